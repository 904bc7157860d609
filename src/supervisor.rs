//! PID 1 supervisor: spawn one child, forward signals through the rewrite
//! map, reap every descendant, and exit with a status that reflects the
//! child's fate.
//!
//! All forwardable signals are blocked before the child is spawned; the
//! main loop consumes them synchronously with `sigwait`, so no handlers
//! are ever installed and dispositions never change after startup. The
//! child starts with a clean slate: libstd clears the spawned process's
//! signal mask and exec resets dispositions to their defaults.

use std::ffi::CString;
use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{self, Pid};
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::rewrite::{SignalMap, Target};

/// Signals that are never blocked, waited for, or forwarded: KILL and STOP
/// cannot be caught, and the synchronous faults must stay deliverable
/// in-line.
const UNTOUCHABLE: [Signal; 6] = [
    Signal::SIGKILL,
    Signal::SIGSTOP,
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGILL,
];

/// The job-control trio that must also suspend the supervisor itself.
const JOB_CONTROL: [Signal; 3] = [Signal::SIGTSTP, Signal::SIGTTIN, Signal::SIGTTOU];

/// The supervised subprocess.
#[derive(Debug)]
struct ChildHandle {
    pid: Pid,
    use_setsid: bool,
    exited: bool,
    status: Option<WaitStatus>,
}

struct Supervisor {
    child: ChildHandle,
    map: SignalMap,
    suspended: bool,
}

/// Supervise `command` until its fate is known; returns the exit status
/// this process should report.
pub fn run(command: &[String], map: SignalMap, use_setsid: bool) -> Result<i32, Error> {
    let mask = forwardable_mask();
    // Block before spawning so nothing slips through between child creation
    // and the first wait.
    signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&mask), None).map_err(Error::SignalSetup)?;

    let child = spawn_child(command, use_setsid)?;
    info!(pid = child.pid.as_raw(), setsid = use_setsid, "child started");

    let mut sv = Supervisor {
        child,
        map,
        suspended: false,
    };

    loop {
        let sig = mask.wait().map_err(Error::WaitFailed)?;
        if sv.suspended {
            // Waking up again means a CONT brought us back.
            sv.suspended = false;
            debug!("resumed by SIGCONT");
        }
        trace!(signal = sig.as_str(), "signal received");

        if sig == Signal::SIGCHLD {
            sv.reap();
        } else {
            sv.forward(sig);
            if JOB_CONTROL.contains(&sig) {
                sv.suspend();
            }
        }

        // reap() drains fully, so nothing reapable remains here.
        if sv.child.exited {
            break;
        }
    }

    exit_status(&sv.child)
}

/// Replace the current process image with `command` (PATH-resolved,
/// environment inherited). Only returns on failure.
pub fn exec(command: &[String]) -> Error {
    if command.is_empty() {
        return Error::MissingExecVector;
    }
    let argv: Vec<CString> = match command
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect()
    {
        Ok(argv) => argv,
        Err(_) => {
            return Error::ExecFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "argument contains a NUL byte",
            ));
        }
    };

    // libstd ignores SIGPIPE process-wide and ignored dispositions survive
    // exec; the child must start with the default.
    unsafe {
        let _ = signal::signal(Signal::SIGPIPE, SigHandler::SigDfl);
    }

    let errno = match unistd::execvp(&argv[0], &argv) {
        Err(errno) => errno,
        Ok(never) => match never {},
    };
    Error::ExecFailed(std::io::Error::from_raw_os_error(errno as i32))
}

/// The set of signals the supervisor blocks and consumes.
fn forwardable_mask() -> SigSet {
    let mut mask = SigSet::empty();
    for sig in Signal::iterator() {
        if !UNTOUCHABLE.contains(&sig) {
            mask.add(sig);
        }
    }
    mask
}

/// Spawn the child, optionally as leader of a fresh session and group.
fn spawn_child(command: &[String], use_setsid: bool) -> Result<ChildHandle, Error> {
    let (program, args) = command.split_first().ok_or(Error::MissingExecVector)?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    if use_setsid {
        // SAFETY: setsid is async-signal-safe and touches no heap state.
        unsafe {
            cmd.pre_exec(|| {
                unistd::setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                Ok(())
            });
        }
    }
    // spawn reports exec failure synchronously, so a bad command surfaces
    // here rather than as a mysterious child exit.
    let child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => Error::ExecFailed(e),
        _ => Error::ForkFailed(e),
    })?;
    Ok(ChildHandle {
        pid: Pid::from_raw(child.id() as i32),
        use_setsid,
        exited: false,
        status: None,
    })
}

impl Supervisor {
    /// Drain every reapable descendant, recording the supervised child's
    /// status. Orphans re-parented to us are reaped and discarded.
    fn reap(&mut self) {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    let pid = status.pid().expect("exited status carries a pid");
                    if pid == self.child.pid {
                        debug!(?status, "child exited");
                        self.child.exited = true;
                        self.child.status = Some(status);
                    } else {
                        debug!(pid = pid.as_raw(), "reaped orphaned descendant");
                    }
                }
                Ok(other) => trace!(?other, "ignoring wait status"),
                Err(Errno::ECHILD) => break,
                Err(e) => {
                    warn!(error = %e, "waiting for descendants failed");
                    break;
                }
            }
        }
    }

    /// Translate and deliver one signal to the child, or its whole group
    /// when it leads a fresh session.
    fn forward(&self, sig: Signal) {
        let target = match self.map.translate(sig) {
            Target::Drop => {
                debug!(signal = sig.as_str(), "dropping signal");
                return;
            }
            Target::Signal(target) => target,
        };
        let result = if self.child.use_setsid {
            signal::killpg(self.child.pid, target)
        } else {
            signal::kill(self.child.pid, target)
        };
        match result {
            Ok(()) => debug!(from = sig.as_str(), to = target.as_str(), "forwarded signal"),
            Err(e) => debug!(signal = target.as_str(), error = %e, "signal delivery failed"),
        }
    }

    /// Stop alongside the child group so a later CONT resumes both.
    fn suspend(&mut self) {
        self.suspended = true;
        debug!("stopping until SIGCONT");
        if let Err(e) = signal::raise(Signal::SIGSTOP) {
            warn!(error = %e, "failed to stop self");
        }
    }
}

/// Derive the exit status from the reaped child.
fn exit_status(child: &ChildHandle) -> Result<i32, Error> {
    match child.status {
        Some(WaitStatus::Exited(_, code)) => Ok(code),
        Some(WaitStatus::Signaled(_, sig, _)) => {
            // Die by the same signal where possible so our own termination
            // reason is observable; fall back to the shell convention.
            let mut set = SigSet::empty();
            set.add(sig);
            let _ = signal::sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&set), None);
            let _ = signal::raise(sig);
            Ok(128 + sig as i32)
        }
        _ => {
            warn!("child exited without a recorded status");
            Ok(1)
        }
    }
}
