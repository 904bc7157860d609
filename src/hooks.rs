//! Hook units: per-phase executables discovered in the hooks directory.
//!
//! A unit is either a subdirectory holding any of the executables
//! `prehook`, `hook`, `posthook` (its capability set is exactly the entry
//! points present), or a plain executable file, which counts as a unit
//! offering only `hook`. Units run in lexicographic order of their names.
//!
//! Each entry point receives the current variable space as a YAML mapping
//! on stdin. A prehook may mutate: non-empty stdout must parse as a YAML
//! mapping and replaces the space; hook and posthook output is inherited.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::Error;
use crate::vars::VariableSpace;

/// One discovered unit and the entry points it offers.
#[derive(Debug)]
pub struct HookUnit {
    pub name: String,
    pub prehook: Option<PathBuf>,
    pub hook: Option<PathBuf>,
    pub posthook: Option<PathBuf>,
}

/// Enumerate hook units, sorted by unit name.
///
/// A missing hooks directory yields no units.
pub fn discover(dir: &Path) -> Result<Vec<HookUnit>, Error> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "no hooks directory");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(hook_err(
                &dir.display().to_string(),
                format!("cannot read hooks directory: {e}"),
            ));
        }
    };

    let mut units = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            hook_err(
                &dir.display().to_string(),
                format!("cannot read hooks directory: {e}"),
            )
        })?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if path.is_dir() {
            let unit = HookUnit {
                prehook: entry_point(&path, "prehook"),
                hook: entry_point(&path, "hook"),
                posthook: entry_point(&path, "posthook"),
                name,
            };
            if unit.prehook.is_some() || unit.hook.is_some() || unit.posthook.is_some() {
                units.push(unit);
            } else {
                debug!(unit = %unit.name, "unit offers no entry points, skipping");
            }
        } else if is_executable(&path) {
            units.push(HookUnit {
                name,
                prehook: None,
                hook: Some(path),
                posthook: None,
            });
        } else {
            debug!(path = %path.display(), "not executable, skipping");
        }
    }

    units.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(units)
}

/// Run every prehook in unit order; each may replace the variable space.
pub fn run_prehooks(units: &[HookUnit], vars: &mut VariableSpace) -> Result<(), Error> {
    for unit in units {
        let Some(program) = &unit.prehook else {
            continue;
        };
        info!(unit = %unit.name, "running prehook");
        let stdout = run_phase(&unit.name, "prehook", program, vars, true)?;
        let stdout = stdout.unwrap_or_default();
        if stdout.trim().is_empty() {
            continue;
        }
        let doc: serde_yaml::Value = serde_yaml::from_str(&stdout).map_err(|e| {
            hook_err(&unit.name, format!("prehook output is not valid YAML: {e}"))
        })?;
        let serde_yaml::Value::Mapping(mapping) = doc else {
            return Err(hook_err(&unit.name, "prehook output is not a mapping".to_string()));
        };
        let mut replaced = VariableSpace::new();
        for (key, value) in mapping {
            let serde_yaml::Value::String(key) = key else {
                return Err(hook_err(&unit.name, "prehook output keys must be strings".to_string()));
            };
            replaced.insert(key, value);
        }
        debug!(unit = %unit.name, keys = replaced.len(), "prehook replaced variables");
        *vars = replaced;
    }
    Ok(())
}

/// Run every `hook` entry point in unit order.
pub fn run_hooks(units: &[HookUnit], vars: &VariableSpace) -> Result<(), Error> {
    for unit in units {
        if let Some(program) = &unit.hook {
            info!(unit = %unit.name, "running hook");
            run_phase(&unit.name, "hook", program, vars, false)?;
        }
    }
    Ok(())
}

/// Run every `posthook` entry point in unit order.
pub fn run_posthooks(units: &[HookUnit], vars: &VariableSpace) -> Result<(), Error> {
    for unit in units {
        if let Some(program) = &unit.posthook {
            info!(unit = %unit.name, "running posthook");
            run_phase(&unit.name, "posthook", program, vars, false)?;
        }
    }
    Ok(())
}

/// Execute one entry point, feeding the variable space as YAML on stdin.
/// Returns captured stdout when `capture` is set.
fn run_phase(
    unit: &str,
    phase: &str,
    program: &Path,
    vars: &VariableSpace,
    capture: bool,
) -> Result<Option<String>, Error> {
    let payload = serde_yaml::to_string(vars)
        .map_err(|e| hook_err(unit, format!("cannot serialize variables: {e}")))?;

    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::piped());
    if capture {
        cmd.stdout(Stdio::piped());
    }
    let mut child = cmd
        .spawn()
        .map_err(|e| hook_err(unit, format!("cannot spawn {phase}: {e}")))?;

    // A hook is free not to read its stdin; a broken pipe here is fine.
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(payload.as_bytes());
    }

    let (status, stdout) = if capture {
        let output = child
            .wait_with_output()
            .map_err(|e| hook_err(unit, format!("cannot wait for {phase}: {e}")))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        (output.status, Some(stdout))
    } else {
        let status = child
            .wait()
            .map_err(|e| hook_err(unit, format!("cannot wait for {phase}: {e}")))?;
        (status, None)
    };

    if !status.success() {
        return Err(hook_err(unit, format!("{phase} exited with {status}")));
    }
    Ok(stdout)
}

fn entry_point(unit_dir: &Path, name: &str) -> Option<PathBuf> {
    let path = unit_dir.join(name);
    is_executable(&path).then_some(path)
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn hook_err(unit: &str, reason: String) -> Error {
    Error::HookError {
        unit: unit.to_string(),
        reason,
    }
}
