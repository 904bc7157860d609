//! Error taxonomy for the entrypoint binary.
//!
//! Every failure surface maps to one variant; nothing is retried. `exit_code`
//! turns a kind into the process exit status contract: 127 when the child
//! command could not be executed, 1 for every other startup failure.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown signal name {0:?}")]
    BadSignalName(String),

    #[error("malformed rewrite {0:?}: expected FROM:TO")]
    BadRewrite(String),

    #[error("no command given to execute")]
    MissingExecVector,

    #[error("variables file {} does not exist", .0.display())]
    VariablesMissing(PathBuf),

    #[error("cannot load variables from {}: {reason}", .path.display())]
    ParseError { path: PathBuf, reason: String },

    #[error("template render failed for {}: {reason}", .path.display())]
    RenderFailed { path: PathBuf, reason: String },

    #[error("hook unit {unit:?} failed: {reason}")]
    HookError { unit: String, reason: String },

    #[error("failed to spawn child process: {0}")]
    ForkFailed(std::io::Error),

    #[error("failed to execute command: {0}")]
    ExecFailed(std::io::Error),

    #[error("signal handling setup failed: {0}")]
    SignalSetup(nix::errno::Errno),

    #[error("waiting for signals failed: {0}")]
    WaitFailed(nix::errno::Errno),
}

impl Error {
    /// Exit status reported for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ExecFailed(_) => 127,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
