//! Command-line surface: supervisor flags and the child exec vector.

use std::path::PathBuf;

use clap::Parser;

use crate::error::Error;
use crate::init::InitPaths;

/// Fixed source tree for template rendering.
pub const TEMPLATES_ROOT: &str = "/templates";
/// Default jinja include directory.
pub const DEFAULT_JINJA: &str = "/jinja";
/// Default variables file; allowed to be absent unless overridden.
pub const DEFAULT_VARIABLES: &str = "/variables.yml";
/// Default hooks directory.
pub const DEFAULT_HOOKS: &str = "/entrypoint_hooks";

#[derive(Debug, Parser)]
#[command(name = "entrypoint")]
#[command(about = "Container init: render templates, run hooks, supervise one child", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv); logs go to stderr.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Skip PID 1 duties; exec the command directly after initialization.
    #[arg(long)]
    pub no_init: bool,

    /// Keep the child in this session; signal only the child, not a group.
    #[arg(long)]
    pub no_setsid: bool,

    /// Rewrite an incoming signal before forwarding; TO may be NONE to drop.
    #[arg(long, value_name = "FROM:TO", action = clap::ArgAction::Append)]
    pub rewrite: Vec<String>,

    /// Override the jinja include directory.
    #[arg(long, value_name = "PATH")]
    pub jinja: Option<PathBuf>,

    /// Override the variables file path.
    #[arg(long, value_name = "PATH")]
    pub variables: Option<PathBuf>,

    /// Override the hooks directory.
    #[arg(long, value_name = "PATH")]
    pub hooks: Option<PathBuf>,

    /// Command and arguments to run as the supervised child.
    #[arg(value_name = "CMD", trailing_var_arg = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// The child argv; an empty vector is a startup error.
    pub fn exec_vector(&self) -> Result<&[String], Error> {
        if self.command.is_empty() {
            return Err(Error::MissingExecVector);
        }
        Ok(&self.command)
    }

    /// Paths the initialization driver operates on, with overrides applied.
    pub fn init_paths(&self) -> InitPaths {
        InitPaths {
            templates_root: PathBuf::from(TEMPLATES_ROOT),
            jinja_root: self
                .jinja
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_JINJA)),
            variables_file: self
                .variables
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VARIABLES)),
            variables_explicit: self.variables.is_some(),
            hooks_dir: self
                .hooks
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HOOKS)),
            dest_root: PathBuf::from("/"),
        }
    }
}
