//! Container entrypoint core library.
//!
//! Provides the signal rewrite map, the CLI surface, the initialization
//! pipeline (variables, hooks, template rendering), and the PID 1
//! supervisor loop.

pub mod cli;
pub mod error;
pub mod rewrite;
pub mod vars;
pub mod hooks;
pub mod render;
pub mod init;
pub mod supervisor;
