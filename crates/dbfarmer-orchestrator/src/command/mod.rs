//! External command execution.
//!
//! Every external program the orchestrator touches (`kill`, `psql`,
//! `docker`, `make`, ...) goes through the [`CommandRunner`] trait, which
//! gives all call sites uniform retry and dry-run behaviour.

mod runner;
#[cfg(test)]
mod scripted;
mod system;

pub use runner::{CommandOutput, CommandRunner, CommandSpec, RetryPolicy};
#[cfg(test)]
pub(crate) use scripted::{ScriptedResponse, ScriptedRunner};
pub use system::SystemCommandRunner;
