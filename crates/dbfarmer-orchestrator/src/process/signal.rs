use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::command::CommandSpec;
use crate::error::OrchestratorError;

/// Signals used to stop node processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    /// SIGTERM (15) - Graceful termination request.
    #[default]
    Term,
    /// SIGINT (2) - Fast shutdown for the database server.
    Int,
    /// SIGQUIT (3) - Immediate shutdown.
    Quit,
    /// SIGKILL (9) - Forceful termination (cannot be caught).
    Kill,
}

impl Signal {
    /// Returns the signal name (without SIG prefix).
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Term => "TERM",
            Signal::Int => "INT",
            Signal::Quit => "QUIT",
            Signal::Kill => "KILL",
        }
    }

    /// Builds `kill -s <NAME> <pid>`.
    pub fn kill_command(&self, pid: u32) -> CommandSpec {
        CommandSpec::new("kill")
            .args(["-s", self.name()])
            .arg(pid.to_string())
    }

    /// Builds `kill -0 <pid>`, which succeeds only while the process exists.
    pub fn probe_command(pid: u32) -> CommandSpec {
        CommandSpec::new("kill").arg("-0").arg(pid.to_string())
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.name())
    }
}

impl FromStr for Signal {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.strip_prefix("SIG").unwrap_or(&upper) {
            "TERM" | "15" => Ok(Signal::Term),
            "INT" | "2" => Ok(Signal::Int),
            "QUIT" | "3" => Ok(Signal::Quit),
            "KILL" | "9" => Ok(Signal::Kill),
            _ => Err(OrchestratorError::configuration(format!(
                "unsupported signal: {}",
                s
            ))),
        }
    }
}
