use std::time::Duration;

use netdiag::error::IsPermanent;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    /// Sanitisation left nothing usable, e.g. a host made only of disallowed characters.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("failed to execute `{program}`")]
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },

    #[error("`{program}` did not finish within {}ms", .after.as_millis())]
    Timeout { program: String, after: Duration },

    #[error("`{program}` failed ({}): {}", describe_code(.code), stderr_or_unknown(.stderr))]
    ProcessFailed {
        program: String,
        /// `None` if the process was terminated by a signal
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to communicate with `{program}`")]
    Io {
        program: String,
        source: std::io::Error,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

fn stderr_or_unknown(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        "Unknown error"
    } else {
        trimmed
    }
}

impl ProbeError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }
}

impl IsPermanent for ProbeError {
    fn is_permanent(&self) -> bool {
        match self {
            ProbeError::InvalidInput { .. } | ProbeError::SpawnFailed { .. } => true,
            ProbeError::Timeout { .. }
            | ProbeError::ProcessFailed { .. }
            | ProbeError::Io { .. } => false,
        }
    }
}
