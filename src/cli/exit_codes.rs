//! CLI Exit Codes
//!
//! A script run either succeeds or it does not; automation only has to test
//! for zero.

use std::process::ExitCode;

use crate::core::runner::RunnerError;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Script validated and, unless only validated, ran to completion
    pub const SUCCESS: u8 = 0;

    /// Any configuration, validation, load or execution failure
    pub const FAILURE: u8 = 1;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional output for stdout
    Success(Option<String>),

    /// Failure with message
    Error(String),
}

impl CliResult {
    /// Success without output
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success printing `msg`
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error(msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(_) => ExitCodes::FAILURE,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to `ExitCode`
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<RunnerError> for CliResult {
    fn from(err: RunnerError) -> Self {
        Self::Error(err.to_string())
    }
}

impl From<anyhow::Error> for CliResult {
    fn from(err: anyhow::Error) -> Self {
        Self::Error(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::ScriptError;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);
        assert_eq!(success.message(), None);

        let error = CliResult::error("Missing plugins: UART");
        assert!(!error.is_success());
        assert_eq!(error.code(), 1);
        assert_eq!(error.message(), Some("Missing plugins: UART"));
    }

    #[test]
    fn test_from_runner_error() {
        let err = RunnerError::Script(ScriptError::OrphanLabel {
            line: 4,
            label: "END".into(),
        });
        let result = CliResult::from(err);
        assert_eq!(result.code(), ExitCodes::FAILURE);
        assert_eq!(result.message(), Some("Line 4: label [END] without preceding GOTO"));
    }
}
