//! CLI error type with warning and exit-code handling
//!
//! Warnings are the one place an "error" does not fail the process: they
//! print to stderr with a warning label and the process exits 0.

use airlift_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Operation was a no-op; reported but not a failure
    #[error("{0}")]
    #[diagnostic(code(airlift::cli::warning))]
    Warning(String),

    /// Interrupted by the user
    #[error("operation cancelled")]
    #[diagnostic(code(airlift::cli::cancelled))]
    Cancelled,

    /// Anything that failed inside the engine
    #[error(transparent)]
    #[diagnostic(code(airlift::cli::error))]
    Engine(KubeError),

    /// IO failure reading input or writing output
    #[error("IO error: {0}")]
    #[diagnostic(code(airlift::cli::io))]
    Io(#[from] std::io::Error),
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Warning(message) => CliError::Warning(message),
            KubeError::Flight(flight) if flight.is_cancelled() => CliError::Cancelled,
            other => CliError::Engine(other),
        }
    }
}

impl CliError {
    pub fn is_warning(&self) -> bool {
        matches!(self, CliError::Warning(_))
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Warning(_) => exit_codes::SUCCESS,
            CliError::Cancelled => exit_codes::CANCELLED,
            _ => exit_codes::ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_exits_zero() {
        let err: CliError = KubeError::warning("nothing to do").into();
        assert!(err.is_warning());
        assert_eq!(err.exit_code(), exit_codes::SUCCESS);
    }

    #[test]
    fn test_engine_errors_exit_one() {
        let err: CliError = KubeError::Storage("bad".to_string()).into();
        assert!(!err.is_warning());
        assert_eq!(err.exit_code(), exit_codes::ERROR);
    }

    #[test]
    fn test_cancelled_flight_maps_to_cancelled() {
        let err: CliError = KubeError::Flight(airlift_wasm::WasmError::Cancelled {
            stderr: "(no output captured on stderr)".to_string(),
        })
        .into();
        assert!(matches!(err, CliError::Cancelled));
        assert_eq!(err.exit_code(), exit_codes::CANCELLED);
    }
}
