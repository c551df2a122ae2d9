//! Job error and outcome types

use thiserror::Error;

/// Error raised by a job handler while processing one row
///
/// The variant decides what the poller does next: the two classified kinds
/// are reported and swallowed, anything else is reported and propagated.
#[derive(Debug, Error)]
pub enum JobError {
    /// The row's content cannot be processed; needs external correction
    #[error("bad input data: {0}")]
    DataValidation(String),

    /// Processing failed operationally (tool exited non-zero, timeout, ...)
    #[error("job execution failed: {0}")]
    Runtime(String),

    /// Anything the handler did not classify
    #[error(transparent)]
    Unclassified(#[from] anyhow::Error),
}

impl JobError {
    pub fn data_validation(message: impl Into<String>) -> Self {
        Self::DataValidation(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Whether the poll cycle may continue after reporting this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Unclassified(_))
    }

    /// Short label used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataValidation(_) => "data",
            Self::Runtime(_) => "runtime",
            Self::Unclassified(_) => "unclassified",
        }
    }
}

/// Result of running a handler on one row
#[derive(Debug)]
pub enum JobOutcome {
    /// Handler returned normally; any success bookkeeping was its own job
    Success,
    /// Reported to the store, cycle continues
    RecoverableFailure(JobError),
    /// Reported to the store, then re-raised out of the executor
    FatalFailure(JobError),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<Result<(), JobError>> for JobOutcome {
    fn from(result: Result<(), JobError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(e) if e.is_recoverable() => Self::RecoverableFailure(e),
            Err(e) => Self::FatalFailure(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(matches!(
            JobOutcome::from(Ok(())),
            JobOutcome::Success
        ));
        assert!(matches!(
            JobOutcome::from(Err(JobError::data_validation("no file"))),
            JobOutcome::RecoverableFailure(JobError::DataValidation(_))
        ));
        assert!(matches!(
            JobOutcome::from(Err(JobError::runtime("exit 1"))),
            JobOutcome::RecoverableFailure(JobError::Runtime(_))
        ));
        assert!(matches!(
            JobOutcome::from(Err(JobError::from(anyhow::anyhow!("boom")))),
            JobOutcome::FatalFailure(JobError::Unclassified(_))
        ));
    }

    #[test]
    fn test_anyhow_converts_to_unclassified() {
        fn handler() -> Result<(), JobError> {
            let _n: u32 = "x".parse().map_err(anyhow::Error::from)?;
            Ok(())
        }
        let err = handler().unwrap_err();
        assert_eq!(err.kind(), "unclassified");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            JobError::data_validation("missing Filename").to_string(),
            "bad input data: missing Filename"
        );
        assert_eq!(
            JobError::runtime("exit status 2").to_string(),
            "job execution failed: exit status 2"
        );
    }
}
