//! Pipeline error model.
//!
//! `TooManyErrors` and `Unrecoverable` are the two fatal paths out of an
//! otherwise error-recovering pipeline: the former when the configured
//! threshold is crossed, the latter for programming/protocol errors that
//! must not be absorbed by the error counter.
//!
//! `Infrastructure` wraps opaque host-side errors (I/O on log artifacts,
//! channel failures, worker panics, etc.).

use bulkflow_types::{ExecError, TooManyErrors};

/// Categorized pipeline error deciding the run's exit path.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The configured error threshold was crossed.
    #[error(transparent)]
    TooManyErrors(#[from] TooManyErrors),
    /// A driver failure that indicates a programming error; aborts
    /// without counting toward the threshold.
    #[error(transparent)]
    Unrecoverable(ExecError),
    /// Infrastructure error (file I/O, channels, worker panics, etc.)
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl PipelineError {
    /// True when the failure is the threshold stop signal, used by the
    /// CLI to pick exit code 3.
    #[must_use]
    pub fn is_threshold_abort(&self) -> bool {
        matches!(self, Self::TooManyErrors(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkflow_types::{ErrorThreshold, ExecErrorKind};

    #[test]
    fn threshold_abort_is_detected() {
        let err = PipelineError::from(TooManyErrors::new(ErrorThreshold::absolute(0)));
        assert!(err.is_threshold_abort());
        assert_eq!(err.to_string(), "Too many errors, the maximum allowed is 0.");
    }

    #[test]
    fn unrecoverable_keeps_exec_error_message() {
        let err = PipelineError::Unrecoverable(ExecError::new(
            ExecErrorKind::IllegalArgument,
            "error 1",
        ));
        assert!(!err.is_threshold_abort());
        assert!(err.to_string().contains("error 1"));
    }

    #[test]
    fn infrastructure_from_anyhow() {
        let err: PipelineError = anyhow::anyhow!("log directory unwritable").into();
        assert!(matches!(err, PipelineError::Infrastructure(_)));
    }
}
