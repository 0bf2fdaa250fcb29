//! Execution error model.
//!
//! [`ExecError`] classifies driver failures into recoverable kinds (logged
//! and counted against the error threshold) and unrecoverable kinds
//! (programming or protocol errors that abort the run immediately).

use crate::threshold::ErrorThreshold;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a driver execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ExecErrorKind {
    /// Request timed out at the coordinator (retryable by the operator).
    Timeout,
    /// Not enough replicas alive to satisfy the consistency level.
    Unavailable,
    /// Coordinator timed out waiting for replica writes.
    WriteTimeout,
    /// Coordinator timed out waiting for replica reads.
    ReadTimeout,
    /// Invalid argument: a programming error, aborts the run.
    IllegalArgument,
    /// Protocol-level violation, aborts the run.
    ProtocolViolation,
    /// Anything else the driver reported.
    Other,
}

impl fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::WriteTimeout => "write timeout",
            Self::ReadTimeout => "read timeout",
            Self::IllegalArgument => "illegal argument",
            Self::ProtocolViolation => "protocol violation",
            Self::Other => "execution error",
        };
        f.write_str(s)
    }
}

/// A failed statement execution, as reported by the driver adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("Statement execution failed: {message} ({kind})")]
pub struct ExecError {
    pub kind: ExecErrorKind,
    pub message: String,
}

impl ExecError {
    #[must_use]
    pub fn new(kind: ExecErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Unrecoverable errors bypass the error threshold and abort the run.
    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self.kind,
            ExecErrorKind::IllegalArgument | ExecErrorKind::ProtocolViolation
        )
    }
}

/// Raised when the configured error threshold is crossed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", .threshold.message())]
pub struct TooManyErrors {
    pub threshold: ErrorThreshold,
}

impl TooManyErrors {
    #[must_use]
    pub fn new(threshold: ErrorThreshold) -> Self {
        Self { threshold }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_recoverable() {
        for kind in [
            ExecErrorKind::Timeout,
            ExecErrorKind::Unavailable,
            ExecErrorKind::WriteTimeout,
            ExecErrorKind::ReadTimeout,
            ExecErrorKind::Other,
        ] {
            assert!(!ExecError::new(kind, "x").is_unrecoverable(), "{kind}");
        }
    }

    #[test]
    fn argument_and_protocol_errors_abort() {
        assert!(ExecError::new(ExecErrorKind::IllegalArgument, "x").is_unrecoverable());
        assert!(ExecError::new(ExecErrorKind::ProtocolViolation, "x").is_unrecoverable());
    }

    #[test]
    fn display_includes_message_and_kind() {
        let err = ExecError::new(ExecErrorKind::Timeout, "error 1");
        assert_eq!(
            err.to_string(),
            "Statement execution failed: error 1 (timeout)"
        );
    }

    #[test]
    fn too_many_errors_uses_threshold_message() {
        let err = TooManyErrors::new(ErrorThreshold::absolute(0));
        assert_eq!(err.to_string(), "Too many errors, the maximum allowed is 0.");
    }

    #[test]
    fn exec_error_serde_roundtrip() {
        let err = ExecError::new(ExecErrorKind::WriteTimeout, "replica lag");
        let json = serde_json::to_string(&err).unwrap();
        let back: ExecError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
