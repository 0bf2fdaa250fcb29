//! Error thresholds: the policy turning an error count into a stop signal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default minimum sample size for ratio thresholds.
pub const DEFAULT_MIN_SAMPLE: u64 = 100;

/// How many errors a run tolerates before aborting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorThreshold {
    /// Never abort.
    Unlimited,
    /// Abort when strictly more than `max` errors have occurred.
    /// `max = 0` stops on the first error.
    Absolute { max: u64 },
    /// Abort when `errors / total > max_ratio`, once at least
    /// `min_sample` items have been seen.
    Ratio { max_ratio: f32, min_sample: u64 },
}

impl ErrorThreshold {
    #[must_use]
    pub fn unlimited() -> Self {
        Self::Unlimited
    }

    #[must_use]
    pub fn absolute(max: u64) -> Self {
        Self::Absolute { max }
    }

    #[must_use]
    pub fn ratio(max_ratio: f32, min_sample: u64) -> Self {
        Self::Ratio {
            max_ratio,
            min_sample,
        }
    }

    /// Parse the `log.maxErrors` syntax: a non-negative integer, an
    /// integer percentage `N%`, or `-1` for unlimited.
    pub fn parse(input: &str) -> Result<Self, ThresholdParseError> {
        let trimmed = input.trim();
        if let Some(pct) = trimmed.strip_suffix('%') {
            let pct: u32 = pct
                .trim()
                .parse()
                .map_err(|_| ThresholdParseError(input.to_string()))?;
            if pct == 0 || pct > 100 {
                return Err(ThresholdParseError(input.to_string()));
            }
            return Ok(Self::Ratio {
                max_ratio: pct as f32 / 100.0,
                min_sample: DEFAULT_MIN_SAMPLE,
            });
        }
        let value: i64 = trimmed
            .parse()
            .map_err(|_| ThresholdParseError(input.to_string()))?;
        match value {
            -1 => Ok(Self::Unlimited),
            v if v >= 0 => Ok(Self::Absolute { max: v as u64 }),
            _ => Err(ThresholdParseError(input.to_string())),
        }
    }

    /// Decide whether the threshold is crossed at the current counts.
    /// Callers invoke this after every error increment.
    #[must_use]
    pub fn is_exceeded(&self, errors: u64, total: u64) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Absolute { max } => errors > *max,
            Self::Ratio {
                max_ratio,
                min_sample,
            } => total >= *min_sample && errors as f64 / total as f64 > f64::from(*max_ratio),
        }
    }

    /// The operator-facing abort message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Unlimited => "Too many errors.".to_string(),
            Self::Absolute { max } => {
                format!("Too many errors, the maximum allowed is {max}.")
            }
            Self::Ratio { max_ratio, .. } => {
                format!(
                    "Too many errors, the maximum allowed is {}%.",
                    (max_ratio * 100.0).round() as u32
                )
            }
        }
    }
}

impl fmt::Display for ErrorThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Absolute { max } => write!(f, "{max}"),
            Self::Ratio { max_ratio, .. } => {
                write!(f, "{}%", (max_ratio * 100.0).round() as u32)
            }
        }
    }
}

/// Raised for unparseable threshold syntax.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid error threshold '{0}': expected a non-negative integer, 'N%', or -1")]
pub struct ThresholdParseError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_values() {
        assert_eq!(ErrorThreshold::parse("0").unwrap(), ErrorThreshold::absolute(0));
        assert_eq!(ErrorThreshold::parse("100").unwrap(), ErrorThreshold::absolute(100));
        assert_eq!(ErrorThreshold::parse(" 2 ").unwrap(), ErrorThreshold::absolute(2));
    }

    #[test]
    fn parses_unlimited() {
        assert_eq!(ErrorThreshold::parse("-1").unwrap(), ErrorThreshold::Unlimited);
    }

    #[test]
    fn parses_percentages() {
        let t = ErrorThreshold::parse("1%").unwrap();
        assert_eq!(
            t,
            ErrorThreshold::ratio(0.01, DEFAULT_MIN_SAMPLE)
        );
    }

    #[test]
    fn rejects_bad_syntax() {
        assert!(ErrorThreshold::parse("").is_err());
        assert!(ErrorThreshold::parse("-2").is_err());
        assert!(ErrorThreshold::parse("0%").is_err());
        assert!(ErrorThreshold::parse("101%").is_err());
        assert!(ErrorThreshold::parse("abc").is_err());
    }

    #[test]
    fn absolute_zero_stops_on_first_error() {
        let t = ErrorThreshold::absolute(0);
        assert!(!t.is_exceeded(0, 10));
        assert!(t.is_exceeded(1, 10));
    }

    #[test]
    fn absolute_is_strictly_greater_than() {
        let t = ErrorThreshold::absolute(2);
        assert!(!t.is_exceeded(2, 100));
        assert!(t.is_exceeded(3, 100));
    }

    #[test]
    fn ratio_waits_for_min_sample() {
        let t = ErrorThreshold::ratio(0.01, 100);
        // 3 failures out of 3: ratio grossly exceeded but sample too small.
        assert!(!t.is_exceeded(3, 3));
        assert!(!t.is_exceeded(99, 99));
        // At total 101 with 101 errors, both conditions hold.
        assert!(t.is_exceeded(101, 101));
    }

    #[test]
    fn ratio_boundary_is_strict() {
        let t = ErrorThreshold::ratio(0.5, 10);
        assert!(!t.is_exceeded(5, 10));
        assert!(t.is_exceeded(6, 10));
    }

    #[test]
    fn abort_messages() {
        assert_eq!(
            ErrorThreshold::absolute(0).message(),
            "Too many errors, the maximum allowed is 0."
        );
        assert_eq!(
            ErrorThreshold::absolute(2).message(),
            "Too many errors, the maximum allowed is 2."
        );
        assert_eq!(
            ErrorThreshold::ratio(0.01, 100).message(),
            "Too many errors, the maximum allowed is 1%."
        );
    }
}
