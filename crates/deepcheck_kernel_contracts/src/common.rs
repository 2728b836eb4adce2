#![forbid(unsafe_code)]

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
        got: f64,
    },
    NotFinite {
        field: &'static str,
    },
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => write!(f, "{field} {reason}"),
            Self::InvalidRange {
                field,
                min,
                max,
                got,
            } => write!(f, "{field} must be within {min}..={max} (got {got})"),
            Self::NotFinite { field } => write!(f, "{field} must be finite"),
        }
    }
}

impl std::error::Error for ContractViolation {}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

/// Shared checks for short human-entered text fields.
pub(crate) fn validate_text(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if value.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if value.chars().count() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds maximum length",
        });
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not contain control characters",
        });
    }
    Ok(())
}

pub(crate) fn validate_unit_interval(field: &'static str, v: f64) -> Result<(), ContractViolation> {
    if !v.is_finite() {
        return Err(ContractViolation::NotFinite { field });
    }
    if !(0.0..=1.0).contains(&v) {
        return Err(ContractViolation::InvalidRange {
            field,
            min: 0.0,
            max: 1.0,
            got: v,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_common_01_text_rejects_blank_and_control_chars() {
        assert!(validate_text("f", "  ", 8).is_err());
        assert!(validate_text("f", "a\nb", 8).is_err());
        assert!(validate_text("f", "abcdefghi", 8).is_err());
        assert!(validate_text("f", "alice", 8).is_ok());
    }

    #[test]
    fn at_common_02_unit_interval_bounds() {
        assert!(validate_unit_interval("c", 0.0).is_ok());
        assert!(validate_unit_interval("c", 1.0).is_ok());
        assert!(matches!(
            validate_unit_interval("c", 1.01),
            Err(ContractViolation::InvalidRange { .. })
        ));
        assert!(matches!(
            validate_unit_interval("c", f64::NAN),
            Err(ContractViolation::NotFinite { .. })
        ));
    }

    #[test]
    fn at_common_03_display_names_field() {
        let v = ContractViolation::InvalidValue {
            field: "username",
            reason: "must not be empty",
        };
        assert_eq!(v.to_string(), "username must not be empty");
    }
}
