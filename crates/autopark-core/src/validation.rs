//! # Validation Module
//!
//! Input validation for AutoPark.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: OCR / UI collaborator                                        │
//! │  └── Basic capture quality, immediate feedback                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (parse-at-boundary)                              │
//! │  └── Plate normalization, username/name rules, tariff sanity           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  └── NOT NULL, UNIQUE, CHECK, foreign key constraints                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::tariff::TariffSchedule;
use crate::{MAX_NAME_LEN, MAX_PLATE_LEN, MAX_USERNAME_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Plate Validation
// =============================================================================

/// Validates and normalizes a license plate.
///
/// ## Rules
/// - Trimmed and uppercased (the normalized form is the business key)
/// - Must not be empty
/// - At most 16 characters
/// - Letters, digits, hyphens, and inner spaces only
///
/// ## Example
/// ```rust
/// use autopark_core::validation::normalize_plate;
///
/// assert_eq!(normalize_plate(" abc-123 ").unwrap(), "ABC-123");
/// assert!(normalize_plate("").is_err());
/// assert!(normalize_plate("A!@#").is_err());
/// ```
pub fn normalize_plate(plate: &str) -> ValidationResult<String> {
    let plate = plate.trim();

    if plate.is_empty() {
        return Err(ValidationError::Required {
            field: "plate_number".to_string(),
        });
    }

    if plate.chars().count() > MAX_PLATE_LEN {
        return Err(ValidationError::TooLong {
            field: "plate_number".to_string(),
            max: MAX_PLATE_LEN,
        });
    }

    if !plate
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ' ')
    {
        return Err(ValidationError::InvalidFormat {
            field: "plate_number".to_string(),
            reason: "must contain only letters, digits, hyphens, and spaces".to_string(),
        });
    }

    Ok(plate.to_ascii_uppercase())
}

/// Clamps an OCR confidence score to [0, 1].
///
/// Confidence is advisory only, so out-of-range values are clamped rather
/// than rejected. NaN clamps to 0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, 1.0)
}

// =============================================================================
// Operator Validation
// =============================================================================

/// Validates a username.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 32 characters
/// - Letters, digits, dots, hyphens, underscores
pub fn validate_username(username: &str) -> ValidationResult<String> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::Required {
            field: "username".to_string(),
        });
    }

    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: MAX_USERNAME_LEN,
        });
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must contain only letters, digits, dots, hyphens, and underscores"
                .to_string(),
        });
    }

    Ok(username.to_string())
}

/// Validates a display name.
pub fn validate_display_name(name: &str) -> ValidationResult<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(name.to_string())
}

// =============================================================================
// Tariff Validation
// =============================================================================

/// Rejects negative tariff amounts before they reach the settings table.
pub fn validate_rate(field: &str, rate: Money) -> ValidationResult<()> {
    if rate.is_negative() {
        return Err(ValidationError::NegativeAmount {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a full tariff schedule update.
pub fn validate_tariff_schedule(schedule: &TariffSchedule) -> ValidationResult<()> {
    validate_rate("tariff_first_hour", schedule.first_hour)?;
    validate_rate("tariff_additional_hour", schedule.additional_hour)?;
    validate_rate("tariff_max_daily", schedule.max_daily)?;
    validate_rate("tariff_night_rate", schedule.night_hour)?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plate_normalization() {
        assert_eq!(normalize_plate("abc-123").unwrap(), "ABC-123");
        assert_eq!(normalize_plate("  v2x 481  ").unwrap(), "V2X 481");
        assert_eq!(normalize_plate("ABC123").unwrap(), "ABC123");
    }

    #[test]
    fn test_plate_rejections() {
        assert!(matches!(
            normalize_plate(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            normalize_plate("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            normalize_plate("ABCDEFGH-123456789"),
            Err(ValidationError::TooLong { .. })
        ));
        assert!(matches!(
            normalize_plate("AB#123"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_confidence_clamping() {
        assert_eq!(clamp_confidence(0.85), 0.85);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
    }

    #[test]
    fn test_username_rules() {
        assert_eq!(validate_username("operador2").unwrap(), "operador2");
        assert_eq!(validate_username(" maria.q ").unwrap(), "maria.q");
        assert!(validate_username("").is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username(&"x".repeat(40)).is_err());
    }

    #[test]
    fn test_negative_rate_rejected() {
        assert!(validate_rate("tariff_first_hour", Money::from_cents(500)).is_ok());
        assert!(validate_rate("tariff_first_hour", Money::zero()).is_ok());
        assert!(matches!(
            validate_rate("tariff_first_hour", Money::from_cents(-100)),
            Err(ValidationError::NegativeAmount { .. })
        ));
    }

    #[test]
    fn test_tariff_schedule_validation() {
        assert!(validate_tariff_schedule(&TariffSchedule::default()).is_ok());

        let bad = TariffSchedule {
            night_hour: Money::from_cents(-1),
            ..TariffSchedule::default()
        };
        assert!(validate_tariff_schedule(&bad).is_err());
    }
}
