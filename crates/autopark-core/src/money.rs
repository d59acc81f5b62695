//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A parking fee of S/ 5.00 × 1.2 must be S/ 6.00, not S/ 5.999999...    │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    All fees are i64 cents; settings strings like "5.00" are parsed     │
//! │    at the boundary and serialized back from cents.                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use autopark_core::money::Money;
//!
//! // Create from cents (preferred)
//! let first_hour = Money::from_cents(500); // S/ 5.00
//!
//! // Parse a settings value
//! let parsed = Money::parse_decimal("3.00").unwrap();
//! assert_eq!(parsed.cents(), 300);
//!
//! // Serialize back for the settings table
//! assert_eq!(first_hour.to_decimal_string(), "5.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (céntimos).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for corrections/refunds
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
///
/// ## Where Money Flows
/// ```text
/// app_settings "tariff_first_hour" = "5.00"
///      │ parse_decimal (boundary)
///      ▼
/// TariffSchedule.first_hour ──► compute_fee() ──► VehicleSession.amount_cents
///      │                                               │
///      └── to_decimal_string (boundary) ◄──────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use autopark_core::money::Money;
    ///
    /// let fee = Money::from_cents(500); // S/ 5.00
    /// assert_eq!(fee.cents(), 500);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (soles) portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit (céntimos) portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Parses a decimal settings string ("5.00", "25", "1.5") into cents.
    ///
    /// ## Rules
    /// - At most one decimal point; at most two fraction digits kept
    /// - A single fraction digit means tenths ("1.5" == 150 cents)
    /// - Returns `None` for empty or non-numeric input
    ///
    /// ## Example
    /// ```rust
    /// use autopark_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("5.00"), Some(Money::from_cents(500)));
    /// assert_eq!(Money::parse_decimal("25"), Some(Money::from_cents(2500)));
    /// assert_eq!(Money::parse_decimal("1.5"), Some(Money::from_cents(150)));
    /// assert_eq!(Money::parse_decimal("abc"), None);
    /// ```
    pub fn parse_decimal(input: &str) -> Option<Money> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let (negative, digits) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };

        let (major_part, minor_part) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };

        if major_part.is_empty() && minor_part.is_empty() {
            return None;
        }

        let major: i64 = if major_part.is_empty() {
            0
        } else {
            major_part.parse().ok()?
        };

        // Keep at most two fraction digits, right-padding with zeros
        let minor: i64 = if minor_part.is_empty() {
            0
        } else {
            let trimmed: String = minor_part.chars().take(2).collect();
            if !trimmed.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let value: i64 = trimmed.parse().ok()?;
            if trimmed.len() == 1 {
                value * 10
            } else {
                value
            }
        };

        let cents = major.checked_mul(100)?.checked_add(minor)?;
        Some(if negative { Money(-cents) } else { Money(cents) })
    }

    /// Serializes to the decimal string format used by the settings table.
    ///
    /// ## Example
    /// ```rust
    /// use autopark_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(500).to_decimal_string(), "5.00");
    /// assert_eq!(Money::from_cents(2550).to_decimal_string(), "25.50");
    /// ```
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.major().abs(), self.minor())
    }

    /// Applies a rate multiplier, rounding half-up to the nearest cent.
    ///
    /// ## Example
    /// ```rust
    /// use autopark_core::money::{Money, RateMultiplier};
    ///
    /// let base = Money::from_cents(800); // S/ 8.00
    /// let weekend = base.apply_multiplier(RateMultiplier::from_hundredths(120));
    /// assert_eq!(weekend.cents(), 960); // S/ 9.60
    /// ```
    pub fn apply_multiplier(&self, multiplier: RateMultiplier) -> Money {
        // i128 to prevent overflow; +50 rounds half-up at the cent boundary
        let cents = (self.0 as i128 * multiplier.hundredths() as i128 + 50) / 100;
        Money::from_cents(cents as i64)
    }
}

// =============================================================================
// Rate Multiplier
// =============================================================================

/// A tariff multiplier in integer hundredths (120 = 1.20×).
///
/// ## Why Hundredths?
/// The weekend multiplier is configured as a decimal string ("1.2").
/// Storing it as integer hundredths keeps fee math in pure integer space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateMultiplier(u32);

impl RateMultiplier {
    /// Creates a multiplier from hundredths (120 = 1.2×).
    #[inline]
    pub const fn from_hundredths(hundredths: u32) -> Self {
        RateMultiplier(hundredths)
    }

    /// The identity multiplier (1.0×).
    #[inline]
    pub const fn identity() -> Self {
        RateMultiplier(100)
    }

    /// Returns the multiplier in hundredths.
    #[inline]
    pub const fn hundredths(&self) -> u32 {
        self.0
    }

    /// Checks whether this multiplier changes nothing.
    #[inline]
    pub const fn is_identity(&self) -> bool {
        self.0 == 100
    }

    /// Parses a decimal multiplier string ("1.2") into hundredths.
    pub fn parse_decimal(input: &str) -> Option<RateMultiplier> {
        let factor: f64 = input.trim().parse().ok()?;
        if !factor.is_finite() || factor < 0.0 {
            return None;
        }
        Some(RateMultiplier((factor * 100.0).round() as u32))
    }

    /// Serializes back to the settings decimal format ("1.2", "1.25").
    pub fn to_decimal_string(&self) -> String {
        if self.0 % 100 == 0 {
            format!("{}", self.0 / 100)
        } else if self.0 % 10 == 0 {
            format!("{}.{}", self.0 / 100, (self.0 % 100) / 10)
        } else {
            format!("{}.{:02}", self.0 / 100, self.0 % 100)
        }
    }
}

impl Default for RateMultiplier {
    fn default() -> Self {
        RateMultiplier::identity()
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for logs and debugging. Receipts format through the ticket
/// collaborator, which handles localization.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}S/ {}.{:02}", sign, self.major().abs(), self.minor())
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

/// Addition of two Money values.
impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

/// Addition assignment (+=).
impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

/// Subtraction of two Money values.
impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

/// Subtraction assignment (-=).
impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by i64 (for per-hour and per-day math).
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, count: i64) -> Self {
        Money(self.0 * count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
