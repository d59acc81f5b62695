//! # Tariff Engine
//!
//! Pure fee calculation for parking sessions.
//!
//! ## Fee Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Fee Calculation                                  │
//! │                                                                         │
//! │  duration = ceil((exit − entry) / 1 minute), clamped to ≥ 0            │
//! │                                                                         │
//! │  duration == 0          →  S/ 0.00 (near-instant exit)                 │
//! │  duration 1..=60 min    →  first_hour (flat, not prorated)             │
//! │  duration > 60 min      →  first_hour                                  │
//! │                            + one rate per started additional hour:     │
//! │                              • night_hour if the hour begins inside    │
//! │                                the 22:00–06:00 window                  │
//! │                              • additional_hour otherwise               │
//! │                                                                         │
//! │  entry on Sat/Sun       →  subtotal × weekend_multiplier               │
//! │  final                  →  min(subtotal, max_daily × days spanned)     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Purity
//! `compute_fee` performs no I/O and is fully deterministic given its
//! inputs. Timestamps are interpreted as facility wall-clock readings.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::money::{Money, RateMultiplier};

// =============================================================================
// Constants
// =============================================================================

/// Hour of day (inclusive) at which the night tariff window opens.
pub const NIGHT_WINDOW_START_HOUR: u32 = 22;

/// Hour of day (exclusive) at which the night tariff window closes.
pub const NIGHT_WINDOW_END_HOUR: u32 = 6;

/// Minutes in a billing day, used by the daily cap.
const MINUTES_PER_DAY: i64 = 24 * 60;

// =============================================================================
// Tariff Schedule
// =============================================================================

/// The fee schedule applied when a session exits.
///
/// Stored flat in `app_settings` (`tariff_*` keys) and materialized into
/// this struct at the parse boundary. Read on every exit calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TariffSchedule {
    /// Flat charge covering any stay up to one hour.
    pub first_hour: Money,

    /// Charge per started additional hour (daytime).
    pub additional_hour: Money,

    /// Cap per started 24h day; disabled when zero.
    pub max_daily: Money,

    /// Charge per started additional hour beginning inside the night window.
    pub night_hour: Money,

    /// Multiplier applied when the entry falls on Saturday or Sunday.
    pub weekend_multiplier: RateMultiplier,
}

impl Default for TariffSchedule {
    /// First-run defaults: 5.00 / 3.00 / 25.00 / 2.00 / 1.2.
    fn default() -> Self {
        TariffSchedule {
            first_hour: Money::from_cents(500),
            additional_hour: Money::from_cents(300),
            max_daily: Money::from_cents(2500),
            night_hour: Money::from_cents(200),
            weekend_multiplier: RateMultiplier::from_hundredths(120),
        }
    }
}

// =============================================================================
// Duration
// =============================================================================

/// Billable duration in whole minutes: ceil of the elapsed time.
///
/// Negative intervals (clock skew) clamp to zero. A stay of 61 seconds
/// bills as 2 minutes; a stay of exactly 60 seconds bills as 1.
///
/// ## Example
/// ```rust
/// use autopark_core::tariff::duration_minutes;
/// use chrono::{TimeZone, Utc};
///
/// let entry = Utc.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap();
/// let exit = Utc.with_ymd_and_hms(2026, 3, 11, 10, 30, 0).unwrap();
/// assert_eq!(duration_minutes(entry, exit), 30);
/// ```
pub fn duration_minutes(entry: DateTime<Utc>, exit: DateTime<Utc>) -> i64 {
    let elapsed_ms = (exit - entry).num_milliseconds();
    if elapsed_ms <= 0 {
        return 0;
    }
    (elapsed_ms + 59_999) / 60_000
}

// =============================================================================
// Fee Calculation
// =============================================================================

/// Computes the fee for a parked interval against a tariff schedule.
///
/// ## Arguments
/// * `entry` - When the vehicle entered
/// * `exit` - When the vehicle left
/// * `schedule` - The tariff schedule in force at exit time
///
/// ## Example
/// ```rust
/// use autopark_core::money::Money;
/// use autopark_core::tariff::{compute_fee, TariffSchedule};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let schedule = TariffSchedule::default();
/// let entry = Utc.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap();
///
/// // 90 minutes: first hour + 1 additional hour
/// let fee = compute_fee(entry, entry + Duration::minutes(90), &schedule);
/// assert_eq!(fee, Money::from_cents(800));
/// ```
pub fn compute_fee(entry: DateTime<Utc>, exit: DateTime<Utc>, schedule: &TariffSchedule) -> Money {
    let minutes = duration_minutes(entry, exit);
    if minutes == 0 {
        return Money::zero();
    }

    // Flat base charge for any stay, however short
    let mut amount = schedule.first_hour;

    if minutes > 60 {
        let additional_hours = (minutes - 60 + 59) / 60;
        for hour_index in 0..additional_hours {
            let hour_start = entry + Duration::minutes(60 * (hour_index + 1));
            amount += if in_night_window(hour_start) {
                schedule.night_hour
            } else {
                schedule.additional_hour
            };
        }
    }

    if is_weekend(entry) {
        amount = amount.apply_multiplier(schedule.weekend_multiplier);
    }

    if schedule.max_daily.is_positive() {
        let days_spanned = (minutes + MINUTES_PER_DAY - 1) / MINUTES_PER_DAY;
        let cap = schedule.max_daily * days_spanned;
        if amount > cap {
            amount = cap;
        }
    }

    amount
}

/// Whether a timestamp falls inside the night tariff window (22:00–06:00).
pub fn in_night_window(at: DateTime<Utc>) -> bool {
    let hour = at.hour();
    hour >= NIGHT_WINDOW_START_HOUR || hour < NIGHT_WINDOW_END_HOUR
}

/// Whether a timestamp falls on a Saturday or Sunday.
pub fn is_weekend(at: DateTime<Utc>) -> bool {
    matches!(at.weekday(), Weekday::Sat | Weekday::Sun)
}

// =============================================================================
// Unit Tests
// =============================================================================
