//! # Settings Boundary
//!
//! Typed views over the flat `app_settings` key/value table.
//!
//! ## Parse-at-Boundary
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Settings Flow                                      │
//! │                                                                         │
//! │  app_settings (remote + mirror)                                        │
//! │    key                        value                                     │
//! │    ─────────────────────────  ───────                                  │
//! │    tariff_first_hour          "5.00"                                   │
//! │    business_max_spots         "50"                                     │
//! │    system_use_ocr             "true"                                   │
//! │         │                                                               │
//! │         ▼  from_settings() — THIS MODULE                               │
//! │  AllSettings {                                                          │
//! │    tariffs:       TariffSchedule   (Money cents, RateMultiplier)       │
//! │    business_info: BusinessInfo     (strings + u32 capacity)            │
//! │    system_config: SystemConfig     (bools + u32 counters)              │
//! │  }                                                                      │
//! │                                                                         │
//! │  Every known key has a documented default applied when the row is      │
//! │  absent or unparseable. Callers never see "missing".                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::money::{Money, RateMultiplier};
use crate::tariff::TariffSchedule;

// =============================================================================
// Setting Keys
// =============================================================================

/// Well-known keys of the `app_settings` table.
pub mod keys {
    pub const TARIFF_FIRST_HOUR: &str = "tariff_first_hour";
    pub const TARIFF_ADDITIONAL_HOUR: &str = "tariff_additional_hour";
    pub const TARIFF_MAX_DAILY: &str = "tariff_max_daily";
    pub const TARIFF_NIGHT_RATE: &str = "tariff_night_rate";
    pub const TARIFF_WEEKEND_MULTIPLIER: &str = "tariff_weekend_multiplier";

    pub const BUSINESS_NAME: &str = "business_name";
    pub const BUSINESS_ADDRESS: &str = "business_address";
    pub const BUSINESS_PHONE: &str = "business_phone";
    pub const BUSINESS_EMAIL: &str = "business_email";
    pub const BUSINESS_RUC: &str = "business_ruc";
    pub const BUSINESS_MAX_SPOTS: &str = "business_max_spots";

    pub const SYSTEM_AUTO_BACKUP: &str = "system_auto_backup";
    pub const SYSTEM_PRINT_TICKETS: &str = "system_print_tickets";
    pub const SYSTEM_USE_OCR: &str = "system_use_ocr";
    pub const SYSTEM_SOUND_ALERTS: &str = "system_sound_alerts";
    pub const SYSTEM_MAX_LOGIN_ATTEMPTS: &str = "system_max_login_attempts";
    pub const SYSTEM_SESSION_TIMEOUT: &str = "system_session_timeout";
    pub const SYSTEM_LANGUAGE: &str = "system_language";

    pub const GRACE_PERIOD_MINUTES: &str = "grace_period_minutes";
    pub const APP_VERSION: &str = "app_version";
}

// =============================================================================
// Business Info
// =============================================================================

/// Facility identity printed on tickets and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessInfo {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub ruc: String,
    /// Facility capacity.
    pub max_spots: u32,
}

impl Default for BusinessInfo {
    fn default() -> Self {
        BusinessInfo {
            name: "AutoParking Control".to_string(),
            address: "Av. Principal 123, Arequipa".to_string(),
            phone: "054-123456".to_string(),
            email: "info@autoparking.com".to_string(),
            ruc: "20123456789".to_string(),
            max_spots: 50,
        }
    }
}

// =============================================================================
// System Config
// =============================================================================

/// Operational flags and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub auto_backup: bool,
    pub print_tickets: bool,
    pub use_ocr: bool,
    pub sound_alerts: bool,
    pub max_login_attempts: u32,
    pub session_timeout_minutes: u32,
    pub language: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            auto_backup: true,
            print_tickets: true,
            use_ocr: true,
            sound_alerts: true,
            max_login_attempts: 3,
            session_timeout_minutes: 30,
            language: "es".to_string(),
        }
    }
}

// =============================================================================
// All Settings
// =============================================================================

/// The three typed settings groups exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllSettings {
    pub tariffs: TariffSchedule,
    pub business_info: BusinessInfo,
    pub system_config: SystemConfig,
}

impl Default for AllSettings {
    fn default() -> Self {
        AllSettings {
            tariffs: TariffSchedule::default(),
            business_info: BusinessInfo::default(),
            system_config: SystemConfig::default(),
        }
    }
}

// =============================================================================
// Parsing (flat map → typed groups)
// =============================================================================

fn money_or(map: &HashMap<String, String>, key: &str, default: Money) -> Money {
    map.get(key)
        .and_then(|v| Money::parse_decimal(v))
        .unwrap_or(default)
}

fn string_or(map: &HashMap<String, String>, key: &str, default: &str) -> String {
    match map.get(key) {
        Some(v) if !v.is_empty() => v.clone(),
        _ => default.to_string(),
    }
}

fn bool_or(map: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match map.get(key).map(String::as_str) {
        Some("true") => true,
        Some("false") => false,
        _ => default,
    }
}

fn u32_or(map: &HashMap<String, String>, key: &str, default: u32) -> u32 {
    map.get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl TariffSchedule {
    /// Materializes the tariff group from flat settings, defaulting every
    /// absent or unparseable key.
    pub fn from_settings(map: &HashMap<String, String>) -> Self {
        let defaults = TariffSchedule::default();
        TariffSchedule {
            first_hour: money_or(map, keys::TARIFF_FIRST_HOUR, defaults.first_hour),
            additional_hour: money_or(map, keys::TARIFF_ADDITIONAL_HOUR, defaults.additional_hour),
            max_daily: money_or(map, keys::TARIFF_MAX_DAILY, defaults.max_daily),
            night_hour: money_or(map, keys::TARIFF_NIGHT_RATE, defaults.night_hour),
            weekend_multiplier: map
                .get(keys::TARIFF_WEEKEND_MULTIPLIER)
                .and_then(|v| RateMultiplier::parse_decimal(v))
                .unwrap_or(defaults.weekend_multiplier),
        }
    }

    /// Serializes the tariff group back into flat settings entries.
    pub fn to_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (keys::TARIFF_FIRST_HOUR, self.first_hour.to_decimal_string()),
            (
                keys::TARIFF_ADDITIONAL_HOUR,
                self.additional_hour.to_decimal_string(),
            ),
            (keys::TARIFF_MAX_DAILY, self.max_daily.to_decimal_string()),
            (keys::TARIFF_NIGHT_RATE, self.night_hour.to_decimal_string()),
            (
                keys::TARIFF_WEEKEND_MULTIPLIER,
                self.weekend_multiplier.to_decimal_string(),
            ),
        ]
    }
}

impl BusinessInfo {
    /// Materializes the business group from flat settings.
    pub fn from_settings(map: &HashMap<String, String>) -> Self {
        let defaults = BusinessInfo::default();
        BusinessInfo {
            name: string_or(map, keys::BUSINESS_NAME, &defaults.name),
            address: string_or(map, keys::BUSINESS_ADDRESS, &defaults.address),
            phone: string_or(map, keys::BUSINESS_PHONE, &defaults.phone),
            email: string_or(map, keys::BUSINESS_EMAIL, &defaults.email),
            ruc: string_or(map, keys::BUSINESS_RUC, &defaults.ruc),
            max_spots: u32_or(map, keys::BUSINESS_MAX_SPOTS, defaults.max_spots),
        }
    }
}

impl SystemConfig {
    /// Materializes the system group from flat settings.
    pub fn from_settings(map: &HashMap<String, String>) -> Self {
        let defaults = SystemConfig::default();
        SystemConfig {
            auto_backup: bool_or(map, keys::SYSTEM_AUTO_BACKUP, defaults.auto_backup),
            print_tickets: bool_or(map, keys::SYSTEM_PRINT_TICKETS, defaults.print_tickets),
            use_ocr: bool_or(map, keys::SYSTEM_USE_OCR, defaults.use_ocr),
            sound_alerts: bool_or(map, keys::SYSTEM_SOUND_ALERTS, defaults.sound_alerts),
            max_login_attempts: u32_or(
                map,
                keys::SYSTEM_MAX_LOGIN_ATTEMPTS,
                defaults.max_login_attempts,
            ),
            session_timeout_minutes: u32_or(
                map,
                keys::SYSTEM_SESSION_TIMEOUT,
                defaults.session_timeout_minutes,
            ),
            language: string_or(map, keys::SYSTEM_LANGUAGE, &defaults.language),
        }
    }
}

impl AllSettings {
    /// Materializes every typed group from a flat settings map.
    pub fn from_settings(map: &HashMap<String, String>) -> Self {
        AllSettings {
            tariffs: TariffSchedule::from_settings(map),
            business_info: BusinessInfo::from_settings(map),
            system_config: SystemConfig::from_settings(map),
        }
    }

    /// The seed rows written on first run when `app_settings` is empty.
    ///
    /// `grace_period_minutes` and `app_version` are seeded as raw keys;
    /// they are not part of any typed group.
    pub fn default_entries() -> Vec<(&'static str, String)> {
        let mut entries = TariffSchedule::default().to_entries();
        let business = BusinessInfo::default();
        let system = SystemConfig::default();

        entries.extend([
            (keys::BUSINESS_NAME, business.name),
            (keys::BUSINESS_ADDRESS, business.address),
            (keys::BUSINESS_PHONE, business.phone),
            (keys::BUSINESS_EMAIL, business.email),
            (keys::BUSINESS_RUC, business.ruc),
            (keys::BUSINESS_MAX_SPOTS, business.max_spots.to_string()),
            (keys::SYSTEM_AUTO_BACKUP, system.auto_backup.to_string()),
            (keys::SYSTEM_PRINT_TICKETS, system.print_tickets.to_string()),
            (keys::SYSTEM_USE_OCR, system.use_ocr.to_string()),
            (keys::SYSTEM_SOUND_ALERTS, system.sound_alerts.to_string()),
            (
                keys::SYSTEM_MAX_LOGIN_ATTEMPTS,
                system.max_login_attempts.to_string(),
            ),
            (
                keys::SYSTEM_SESSION_TIMEOUT,
                system.session_timeout_minutes.to_string(),
            ),
            (keys::SYSTEM_LANGUAGE, system.language),
            (keys::GRACE_PERIOD_MINUTES, "15".to_string()),
            (keys::APP_VERSION, "1.0.0".to_string()),
        ]);

        entries
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
