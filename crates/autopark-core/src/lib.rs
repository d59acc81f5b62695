//! # autopark-core: Pure Business Logic for AutoPark
//!
//! This crate is the **heart** of AutoPark. It contains all business logic
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        AutoPark Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              UI / OCR / Ticket collaborators                    │   │
//! │  │    (out of scope: consume the store, feed it plates)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │           autopark-sync (ParkingStore facade)                   │   │
//! │  │    register_entry, process_exit, settings, operators           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ autopark-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  tariff   │  │ validation│  │   │
//! │  │   │  Session  │  │   Money   │  │ schedule  │  │   rules   │  │   │
//! │  │   │   User    │  │ Multiplier│  │ comp_fee  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                autopark-db (Local Mirror)                       │   │
//! │  │         SQLite queries, migrations, repositories                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (VehicleSession, User, QueuedOp, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`tariff`] - The fee engine: pure, deterministic, tested in isolation
//! - [`settings`] - Typed settings groups and the parse boundary
//! - [`error`] - Domain error types
//! - [`validation`] - Plate/operator/tariff validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use autopark_core::money::Money;
//! use autopark_core::tariff::{compute_fee, TariffSchedule};
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let schedule = TariffSchedule::default();
//! let entry = Utc.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap();
//! let exit = entry + Duration::minutes(90);
//!
//! // First hour flat + one additional hour
//! assert_eq!(compute_fee(entry, exit, &schedule), Money::from_cents(800));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod settings;
pub mod tariff;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use autopark_core::Money` instead of
// `use autopark_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, RateMultiplier};
pub use settings::{AllSettings, BusinessInfo, SystemConfig};
pub use tariff::TariffSchedule;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum accepted license-plate length (normalized form).
///
/// Peruvian plates are 6-7 characters; the margin covers diplomatic and
/// foreign formats without letting OCR noise through.
pub const MAX_PLATE_LEN: usize = 16;

/// Maximum username length.
pub const MAX_USERNAME_LEN: usize = 32;

/// Maximum operator display-name length.
pub const MAX_NAME_LEN: usize = 100;

/// Password assigned to operators created without one.
pub const DEFAULT_OPERATOR_PASSWORD: &str = "operador123";

/// Display name used in reports for sessions without an operator.
pub const SYSTEM_OPERATOR_NAME: &str = "Sistema";
