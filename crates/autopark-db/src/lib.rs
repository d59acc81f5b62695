//! # autopark-db: Local Database Layer for AutoPark
//!
//! This crate provides local persistence for the AutoPark system.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        AutoPark Data Flow                               │
//! │                                                                         │
//! │  ParkingStore (autopark-sync)                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    autopark-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ SessionRepo   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ SettingsRepo  │    │ 001_init.sql │  │   │
//! │  │   │ Connection    │    │ UserRepo      │    │ ...          │  │   │
//! │  │   │ Management    │    │ QueueRepo     │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (the local mirror of the remote store)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (session, settings, user, queue)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use autopark_db::{Database, DbConfig};
//!
//! let config = DbConfig::new("path/to/autopark.db");
//! let db = Database::new(config).await?;
//! db.seed_defaults().await?;
//!
//! let active = db.sessions().active_sessions().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::queue::QueueRepository;
pub use repository::session::SessionRepository;
pub use repository::settings::SettingsRepository;
pub use repository::user::{hash_password, verify_password, UserRepository};
