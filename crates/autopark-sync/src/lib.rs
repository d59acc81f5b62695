//! # autopark-sync: Offline-First Store for AutoPark
//!
//! This crate turns the local mirror (autopark-db) and a remote
//! relational store into one coherent, offline-first `ParkingStore`.
//!
//! ## The Offline Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Offline Cache & Sync Queue                           │
//! │                                                                         │
//! │  WRITE:  attempt remote (bounded) ──ok──► write through mirror         │
//! │              │                                                          │
//! │              └─unreachable──► mirror + offline_queue (FIFO)            │
//! │                                                                         │
//! │  READ:   refresh mirror from remote when connected, then serve the    │
//! │          mirror; offline reads serve the mirror directly               │
//! │                                                                         │
//! │  REPLAY: worker probes with backoff; on reconnect drains the queue     │
//! │          FIFO through the same apply path direct writes use            │
//! │                                                                         │
//! │  Remote wins on conflict; the mirror is a best-effort replica, not     │
//! │  a second source of truth.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`store`] - The `ParkingStore` facade and the resilient write path
//! - [`remote`] - The pluggable `RemoteStore` backend trait
//! - [`rest`] - REST implementation of the backend
//! - [`replay`] - Background queue replay worker
//! - [`connectivity`] - Shared online/offline state
//! - [`config`] - Per-device TOML configuration
//! - [`error`] - Store and remote error types
//!
//! ## Wiring It Up
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use autopark_db::{Database, DbConfig};
//! use autopark_sync::{ParkingConfig, ParkingStore, ReplayWorker, RestRemote};
//!
//! let config = ParkingConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new("autopark.db")).await?;
//!
//! let store = match RestRemote::from_config(&config)? {
//!     Some(remote) => {
//!         ParkingStore::with_remote(db, Arc::new(remote), config.tuning()).await?
//!     }
//!     None => ParkingStore::local_only(db).await?,
//! };
//! let store = Arc::new(store);
//!
//! let (worker, replay) = ReplayWorker::new(store.clone());
//! tokio::spawn(worker.run());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod connectivity;
pub mod error;
pub mod remote;
pub mod replay;
pub mod rest;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ParkingConfig, StoreTuning};
pub use connectivity::{ConnectionState, Connectivity};
pub use error::{RemoteError, StoreError, StoreResult};
pub use remote::{RemoteResult, RemoteStore};
pub use replay::{ReplayWorker, ReplayWorkerHandle};
pub use rest::RestRemote;
pub use store::{Backend, DrainReport, EntryOutcome, ExitOutcome, ParkingStore};
