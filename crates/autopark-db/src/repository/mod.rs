//! # Repository Implementations
//!
//! One repository per aggregate:
//!
//! - [`session`] - Vehicle parking sessions (`vehicle_entries`)
//! - [`settings`] - Flat key/value configuration (`app_settings`)
//! - [`user`] - Staff accounts and credentials (`users`)
//! - [`queue`] - Offline mutation queue (`offline_queue`)

pub mod queue;
pub mod session;
pub mod settings;
pub mod user;
