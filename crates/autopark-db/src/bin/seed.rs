//! # Seed Data Generator
//!
//! Populates the database with demo parking activity for development.
//!
//! ## Usage
//! ```bash
//! # Seed 40 sessions (default)
//! cargo run -p autopark-db --bin seed
//!
//! # Custom amount
//! cargo run -p autopark-db --bin seed -- --count 200
//!
//! # Specify database path
//! cargo run -p autopark-db --bin seed -- --db ./data/autopark.db
//! ```
//!
//! ## Generated Data
//! - Default settings and the admin/operador accounts (first run only)
//! - A mix of exited sessions over the past days and a handful of
//!   currently parked vehicles, billed against the default tariffs

use chrono::{Duration, Utc};
use std::env;
use uuid::Uuid;

use autopark_core::tariff::{compute_fee, duration_minutes};
use autopark_core::{SessionStatus, TariffSchedule, VehicleSession};
use autopark_db::{Database, DbConfig};

/// Plate prefixes used to generate plausible Peruvian plates.
const PLATE_PREFIXES: &[&str] = &["V1A", "V2B", "A3C", "B4D", "C5E", "D6F", "F7G", "X8H"];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let count = arg_value(&args, "--count")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(40);
    let db_path = arg_value(&args, "--db").unwrap_or_else(|| "./autopark.db".to_string());

    println!("Seeding {count} sessions into {db_path}");

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .expect("failed to open database");
    db.seed_defaults().await.expect("failed to seed defaults");

    let operator = db
        .users()
        .get_by_username("operador")
        .await
        .expect("failed to query users")
        .expect("seeded operator missing");

    let schedule = TariffSchedule::default();
    let sessions = db.sessions();
    let now = Utc::now();
    let mut seeded = 0usize;

    for index in 0..count {
        let prefix = PLATE_PREFIXES[index % PLATE_PREFIXES.len()];
        let plate = format!("{}-{:03}", prefix, 100 + index);

        // Spread entries over the past week; every eighth stays parked
        let entry = now - Duration::hours(3 + (index as i64 * 7) % (24 * 7));
        let parked = index % 8 == 0;

        let mut session = VehicleSession {
            id: Uuid::new_v4().to_string(),
            plate_number: plate,
            entry_time: entry,
            exit_time: None,
            duration_minutes: None,
            amount_cents: None,
            status: SessionStatus::Parked,
            confidence: 0.70 + ((index % 30) as f64) / 100.0,
            operator_id: Some(operator.id.clone()),
            created_at: entry,
        };

        if !parked {
            let exit = entry + Duration::minutes(20 + (index as i64 * 37) % 300);
            session.exit_time = Some(exit);
            session.duration_minutes = Some(duration_minutes(entry, exit));
            session.amount_cents = Some(compute_fee(entry, exit, &schedule).cents());
            session.status = SessionStatus::Exited;
        }

        match db.sessions().insert(&session).await {
            Ok(()) => seeded += 1,
            // A parked plate collision just means we keep the earlier one
            Err(e) if e.is_unique_violation() => continue,
            Err(e) => panic!("failed to insert session: {e}"),
        }
    }

    let active = sessions
        .active_sessions()
        .await
        .expect("failed to count active sessions");
    println!("Seeded {seeded} sessions ({} currently parked)", active.len());
}

/// Returns the value following a `--flag` argument, if present.
fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
