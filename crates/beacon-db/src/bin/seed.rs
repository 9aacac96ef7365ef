//! # Counter Seeder
//!
//! Registers service counters for development and first installs.
//!
//! ## Usage
//! ```bash
//! # Register counters 1-6 (default)
//! cargo run -p beacon-db --bin seed
//!
//! # Register a custom amount
//! cargo run -p beacon-db --bin seed -- --count 10
//!
//! # Specify database path
//! cargo run -p beacon-db --bin seed -- --db ./data/beacon.db
//! ```
//!
//! Counters are labelled `Counter N` with display number `N`. Running the
//! seeder again updates labels and reactivates counters instead of
//! duplicating them.

use beacon_core::TicketStatus;
use beacon_db::{Database, DbConfig};
use std::env;

const DEFAULT_COUNT: i64 = 6;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: i64 = DEFAULT_COUNT;
    let mut db_path = String::from("./beacon_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(DEFAULT_COUNT);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Beacon Queue Counter Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of counters to register (default: 6)");
                println!("  -d, --db <PATH>    Database file path (default: ./beacon_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Beacon Queue Counter Seeder");
    println!("===========================");
    println!("Database: {}", db_path);
    println!("Counters: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");
    println!();

    for number in 1..=count {
        let label = format!("Counter {number}");
        match db.counters().register(&label, number).await {
            Ok(counter) => println!("  ✓ {} (#{}) {}", counter.label, counter.number, counter.id),
            Err(e) => eprintln!("  ✗ Failed to register {}: {}", label, e),
        }
    }

    let active = db.counters().list_active().await?;
    let waiting = db.tickets().list_by_status(TicketStatus::Waiting, None).await?;

    println!();
    println!("✓ {} active counters, {} waiting tickets", active.len(), waiting.len());

    db.close().await;
    Ok(())
}
