//! Scheduled single-elimination rock-paper-scissors tournament
//!
//! This crate provides:
//! - Bracket formation, concurrent rounds and payouts ([`TournamentEngine`])
//! - Crash recovery from the persisted tournament stage
//! - Cancellable payment and profile edit watches ([`Watcher`], [`SignalRegistry`])
//! - The participant command surface ([`Dispatcher`])
//!
//! # Usage
//!
//! ```bash
//! # Run the service with a console transport and a simulated wallet
//! cargo run -p rps_tournament -- run --capacity 16 --round-time 10
//!
//! # Show the leaderboard of an existing database
//! cargo run -p rps_tournament -- leaderboard --db ./db
//! ```

pub mod bracket;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod leaderboard;
pub mod observability;
pub mod ports;
pub mod registry;
pub mod report;
pub mod round;
pub mod schedule;
pub mod watcher;

pub use bracket::{power_of_two_floor, Bracket, Slot};
pub use commands::{validate_name, validate_wallet, Command, Dispatcher, PendingInvoice};
pub use config::{ConfigError, TournamentConfig};
pub use engine::{RunSummary, TournamentEngine, HELD_KEY, POOL_KEY};
pub use error::TournamentError;
pub use leaderboard::Standing;
pub use ports::*;
pub use registry::{Signal, SignalReceiver, SignalRegistry, SignalState};
pub use report::RunReport;
pub use round::{Decision, RoundExecutor, RoundOutcome};
pub use schedule::Schedule;
pub use watcher::{Deadline, WatchOutcome, Watcher};
