//! Core data model of the rock-paper-scissors elimination tournament.
//!
//! - Hands and per-round move sequences
//! - Participant records and the persisted tournament stage
//! - The durable key-value store used for records and flags

pub mod error;
pub mod participant;
pub mod stage;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use participant::Participant;
pub use stage::{TournamentStage, STAGE_KEY};
pub use store::{KeyValueStore, Vault};
pub use types::*;
