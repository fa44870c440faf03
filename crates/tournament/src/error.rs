use rps_core::{ParticipantId, StoreError};
use thiserror::Error;

use crate::ports::PaymentError;

#[derive(Debug, Error)]
pub enum TournamentError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("participant {0} not found")]
    UnknownParticipant(ParticipantId),
    #[error("pairing without players")]
    EmptyPairing,
    #[error("tournament aborted: {0}")]
    Aborted(String),
}
