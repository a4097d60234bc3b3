//! Error types for the allocator

use std::path::PathBuf;

use thiserror::Error;
use wave_table::Channel;

use crate::state::{PairKey, ParticipantId, PartyId};

/// Errors raised by persisted repositories
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file exists but does not hold what we expect
    #[error("corrupt file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Value could not be serialized
    #[error("serialization error: {0}")]
    Serialize(String),
}

/// Errors that can occur in the allocator
#[derive(Debug, Error)]
pub enum AllocError {
    /// Party identifier is not an integer
    #[error("invalid party identifier: {0:?}")]
    InvalidParty(String),

    /// Both sides of the request name the same party
    #[error("party {0} cannot pair with itself")]
    SelfPairing(PartyId),

    /// The pair already used up its submissions
    #[error("pair {0} already submitted the maximum number of requests")]
    QueryLimit(PairKey),

    /// No session is bound to the channel
    #[error("channel {0} is not assigned")]
    ChannelNotAssigned(Channel),

    /// The session already has its full set of participants
    #[error("channel {channel} is full ({occupancy} connected)")]
    ChannelFull { channel: Channel, occupancy: usize },

    /// Participant is not connected
    #[error("participant {0} is not connected")]
    UnknownParticipant(ParticipantId),

    /// The reference configuration has no ranking
    #[error("no ranking for configuration {0}")]
    UnknownConfiguration(String),

    /// Persistence failure
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The allocator actor is gone
    #[error("allocator is not running")]
    ActorClosed,
}

impl AllocError {
    /// Message safe to show to an end user
    ///
    /// Storage and actor failures are reported generically.
    pub fn user_message(&self) -> String {
        match self {
            Self::Store(_) | Self::ActorClosed => {
                "The request could not be completed. Please try again.".to_string()
            }
            Self::QueryLimit(_) => {
                "Channel for that pair is already full. Please try different identifiers."
                    .to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether the failure came from bad input rather than system state
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidParty(_) | Self::SelfPairing(_) | Self::QueryLimit(_)
        )
    }
}
