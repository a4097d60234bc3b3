//! Pairing and session state

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wave_table::{Channel, Configuration};

use crate::error::AllocError;

/// External identifier of a requesting party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub i64);

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PartyId {
    type Err = AllocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(PartyId)
            .map_err(|_| AllocError::InvalidParty(s.to_string()))
    }
}

/// Unordered pair of parties, stored sorted
///
/// `(5, 9)` and `(9, 5)` are the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    low: PartyId,
    high: PartyId,
}

impl PairKey {
    /// Canonicalise a pair; a party cannot pair with itself
    pub fn new(a: PartyId, b: PartyId) -> Result<Self, AllocError> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Ok(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => Err(AllocError::SelfPairing(a)),
        }
    }

    pub fn low(&self) -> PartyId {
        self.low
    }

    pub fn high(&self) -> PartyId {
        self.high
    }

    /// Whether the party is one of the pair
    pub fn includes(&self, party: PartyId) -> bool {
        self.low == party || self.high == party
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

/// Handle of a connection joined to a channel session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(pub u64);

impl ParticipantId {
    /// Get the raw id value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a pair that has been seen
///
/// A pair with no entry is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PairingState {
    /// Waiting for the complementary request, or for a channel to free up
    Pending {
        /// Requests accepted so far
        submissions: u8,
    },
    /// A channel is bound to the pair
    Assigned { channel: Channel, submissions: u8 },
}

impl PairingState {
    pub fn submissions(&self) -> u8 {
        match self {
            Self::Pending { submissions } | Self::Assigned { submissions, .. } => *submissions,
        }
    }

    pub fn channel(&self) -> Option<Channel> {
        match self {
            Self::Assigned { channel, .. } => Some(*channel),
            Self::Pending { .. } => None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned { .. })
    }
}

/// Outcome of an accepted submission
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Submission {
    /// First request of the pair; waiting for the other side
    Pending { pair: PairKey },
    /// A channel is bound to the pair
    Assigned {
        pair: PairKey,
        channel: Channel,
        /// True when this request caused the assignment
        fresh: bool,
    },
    /// Both sides asked but every channel is taken; the pair waits for a release
    Unavailable { pair: PairKey },
}

impl Submission {
    pub fn pair(&self) -> PairKey {
        match self {
            Self::Pending { pair } | Self::Assigned { pair, .. } | Self::Unavailable { pair } => {
                *pair
            }
        }
    }

    pub fn channel(&self) -> Option<Channel> {
        match self {
            Self::Assigned { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}

/// Result of ending a channel session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnd {
    pub channel: Channel,
    /// Pair that held the channel (None for a stale exclusion entry)
    pub pair: Option<PairKey>,
    /// Participants that were disconnected
    pub disconnected: Vec<ParticipantId>,
}

/// Engine-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Configuration every selection is made against
    pub reference_configuration: Configuration,
    /// Requests accepted per pair before further ones are rejected
    pub max_submissions: u8,
    /// Participants allowed in one channel session at a time
    pub max_participants: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            reference_configuration: Configuration::default_reference(),
            max_submissions: 2,
            max_participants: 2,
        }
    }
}
