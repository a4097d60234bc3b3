//! Unified event stream for the allocator
//!
//! Every observable state change (pair progress, channel binding, session
//! traffic) is emitted through a single event channel, in the order the
//! allocator applied it.

use wave_table::Channel;

use crate::state::{PairKey, ParticipantId};

/// Unified event enum for all allocator activity
#[derive(Debug, Clone, PartialEq)]
pub enum AllocEvent {
    // -------------------------------------------------------------------------
    // Pairing events
    // -------------------------------------------------------------------------
    /// First request of a pair was recorded
    PairPending {
        pair: PairKey,
    },

    /// A channel was bound to a pair
    ChannelAssigned {
        pair: PairKey,
        channel: Channel,
        /// Aggregate interference score of the chosen channel
        score: f64,
    },

    /// Both sides asked but no channel could be chosen; the pair waits
    ChannelUnavailable {
        pair: PairKey,
    },

    /// A request was refused because the pair is already waiting
    SubmissionRejected {
        pair: PairKey,
    },

    /// A channel was released and its pair forgotten
    SessionEnded {
        channel: Channel,
        /// Pair that held the channel (None for a stale exclusion entry)
        pair: Option<PairKey>,
        /// Participants dropped from the session
        disconnected: Vec<ParticipantId>,
    },

    // -------------------------------------------------------------------------
    // Session events
    // -------------------------------------------------------------------------
    /// A participant joined a channel session
    ParticipantJoined {
        channel: Channel,
        participant: ParticipantId,
        /// Participants connected after the join
        occupancy: usize,
    },

    /// A participant left a channel session
    ParticipantLeft {
        channel: Channel,
        participant: ParticipantId,
    },

    /// A join was refused because the session is full
    JoinRefused {
        channel: Channel,
    },

    /// Text relayed to the other participants of a session
    MessageRelayed {
        channel: Channel,
        from: ParticipantId,
        text: String,
    },

    // -------------------------------------------------------------------------
    // Control events
    // -------------------------------------------------------------------------
    /// An error occurred in the allocator
    Error {
        /// Source of the error
        source: String,
        /// Error message
        message: String,
    },
}

impl AllocEvent {
    /// Check if this event changes which channels are bound
    pub fn is_binding_change(&self) -> bool {
        matches!(
            self,
            AllocEvent::ChannelAssigned { .. } | AllocEvent::SessionEnded { .. }
        )
    }

    /// Check if this is a session traffic event
    pub fn is_session_traffic(&self) -> bool {
        matches!(
            self,
            AllocEvent::ParticipantJoined { .. }
                | AllocEvent::ParticipantLeft { .. }
                | AllocEvent::JoinRefused { .. }
                | AllocEvent::MessageRelayed { .. }
        )
    }

    /// Get the channel if this event is associated with one
    pub fn channel(&self) -> Option<Channel> {
        match self {
            AllocEvent::ChannelAssigned { channel, .. }
            | AllocEvent::SessionEnded { channel, .. }
            | AllocEvent::ParticipantJoined { channel, .. }
            | AllocEvent::ParticipantLeft { channel, .. }
            | AllocEvent::JoinRefused { channel }
            | AllocEvent::MessageRelayed { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    /// Get the pair if this event is associated with one
    pub fn pair(&self) -> Option<PairKey> {
        match self {
            AllocEvent::PairPending { pair }
            | AllocEvent::ChannelAssigned { pair, .. }
            | AllocEvent::ChannelUnavailable { pair }
            | AllocEvent::SubmissionRejected { pair } => Some(*pair),
            AllocEvent::SessionEnded { pair, .. } => *pair,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PartyId;

    #[test]
    fn test_event_classification() {
        let pair = PairKey::new(PartyId(5), PartyId(9)).unwrap();
        let assigned = AllocEvent::ChannelAssigned {
            pair,
            channel: Channel(1541),
            score: 0.25,
        };
        assert!(assigned.is_binding_change());
        assert!(!assigned.is_session_traffic());

        let joined = AllocEvent::ParticipantJoined {
            channel: Channel(1541),
            participant: ParticipantId(1),
            occupancy: 1,
        };
        assert!(joined.is_session_traffic());
        assert!(!joined.is_binding_change());
    }

    #[test]
    fn test_channel_and_pair_extraction() {
        let pair = PairKey::new(PartyId(1), PartyId(2)).unwrap();
        let ended = AllocEvent::SessionEnded {
            channel: Channel(1533),
            pair: Some(pair),
            disconnected: vec![],
        };
        assert_eq!(ended.channel(), Some(Channel(1533)));
        assert_eq!(ended.pair(), Some(pair));

        let pending = AllocEvent::PairPending { pair };
        assert_eq!(pending.channel(), None);

        let error = AllocEvent::Error {
            source: "store".into(),
            message: "disk full".into(),
        };
        assert_eq!(error.pair(), None);
    }
}
