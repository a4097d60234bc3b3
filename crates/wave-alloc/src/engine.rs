//! Allocation engine
//!
//! The core allocator: tracks pairs through their request lifecycle, binds
//! channels chosen from the score table, and keeps the persisted exclusion
//! list and pairing ledger in step with what it holds in memory.
//!
//! Every mutating operation either completes, with both stores written, or
//! fails leaving memory and stores as they were.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use wave_table::{select, CandidateRanking, Channel};

use crate::error::AllocError;
use crate::events::AllocEvent;
use crate::state::{
    AllocatorConfig, PairKey, PairingState, ParticipantId, PartyId, SessionEnd, Submission,
};
use crate::store::{ExclusionList, PairRecord, PairingLedger, Repository};

/// Requests that make a pair complete
const COMPLETING_SUBMISSIONS: u8 = 2;

/// Shared handle to the loaded rankings
pub type SharedRanking = Arc<dyn CandidateRanking + Send + Sync>;

/// The allocation engine
pub struct Allocator {
    config: AllocatorConfig,
    ranking: SharedRanking,
    exclusions: Box<dyn Repository<ExclusionList>>,
    ledger: Box<dyn Repository<PairingLedger>>,
    pairs: BTreeMap<PairKey, PairingState>,
    bindings: HashMap<Channel, PairKey>,
    /// Complete pairs still waiting for a channel, oldest first
    waiting: VecDeque<PairKey>,
    sessions: HashMap<Channel, Vec<ParticipantId>>,
    participants: HashMap<ParticipantId, Channel>,
    next_participant: u64,
    event_buffer: Vec<AllocEvent>,
}

impl Allocator {
    /// Open the allocator over its stores
    ///
    /// Restores pairs from the ledger, drops assignments whose channel is no
    /// longer excluded, then tries to serve pairs that were left waiting.
    pub fn open(
        mut config: AllocatorConfig,
        ranking: SharedRanking,
        exclusions: Box<dyn Repository<ExclusionList>>,
        ledger: Box<dyn Repository<PairingLedger>>,
    ) -> Result<Self, AllocError> {
        if ranking.ranked(&config.reference_configuration).is_none() {
            return Err(AllocError::UnknownConfiguration(
                config.reference_configuration.key(),
            ));
        }
        if config.max_submissions < COMPLETING_SUBMISSIONS {
            warn!(
                "max_submissions {} is below {}, raising it",
                config.max_submissions, COMPLETING_SUBMISSIONS
            );
            config.max_submissions = COMPLETING_SUBMISSIONS;
        }

        let excluded = exclusions.load()?;
        let snapshot = ledger.load()?;

        let mut allocator = Self {
            config,
            ranking,
            exclusions,
            ledger,
            pairs: BTreeMap::new(),
            bindings: HashMap::new(),
            waiting: VecDeque::new(),
            sessions: HashMap::new(),
            participants: HashMap::new(),
            next_participant: 1,
            event_buffer: Vec::new(),
        };

        if allocator.restore(snapshot, &excluded) {
            allocator.persist_ledger()?;
        }
        allocator.serve_waiting()?;

        info!(
            "Allocator opened: {} pairs, {} bound, {} waiting, {} excluded",
            allocator.pairs.len(),
            allocator.bindings.len(),
            allocator.waiting.len(),
            excluded.len()
        );
        Ok(allocator)
    }

    /// Rebuild in-memory state from a ledger snapshot
    ///
    /// Returns true if anything in the snapshot had to be dropped.
    fn restore(&mut self, snapshot: PairingLedger, excluded: &ExclusionList) -> bool {
        let mut dropped = false;

        for PairRecord { pair, state } in snapshot.pairs {
            if self.pairs.contains_key(&pair) {
                warn!("Duplicate ledger entry for pair {}, keeping the first", pair);
                dropped = true;
                continue;
            }
            if let PairingState::Assigned { channel, .. } = state {
                if !excluded.contains(channel) {
                    warn!(
                        "Pair {} held channel {} which is no longer excluded, forgetting it",
                        pair, channel
                    );
                    dropped = true;
                    continue;
                }
                if let Some(holder) = self.bindings.get(&channel) {
                    warn!(
                        "Channel {} bound to both {} and {}, forgetting {}",
                        channel, holder, pair, pair
                    );
                    dropped = true;
                    continue;
                }
                self.bindings.insert(channel, pair);
            }
            self.pairs.insert(pair, state);
        }

        for pair in snapshot.waiting {
            if self.is_waiting(pair) && !self.waiting.contains(&pair) {
                self.waiting.push_back(pair);
            } else {
                dropped = true;
            }
        }
        // Exhausted pairs missing from the queue go to the back
        let unqueued: Vec<PairKey> = self
            .pairs
            .keys()
            .copied()
            .filter(|p| self.is_waiting(*p) && !self.waiting.contains(p))
            .collect();
        if !unqueued.is_empty() {
            dropped = true;
            self.waiting.extend(unqueued);
        }

        dropped
    }

    fn is_waiting(&self, pair: PairKey) -> bool {
        matches!(
            self.pairs.get(&pair),
            Some(PairingState::Pending { submissions }) if *submissions >= COMPLETING_SUBMISSIONS
        )
    }

    /// Get the engine configuration
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Pairing
    // -------------------------------------------------------------------------

    /// Submit a request with raw identifiers
    pub fn submit_raw(&mut self, a: &str, b: &str) -> Result<Submission, AllocError> {
        let a: PartyId = a.parse()?;
        let b: PartyId = b.parse()?;
        self.submit(a, b)
    }

    /// Submit a request for the pair `(a, b)`
    ///
    /// The first request leaves the pair pending. The second one allocates a
    /// channel, or queues the pair if none is free. Requests for a pair that
    /// already holds a channel return that channel again. Requests beyond
    /// `max_submissions` for a waiting pair are rejected.
    pub fn submit(&mut self, a: PartyId, b: PartyId) -> Result<Submission, AllocError> {
        let pair = PairKey::new(a, b)?;

        match self.pairs.get(&pair).copied() {
            None => {
                self.pairs
                    .insert(pair, PairingState::Pending { submissions: 1 });
                if let Err(e) = self.persist_ledger() {
                    self.pairs.remove(&pair);
                    return Err(e);
                }
                info!("Pair {} pending", pair);
                self.event_buffer.push(AllocEvent::PairPending { pair });
                Ok(Submission::Pending { pair })
            }

            Some(PairingState::Assigned { channel, .. }) => {
                debug!("Pair {} already holds channel {}", pair, channel);
                Ok(Submission::Assigned {
                    pair,
                    channel,
                    fresh: false,
                })
            }

            Some(PairingState::Pending { submissions })
                if submissions >= self.config.max_submissions =>
            {
                warn!(
                    "Pair {} rejected after {} submissions",
                    pair, submissions
                );
                self.event_buffer
                    .push(AllocEvent::SubmissionRejected { pair });
                Err(AllocError::QueryLimit(pair))
            }

            Some(PairingState::Pending { submissions }) => {
                let submissions = (submissions + 1).max(COMPLETING_SUBMISSIONS);
                self.complete(pair, submissions)
            }
        }
    }

    /// Allocate for a pair that just became complete
    fn complete(&mut self, pair: PairKey, submissions: u8) -> Result<Submission, AllocError> {
        if let Some(channel) = self.allocate(pair, submissions)? {
            return Ok(Submission::Assigned {
                pair,
                channel,
                fresh: true,
            });
        }

        let previous = self
            .pairs
            .insert(pair, PairingState::Pending { submissions });
        let queued = !self.waiting.contains(&pair);
        if queued {
            self.waiting.push_back(pair);
        }
        if let Err(e) = self.persist_ledger() {
            if let Some(state) = previous {
                self.pairs.insert(pair, state);
            }
            if queued {
                self.waiting.retain(|p| *p != pair);
            }
            return Err(e);
        }

        warn!("No channel available for pair {}, waiting for a release", pair);
        self.event_buffer
            .push(AllocEvent::ChannelUnavailable { pair });
        Ok(Submission::Unavailable { pair })
    }

    /// Select and bind a channel for a pair
    ///
    /// Runs as one transaction: read exclusions, select, write exclusions,
    /// then write the ledger. A failed ledger write takes the new exclusion
    /// entry back out. Returns None when every candidate is barred.
    fn allocate(
        &mut self,
        pair: PairKey,
        submissions: u8,
    ) -> Result<Option<Channel>, AllocError> {
        let mut excluded = self.exclusions.load()?;
        let mut barred = excluded.to_set();
        barred.extend(self.bindings.keys().copied());

        let Some(candidate) = select(
            &*self.ranking,
            &self.config.reference_configuration,
            &barred,
        ) else {
            return Ok(None);
        };
        let channel = candidate.channel;

        excluded.insert(channel);
        self.exclusions.save(&excluded)?;

        let previous = self.pairs.insert(
            pair,
            PairingState::Assigned {
                channel,
                submissions,
            },
        );
        self.bindings.insert(channel, pair);
        let queue_position = self.waiting.iter().position(|p| *p == pair);
        if let Some(pos) = queue_position {
            self.waiting.remove(pos);
        }

        if let Err(e) = self.persist_ledger() {
            self.bindings.remove(&channel);
            match previous {
                Some(state) => self.pairs.insert(pair, state),
                None => self.pairs.remove(&pair),
            };
            if let Some(pos) = queue_position {
                self.waiting.insert(pos, pair);
            }
            excluded.remove(channel);
            if let Err(rollback) = self.exclusions.save(&excluded) {
                error!(
                    "Failed to release channel {} after ledger error: {}",
                    channel, rollback
                );
            }
            return Err(e);
        }

        info!(
            "Assigned channel {} to pair {} (S = {:e})",
            channel, pair, candidate.score
        );
        self.event_buffer.push(AllocEvent::ChannelAssigned {
            pair,
            channel,
            score: candidate.score,
        });
        Ok(Some(channel))
    }

    /// Bind channels to waiting pairs, oldest first, until one cannot be served
    fn serve_waiting(&mut self) -> Result<usize, AllocError> {
        let mut served = 0;
        while let Some(&pair) = self.waiting.front() {
            let submissions = match self.pairs.get(&pair) {
                Some(PairingState::Pending { submissions }) => *submissions,
                _ => {
                    self.waiting.pop_front();
                    continue;
                }
            };
            if self.allocate(pair, submissions)?.is_none() {
                break;
            }
            served += 1;
        }
        if served > 0 {
            info!("Served {} waiting pairs", served);
        }
        Ok(served)
    }

    // -------------------------------------------------------------------------
    // Session teardown
    // -------------------------------------------------------------------------

    /// Release a channel
    ///
    /// Removes it from the exclusion list, forgets the pair that held it and
    /// disconnects its participants. The freed channel is then offered to
    /// waiting pairs.
    pub fn end_session(&mut self, channel: Channel) -> Result<SessionEnd, AllocError> {
        let mut excluded = self.exclusions.load()?;
        let listed = excluded.remove(channel);
        let pair = self.bindings.get(&channel).copied();

        if !listed && pair.is_none() {
            return Err(AllocError::ChannelNotAssigned(channel));
        }
        if listed {
            self.exclusions.save(&excluded)?;
        }

        let Some(pair) = pair else {
            info!("Released stale exclusion entry for channel {}", channel);
            self.event_buffer.push(AllocEvent::SessionEnded {
                channel,
                pair: None,
                disconnected: Vec::new(),
            });
            self.serve_after_release();
            return Ok(SessionEnd {
                channel,
                pair: None,
                disconnected: Vec::new(),
            });
        };

        self.bindings.remove(&channel);
        let previous = self.pairs.remove(&pair);
        if let Err(e) = self.persist_ledger() {
            self.bindings.insert(channel, pair);
            if let Some(state) = previous {
                self.pairs.insert(pair, state);
            }
            if listed {
                excluded.insert(channel);
                if let Err(rollback) = self.exclusions.save(&excluded) {
                    error!(
                        "Failed to restore channel {} after ledger error: {}",
                        channel, rollback
                    );
                }
            }
            return Err(e);
        }

        let disconnected = self.disconnect_all(channel);
        info!(
            "Session on channel {} ended for pair {} ({} disconnected)",
            channel,
            pair,
            disconnected.len()
        );
        self.event_buffer.push(AllocEvent::SessionEnded {
            channel,
            pair: Some(pair),
            disconnected: disconnected.clone(),
        });
        self.serve_after_release();

        Ok(SessionEnd {
            channel,
            pair: Some(pair),
            disconnected,
        })
    }

    /// Serve waiting pairs after a release has already been committed
    fn serve_after_release(&mut self) {
        if let Err(e) = self.serve_waiting() {
            error!("Failed to serve waiting pairs: {}", e);
            self.event_buffer.push(AllocEvent::Error {
                source: "allocator".to_string(),
                message: e.to_string(),
            });
        }
    }

    fn disconnect_all(&mut self, channel: Channel) -> Vec<ParticipantId> {
        let members = self.sessions.remove(&channel).unwrap_or_default();
        for participant in &members {
            self.participants.remove(participant);
        }
        members
    }

    // -------------------------------------------------------------------------
    // Live sessions
    // -------------------------------------------------------------------------

    /// Connect a participant to the session on a bound channel
    pub fn join(&mut self, channel: Channel) -> Result<ParticipantId, AllocError> {
        if !self.bindings.contains_key(&channel) {
            return Err(AllocError::ChannelNotAssigned(channel));
        }

        let members = self.sessions.entry(channel).or_default();
        if members.len() >= self.config.max_participants {
            let occupancy = members.len();
            debug!("Channel {} full, refusing join", channel);
            self.event_buffer.push(AllocEvent::JoinRefused { channel });
            return Err(AllocError::ChannelFull { channel, occupancy });
        }

        let participant = ParticipantId(self.next_participant);
        self.next_participant += 1;
        members.push(participant);
        let occupancy = members.len();
        self.participants.insert(participant, channel);

        debug!(
            "Participant {} joined channel {} ({} connected)",
            participant, channel, occupancy
        );
        self.event_buffer.push(AllocEvent::ParticipantJoined {
            channel,
            participant,
            occupancy,
        });
        Ok(participant)
    }

    /// Disconnect a participant; returns the channel it was on
    pub fn leave(&mut self, participant: ParticipantId) -> Result<Channel, AllocError> {
        let channel = self
            .participants
            .remove(&participant)
            .ok_or(AllocError::UnknownParticipant(participant))?;

        if let Some(members) = self.sessions.get_mut(&channel) {
            members.retain(|p| *p != participant);
            if members.is_empty() {
                self.sessions.remove(&channel);
            }
        }

        debug!("Participant {} left channel {}", participant, channel);
        self.event_buffer.push(AllocEvent::ParticipantLeft {
            channel,
            participant,
        });
        Ok(channel)
    }

    /// Relay text from a participant to everyone else on its channel
    ///
    /// Returns the recipients.
    pub fn relay(
        &mut self,
        from: ParticipantId,
        text: impl Into<String>,
    ) -> Result<Vec<ParticipantId>, AllocError> {
        let channel = *self
            .participants
            .get(&from)
            .ok_or(AllocError::UnknownParticipant(from))?;

        let recipients: Vec<ParticipantId> = self
            .sessions
            .get(&channel)
            .map(|members| members.iter().copied().filter(|p| *p != from).collect())
            .unwrap_or_default();

        self.event_buffer.push(AllocEvent::MessageRelayed {
            channel,
            from,
            text: text.into(),
        });
        Ok(recipients)
    }

    /// Number of participants connected to a channel
    pub fn channel_occupancy(&self, channel: Channel) -> usize {
        self.sessions.get(&channel).map_or(0, Vec::len)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// State of a pair, None if absent
    pub fn pair_state(&self, pair: &PairKey) -> Option<PairingState> {
        self.pairs.get(pair).copied()
    }

    /// Channel bound to a pair
    pub fn channel_for(&self, pair: &PairKey) -> Option<Channel> {
        self.pairs.get(pair).and_then(PairingState::channel)
    }

    /// Pair holding a channel
    pub fn pair_on(&self, channel: Channel) -> Option<PairKey> {
        self.bindings.get(&channel).copied()
    }

    /// Bound channels with their pairs, ascending by channel
    pub fn bound_channels(&self) -> Vec<(Channel, PairKey)> {
        let mut bound: Vec<_> = self.bindings.iter().map(|(c, p)| (*c, *p)).collect();
        bound.sort_unstable();
        bound
    }

    /// Pairs waiting for a channel, oldest first
    pub fn waiting(&self) -> impl Iterator<Item = PairKey> + '_ {
        self.waiting.iter().copied()
    }

    /// Current persisted exclusion list
    pub fn exclusions(&self) -> Result<ExclusionList, AllocError> {
        Ok(self.exclusions.load()?)
    }

    // -------------------------------------------------------------------------
    // Persistence and events
    // -------------------------------------------------------------------------

    fn ledger_snapshot(&self) -> PairingLedger {
        PairingLedger {
            pairs: self
                .pairs
                .iter()
                .map(|(pair, state)| PairRecord {
                    pair: *pair,
                    state: *state,
                })
                .collect(),
            waiting: self.waiting.iter().copied().collect(),
        }
    }

    fn persist_ledger(&self) -> Result<(), AllocError> {
        Ok(self.ledger.save(&self.ledger_snapshot())?)
    }

    /// Write the ledger out, for shutdown
    pub fn flush(&self) -> Result<(), AllocError> {
        self.persist_ledger()
    }

    /// Drain pending events
    pub fn drain_events(&mut self) -> Vec<AllocEvent> {
        std::mem::take(&mut self.event_buffer)
    }
}
