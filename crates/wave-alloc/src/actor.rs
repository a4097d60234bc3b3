//! Allocator Actor
//!
//! All allocator operations run inside one task that owns the [`Allocator`].
//! Commands arrive over an mpsc channel and are handled strictly one at a
//! time, so a selection and the exclusion write that follows it can never
//! interleave with another request. Results go back over oneshot channels and
//! the events each command produced are forwarded to the event channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use wave_alloc::actor::{run_alloc_actor, AllocHandle};
//! use tokio::sync::mpsc;
//!
//! let (cmd_tx, cmd_rx) = mpsc::channel(256);
//! let (event_tx, mut event_rx) = mpsc::channel(256);
//!
//! tokio::spawn(run_alloc_actor(allocator, cmd_rx, event_tx));
//! let handle = AllocHandle::new(cmd_tx);
//! let outcome = handle.submit_request("5", "9").await?;
//! ```

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};
use wave_table::Channel;

use crate::engine::Allocator;
use crate::error::AllocError;
use crate::events::AllocEvent;
use crate::state::{PairKey, PairingState, ParticipantId, PartyId, SessionEnd, Submission};

/// Reply channel for a command
type Reply<T> = oneshot::Sender<Result<T, AllocError>>;

/// Commands sent to the allocator actor
#[derive(Debug)]
pub enum AllocActorCommand {
    /// Submit a request for a pair, identifiers as received
    Submit {
        a: String,
        b: String,
        response: Reply<Submission>,
    },

    /// Release a channel
    EndSession {
        channel: Channel,
        response: Reply<SessionEnd>,
    },

    /// Connect a participant to a channel session
    Join {
        channel: Channel,
        response: Reply<ParticipantId>,
    },

    /// Disconnect a participant
    Leave {
        participant: ParticipantId,
        response: Reply<Channel>,
    },

    /// Relay text from a participant to its session
    Relay {
        participant: ParticipantId,
        text: String,
        response: Reply<Vec<ParticipantId>>,
    },

    /// Query how many participants a channel has
    QueryOccupancy {
        channel: Channel,
        response: oneshot::Sender<usize>,
    },

    /// Query the state of a pair
    QueryPair {
        pair: PairKey,
        response: oneshot::Sender<Option<PairingState>>,
    },

    /// Query every bound channel
    QueryBindings {
        response: oneshot::Sender<Vec<(Channel, PairKey)>>,
    },

    /// Shutdown the actor
    Shutdown,
}

/// Run the allocator actor until shutdown or until every sender is dropped
pub async fn run_alloc_actor(
    mut allocator: Allocator,
    mut cmd_rx: mpsc::Receiver<AllocActorCommand>,
    event_tx: mpsc::Sender<AllocEvent>,
) {
    info!("Allocator actor started");

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            AllocActorCommand::Submit { a, b, response } => {
                let result = allocator.submit_raw(&a, &b);
                if let Err(ref e) = result {
                    debug!("Request ({}, {}) failed: {}", a, b, e);
                }
                let _ = response.send(result);
            }

            AllocActorCommand::EndSession { channel, response } => {
                let _ = response.send(allocator.end_session(channel));
            }

            AllocActorCommand::Join { channel, response } => {
                let _ = response.send(allocator.join(channel));
            }

            AllocActorCommand::Leave {
                participant,
                response,
            } => {
                let _ = response.send(allocator.leave(participant));
            }

            AllocActorCommand::Relay {
                participant,
                text,
                response,
            } => {
                let _ = response.send(allocator.relay(participant, text));
            }

            AllocActorCommand::QueryOccupancy { channel, response } => {
                let _ = response.send(allocator.channel_occupancy(channel));
            }

            AllocActorCommand::QueryPair { pair, response } => {
                let _ = response.send(allocator.pair_state(&pair));
            }

            AllocActorCommand::QueryBindings { response } => {
                let _ = response.send(allocator.bound_channels());
            }

            AllocActorCommand::Shutdown => {
                info!("Allocator actor shutting down");
                break;
            }
        }

        for event in allocator.drain_events() {
            let _ = event_tx.send(event).await;
        }
    }

    if let Err(e) = allocator.flush() {
        error!("Failed to write pairing ledger on shutdown: {}", e);
        let _ = event_tx
            .send(AllocEvent::Error {
                source: "allocator".to_string(),
                message: e.to_string(),
            })
            .await;
    }
    info!("Allocator actor stopped");
}

/// Cloneable client for the allocator actor
#[derive(Debug, Clone)]
pub struct AllocHandle {
    cmd_tx: mpsc::Sender<AllocActorCommand>,
}

impl AllocHandle {
    pub fn new(cmd_tx: mpsc::Sender<AllocActorCommand>) -> Self {
        Self { cmd_tx }
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> AllocActorCommand,
    ) -> Result<T, AllocError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| AllocError::ActorClosed)?;
        rx.await.map_err(|_| AllocError::ActorClosed)
    }

    /// Submit a request with raw identifiers
    pub async fn submit_request(
        &self,
        a: impl Into<String>,
        b: impl Into<String>,
    ) -> Result<Submission, AllocError> {
        let (a, b) = (a.into(), b.into());
        self.call(|response| AllocActorCommand::Submit { a, b, response })
            .await?
    }

    /// Submit a request with parsed identifiers
    pub async fn submit(&self, a: PartyId, b: PartyId) -> Result<Submission, AllocError> {
        self.submit_request(a.to_string(), b.to_string()).await
    }

    pub async fn end_session(&self, channel: Channel) -> Result<SessionEnd, AllocError> {
        self.call(|response| AllocActorCommand::EndSession { channel, response })
            .await?
    }

    pub async fn join(&self, channel: Channel) -> Result<ParticipantId, AllocError> {
        self.call(|response| AllocActorCommand::Join { channel, response })
            .await?
    }

    pub async fn leave(&self, participant: ParticipantId) -> Result<Channel, AllocError> {
        self.call(|response| AllocActorCommand::Leave {
            participant,
            response,
        })
        .await?
    }

    pub async fn relay(
        &self,
        participant: ParticipantId,
        text: impl Into<String>,
    ) -> Result<Vec<ParticipantId>, AllocError> {
        let text = text.into();
        self.call(|response| AllocActorCommand::Relay {
            participant,
            text,
            response,
        })
        .await?
    }

    pub async fn channel_occupancy(&self, channel: Channel) -> Result<usize, AllocError> {
        self.call(|response| AllocActorCommand::QueryOccupancy { channel, response })
            .await
    }

    pub async fn pair_status(&self, pair: PairKey) -> Result<Option<PairingState>, AllocError> {
        self.call(|response| AllocActorCommand::QueryPair { pair, response })
            .await
    }

    pub async fn bound_channels(&self) -> Result<Vec<(Channel, PairKey)>, AllocError> {
        self.call(|response| AllocActorCommand::QueryBindings { response })
            .await
    }

    /// Ask the actor to stop; it writes the ledger before exiting
    pub async fn shutdown(&self) -> Result<(), AllocError> {
        self.cmd_tx
            .send(AllocActorCommand::Shutdown)
            .await
            .map_err(|_| AllocError::ActorClosed)
    }
}
