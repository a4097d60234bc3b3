//! Wavelength Channel Allocator
//!
//! This crate pairs requesting parties and binds each complete pair to the
//! least-interfering free channel, using the rankings built by `wave_table`.
//!
//! # Lifecycle
//!
//! A pair `(a, b)` is unordered. Its first request leaves it **pending**. The
//! second request (from either side) runs one allocation transaction: read
//! the exclusion list, select the cheapest candidate outside it, write the
//! list back with the new channel, then record the assignment in the pairing
//! ledger. When every channel is taken the pair **waits** and is served, oldest
//! first, as soon as a session ends.
//!
//! # Architecture
//!
//! - [`Allocator`] holds the state machine and talks to its stores through
//!   [`Repository`]
//! - [`run_alloc_actor`] owns an allocator and serialises every operation on
//!   it; [`AllocHandle`] is the cloneable async client
//! - All observable changes come out as [`AllocEvent`]s
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use wave_alloc::{Allocator, AllocatorConfig, ExclusionList, MemoryStore, PairingLedger, PartyId};
//! use wave_table::{Candidate, Channel, Configuration, ScoreTable};
//!
//! let mut scores = ScoreTable::default();
//! scores.insert(
//!     Configuration::default_reference(),
//!     vec![Candidate { channel: Channel(1541), score: 0.5 }],
//! );
//!
//! let mut allocator = Allocator::open(
//!     AllocatorConfig::default(),
//!     Arc::new(scores),
//!     Box::new(MemoryStore::<ExclusionList>::default()),
//!     Box::new(MemoryStore::<PairingLedger>::default()),
//! )
//! .unwrap();
//!
//! allocator.submit(PartyId(5), PartyId(9)).unwrap();
//! let outcome = allocator.submit(PartyId(9), PartyId(5)).unwrap();
//! assert_eq!(outcome.channel(), Some(Channel(1541)));
//! ```

pub mod actor;
pub mod engine;
pub mod error;
pub mod events;
pub mod state;
pub mod store;

// Re-export actor types
pub use actor::{run_alloc_actor, AllocActorCommand, AllocHandle};

// Re-export event types
pub use events::AllocEvent;

// Re-export engine types
pub use engine::{Allocator, SharedRanking};
pub use error::{AllocError, StoreError};
pub use state::{
    AllocatorConfig, PairKey, PairingState, ParticipantId, PartyId, SessionEnd, Submission,
};
pub use store::{
    ExclusionList, JsonFileStore, MemoryStore, PairRecord, PairingLedger, Repository,
    EXCLUSION_FILE, LEDGER_FILE,
};
