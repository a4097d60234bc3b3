//! Wavelength Channel Scoring Library
//!
//! This crate builds the lookup tables used to pick the least-interfering
//! wavelength channel for a new session:
//!
//! - **Interference table**: B(a, b), the crosstalk channel `a` puts on channel
//!   `b`, derived from a measured reference curve
//! - **Score table**: for every configuration Q of 1–4 occupied channels, all
//!   remaining channels ranked by S(gi, Q) = Σ q·B(gi, q)
//! - **Selection**: the cheapest ranked candidate outside Q and a runtime
//!   exclusion set
//!
//! Both tables persist as CSV so they can be built once, offline, and loaded by
//! the allocator at startup.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeSet;
//! use wave_table::{
//!     select, Channel, ChannelRange, Configuration, InterferenceTable, ReferenceCurve,
//!     ScoreTable,
//! };
//!
//! let range = ChannelRange::new(1530, 1540).unwrap();
//! let curve = ReferenceCurve::new(1550.0, (1450..=1650).map(|x| (x, 1e-6)));
//! let (table, _report) = InterferenceTable::build(range, &curve);
//! let scores = ScoreTable::aggregate(&table, 3).unwrap();
//!
//! let q: Configuration = "1530-1537-1538".parse().unwrap();
//! let exclusion = BTreeSet::from([Channel(1539)]);
//! let best = select(&scores, &q, &exclusion).unwrap();
//! assert!(!q.contains(best.channel));
//! assert_ne!(best.channel, Channel(1539));
//! ```

pub mod channel;
pub mod curve;
pub mod error;
pub mod interference;
pub mod io;
pub mod keyrate;
pub mod scores;
pub mod select;

pub use channel::{Channel, ChannelRange, Configuration, MAX_CONFIGURATION_SIZE};
pub use curve::{ReferenceCurve, DEFAULT_REFERENCE_NM};
pub use error::{CellError, TableError};
pub use interference::{interference, BuildReport, InterferenceTable, UndefinedCell};
pub use keyrate::{interference_load, KeyRateParams};
pub use scores::{rank_configuration, Candidate, CandidateRanking, ScoreTable};
pub use select::select;
