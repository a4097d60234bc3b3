//! Error types for table construction and parsing

use thiserror::Error;

/// Reasons a single interference cell has no defined value
///
/// These never abort a build; the cell is stored as NaN and reported.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum CellError {
    /// The derived-wavelength denominator is numerically zero
    #[error("singular denominator")]
    Singular,

    /// The derived wavelength has no measurement on the reference curve
    #[error("derived wavelength {0} outside the measured curve")]
    OutOfDomain(i64),
}

/// Errors raised while building, loading or querying tables
#[derive(Debug, Error)]
pub enum TableError {
    /// A persisted file could not be parsed
    #[error("malformed input at line {line}: {reason}")]
    Malformed {
        /// 1-based line number
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Channel range bounds are inverted
    #[error("invalid channel range {low}..={high}")]
    InvalidRange { low: u16, high: u16 },

    /// A configuration violates the size or distinctness rules
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A channel is not part of the table's universe
    #[error("channel {0} outside the channel range")]
    UnknownChannel(u16),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TableError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }
}
