//! Interference table builder
//!
//! B(a, b) is the crosstalk channel `a` imposes on channel `b`. It is derived
//! from the reference curve B(REF, λ) with a fourth-power scaling law:
//!
//! ```text
//! λ_del  = floor(1 / (1/REF - 1/a + 1/b))
//! B(a,b) = (λ_del / b)^4 * B(REF, λ_del)
//! ```
//!
//! Self-interference (a = b) is infinite. Cells whose denominator vanishes or
//! whose λ_del was never measured are undefined and stored as NaN.

use std::io::{BufRead, Write};
use std::path::Path;

use ndarray::Array2;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelRange};
use crate::curve::ReferenceCurve;
use crate::error::{CellError, TableError};
use crate::io::atomic_write;

/// Relative tolerance under which the λ_del denominator counts as zero
pub const SINGULAR_TOLERANCE: f64 = 1e-9;

/// Compute a single B(a, b) cell
pub fn interference(curve: &ReferenceCurve, a: Channel, b: Channel) -> Result<f64, CellError> {
    if a == b {
        return Ok(f64::INFINITY);
    }

    let inv_ref = 1.0 / curve.reference_nm();
    let inv_a = 1.0 / a.wavelength();
    let inv_b = 1.0 / b.wavelength();
    let denominator = inv_ref - inv_a + inv_b;

    let scale = inv_ref.abs().max(inv_a).max(inv_b);
    if denominator.abs() <= SINGULAR_TOLERANCE * scale {
        return Err(CellError::Singular);
    }

    let lambda = (1.0 / denominator).floor();
    if !lambda.is_finite() || lambda < i64::MIN as f64 || lambda > i64::MAX as f64 {
        return Err(CellError::Singular);
    }
    let lambda_del = lambda as i64;

    let measured = curve
        .measured(lambda_del)
        .ok_or(CellError::OutOfDomain(lambda_del))?;

    Ok((lambda / b.wavelength()).powi(4) * measured)
}

/// An undefined cell found while building a table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UndefinedCell {
    pub a: Channel,
    pub b: Channel,
    pub reason: CellError,
}

/// Summary of a table build
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Cells stored as NaN, in row-major order
    pub undefined: Vec<UndefinedCell>,
}

impl BuildReport {
    pub fn singular_count(&self) -> usize {
        self.undefined
            .iter()
            .filter(|c| c.reason == CellError::Singular)
            .count()
    }

    pub fn out_of_domain_count(&self) -> usize {
        self.undefined.len() - self.singular_count()
    }
}

/// Dense B(a, b) matrix over a channel universe
///
/// Rows are the interfering channel `a`, columns the victim channel `b`.
#[derive(Debug, Clone, PartialEq)]
pub struct InterferenceTable {
    range: ChannelRange,
    values: Array2<f64>,
}

impl InterferenceTable {
    /// Build the full table from a reference curve
    pub fn build(range: ChannelRange, curve: &ReferenceCurve) -> (Self, BuildReport) {
        let n = range.len();
        let mut values = Array2::from_elem((n, n), f64::NAN);
        let mut report = BuildReport::default();

        for (i, a) in range.iter().enumerate() {
            for (j, b) in range.iter().enumerate() {
                match interference(curve, a, b) {
                    Ok(v) => values[[i, j]] = v,
                    Err(reason) => {
                        debug!("Skipping a={}, b={}: {}", a, b, reason);
                        report.undefined.push(UndefinedCell { a, b, reason });
                    }
                }
            }
        }

        if report.undefined.is_empty() {
            info!("Built {}x{} interference table", n, n);
        } else {
            warn!(
                "Built {}x{} interference table with {} undefined cells ({} singular, {} out of domain)",
                n,
                n,
                report.undefined.len(),
                report.singular_count(),
                report.out_of_domain_count()
            );
        }

        (Self { range, values }, report)
    }

    /// Wrap an existing matrix; it must be square and match the range
    pub fn from_values(range: ChannelRange, values: Array2<f64>) -> Result<Self, TableError> {
        let n = range.len();
        if values.dim() != (n, n) {
            return Err(TableError::InvalidConfiguration(format!(
                "matrix is {:?}, expected {n}x{n}",
                values.dim()
            )));
        }
        Ok(Self { range, values })
    }

    pub fn range(&self) -> ChannelRange {
        self.range
    }

    /// The raw matrix
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// O(1) lookup of B(a, b); None if either channel is outside the universe
    pub fn get(&self, a: Channel, b: Channel) -> Option<f64> {
        let i = self.range.index_of(a)?;
        let j = self.range.index_of(b)?;
        Some(self.values[[i, j]])
    }

    /// Write the table as CSV: header `a,<b...>`, one row per `a`
    ///
    /// Undefined cells are written empty, infinite cells as `inf`.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        write!(writer, "a")?;
        for b in self.range.iter() {
            write!(writer, ",{}", b)?;
        }
        writeln!(writer)?;

        for (a, row) in self.range.iter().zip(self.values.rows()) {
            write!(writer, "{}", a)?;
            for &v in row.iter() {
                if v.is_nan() {
                    write!(writer, ",")?;
                } else {
                    write!(writer, ",{}", v)?;
                }
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Persist the table, replacing any previous file atomically
    pub fn save(&self, path: &Path) -> Result<(), TableError> {
        atomic_write(path, |w| self.write_csv(w))?;
        info!("Saved interference table to {}", path.display());
        Ok(())
    }

    /// Parse a table written by [`InterferenceTable::write_csv`]
    pub fn read_csv<R: BufRead>(reader: R) -> Result<Self, TableError> {
        let mut lines = reader.lines().enumerate();

        let header = match lines.next() {
            Some((_, line)) => line?,
            None => return Err(TableError::malformed(1, "empty table")),
        };
        let columns = header
            .trim()
            .split(',')
            .skip(1)
            .map(|s| {
                s.trim()
                    .parse::<u16>()
                    .map_err(|_| TableError::malformed(1, format!("bad column label {s:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let range = contiguous_range(&columns, 1)?;
        let n = range.len();

        let mut values = Array2::from_elem((n, n), f64::NAN);
        let mut rows_seen = 0;
        for (idx, line) in lines {
            let line_no = idx + 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if rows_seen == n {
                return Err(TableError::malformed(line_no, "more rows than columns"));
            }

            let mut fields = line.trim().split(',');
            let label = fields.next().unwrap_or_default().trim();
            let expected = range.channel_at(rows_seen).map(|c| c.to_string());
            if expected.as_deref() != Some(label) {
                return Err(TableError::malformed(
                    line_no,
                    format!("row label {label:?} out of order"),
                ));
            }

            let cells: Vec<&str> = fields.collect();
            if cells.len() != n {
                return Err(TableError::malformed(
                    line_no,
                    format!("expected {n} cells, found {}", cells.len()),
                ));
            }
            for (j, cell) in cells.iter().enumerate() {
                values[[rows_seen, j]] = parse_cell(cell)
                    .ok_or_else(|| TableError::malformed(line_no, format!("bad cell {cell:?}")))?;
            }
            rows_seen += 1;
        }

        if rows_seen != n {
            return Err(TableError::malformed(
                rows_seen + 1,
                format!("expected {n} rows, found {rows_seen}"),
            ));
        }

        Ok(Self { range, values })
    }

    /// Load a persisted table
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let file = std::fs::File::open(path)?;
        let table = Self::read_csv(std::io::BufReader::new(file))?;
        debug!(
            "Loaded {}x{} interference table from {}",
            table.range.len(),
            table.range.len(),
            path.display()
        );
        Ok(table)
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(f64::NAN);
    }
    cell.parse::<f64>().ok()
}

/// Validate that column labels form an ascending contiguous range
fn contiguous_range(labels: &[u16], line: usize) -> Result<ChannelRange, TableError> {
    let (Some(&low), Some(&high)) = (labels.first(), labels.last()) else {
        return Err(TableError::malformed(line, "no channel columns"));
    };
    let contiguous = labels
        .windows(2)
        .all(|w| w[0].checked_add(1) == Some(w[1]));
    if !contiguous {
        return Err(TableError::malformed(
            line,
            "channel labels must be ascending and contiguous",
        ));
    }
    ChannelRange::new(low, high)
}
