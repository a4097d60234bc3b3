//! Reference crosstalk curve
//!
//! The curve holds measured base interference values B(REF, λ) for the
//! wavelengths that were actually measured. It is read from a two-column,
//! headerless CSV: `wavelength,value`.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use tracing::debug;

use crate::error::TableError;

/// Default reference wavelength of the measurement (nm)
pub const DEFAULT_REFERENCE_NM: f64 = 1550.0;

/// Measured base interference values keyed by integral wavelength
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceCurve {
    reference_nm: f64,
    points: BTreeMap<i64, f64>,
}

impl ReferenceCurve {
    /// Build a curve from in-memory points
    pub fn new(reference_nm: f64, points: impl IntoIterator<Item = (i64, f64)>) -> Self {
        Self {
            reference_nm,
            points: points.into_iter().collect(),
        }
    }

    /// Wavelength the curve was measured against
    pub fn reference_nm(&self) -> f64 {
        self.reference_nm
    }

    /// Measured value at a wavelength, if one exists
    pub fn measured(&self, wavelength: i64) -> Option<f64> {
        self.points.get(&wavelength).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest and largest measured wavelength
    pub fn domain(&self) -> Option<(i64, i64)> {
        let first = self.points.keys().next()?;
        let last = self.points.keys().next_back()?;
        Some((*first, *last))
    }

    /// Parse the curve from CSV rows
    ///
    /// Blank lines and lines starting with `#` are ignored. Wavelengths must be
    /// integral; values must be finite and non-negative.
    pub fn read_csv<R: BufRead>(reference_nm: f64, reader: R) -> Result<Self, TableError> {
        let mut points = BTreeMap::new();

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split(',').map(str::trim);
            let (Some(x), Some(y), None) = (fields.next(), fields.next(), fields.next()) else {
                return Err(TableError::malformed(line_no, "expected two columns"));
            };

            let x: f64 = x
                .parse()
                .map_err(|_| TableError::malformed(line_no, format!("bad wavelength {x:?}")))?;
            if !x.is_finite() || x.fract() != 0.0 {
                return Err(TableError::malformed(
                    line_no,
                    format!("wavelength {x} is not integral"),
                ));
            }
            let y: f64 = y
                .parse()
                .map_err(|_| TableError::malformed(line_no, format!("bad value {y:?}")))?;
            if !y.is_finite() || y < 0.0 {
                return Err(TableError::malformed(
                    line_no,
                    format!("value {y} must be finite and non-negative"),
                ));
            }

            if points.insert(x as i64, y).is_some() {
                return Err(TableError::malformed(
                    line_no,
                    format!("wavelength {x} listed twice"),
                ));
            }
        }

        debug!("Loaded reference curve with {} points", points.len());
        Ok(Self {
            reference_nm,
            points,
        })
    }

    /// Load the curve from a CSV file
    pub fn load(reference_nm: f64, path: &Path) -> Result<Self, TableError> {
        let file = std::fs::File::open(path)?;
        Self::read_csv(reference_nm, std::io::BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_curve() {
        let csv = "1530,0.5\n1531.0, 0.25\n\n# comment\n1532,0\n";
        let curve = ReferenceCurve::read_csv(1550.0, csv.as_bytes()).unwrap();
        assert_eq!(curve.len(), 3);
        assert_eq!(curve.measured(1531), Some(0.25));
        assert_eq!(curve.measured(1533), None);
        assert_eq!(curve.domain(), Some((1530, 1532)));
        assert_eq!(curve.reference_nm(), 1550.0);
    }

    #[test]
    fn test_rejects_fractional_wavelength() {
        let err = ReferenceCurve::read_csv(1550.0, "1530.5,1.0\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_rejects_negative_value() {
        let err = ReferenceCurve::read_csv(1550.0, "1530,1\n1531,-2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_rejects_wrong_column_count() {
        assert!(ReferenceCurve::read_csv(1550.0, "1530\n".as_bytes()).is_err());
        assert!(ReferenceCurve::read_csv(1550.0, "1530,1,2\n".as_bytes()).is_err());
    }

    #[test]
    fn test_rejects_duplicates() {
        assert!(ReferenceCurve::read_csv(1550.0, "1530,1\n1530,2\n".as_bytes()).is_err());
    }
}
