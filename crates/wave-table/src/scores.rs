//! Score aggregation
//!
//! For a configuration Q of occupied channels, every other channel gi gets the
//! total interference score
//!
//! ```text
//! S(gi, Q) = Σ_{q ∈ Q} q · B(gi, q)
//! ```
//!
//! Scores are computed for every configuration of sizes 1 to 4 at once and
//! kept as ranked candidate lists, cheapest first.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;

use ndarray::{Array1, Axis};
use tracing::{debug, info};

use crate::channel::{Channel, Configuration};
use crate::error::TableError;
use crate::interference::InterferenceTable;
use crate::io::atomic_write;

/// Header of the persisted score table
pub const SCORE_HEADER: &str = "Q,gi,S";

/// A channel that could be assigned next, with its interference score
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Candidate {
    pub channel: Channel,
    pub score: f64,
}

/// Read access to ranked candidate lists
///
/// This is the seam between selection and wherever the rankings live.
pub trait CandidateRanking {
    /// Candidates for a configuration, sorted ascending by score
    fn ranked(&self, config: &Configuration) -> Option<&[Candidate]>;
}

/// Score every channel outside `config` against it
///
/// The B sub-matrix (remaining rows x Q columns) is gathered once and reduced
/// with a single matrix-vector product. Candidates whose score is not finite
/// are dropped. The result is stable-sorted ascending by score, so ties keep
/// ascending channel order.
pub fn rank_configuration(
    table: &InterferenceTable,
    config: &Configuration,
) -> Result<Vec<Candidate>, TableError> {
    let range = table.range();

    let columns = config
        .channels()
        .iter()
        .map(|&q| range.index_of(q).ok_or(TableError::UnknownChannel(q.0)))
        .collect::<Result<Vec<_>, _>>()?;
    let weights: Array1<f64> = config.channels().iter().map(|q| q.wavelength()).collect();

    let remaining: Vec<Channel> = range.iter().filter(|&c| !config.contains(c)).collect();
    let rows: Vec<usize> = remaining
        .iter()
        .filter_map(|&c| range.index_of(c))
        .collect();

    let sub = table
        .values()
        .select(Axis(0), &rows)
        .select(Axis(1), &columns);
    let totals = sub.dot(&weights);

    let mut ranked: Vec<Candidate> = remaining
        .iter()
        .zip(totals.iter())
        .filter(|(_, s)| s.is_finite())
        .map(|(&channel, &score)| Candidate { channel, score })
        .collect();

    let dropped = remaining.len() - ranked.len();
    if dropped > 0 {
        debug!("Q={}: dropped {} candidates with undefined score", config, dropped);
    }

    ranked.sort_by(|a, b| a.score.total_cmp(&b.score));
    Ok(ranked)
}

/// Ranked candidate lists for every precomputed configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    rows: BTreeMap<Configuration, Vec<Candidate>>,
}

impl ScoreTable {
    /// Score all configurations of sizes `1..=max_size` over the table's universe
    pub fn aggregate(table: &InterferenceTable, max_size: usize) -> Result<Self, TableError> {
        let mut rows = BTreeMap::new();
        for config in table.range().configurations(max_size)? {
            let ranked = rank_configuration(table, &config)?;
            rows.insert(config, ranked);
        }

        let candidates: usize = rows.values().map(Vec::len).sum();
        info!(
            "Aggregated scores for {} configurations ({} ranked candidates)",
            rows.len(),
            candidates
        );
        Ok(Self { rows })
    }

    /// Insert or replace the ranking for one configuration
    ///
    /// The list is cleaned the same way a loaded file is.
    pub fn insert(&mut self, config: Configuration, candidates: Vec<Candidate>) {
        let cleaned = clean_ranking(&config, candidates);
        self.rows.insert(config, cleaned);
    }

    /// Number of configurations
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate configurations with their rankings, in persisted order
    pub fn iter(&self) -> impl Iterator<Item = (&Configuration, &[Candidate])> {
        self.rows.iter().map(|(q, c)| (q, c.as_slice()))
    }

    /// Write `Q,gi,S` rows, one per ranked candidate
    pub fn write_csv<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(writer, "{}", SCORE_HEADER)?;
        for (config, candidates) in &self.rows {
            let key = config.key();
            for candidate in candidates {
                writeln!(writer, "{},{},{}", key, candidate.channel, candidate.score)?;
            }
        }
        Ok(())
    }

    /// Persist the score table, replacing any previous file atomically
    pub fn save(&self, path: &Path) -> Result<(), TableError> {
        atomic_write(path, |w| self.write_csv(w))?;
        info!("Saved score table to {}", path.display());
        Ok(())
    }

    /// Parse `Q,gi,S` rows
    ///
    /// Rows are grouped by configuration in file order. Each group is then
    /// cleaned: members of Q and non-finite scores are dropped and the list is
    /// stable-sorted ascending, so ties keep their file order.
    pub fn read_csv<R: BufRead>(reader: R) -> Result<Self, TableError> {
        let mut grouped: BTreeMap<Configuration, Vec<Candidate>> = BTreeMap::new();
        let mut last: Option<(String, Configuration)> = None;
        let mut first_row = true;

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // Header is optional and only accepted before any data row
            if std::mem::take(&mut first_row) && line.replace(' ', "") == SCORE_HEADER {
                continue;
            }

            let mut fields = line.split(',').map(str::trim);
            let (Some(q), Some(gi), Some(s), None) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(TableError::malformed(line_no, "expected Q,gi,S"));
            };

            // Rows for one configuration are contiguous; avoid re-parsing the key
            let config = match &last {
                Some((key, config)) if key == q => config.clone(),
                _ => {
                    let config: Configuration = q.parse().map_err(|e| {
                        TableError::malformed(line_no, format!("bad configuration {q:?}: {e}"))
                    })?;
                    last = Some((q.to_string(), config.clone()));
                    config
                }
            };
            let channel = parse_channel(gi)
                .ok_or_else(|| TableError::malformed(line_no, format!("bad candidate {gi:?}")))?;
            let score: f64 = if s.is_empty() {
                f64::NAN
            } else {
                s.parse()
                    .map_err(|_| TableError::malformed(line_no, format!("bad score {s:?}")))?
            };

            grouped
                .entry(config)
                .or_default()
                .push(Candidate { channel, score });
        }

        let mut table = Self::default();
        for (config, candidates) in grouped {
            table.insert(config, candidates);
        }
        Ok(table)
    }

    /// Load a persisted score table
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let file = std::fs::File::open(path)?;
        let table = Self::read_csv(std::io::BufReader::new(file))?;
        info!(
            "Loaded score table with {} configurations from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }
}

impl CandidateRanking for ScoreTable {
    fn ranked(&self, config: &Configuration) -> Option<&[Candidate]> {
        self.rows.get(config).map(Vec::as_slice)
    }
}

/// Accepts `1550` as well as pandas-style `1550.0`
fn parse_channel(s: &str) -> Option<Channel> {
    if let Ok(v) = s.parse::<u16>() {
        return Some(Channel(v));
    }
    let v: f64 = s.parse().ok()?;
    (v.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&v)).then(|| Channel(v as u16))
}

fn clean_ranking(config: &Configuration, candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut cleaned: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| c.score.is_finite() && !config.contains(c.channel))
        .collect();
    cleaned.sort_by(|a, b| a.score.total_cmp(&b.score));
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRange;
    use crate::curve::ReferenceCurve;

    fn config(channels: &[u16]) -> Configuration {
        Configuration::new(channels.iter().copied().map(Channel)).unwrap()
    }

    fn small_table() -> InterferenceTable {
        let range = ChannelRange::new(1530, 1540).unwrap();
        let curve = ReferenceCurve::new(
            1550.0,
            (1450..=1650).map(|x| (x, 1e-6 * (1.0 + ((x - 1550) as f64).powi(2) / 50.0))),
        );
        InterferenceTable::build(range, &curve).0
    }

    #[test]
    fn test_rank_matches_scalar_sum() {
        let table = small_table();
        let q = config(&[1530, 1537, 1538]);
        let ranked = rank_configuration(&table, &q).unwrap();

        assert_eq!(ranked.len(), 8);
        for candidate in &ranked {
            let expected: f64 = q
                .channels()
                .iter()
                .map(|&c| c.wavelength() * table.get(candidate.channel, c).unwrap())
                .sum();
            assert!((candidate.score - expected).abs() <= 1e-12 * expected.abs().max(1.0));
        }
    }

    #[test]
    fn test_rank_is_sorted_and_excludes_q() {
        let table = small_table();
        let q = config(&[1533, 1535]);
        let ranked = rank_configuration(&table, &q).unwrap();
        assert!(ranked.windows(2).all(|w| w[0].score <= w[1].score));
        assert!(ranked.iter().all(|c| !q.contains(c.channel)));
    }

    #[test]
    fn test_nan_candidates_are_dropped() {
        let range = ChannelRange::new(1, 3).unwrap();
        let values = ndarray::array![
            [f64::INFINITY, 1.0, 2.0],
            [f64::NAN, f64::INFINITY, 1.0],
            [0.5, 0.25, f64::INFINITY],
        ];
        let table = InterferenceTable::from_values(range, values).unwrap();

        let ranked = rank_configuration(&table, &config(&[1])).unwrap();
        assert_eq!(
            ranked,
            vec![Candidate {
                channel: Channel(3),
                score: 0.5
            }]
        );
    }

    #[test]
    fn test_ties_keep_channel_order() {
        let range = ChannelRange::new(1, 4).unwrap();
        let mut values = ndarray::Array2::from_elem((4, 4), 1.0);
        for i in 0..4 {
            values[[i, i]] = f64::INFINITY;
        }
        let table = InterferenceTable::from_values(range, values).unwrap();

        let ranked = rank_configuration(&table, &config(&[2])).unwrap();
        let order: Vec<u16> = ranked.iter().map(|c| c.channel.0).collect();
        assert_eq!(order, vec![1, 3, 4]);
    }

    #[test]
    fn test_aggregate_covers_all_configurations() {
        let table = small_table();
        let scores = ScoreTable::aggregate(&table, 2).unwrap();
        assert_eq!(scores.len(), 11 + 55);
        let ranked = scores.ranked(&config(&[1530, 1540])).unwrap();
        assert_eq!(ranked.len(), 9);
        assert!(scores.ranked(&config(&[1530, 1531, 1532])).is_none());
    }

    #[test]
    fn test_csv_round_trip() {
        let table = small_table();
        let scores = ScoreTable::aggregate(&table, 2).unwrap();

        let mut out = Vec::new();
        scores.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.starts_with("Q,gi,S\n1530,"));

        let reloaded = ScoreTable::read_csv(out.as_slice()).unwrap();
        assert_eq!(reloaded, scores);
    }

    #[test]
    fn test_read_cleans_foreign_rows() {
        let csv = "Q,gi,S\n1530-1537,1531,5.0\n1530-1537,1537,0.1\n1530-1537,1532,\n1530-1537,1533.0,2.0\n1530-1537,1534,2.0\n";
        let scores = ScoreTable::read_csv(csv.as_bytes()).unwrap();
        let ranked = scores.ranked(&config(&[1530, 1537])).unwrap();
        let order: Vec<u16> = ranked.iter().map(|c| c.channel.0).collect();
        assert_eq!(order, vec![1533, 1534, 1531]);
    }

    #[test]
    fn test_header_after_blank_lines() {
        let csv = "\n  \nQ,gi,S\n1530,1532,0.2\n1530,1531,0.1\n";
        let scores = ScoreTable::read_csv(csv.as_bytes()).unwrap();
        let ranked = scores.ranked(&config(&[1530])).unwrap();
        let order: Vec<u16> = ranked.iter().map(|c| c.channel.0).collect();
        assert_eq!(order, vec![1531, 1532]);

        // Only the first non-blank line may be a header
        assert!(ScoreTable::read_csv("1530,1531,0.1\nQ,gi,S\n".as_bytes()).is_err());
    }

    #[test]
    fn test_read_rejects_malformed_rows() {
        assert!(ScoreTable::read_csv("Q,gi,S\n1530,1531\n".as_bytes()).is_err());
        assert!(ScoreTable::read_csv("Q,gi,S\nx-y,1531,1.0\n".as_bytes()).is_err());
        assert!(ScoreTable::read_csv("Q,gi,S\n1530,abc,1.0\n".as_bytes()).is_err());
        assert!(ScoreTable::read_csv("Q,gi,S\n1530,1531,abc\n".as_bytes()).is_err());
    }
}
