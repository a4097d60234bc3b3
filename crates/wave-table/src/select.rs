//! Candidate selection against a ranked score table

use std::collections::BTreeSet;

use tracing::{trace, warn};

use crate::channel::{Channel, Configuration};
use crate::scores::{Candidate, CandidateRanking};

/// Pick the cheapest candidate for `config` that is neither part of the
/// configuration nor excluded
///
/// Returns None when every ranked candidate is barred, or when the ranking has
/// no entry for the configuration. Never mutates anything; equal inputs always
/// give the same answer.
pub fn select<R>(
    ranking: &R,
    config: &Configuration,
    exclusion: &BTreeSet<Channel>,
) -> Option<Candidate>
where
    R: CandidateRanking + ?Sized,
{
    let Some(ranked) = ranking.ranked(config) else {
        warn!("No ranking for configuration {}", config);
        return None;
    };

    let chosen = ranked
        .iter()
        .find(|c| {
            c.score.is_finite() && !config.contains(c.channel) && !exclusion.contains(&c.channel)
        })
        .copied();

    trace!(
        "select Q={} excluding {} channels -> {:?}",
        config,
        exclusion.len(),
        chosen
    );
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scores::ScoreTable;

    fn config(channels: &[u16]) -> Configuration {
        Configuration::new(channels.iter().copied().map(Channel)).unwrap()
    }

    fn candidate(channel: u16, score: f64) -> Candidate {
        Candidate {
            channel: Channel(channel),
            score,
        }
    }

    fn table() -> ScoreTable {
        let mut scores = ScoreTable::default();
        scores.insert(
            config(&[1530, 1537]),
            vec![
                candidate(1531, 0.1),
                candidate(1532, 0.2),
                candidate(1533, 0.3),
            ],
        );
        scores
    }

    #[test]
    fn test_select_cheapest() {
        let chosen = select(&table(), &config(&[1530, 1537]), &BTreeSet::new());
        assert_eq!(chosen, Some(candidate(1531, 0.1)));
    }

    #[test]
    fn test_select_skips_excluded() {
        let exclusion = BTreeSet::from([Channel(1531), Channel(1533)]);
        let chosen = select(&table(), &config(&[1530, 1537]), &exclusion);
        assert_eq!(chosen, Some(candidate(1532, 0.2)));
    }

    #[test]
    fn test_select_exhausted() {
        let exclusion = BTreeSet::from([Channel(1531), Channel(1532), Channel(1533)]);
        assert_eq!(select(&table(), &config(&[1530, 1537]), &exclusion), None);
    }

    #[test]
    fn test_select_unknown_configuration() {
        assert_eq!(select(&table(), &config(&[1560]), &BTreeSet::new()), None);
    }

    #[test]
    fn test_select_works_through_trait_object() {
        let scores = table();
        let ranking: &dyn CandidateRanking = &scores;
        let chosen = select(ranking, &config(&[1530, 1537]), &BTreeSet::new());
        assert_eq!(chosen.map(|c| c.channel), Some(Channel(1531)));
    }
}
