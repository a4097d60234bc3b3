//! Integration tests for the scoring pipeline
//!
//! These tests run the full offline pipeline:
//! - reference curve CSV → interference table → score table
//! - persistence of both tables and reload
//! - selection against the reloaded rankings

use std::collections::BTreeSet;

use wave_table::{
    select, Channel, ChannelRange, Configuration, InterferenceTable, ReferenceCurve, ScoreTable,
};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// A curve wide enough that every cell of a 1530–1565 table is defined
    pub fn wide_curve() -> ReferenceCurve {
        let csv: String = (1450..=1650)
            .map(|x: i64| {
                let offset = (x - 1550) as f64;
                format!("{},{}\n", x, 1e-6 * (1.0 + offset * offset / 40.0))
            })
            .collect();
        ReferenceCurve::read_csv(1550.0, csv.as_bytes()).unwrap()
    }

    pub fn config(channels: &[u16]) -> Configuration {
        Configuration::new(channels.iter().copied().map(Channel)).unwrap()
    }

    /// Brute-force minimum of Σ q·B(gi, q) outside Q and the exclusion set
    pub fn brute_force_best(
        table: &InterferenceTable,
        q: &Configuration,
        exclusion: &BTreeSet<Channel>,
    ) -> Option<(Channel, f64)> {
        table
            .range()
            .iter()
            .filter(|c| !q.contains(*c) && !exclusion.contains(c))
            .map(|gi| {
                let s: f64 = q
                    .channels()
                    .iter()
                    .map(|&c| c.wavelength() * table.get(gi, c).unwrap())
                    .sum();
                (gi, s)
            })
            .filter(|(_, s)| s.is_finite())
            .fold(None, |best: Option<(Channel, f64)>, (gi, s)| match best {
                Some((_, b)) if b <= s => best,
                _ => Some((gi, s)),
            })
    }
}

// ============================================================================
// Pipeline Tests
// ============================================================================

mod pipeline_tests {
    use super::*;

    #[test]
    fn reference_configuration_scenario() {
        let range = ChannelRange::new(1530, 1545).unwrap();
        let (table, report) = InterferenceTable::build(range, &helpers::wide_curve());
        assert!(report.undefined.is_empty());

        let scores = ScoreTable::aggregate(&table, 3).unwrap();
        let q = helpers::config(&[1530, 1537, 1538]);

        let chosen = select(&scores, &q, &BTreeSet::new()).unwrap();
        let (expected, expected_score) =
            helpers::brute_force_best(&table, &q, &BTreeSet::new()).unwrap();

        assert_eq!(chosen.channel, expected);
        assert!((chosen.score - expected_score).abs() <= 1e-12 * expected_score);
    }

    #[test]
    fn selection_with_exclusions_matches_brute_force() {
        let range = ChannelRange::new(1530, 1545).unwrap();
        let (table, _) = InterferenceTable::build(range, &helpers::wide_curve());
        let scores = ScoreTable::aggregate(&table, 3).unwrap();
        let q = helpers::config(&[1530, 1537, 1538]);

        let mut exclusion = BTreeSet::new();
        // Keep taking the best channel until the universe runs dry
        while let Some(chosen) = select(&scores, &q, &exclusion) {
            let (expected, _) = helpers::brute_force_best(&table, &q, &exclusion).unwrap();
            assert_eq!(chosen.channel, expected);
            assert!(exclusion.insert(chosen.channel));
        }
        assert_eq!(exclusion.len(), range.len() - q.len());
    }

    #[test]
    fn tables_survive_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let table_path = dir.path().join("B_table.csv");
        let scores_path = dir.path().join("results.csv");

        let range = ChannelRange::new(1530, 1538).unwrap();
        let (table, _) = InterferenceTable::build(range, &helpers::wide_curve());
        table.save(&table_path).unwrap();

        let reloaded = InterferenceTable::load(&table_path).unwrap();
        let scores = ScoreTable::aggregate(&reloaded, 4).unwrap();
        scores.save(&scores_path).unwrap();

        let reloaded_scores = ScoreTable::load(&scores_path).unwrap();
        assert_eq!(reloaded_scores, scores);

        let q = helpers::config(&[1530, 1537]);
        assert_eq!(
            select(&reloaded_scores, &q, &BTreeSet::new()),
            select(&scores, &q, &BTreeSet::new())
        );
    }

    #[test]
    fn curve_gaps_drop_candidates_instead_of_ranking_them() {
        let range = ChannelRange::new(1530, 1545).unwrap();
        // Measured only close to the reference wavelength
        let curve = ReferenceCurve::new(1550.0, (1540..=1556).map(|x| (x, 1e-6)));
        let (table, report) = InterferenceTable::build(range, &curve);
        assert!(!report.undefined.is_empty());

        let scores = ScoreTable::aggregate(&table, 2).unwrap();
        for (_, ranked) in scores.iter() {
            assert!(ranked.iter().all(|c| c.score.is_finite()));
        }
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn curve() -> impl Strategy<Value = ReferenceCurve> {
        prop::collection::btree_map(1500i64..1600i64, 0.0f64..1e-3, 1..80)
            .prop_map(|points| ReferenceCurve::new(1550.0, points))
    }

    fn configuration() -> impl Strategy<Value = Configuration> {
        prop::collection::btree_set(1530u16..=1541u16, 1..=4)
            .prop_map(|set| Configuration::new(set.into_iter().map(Channel)).unwrap())
    }

    fn exclusion() -> impl Strategy<Value = BTreeSet<Channel>> {
        prop::collection::btree_set((1530u16..=1541u16).prop_map(Channel), 0..8)
    }

    proptest! {
        #[test]
        fn interference_is_infinite_on_diagonal_and_never_negative(curve in curve()) {
            let range = ChannelRange::new(1530, 1541).unwrap();
            let (table, _) = InterferenceTable::build(range, &curve);

            for a in range.iter() {
                for b in range.iter() {
                    let v = table.get(a, b).unwrap();
                    if a == b {
                        prop_assert_eq!(v, f64::INFINITY);
                    } else {
                        prop_assert!(v.is_nan() || v >= 0.0);
                    }
                }
            }
        }

        #[test]
        fn rankings_are_sorted_and_exclude_configuration(curve in curve(), q in configuration()) {
            let range = ChannelRange::new(1530, 1541).unwrap();
            let (table, _) = InterferenceTable::build(range, &curve);
            let ranked = wave_table::rank_configuration(&table, &q).unwrap();

            prop_assert!(ranked.windows(2).all(|w| w[0].score <= w[1].score));
            prop_assert!(ranked.iter().all(|c| !q.contains(c.channel)));
            prop_assert!(ranked.iter().all(|c| c.score.is_finite()));
        }

        #[test]
        fn selection_never_returns_barred_channel(
            curve in curve(),
            q in configuration(),
            excluded in exclusion()
        ) {
            let range = ChannelRange::new(1530, 1541).unwrap();
            let (table, _) = InterferenceTable::build(range, &curve);
            let mut scores = ScoreTable::default();
            scores.insert(q.clone(), wave_table::rank_configuration(&table, &q).unwrap());

            if let Some(chosen) = select(&scores, &q, &excluded) {
                prop_assert!(!q.contains(chosen.channel));
                prop_assert!(!excluded.contains(&chosen.channel));
            }

            let first = scores.iter().next().and_then(|(_, r)| r.first().copied());
            prop_assert_eq!(select(&scores, &q, &BTreeSet::new()), first);
        }
    }
}
