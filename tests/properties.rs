//! Property tests over randomly generated series.

use chartsignals::analyze;
use chartsignals::prelude::*;
use proptest::prelude::*;

const HOUR: i64 = 3_600_000;

/// (price change, upper wick, lower wick, volume) per bar
fn moves() -> impl Strategy<Value = Vec<(f64, f64, f64, f64)>> {
    proptest::collection::vec((-2.0..2.0f64, 0.0..1.5f64, 0.0..1.5f64, 0.0..5_000.0f64), 0..260)
}

/// Hourly random walk, so sessions change every 24 bars
fn walk(moves: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    let mut price = 100.0;
    moves
        .iter()
        .enumerate()
        .map(|(i, &(change, up, down, volume))| {
            let open = price;
            price = (price + change).max(5.0);
            Bar::new(
                i as i64 * HOUR,
                open,
                open.max(price) + up,
                open.min(price) - down,
                price,
                volume,
            )
        })
        .collect()
}

fn in_percent_range(line: &Line) -> bool {
    line.iter()
        .flatten()
        .all(|v| (-1e-9..=100.0 + 1e-9).contains(v))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_lines_align_with_series(moves in moves()) {
        let bars = walk(&moves);
        let analysis = analyze(&bars, &AnalysisOptions::default()).unwrap();
        prop_assert_eq!(analysis.indicators.len(), bars.len());
        for (name, line) in analysis.indicators.lines() {
            prop_assert_eq!(line.len(), bars.len(), "{}", name);
        }
    }

    #[test]
    fn test_oscillators_stay_bounded(moves in moves()) {
        let bars = walk(&moves);
        let analysis = analyze(&bars, &AnalysisOptions::default()).unwrap();
        prop_assert!(in_percent_range(analysis.indicators.rsi().unwrap()));
        let stochastic = analysis.indicators.stochastic().unwrap();
        prop_assert!(in_percent_range(&stochastic.k));
        prop_assert!(in_percent_range(&stochastic.d));
    }

    #[test]
    fn test_ranked_patterns_are_tradeable(moves in moves()) {
        let bars = walk(&moves);
        let analysis = analyze(&bars, &AnalysisOptions::default()).unwrap();
        prop_assert!(analysis.patterns.len() <= 3);
        for p in &analysis.patterns {
            prop_assert!(p.risk_reward > 0.0 && p.risk_reward.is_finite());
            prop_assert!(p.stop_loss != p.entry_price);
            prop_assert!(p.start_index <= p.end_index && p.end_index < bars.len());
            prop_assert!((0.0..=100.0).contains(&p.probability));
        }
    }

    #[test]
    fn test_analysis_is_idempotent(moves in moves()) {
        let bars = walk(&moves);
        let engine = EngineBuilder::new().build().unwrap();
        let first = engine.analyze(&bars, &AnalysisOptions::default()).unwrap();
        let second = engine.analyze(&bars, &AnalysisOptions::default()).unwrap();
        prop_assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_levels_respect_min_touches(moves in moves()) {
        let bars = walk(&moves);
        let analysis = analyze(&bars, &AnalysisOptions::default()).unwrap();
        for level in &analysis.levels {
            prop_assert!(level.strength >= 2);
            prop_assert!(level.first_index <= level.last_index);
        }
    }
}
