//! Confluence of candlestick shapes with support/resistance
//!
//! A directional candlestick whose last close sits within tolerance of a level
//! of matching bias (bullish at Support, bearish at Resistance) is promoted:
//! confidence goes up one tier and probability gains the knowledge-table bonus.

use super::MatchInput;
use crate::config::ConfluenceParams;
use crate::knowledge::codes;
use crate::levels::{Level, LevelKind};
use crate::pattern::{DetectedPattern, PatternDetail, PatternKind};
use crate::Direction;

/// Probability ceiling after the confluence bonus
pub const MAX_PROBABILITY: f64 = 95.0;

/// Promote candlestick matches that coincide with a level.
///
/// Non-candlestick and neutral inputs are ignored. The base matches are not
/// modified; promoted copies are returned.
pub fn promote(
    input: &MatchInput<'_>,
    candidates: &[DetectedPattern],
    params: &ConfluenceParams,
) -> Vec<DetectedPattern> {
    candidates
        .iter()
        .filter(|p| p.kind() == PatternKind::Candlestick)
        .filter_map(|p| promote_one(input, p, params))
        .collect()
}

fn promote_one(
    input: &MatchInput<'_>,
    base: &DetectedPattern,
    params: &ConfluenceParams,
) -> Option<DetectedPattern> {
    let (kind, code) = match base.signal {
        Direction::Bullish => (LevelKind::Support, codes::CONFLUENCE_SUPPORT),
        Direction::Bearish => (LevelKind::Resistance, codes::CONFLUENCE_RESISTANCE),
        Direction::Neutral => return None,
    };
    let close = input.bars().get(base.end_index)?.close;
    let level = nearest_level(input.levels, kind, close, params.tolerance.get())?;

    let mut promoted = base.clone();
    promoted.detail = PatternDetail::Confluence {
        base: base.code,
        base_confidence: base.confidence,
        level: *level,
    };
    promoted.code = code;
    promoted.name = format!("{} at {}", base.name, kind.as_str());
    promoted.confidence = base.confidence.raised();
    promoted.probability = (base.probability + input.knowledge.confluence_bonus)
        .min(MAX_PROBABILITY)
        .max(base.probability);

    promoted.evidence.push(format!(
        "Close {:.2} within {:.2}% of {} {:.2} ({} touches)",
        close,
        level.distance_ratio(close) * 100.0,
        kind.as_str(),
        level.price,
        level.strength
    ));
    promoted.confirmation.push(match kind {
        LevelKind::Support => format!("{} holds on a closing basis", kind.as_str()),
        LevelKind::Resistance => format!("{} caps the next rally attempt", kind.as_str()),
    });

    Some(promoted)
}

/// Closest level of `kind` within tolerance; ties go to the stronger level.
fn nearest_level(levels: &[Level], kind: LevelKind, price: f64, tolerance: f64) -> Option<&Level> {
    levels
        .iter()
        .filter(|l| l.kind == kind && l.is_near(price, tolerance))
        .min_by(|a, b| {
            a.distance_ratio(price)
                .total_cmp(&b.distance_ratio(price))
                .then(b.strength.cmp(&a.strength))
        })
}
