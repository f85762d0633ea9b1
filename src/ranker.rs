//! Pattern ranking
//!
//! Matches from every family are deduplicated on `(base code, start, end)`,
//! ordered by score and cut to the configured top-K. The order is total, so
//! the output only depends on the set of matches, not on the order the
//! matchers produced them.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::RankingParams;
use crate::knowledge::PatternCode;
use crate::pattern::DetectedPattern;

type DedupKey = (PatternCode, usize, usize);

/// Deduplicate, sort and truncate.
pub fn rank(matches: Vec<DetectedPattern>, params: &RankingParams) -> Vec<DetectedPattern> {
  let found = matches.len();

  let mut best: BTreeMap<DedupKey, DetectedPattern> = BTreeMap::new();
  for pattern in matches {
    let key = (pattern.base_code(), pattern.start_index, pattern.end_index);
    let better = best
      .get(&key)
      .map_or(true, |kept| compare(&pattern, kept) == Ordering::Less);
    if better {
      best.insert(key, pattern);
    }
  }

  let mut ranked: Vec<DetectedPattern> = best.into_values().collect();
  ranked.sort_by(compare);
  ranked.truncate(params.top_k);

  tracing::debug!(found, kept = ranked.len(), "ranked patterns");
  ranked
}

/// `Less` means `a` ranks ahead of `b`
pub fn compare(a: &DetectedPattern, b: &DetectedPattern) -> Ordering {
  b.score()
    .total_cmp(&a.score())
    .then_with(|| b.risk_reward.total_cmp(&a.risk_reward))
    .then_with(|| a.start_index.cmp(&b.start_index))
    .then_with(|| a.code.cmp(&b.code))
    .then_with(|| a.end_index.cmp(&b.end_index))
}
