//! Support/resistance level detection
//!
//! Local extrema over a symmetric neighbourhood are clustered by price; each
//! cluster becomes one level whose strength is its touch count.

use serde::{Deserialize, Serialize};

use crate::config::LevelParams;
use crate::series::{Bar, Series};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelKind {
    /// Built from swing lows
    Support,
    /// Built from swing highs
    Resistance,
}

impl LevelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LevelKind::Support => "Support",
            LevelKind::Resistance => "Resistance",
        }
    }
}

/// A horizontal price level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub kind: LevelKind,
    /// Number of extrema merged into this level (>= 1)
    pub strength: usize,
    pub first_index: usize,
    pub last_index: usize,
}

impl Level {
    /// Distance from `price` relative to the level price
    #[inline]
    pub fn distance_ratio(&self, price: f64) -> f64 {
        if self.price.abs() <= f64::EPSILON {
            return (price - self.price).abs();
        }
        (price - self.price).abs() / self.price.abs()
    }

    #[inline]
    pub fn is_near(&self, price: f64, tolerance: f64) -> bool {
        self.distance_ratio(price) <= tolerance
    }
}

/// A swing high or low
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremum {
    pub index: usize,
    pub price: f64,
}

/// Swing highs and lows of a bar slice
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extrema {
    /// Peaks on highs, ascending index
    pub peaks: Vec<Extremum>,
    /// Valleys on lows, ascending index
    pub valleys: Vec<Extremum>,
}

/// Find bars whose high (low) dominates every bar within `radius` on both sides.
///
/// A bar must be >= all neighbours and strictly greater than at least one, so a
/// perfectly flat stretch yields nothing. The first and last `radius` bars are never
/// extrema because their neighbourhood is incomplete.
pub fn find_extrema(bars: &[Bar], radius: usize) -> Extrema {
    let mut out = Extrema::default();
    if radius == 0 || radius.checked_mul(2).map_or(true, |width| bars.len() <= width) {
        return out;
    }

    for i in radius..bars.len() - radius {
        let neighbours = (i - radius..=i + radius).filter(|&j| j != i);

        let high = bars[i].high;
        let low = bars[i].low;
        let (mut peak, mut peak_strict) = (true, false);
        let (mut valley, mut valley_strict) = (true, false);

        for j in neighbours {
            let other = &bars[j];
            if other.high > high {
                peak = false;
            } else if other.high < high {
                peak_strict = true;
            }
            if other.low < low {
                valley = false;
            } else if other.low > low {
                valley_strict = true;
            }
        }

        if peak && peak_strict {
            out.peaks.push(Extremum { index: i, price: high });
        }
        if valley && valley_strict {
            out.valleys.push(Extremum { index: i, price: low });
        }
    }

    out
}

#[inline]
fn within(a: f64, b: f64, tolerance: f64) -> bool {
    let reference = a.abs().max(b.abs());
    if reference <= f64::EPSILON {
        return true;
    }
    (a - b).abs() / reference <= tolerance
}

#[derive(Debug, Clone)]
struct Cluster {
    sum: f64,
    count: usize,
    first_index: usize,
    last_index: usize,
}

impl Cluster {
    fn new(e: &Extremum) -> Self {
        Self {
            sum: e.price,
            count: 1,
            first_index: e.index,
            last_index: e.index,
        }
    }

    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }

    fn absorb(&mut self, other: &Cluster) {
        self.sum += other.sum;
        self.count += other.count;
        self.first_index = self.first_index.min(other.first_index);
        self.last_index = self.last_index.max(other.last_index);
    }
}

fn cluster(mut points: Vec<Extremum>, tolerance: f64) -> Vec<Cluster> {
    points.sort_by(|a, b| a.price.total_cmp(&b.price).then(a.index.cmp(&b.index)));

    let mut clusters: Vec<Cluster> = Vec::new();
    for point in &points {
        match clusters.last_mut() {
            Some(c) if within(c.mean(), point.price, tolerance) => c.absorb(&Cluster::new(point)),
            _ => clusters.push(Cluster::new(point)),
        }
    }

    clusters
}

/// Detect support and resistance levels.
///
/// Output is sorted by strength (desc), then most recent touch (desc), then price.
pub fn detect(series: &Series, params: &LevelParams) -> Vec<Level> {
    let extrema = find_extrema(series.bars(), params.radius.get());
    let tolerance = params.tolerance.get();
    let min_touches = params.min_touches.get();

    let mut levels: Vec<Level> = [
        (LevelKind::Resistance, extrema.peaks),
        (LevelKind::Support, extrema.valleys),
    ]
    .into_iter()
    .flat_map(|(kind, points)| {
        cluster(points, tolerance)
            .into_iter()
            .filter(|c| c.count >= min_touches)
            .map(move |c| Level {
                price: c.mean(),
                kind,
                strength: c.count,
                first_index: c.first_index,
                last_index: c.last_index,
            })
    })
    .collect();

    levels.sort_by(|a, b| {
        b.strength
            .cmp(&a.strength)
            .then(b.last_index.cmp(&a.last_index))
            .then(a.price.total_cmp(&b.price))
    });
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Period, Ratio};

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(i as i64, c, c + 0.5, c - 0.5, c, 100.0))
            .collect()
    }

    fn zigzag() -> Vec<Bar> {
        bars_from_closes(&[
            100.0, 98.0, 96.0, 95.0, 96.0, 98.0, 100.0, 98.0, 96.0, 95.1, 96.0, 98.0, 100.2,
            98.0, 96.0, 95.05, 96.0, 98.0, 100.0,
        ])
    }

    #[test]
    fn test_find_extrema() {
        let extrema = find_extrema(&zigzag(), 2);
        let peaks: Vec<usize> = extrema.peaks.iter().map(|e| e.index).collect();
        let valleys: Vec<usize> = extrema.valleys.iter().map(|e| e.index).collect();
        assert_eq!(peaks, vec![6, 12]);
        assert_eq!(valleys, vec![3, 9, 15]);
    }

    #[test]
    fn test_find_extrema_radius_beyond_series() {
        let bars = zigzag();
        assert_eq!(find_extrema(&bars, usize::MAX), Extrema::default());
        assert_eq!(find_extrema(&bars, bars.len() / 2 + 1), Extrema::default());
    }

    #[test]
    fn test_detect_levels() {
        let series = Series::from_bars(&zigzag()).unwrap();
        let levels = detect(&series, &LevelParams::default());
        assert_eq!(levels.len(), 2);

        let support = &levels[0];
        assert_eq!(support.kind, LevelKind::Support);
        assert_eq!(support.strength, 3);
        assert_eq!((support.first_index, support.last_index), (3, 15));
        assert!((support.price - 94.55).abs() < 1e-9);

        assert_eq!(levels[1].kind, LevelKind::Resistance);
        assert_eq!(levels[1].strength, 2);
    }

    #[test]
    fn test_flat_series_has_no_levels() {
        let series = Series::from_bars(&bars_from_closes(&[50.0; 40])).unwrap();
        assert!(detect(&series, &LevelParams::default()).is_empty());
    }

    #[test]
    fn test_min_touches_filter() {
        let series = Series::from_bars(&zigzag()).unwrap();
        let params = LevelParams {
            min_touches: Period::new_const(3),
            ..LevelParams::default()
        };
        let levels = detect(&series, &params);
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].kind, LevelKind::Support);
    }

    #[test]
    fn test_distant_extrema_stay_apart() {
        let series = Series::from_bars(&zigzag()).unwrap();
        let params = LevelParams {
            tolerance: Ratio::new_const(0.0001),
            min_touches: Period::new_const(1),
            ..LevelParams::default()
        };
        let supports = detect(&series, &params)
            .into_iter()
            .filter(|l| l.kind == LevelKind::Support)
            .count();
        assert_eq!(supports, 3);
    }

    #[test]
    fn test_clusters_join_on_running_mean() {
        // 101.3 is more than 1% above 100 but within 1% of the 100/100.9 mean
        let points = [101.3, 100.0, 100.9]
            .iter()
            .enumerate()
            .map(|(index, &price)| Extremum { index, price })
            .collect();
        let clusters = cluster(points, 0.01);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 3);
    }

    #[test]
    fn test_level_is_near() {
        let level = Level {
            price: 95.0,
            kind: LevelKind::Support,
            strength: 3,
            first_index: 0,
            last_index: 10,
        };
        assert!(level.is_near(95.2, 0.01));
        assert!(!level.is_near(97.0, 0.01));
    }
}
