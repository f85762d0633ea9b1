//! Renderer-agnostic overlay geometry
//!
//! Coordinates are in chart space: `x` is a (possibly fractional) bar index,
//! `y` is a price. Mapping to pixels belongs to the presentation layer.
//!
//! Label placement is greedy and order-dependent: patterns are processed in
//! the order given (the ranker's order) and each label avoids only the labels
//! placed before it.

use serde::Serialize;

use crate::config::OverlayParams;
use crate::detectors::helpers::{highest_high, lowest_low};
use crate::knowledge::PatternCode;
use crate::pattern::DetectedPattern;
use crate::series::Series;
use crate::Direction;

// ============================================================
// PRIMITIVES
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverlayKind {
    Box,
    Line,
    Icon,
    Arrow,
}

/// What an overlay depicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverlayRole {
    /// Bars covered by the pattern
    Span,
    Entry,
    Target,
    Stop,
    /// Marker at the pattern midpoint
    Marker,
    /// From the last close toward the target
    Projection,
    Label,
}

/// One drawable primitive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub kind: OverlayKind,
    pub role: OverlayRole,
    pub start_x: f64,
    pub start_y: f64,
    /// Unset for icons
    pub end_x: Option<f64>,
    pub end_y: Option<f64>,
    pub color: &'static str,
    pub label: Option<String>,
    pub code: PatternCode,
}

impl Overlay {
    fn point(kind: OverlayKind, role: OverlayRole, x: f64, y: f64, code: PatternCode) -> Self {
        Self {
            kind,
            role,
            start_x: x,
            start_y: y,
            end_x: None,
            end_y: None,
            color: NEUTRAL,
            label: None,
            code,
        }
    }

    fn to(mut self, x: f64, y: f64) -> Self {
        self.end_x = Some(x);
        self.end_y = Some(y);
        self
    }

    fn colored(mut self, color: &'static str) -> Self {
        self.color = color;
        self
    }

    fn labeled(mut self, label: String) -> Self {
        self.label = Some(label);
        self
    }
}

const BULLISH: &str = "#26a69a";
const BEARISH: &str = "#ef5350";
const NEUTRAL: &str = "#9e9e9e";
const ENTRY: &str = "#2962ff";
const TARGET: &str = "#00c853";
const STOP: &str = "#d50000";

fn direction_color(direction: Direction) -> &'static str {
    match direction {
        Direction::Bullish => BULLISH,
        Direction::Bearish => BEARISH,
        Direction::Neutral => NEUTRAL,
    }
}

// ============================================================
// LABEL PLACEMENT
// ============================================================

/// Axis-aligned label box anchored at its lower-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
struct LabelBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl LabelBox {
    /// Touching edges do not count as overlap
    fn intersects(&self, other: &LabelBox) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    fn shifted(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }
}

/// Default position, then upward shifts, then rightward shifts; the default
/// when every attempt collides.
fn place_label(default: LabelBox, placed: &[LabelBox], params: &OverlayParams) -> LabelBox {
    let vertical =
        (1..=params.vertical_attempts).map(|k| default.shifted(0.0, k as f64 * default.height));
    let horizontal = (1..=params.horizontal_attempts)
        .map(|k| default.shifted(k as f64 * default.width / 2.0, 0.0));

    std::iter::once(default)
        .chain(vertical)
        .chain(horizontal)
        .find(|candidate| placed.iter().all(|p| !candidate.intersects(p)))
        .unwrap_or_else(|| {
            tracing::trace!(x = default.x, y = default.y, "label overlaps after all attempts");
            default
        })
}

// ============================================================
// GENERATION
// ============================================================

/// Project ranked patterns into overlay primitives.
///
/// Per pattern: span box, entry/target/stop lines, midpoint marker,
/// projection arrow and a label.
pub fn generate(patterns: &[DetectedPattern], series: &Series, params: &OverlayParams) -> Vec<Overlay> {
    let Some((low, high)) = series.price_bounds() else {
        return Vec::new();
    };
    let price_span = high - low;
    let label_height = if price_span > f64::EPSILON {
        params.label_height_ratio.get() * price_span
    } else {
        params.label_height_ratio.get() * high.abs().max(1.0)
    };

    let bars = series.bars();
    let mut placed: Vec<LabelBox> = Vec::with_capacity(patterns.len());
    let mut out = Vec::with_capacity(patterns.len() * 7);

    for p in patterns {
        let (start, end) = (p.start_index, p.end_index);
        let (Some(span_low), Some(span_high), Some(last)) =
            (lowest_low(bars, start, end), highest_high(bars, start, end), bars.get(end))
        else {
            tracing::trace!(code = p.code.as_str(), start, end, "pattern outside series, no overlay");
            continue;
        };
        let (x0, x1) = (start as f64, end as f64);
        let line_end = x1 + params.extend_bars;
        let color = direction_color(p.signal);

        out.push(
            Overlay::point(OverlayKind::Box, OverlayRole::Span, x0, span_high, p.code)
                .to(x1, span_low)
                .colored(color),
        );
        for (role, price, line_color, text) in [
            (OverlayRole::Entry, p.entry_price, ENTRY, "Entry"),
            (OverlayRole::Target, p.target_price, TARGET, "Target"),
            (OverlayRole::Stop, p.stop_loss, STOP, "Stop"),
        ] {
            out.push(
                Overlay::point(OverlayKind::Line, role, x0, price, p.code)
                    .to(line_end, price)
                    .colored(line_color)
                    .labeled(format!("{text} {price:.2}")),
            );
        }

        let marker_y = match p.signal {
            Direction::Bullish => span_low,
            Direction::Bearish => span_high,
            Direction::Neutral => last.close,
        };
        out.push(
            Overlay::point(OverlayKind::Icon, OverlayRole::Marker, p.mid_index(), marker_y, p.code)
                .colored(color),
        );
        out.push(
            Overlay::point(OverlayKind::Arrow, OverlayRole::Projection, x1, last.close, p.code)
                .to(line_end, p.target_price)
                .colored(color),
        );

        let text = p.name.clone();
        let default = LabelBox {
            x: x0,
            y: span_high + label_height / 2.0,
            width: text.chars().count() as f64 * params.char_width,
            height: label_height,
        };
        let label = place_label(default, &placed, params);
        placed.push(label);
        out.push(
            Overlay::point(OverlayKind::Icon, OverlayRole::Label, label.x, label.y, p.code)
                .colored(color)
                .labeled(text),
        );
    }

    tracing::debug!(patterns = patterns.len(), overlays = out.len(), "generated overlays");
    out
}
