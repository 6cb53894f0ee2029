//! Waterfall Layout
//!
//! Pure geometry: which rows are shown, where each bar starts and ends in
//! margin units, and how margin units map to pixels.

use inference_engine::Explanation;
use serde::Serialize;

/// One bar of the waterfall
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterfallRow {
    /// Axis label, e.g. `31 = Rot spd ovr torque`
    pub label: String,
    /// Contribution of this row
    pub shap: f64,
    /// Cumulative value where the bar starts
    pub start: f64,
    /// Cumulative value where the bar ends
    pub end: f64,
}

/// Format a feature value the way the axis labels show it
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e9 {
        format!("{}", value as i64)
    } else {
        let s = format!("{:.3}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Order contributions by magnitude and fold the tail into one row
///
/// Rows are returned top to bottom: the largest contribution first. The
/// bottom row starts at `base_value` and the top row ends at
/// `base_value + Σ shap`.
pub fn layout_rows(explanation: &Explanation, max_display: usize) -> Vec<WaterfallRow> {
    let max_display = max_display.max(1);

    let mut order: Vec<usize> = (0..explanation.contributions.len()).collect();
    // Stable sort keeps feature order among ties
    order.sort_by(|&a, &b| {
        let sa = explanation.contributions[a].shap.abs();
        let sb = explanation.contributions[b].shap.abs();
        sb.total_cmp(&sa)
    });

    let mut rows: Vec<(String, f64)> = Vec::with_capacity(max_display);
    if order.len() > max_display {
        let (shown, rest) = order.split_at(max_display - 1);
        for &idx in shown {
            let c = &explanation.contributions[idx];
            rows.push((format!("{} = {}", format_value(c.value), c.name), c.shap));
        }
        let rest_total: f64 = rest.iter().map(|&idx| explanation.contributions[idx].shap).sum();
        rows.push((format!("{} other features", rest.len()), rest_total));
    } else {
        for &idx in &order {
            let c = &explanation.contributions[idx];
            rows.push((format!("{} = {}", format_value(c.value), c.name), c.shap));
        }
    }

    // Accumulate from the bottom row upwards
    let mut cumulative = explanation.base_value;
    let mut laid_out: Vec<WaterfallRow> = rows
        .into_iter()
        .rev()
        .map(|(label, shap)| {
            let start = cumulative;
            cumulative += shap;
            WaterfallRow {
                label,
                shap,
                start,
                end: cumulative,
            }
        })
        .collect();
    laid_out.reverse();
    laid_out
}

/// Linear map from margin units to horizontal pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisScale {
    /// Smallest value shown
    pub min: f64,
    /// Largest value shown
    pub max: f64,
    /// Pixel column of `min`
    pub left: f64,
    /// Pixel column of `max`
    pub right: f64,
}

impl AxisScale {
    /// Fit every bar end, the base value and the output value, with padding
    pub fn fit(rows: &[WaterfallRow], base_value: f64, output_value: f64, left: f64, right: f64) -> Self {
        let values = rows
            .iter()
            .flat_map(|r| [r.start, r.end])
            .chain([base_value, output_value]);

        let (mut min, mut max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

        let span = max - min;
        let pad = if span > 0.0 { span * 0.1 } else { 0.5 };
        min -= pad;
        max += pad;

        Self { min, max, left, right }
    }

    /// Pixel column for a value
    pub fn to_px(&self, value: f64) -> f64 {
        self.left + (value - self.min) / (self.max - self.min) * (self.right - self.left)
    }

    /// Tick positions at a 1/2/5 step giving roughly `target` ticks
    pub fn ticks(&self, target: usize) -> Vec<f64> {
        let step = nice_step((self.max - self.min) / target.max(1) as f64);
        let first = (self.min / step).ceil() as i64;
        let last = (self.max / step).floor() as i64;
        (first..=last).map(|i| i as f64 * step).collect()
    }
}

fn nice_step(raw: f64) -> f64 {
    if !(raw.is_finite() && raw > 0.0) {
        return 1.0;
    }
    let magnitude = 10f64.powf(raw.log10().floor());
    let fraction = raw / magnitude;
    let nice = if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_engine::FeatureContribution;

    fn explanation(shaps: &[f64]) -> Explanation {
        let names = ["a", "b", "c", "d", "e"];
        let contributions: Vec<FeatureContribution> = shaps
            .iter()
            .zip(names)
            .map(|(shap, name)| FeatureContribution {
                name,
                value: 1.5,
                shap: *shap,
            })
            .collect();
        let total: f64 = shaps.iter().sum();
        Explanation {
            base_value: -1.0,
            contributions,
            output_value: -1.0 + total,
        }
    }

    #[test]
    fn test_rows_sorted_by_magnitude() {
        let rows = layout_rows(&explanation(&[0.1, -0.7, 0.3]), 10);
        let shaps: Vec<f64> = rows.iter().map(|r| r.shap).collect();
        assert_eq!(shaps, vec![-0.7, 0.3, 0.1]);
        assert_eq!(rows[0].label, "1.5 = b");
    }

    #[test]
    fn test_rows_chain_from_base_to_output() {
        let e = explanation(&[0.1, -0.7, 0.3]);
        let rows = layout_rows(&e, 10);

        assert_eq!(rows.last().unwrap().start, e.base_value);
        assert!((rows[0].end - e.output_value).abs() < 1e-12);
        for pair in rows.windows(2) {
            assert_eq!(pair[1].end, pair[0].start);
        }
    }

    #[test]
    fn test_tail_folded_into_other_features() {
        let e = explanation(&[0.5, 0.01, -0.02, 0.4, 0.03]);
        let rows = layout_rows(&e, 3);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].label, "3 other features");
        assert!((rows[2].shap - 0.02).abs() < 1e-12);
        assert!((rows[0].end - e.output_value).abs() < 1e-12);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(31.0), "31");
        assert_eq!(format_value(90592.0), "90592");
        assert_eq!(format_value(0.125), "0.125");
        assert_eq!(format_value(304.5), "304.5");
        assert_eq!(format_value(-2.0), "-2");
    }

    #[test]
    fn test_scale_and_ticks() {
        let e = explanation(&[1.0, -0.5]);
        let rows = layout_rows(&e, 10);
        let scale = AxisScale::fit(&rows, e.base_value, e.output_value, 100.0, 600.0);

        // Bars span -1.5 to -0.5, padded on both sides
        assert!(scale.min < -1.5 && scale.max > -0.5);
        assert!((scale.to_px(scale.min) - 100.0).abs() < 1e-9);
        assert!((scale.to_px(scale.max) - 600.0).abs() < 1e-9);

        let ticks = scale.ticks(5);
        assert!(!ticks.is_empty());
        assert!(ticks.iter().all(|t| *t >= scale.min && *t <= scale.max));
    }

    #[test]
    fn test_nice_step() {
        assert_eq!(nice_step(0.23), 0.5);
        assert_eq!(nice_step(1.7), 2.0);
        assert_eq!(nice_step(7.0), 10.0);
        assert_eq!(nice_step(0.0), 1.0);
    }
}
