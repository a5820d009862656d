//! Numeric summaries of leg metric samples.

use serde::{Deserialize, Serialize};

/// Which leg metric a [`MetricSummary`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Metric {
    Duration,
    Delay,
    Deviation,
}

/// Fixed-shape summary of one metric over a group of legs.
///
/// Percentiles are discrete (nearest-rank on the sorted sample) at
/// p10, p25, p50, p75 and p90, matching the analytical-store semantics
/// the serving layer was built against.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MetricSummary {
    pub metric: Metric,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub percentiles: [i64; 5],
}

impl MetricSummary {
    /// Summarizes a sample. Returns `None` for an empty sample.
    pub fn compute(metric: Metric, values: &[i64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_unstable();

        let floats: Vec<f64> = sorted.iter().map(|&v| v as f64).collect();
        let mean = mean(&floats);

        Some(MetricSummary {
            metric,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean,
            median: median_sorted(&sorted),
            stddev: stddev(&floats, mean),
            percentiles: [
                percentile_sorted(&sorted, 0.10),
                percentile_sorted(&sorted, 0.25),
                percentile_sorted(&sorted, 0.50),
                percentile_sorted(&sorted, 0.75),
                percentile_sorted(&sorted, 0.90),
            ],
        })
    }

    /// The 75th-percentile value.
    pub fn upper_quartile(&self) -> i64 {
        self.percentiles[3]
    }
}

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Computes the population standard deviation given a pre-computed mean.
/// Returns 0.0 for empty input.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

    variance.sqrt()
}

/// Interpolated median of an already-sorted sample. 0.0 for empty input.
pub fn median_sorted(sorted: &[i64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2] as f64
    } else {
        (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0
    }
}

/// Discrete nearest-rank percentile of an already-sorted sample: the
/// smallest element whose cumulative proportion reaches `q`.
pub fn percentile_sorted(sorted: &[i64], q: f64) -> i64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
