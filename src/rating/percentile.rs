//! Coarse percentile ranks and probit normalization for ratio measures.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use super::error::RatingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentileSettings {
    /// Number of rank groups; percentiles land on multiples of `100 / buckets`.
    pub buckets: u32,
}

impl Default for PercentileSettings {
    fn default() -> Self {
        Self { buckets: 200 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbitScores {
    pub percentiles: Vec<Option<f64>>,
    pub probits: Vec<Option<f64>>,
}

/// 1-based fractional ranks; tied values share the mean of their positions.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        let shared = (start + end + 2) as f64 / 2.0;
        for idx in &order[start..=end] {
            ranks[*idx] = shared;
        }
        start = end + 1;
    }

    ranks
}

fn standard_normal() -> Result<Normal, RatingError> {
    Normal::new(0.0, 1.0).map_err(|err| RatingError::Distribution(err.to_string()))
}

/// Inverse standard-normal CDF.
pub fn probit(probability: f64) -> Result<f64, RatingError> {
    Ok(standard_normal()?.inverse_cdf(probability))
}

pub fn percentile_probit(
    measure: &str,
    column: &[Option<f64>],
    settings: &PercentileSettings,
) -> Result<ProbitScores, RatingError> {
    let observed: Vec<f64> = column.iter().flatten().copied().collect();
    let ranks = average_ranks(&observed);
    let n = observed.len() as f64;
    let buckets = f64::from(settings.buckets);

    let mut percentiles = Vec::with_capacity(observed.len());
    for rank in ranks {
        // Group index stays within 0..=buckets-2, so the percentile is never 0 or 100.
        let group = (rank * (buckets - 1.0) / (n + 1.0)).floor();
        let percentile = (group + 1.0) * 100.0 / buckets;
        if !(percentile > 0.0 && percentile < 100.0) {
            return Err(RatingError::PercentileOutOfRange {
                measure: measure.to_string(),
                value: percentile,
            });
        }
        percentiles.push(percentile);
    }

    let mut pct_iter = percentiles.iter().copied();
    let percentiles: Vec<Option<f64>> = column
        .iter()
        .map(|cell| cell.and_then(|_| pct_iter.next()))
        .collect();
    let normal = standard_normal()?;
    let probits = percentiles
        .iter()
        .map(|pct| pct.map(|p| normal.inverse_cdf(p / 100.0)))
        .collect();

    Ok(ProbitScores {
        percentiles,
        probits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_share_the_average_rank() {
        assert_eq!(average_ranks(&[5.0, 5.0, 1.0]), vec![2.5, 2.5, 1.0]);
        assert_eq!(average_ranks(&[3.0, 1.0, 2.0]), vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn probit_matches_known_quantiles() {
        let z = |p: f64| probit(p).expect("standard normal");
        assert!(z(0.5).abs() < 1e-12);
        assert!((z(0.975) - 1.959_963_984_540_054).abs() < 1e-9);
        assert!((z(0.025) + 1.959_963_984_540_054).abs() < 1e-9);
    }

    #[test]
    fn small_population_spreads_over_the_bucket_grid() {
        let column = vec![Some(0.8), None, Some(1.4), Some(1.1)];
        let scores =
            percentile_probit("star_var6_f", &column, &PercentileSettings::default()).expect("ok");

        assert_eq!(
            scores.percentiles,
            vec![Some(25.0), None, Some(75.0), Some(50.0)]
        );
        assert!(scores.probits[1].is_none());
        assert!(scores.probits[3].expect("median").abs() < 1e-12);
        assert!(scores.probits[0].expect("low") < 0.0);
    }

    #[test]
    fn large_population_stays_strictly_inside_bounds() {
        let column: Vec<Option<f64>> = (0..5_000).map(|v| Some(f64::from(v % 977))).collect();
        let scores =
            percentile_probit("m", &column, &PercentileSettings::default()).expect("ok");

        for (pct, z) in scores.percentiles.iter().zip(&scores.probits) {
            let pct = pct.expect("present");
            assert!(pct > 0.0 && pct < 100.0);
            assert!((pct * 2.0).fract() == 0.0, "percentile {pct} off the 0.5 grid");
            assert!(z.expect("present").is_finite());
        }
    }

    #[test]
    fn all_missing_column_yields_missing_scores() {
        let column = vec![None, None];
        let scores = percentile_probit("m", &column, &PercentileSettings::default()).expect("ok");
        assert_eq!(scores.percentiles, vec![None, None]);
    }
}
