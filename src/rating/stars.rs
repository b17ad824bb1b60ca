//! Quantile-based star ranks and the score boundaries between them.

use serde::{Deserialize, Serialize};

use super::domain::StarRank;
use super::error::RatingError;
use super::stats::{quantile_sorted, sorted_finite};

/// Percent positions splitting the composite distribution into five ranks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StarQuantiles(pub [f64; 4]);

impl Default for StarQuantiles {
    fn default() -> Self {
        Self([10.0, 30.0, 70.0, 90.0])
    }
}

impl StarQuantiles {
    pub fn validate(&self) -> Result<(), RatingError> {
        let increasing = self.0.windows(2).all(|pair| pair[0] < pair[1]);
        let bounded = self.0.iter().all(|q| *q > 0.0 && *q < 100.0);
        if increasing && bounded {
            Ok(())
        } else {
            Err(RatingError::InvalidMethodology(format!(
                "star quantiles {:?} must be strictly increasing inside (0, 100)",
                self.0
            )))
        }
    }
}

/// Population score values at each quantile plus the maximum sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StarThresholds {
    pub values: [f64; 4],
    pub maximum: f64,
}

impl StarThresholds {
    /// Ties at a threshold fall into the lower rank.
    pub fn rank(&self, score: Option<f64>) -> Option<StarRank> {
        let score = score?;
        let position = self
            .values
            .iter()
            .position(|threshold| score <= *threshold)
            .unwrap_or(self.values.len());
        StarRank::new(position as u8 + 1)
    }
}

pub fn star_thresholds(
    scores: &[Option<f64>],
    quantiles: &StarQuantiles,
) -> Result<StarThresholds, RatingError> {
    let sorted = sorted_finite(scores.iter().flatten().copied());
    let maximum = quantile_sorted(&sorted, 100.0).ok_or(RatingError::EmptyPopulation)?;

    let mut values = [0.0; 4];
    for (slot, pct) in values.iter_mut().zip(quantiles.0) {
        *slot = quantile_sorted(&sorted, pct).ok_or(RatingError::EmptyPopulation)?;
    }

    Ok(StarThresholds { values, maximum })
}

pub fn assign_star_ranks(
    scores: &[Option<f64>],
    quantiles: &StarQuantiles,
) -> Result<(Vec<Option<StarRank>>, StarThresholds), RatingError> {
    let thresholds = star_thresholds(scores, quantiles)?;
    let ranks = scores.iter().map(|score| thresholds.rank(*score)).collect();
    Ok((ranks, thresholds))
}

/// Midpoints between adjacent ranks: boundary k sits between the highest
/// score in rank k and the lowest score in rank k + 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StarCutoffs {
    pub boundaries: [f64; 4],
}

pub fn star_cutoffs<I>(scored: I) -> Result<StarCutoffs, RatingError>
where
    I: IntoIterator<Item = (f64, StarRank)>,
{
    let mut ranges: [Option<(f64, f64)>; 5] = [None; 5];
    for (score, rank) in scored {
        let slot = &mut ranges[usize::from(rank.get() - 1)];
        *slot = match *slot {
            Some((min, max)) => Some((min.min(score), max.max(score))),
            None => Some((score, score)),
        };
    }

    let mut bounds = [(0.0, 0.0); 5];
    for (idx, range) in ranges.iter().enumerate() {
        bounds[idx] = range.ok_or(RatingError::EmptyStarRank(idx as u8 + 1))?;
    }

    let mut boundaries = [0.0; 4];
    for (k, boundary) in boundaries.iter_mut().enumerate() {
        *boundary = (bounds[k].1 + bounds[k + 1].0) / 2.0;
    }

    Ok(StarCutoffs { boundaries })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank(value: u8) -> StarRank {
        StarRank::new(value).expect("valid rank")
    }

    #[test]
    fn cutoffs_are_midpoints_between_adjacent_ranks() {
        let scored = vec![
            (10.0, rank(1)),
            (20.0, rank(1)),
            (21.0, rank(2)),
            (30.0, rank(2)),
            (31.0, rank(3)),
            (50.0, rank(3)),
            (70.0, rank(3)),
            (71.0, rank(4)),
            (90.0, rank(4)),
            (91.0, rank(5)),
            (100.0, rank(5)),
        ];
        let cutoffs = star_cutoffs(scored).expect("all ranks populated");
        assert_eq!(cutoffs.boundaries, [20.5, 30.5, 70.5, 90.5]);
    }

    #[test]
    fn empty_rank_is_a_data_error() {
        let scored = vec![(1.0, rank(1)), (2.0, rank(2)), (3.0, rank(3)), (4.0, rank(5))];
        assert_eq!(star_cutoffs(scored), Err(RatingError::EmptyStarRank(4)));
    }

    #[test]
    fn ranks_follow_population_quantiles_with_lower_inclusive_ties() {
        let scores: Vec<Option<f64>> = (1..=10).map(|v| Some(f64::from(v))).collect();
        let (ranks, thresholds) =
            assign_star_ranks(&scores, &StarQuantiles::default()).expect("ranks");

        assert!((thresholds.values[0] - 1.9).abs() < 1e-12);
        assert!((thresholds.values[3] - 9.1).abs() < 1e-12);
        assert_eq!(thresholds.maximum, 10.0);

        let ranks: Vec<u8> = ranks.iter().map(|r| r.expect("ranked").get()).collect();
        assert_eq!(ranks, vec![1, 2, 2, 3, 3, 3, 3, 4, 4, 5]);

        assert_eq!(thresholds.rank(Some(thresholds.values[1])), Some(rank(2)));
    }

    #[test]
    fn missing_composite_has_no_rank() {
        let scores = vec![Some(1.0), None, Some(3.0)];
        let (ranks, _) = assign_star_ranks(&scores, &StarQuantiles::default()).expect("ranks");
        assert!(ranks[1].is_none());
    }

    #[test]
    fn ranking_requires_at_least_one_score() {
        let scores = vec![None, None];
        assert_eq!(
            assign_star_ranks(&scores, &StarQuantiles::default()).map(|(r, _)| r),
            Err(RatingError::EmptyPopulation)
        );
    }

    #[test]
    fn rank_is_monotone_in_score() {
        let scores: Vec<Option<f64>> = (0..97).map(|v| Some(f64::from(v * 37 % 97))).collect();
        let (ranks, _) = assign_star_ranks(&scores, &StarQuantiles::default()).expect("ranks");
        for (a, ra) in scores.iter().zip(&ranks) {
            for (b, rb) in scores.iter().zip(&ranks) {
                if a < b {
                    assert!(ra <= rb);
                }
            }
        }
    }

    #[test]
    fn quantiles_must_increase() {
        assert!(StarQuantiles([10.0, 30.0, 30.0, 90.0]).validate().is_err());
        assert!(StarQuantiles::default().validate().is_ok());
    }
}
