//! Domain averaging and the flag-conditioned composite score.

use serde::{Deserialize, Serialize};

use super::domain::Domain;
use super::error::RatingError;

pub type DomainScores = [Option<f64>; 4];

/// Measure membership of the four domains, as fixed by the offline factor analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainLayout {
    pub domains: [Vec<String>; 4],
}

impl DomainLayout {
    pub fn members(&self, domain: Domain) -> &[String] {
        &self.domains[domain.index()]
    }
}

/// Equal-weight mean of the non-missing constituents; missing only when every
/// constituent is missing.
pub fn domain_score(constituents: &[Option<f64>]) -> Option<f64> {
    let missing = constituents.iter().filter(|v| v.is_none()).count();
    if missing == constituents.len() {
        return None;
    }

    let present: Vec<f64> = constituents.iter().flatten().copied().collect();
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

/// Domain weights for the standard and PD-only populations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeWeights {
    pub standard: [f64; 4],
    /// Domain 2 carries no weight for PD-only facilities.
    pub pd_only: [f64; 4],
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            standard: [2.0 / 7.0, 2.0 / 7.0, 1.0 / 7.0, 2.0 / 7.0],
            pd_only: [2.0 / 5.0, 0.0, 1.0 / 5.0, 2.0 / 5.0],
        }
    }
}

impl CompositeWeights {
    const TOLERANCE: f64 = 1e-9;

    pub fn validate(&self) -> Result<(), RatingError> {
        for (label, weights) in [("standard", &self.standard), ("pd_only", &self.pd_only)] {
            let sum: f64 = weights.iter().sum();
            if (sum - 1.0).abs() > Self::TOLERANCE {
                return Err(RatingError::InvalidMethodology(format!(
                    "{label} composite weights sum to {sum}, expected 1"
                )));
            }
            if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
                return Err(RatingError::InvalidMethodology(format!(
                    "{label} composite weights must be finite and non-negative"
                )));
            }
        }

        if self.pd_only[Domain::Two.index()] != 0.0 {
            return Err(RatingError::InvalidMethodology(
                "pd_only composite must not weight domain 2".to_string(),
            ));
        }

        Ok(())
    }
}

/// Rules are evaluated in order; the first that matches decides the outcome.
pub fn composite_score(
    domains: &DomainScores,
    pdflag: bool,
    weights: &CompositeWeights,
) -> Option<f64> {
    match (*domains, pdflag) {
        ([None, _, _, _], _) => None,
        ([_, _, None, _], _) => None,
        ([_, _, _, None], _) => None,
        ([_, None, _, _], false) => None,
        ([Some(d1), _, Some(d3), Some(d4)], true) => {
            let w = &weights.pd_only;
            Some(w[0] * d1 + w[2] * d3 + w[3] * d4)
        }
        ([Some(d1), Some(d2), Some(d3), Some(d4)], false) => {
            let w = &weights.standard;
            Some(w[0] * d1 + w[1] * d2 + w[2] * d3 + w[3] * d4)
        }
    }
}
