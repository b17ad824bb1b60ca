//! Iterative winsorization of percentage measures.
//!
//! The z-scored series is clipped to a pair of limits, re-standardized with the
//! clipped moments, and the limits are pulled in by a fixed step until the
//! re-standardized series fits inside `±threshold`. The raw moments, the final
//! limits and the clipped moments are frozen for later evaluation periods.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::RatingError;
use super::stats::{moments, Moments};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinsorSettings {
    pub threshold: f64,
    pub step: f64,
    pub max_iterations: u32,
}

impl Default for WinsorSettings {
    fn default() -> Self {
        Self {
            threshold: 2.58,
            step: 0.001,
            max_iterations: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruncationLimits {
    pub upper: f64,
    pub lower: f64,
}

impl TruncationLimits {
    pub fn symmetric(threshold: f64) -> Self {
        Self {
            upper: threshold,
            lower: -threshold,
        }
    }

    /// Upper limit is checked first so crossed limits still resolve deterministically.
    pub fn clip(self, value: f64) -> f64 {
        if value > self.upper {
            self.upper
        } else if value < self.lower {
            self.lower
        } else {
            value
        }
    }
}

/// Frozen calibration output for one measure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrozenMeasure {
    pub mean: f64,
    pub std: f64,
    pub upper_limit: f64,
    pub lower_limit: f64,
    pub truncated_mean: f64,
    pub truncated_std: f64,
    pub converged: bool,
    pub iterations: u32,
}

impl FrozenMeasure {
    pub fn limits(&self) -> TruncationLimits {
        TruncationLimits {
            upper: self.upper_limit,
            lower: self.lower_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Convergence {
    Converged {
        iterations: u32,
        limits: TruncationLimits,
    },
    MaxIterationsExceeded {
        last_limits: TruncationLimits,
    },
}

impl Convergence {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Winsorized {
    /// Re-standardized scores aligned with the input column.
    pub scores: Vec<Option<f64>>,
    pub parameters: FrozenMeasure,
    pub convergence: Convergence,
}

pub fn winsorize(
    measure: &str,
    column: &[Option<f64>],
    settings: &WinsorSettings,
) -> Result<Winsorized, RatingError> {
    let observed: Vec<f64> = column.iter().flatten().copied().collect();
    let raw = standardizable_moments(measure, &observed)?;
    let z: Vec<f64> = observed.iter().map(|v| (v - raw.mean) / raw.std).collect();

    let threshold = settings.threshold;
    let mut upper_steps: u32 = 0;
    let mut lower_steps: u32 = 0;
    let mut iteration: u32 = 0;

    loop {
        iteration += 1;
        let limits = TruncationLimits {
            upper: threshold - settings.step * f64::from(upper_steps),
            lower: -threshold + settings.step * f64::from(lower_steps),
        };

        let clipped: Vec<f64> = z.iter().map(|v| limits.clip(*v)).collect();
        let truncated = standardizable_moments(measure, &clipped)?;
        let rescaled: Vec<f64> = clipped
            .iter()
            .map(|v| (v - truncated.mean) / truncated.std)
            .collect();

        let max = rescaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = rescaled.iter().copied().fold(f64::INFINITY, f64::min);
        let converged = max <= threshold && min >= -threshold;

        if converged || iteration >= settings.max_iterations {
            let convergence = if converged {
                debug!(
                    measure,
                    iteration,
                    upper = limits.upper,
                    lower = limits.lower,
                    "winsorization converged"
                );
                Convergence::Converged {
                    iterations: iteration,
                    limits,
                }
            } else {
                Convergence::MaxIterationsExceeded {
                    last_limits: limits,
                }
            };

            return Ok(Winsorized {
                scores: realign(column, &rescaled),
                parameters: FrozenMeasure {
                    mean: raw.mean,
                    std: raw.std,
                    upper_limit: limits.upper,
                    lower_limit: limits.lower,
                    truncated_mean: truncated.mean,
                    truncated_std: truncated.std,
                    converged,
                    iterations: iteration,
                },
                convergence,
            });
        }

        if max > threshold {
            upper_steps += 1;
        }
        if min < -threshold {
            lower_steps += 1;
        }
    }
}

fn standardizable_moments(measure: &str, values: &[f64]) -> Result<Moments, RatingError> {
    let m = moments(values).ok_or_else(|| RatingError::InsufficientData {
        measure: measure.to_string(),
        found: values.len(),
        required: 2,
    })?;

    if !(m.std.is_finite() && m.std > 0.0) {
        return Err(RatingError::ZeroVariance {
            measure: measure.to_string(),
        });
    }

    Ok(m)
}

fn realign(column: &[Option<f64>], observed: &[f64]) -> Vec<Option<f64>> {
    let mut values = observed.iter().copied();
    column
        .iter()
        .map(|cell| cell.and_then(|_| values.next()))
        .collect()
}
