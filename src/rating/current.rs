//! Later evaluation periods: frozen baseline limits and truncated moments are
//! reapplied to new raw values so ratings stay comparable across periods.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::baseline::BaselineParameterSet;
use super::domain::{FacilityId, FacilityTable, Normalization};
use super::error::RatingError;
use super::methodology::RatingMethodology;
use super::percentile::percentile_probit;
use super::scoring::{prepare, rank_facilities, Columns, ScoredFacility};
use super::stars::{StarCutoffs, StarThresholds};
use super::stats::moments;
use super::winsorize::FrozenMeasure;

/// Which side of the frozen limits a value was clipped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationFlag {
    Untruncated,
    Lower,
    Upper,
}

impl TruncationFlag {
    pub const fn code(self) -> u8 {
        match self {
            Self::Untruncated => 0,
            Self::Lower => 1,
            Self::Upper => 2,
        }
    }
}

/// Mean and standard deviation used for the first z-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardizationMoments {
    pub mean: f64,
    pub std: f64,
}

impl From<&FrozenMeasure> for StandardizationMoments {
    fn from(frozen: &FrozenMeasure) -> Self {
        Self {
            mean: frozen.mean,
            std: frozen.std,
        }
    }
}

/// Source of the z-score moments for the current period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentSource {
    /// Reuse the frozen baseline mean and standard deviation.
    #[default]
    Baseline,
    /// Standardize against the current period's own moments.
    CurrentPeriod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestandardizedRow {
    pub provfs: FacilityId,
    pub z_score: Option<f64>,
    pub truncated: Option<f64>,
    pub flag: TruncationFlag,
    pub score: Option<f64>,
}

/// Standardize, clip to the frozen limits, then re-standardize with the frozen
/// truncated moments. Output is ordered by facility identifier.
pub fn restandardize(
    measure: &str,
    values: &[(FacilityId, Option<f64>)],
    moments: StandardizationMoments,
    frozen: &FrozenMeasure,
) -> Result<Vec<RestandardizedRow>, RatingError> {
    let degenerate = |std: f64| !(std.is_finite() && std > 0.0);
    if degenerate(moments.std) || degenerate(frozen.truncated_std) {
        return Err(RatingError::ZeroVariance {
            measure: measure.to_string(),
        });
    }

    let limits = frozen.limits();
    let mut rows: Vec<RestandardizedRow> = values
        .iter()
        .map(|(provfs, value)| {
            let z_score = value.map(|v| (v - moments.mean) / moments.std);
            let flag = match z_score {
                Some(z) if z < limits.lower => TruncationFlag::Lower,
                Some(z) if z > limits.upper => TruncationFlag::Upper,
                _ => TruncationFlag::Untruncated,
            };
            let truncated = z_score.map(|z| match flag {
                TruncationFlag::Lower => limits.lower,
                TruncationFlag::Upper => limits.upper,
                TruncationFlag::Untruncated => z,
            });
            RestandardizedRow {
                provfs: provfs.clone(),
                z_score,
                truncated,
                flag,
                score: truncated.map(|t| (t - frozen.truncated_mean) / frozen.truncated_std),
            }
        })
        .collect();

    rows.sort_by(|a, b| a.provfs.cmp(&b.provfs));
    Ok(rows)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPeriodOptions {
    pub moments: MomentSource,
    /// Accept frozen parameters whose calibration hit the iteration cap.
    pub allow_unconverged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DuplicateFacility,
    NonFiniteValue,
    MissingParameters,
    UnconvergedParameters,
    DegenerateMoments,
}

impl SkipReason {
    pub fn summary(&self) -> &'static str {
        match self {
            SkipReason::DuplicateFacility => "facility already scored in this period",
            SkipReason::NonFiniteValue => "raw value is not finite",
            SkipReason::MissingParameters => "no frozen baseline parameters for measure",
            SkipReason::UnconvergedParameters => "frozen parameters did not converge",
            SkipReason::DegenerateMoments => "standardization moments have zero variance",
        }
    }
}

/// Row or measure left out of a current-period run. `provfs` is absent when
/// the whole measure was skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub provfs: Option<FacilityId>,
    pub measure: Option<String>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentPeriodReport {
    pub facilities: Vec<ScoredFacility>,
    pub restandardized: BTreeMap<String, Vec<RestandardizedRow>>,
    pub thresholds: Option<StarThresholds>,
    pub cutoffs: Option<StarCutoffs>,
    /// Why ranks or cutoffs could not be produced, when they are absent.
    pub star_error: Option<RatingError>,
    pub skipped: Vec<SkippedRow>,
}

pub fn score_current_period(
    table: &FacilityTable,
    methodology: &RatingMethodology,
    parameters: &BaselineParameterSet,
    options: CurrentPeriodOptions,
) -> Result<CurrentPeriodReport, RatingError> {
    methodology.validate()?;
    let prepared = prepare(table, methodology)?;

    let mut skipped: Vec<SkippedRow> = prepared
        .duplicates
        .iter()
        .map(|provfs| SkippedRow {
            provfs: Some(provfs.clone()),
            measure: None,
            reason: SkipReason::DuplicateFacility,
        })
        .collect();
    skipped.extend(prepared.non_finite.iter().map(|(provfs, measure)| SkippedRow {
        provfs: Some(provfs.clone()),
        measure: Some(measure.clone()),
        reason: SkipReason::NonFiniteValue,
    }));

    let mut normalized = Columns::new();
    let mut percentiles = Columns::new();
    let mut restandardized = BTreeMap::new();

    for spec in &methodology.measures {
        let column = prepared.column(&spec.name);
        let skip_measure = |reason: SkipReason| SkippedRow {
            provfs: None,
            measure: Some(spec.name.clone()),
            reason,
        };

        match spec.normalization {
            Normalization::Probit => {
                let scores = percentile_probit(&spec.name, column, &methodology.percentile)?;
                percentiles.insert(spec.name.clone(), scores.percentiles);
                normalized.insert(spec.name.clone(), scores.probits);
            }
            Normalization::Winsorized => {
                let Some(frozen) = parameters.get(&spec.name) else {
                    warn!(measure = %spec.name, "no frozen parameters; measure left missing");
                    skipped.push(skip_measure(SkipReason::MissingParameters));
                    continue;
                };
                if !frozen.converged && !options.allow_unconverged {
                    warn!(measure = %spec.name, "frozen parameters are unconverged; measure left missing");
                    skipped.push(skip_measure(SkipReason::UnconvergedParameters));
                    continue;
                }

                let z_moments = match options.moments {
                    MomentSource::Baseline => Some(StandardizationMoments::from(frozen)),
                    MomentSource::CurrentPeriod => {
                        let observed: Vec<f64> = column.iter().flatten().copied().collect();
                        moments(&observed).map(|m| StandardizationMoments {
                            mean: m.mean,
                            std: m.std,
                        })
                    }
                };

                let values: Vec<(FacilityId, Option<f64>)> = prepared
                    .facility_ids()
                    .cloned()
                    .zip(column.iter().copied())
                    .collect();
                let rows = match z_moments.map(|m| restandardize(&spec.name, &values, m, frozen)) {
                    Some(Ok(rows)) => rows,
                    Some(Err(_)) | None => {
                        skipped.push(skip_measure(SkipReason::DegenerateMoments));
                        continue;
                    }
                };

                // Prepared rows are already in facility order, matching `rows`.
                normalized.insert(spec.name.clone(), rows.iter().map(|r| r.score).collect());
                restandardized.insert(spec.name.clone(), rows);
            }
        }
    }

    let ranked = rank_facilities(&prepared.rows, &normalized, &percentiles, methodology);
    let (thresholds, cutoffs, star_error) = match ranked.stars {
        Ok((thresholds, cutoffs)) => (Some(thresholds), Some(cutoffs), None),
        Err(error) => {
            warn!(%error, "star cutoffs unavailable for current period");
            (None, None, Some(error))
        }
    };

    info!(
        facilities = ranked.facilities.len(),
        skipped = skipped.len(),
        "current period scored"
    );

    Ok(CurrentPeriodReport {
        facilities: ranked.facilities,
        restandardized,
        thresholds,
        cutoffs,
        star_error,
        skipped,
    })
}
