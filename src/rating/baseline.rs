//! Calibration run: scores the baseline population and freezes the
//! winsorization parameters for later evaluation periods.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{FacilityTable, Normalization};
use super::error::RatingError;
use super::methodology::RatingMethodology;
use super::percentile::{percentile_probit, ProbitScores};
use super::scoring::{prepare, rank_facilities, Columns, ScoredFacility};
use super::stars::{StarCutoffs, StarThresholds};
use super::winsorize::{winsorize, FrozenMeasure, Winsorized};

/// Frozen per-measure parameters, persisted verbatim between periods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineParameterSet {
    pub measures: BTreeMap<String, FrozenMeasure>,
}

impl BaselineParameterSet {
    pub fn get(&self, measure: &str) -> Option<&FrozenMeasure> {
        self.measures.get(measure)
    }

    pub fn unconverged(&self) -> impl Iterator<Item = &str> {
        self.measures
            .iter()
            .filter(|(_, frozen)| !frozen.converged)
            .map(|(name, _)| name.as_str())
    }
}

/// A measure whose calibration failed; its normalized column is missing
/// for every facility.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureFailure {
    pub measure: String,
    pub error: RatingError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReport {
    /// Sorted by facility identifier.
    pub facilities: Vec<ScoredFacility>,
    pub parameters: BaselineParameterSet,
    pub thresholds: StarThresholds,
    pub cutoffs: StarCutoffs,
    pub failures: Vec<MeasureFailure>,
}

enum MeasureOutput {
    Winsorized(Winsorized),
    Probit(ProbitScores),
}

pub fn calibrate(
    table: &FacilityTable,
    methodology: &RatingMethodology,
) -> Result<CalibrationReport, RatingError> {
    methodology.validate()?;
    let prepared = prepare(table, methodology)?;
    if let Some(duplicate) = prepared.duplicates.first() {
        return Err(RatingError::DuplicateFacility(duplicate.clone()));
    }

    info!(
        facilities = prepared.rows.len(),
        measures = methodology.measures.len(),
        "calibrating baseline period"
    );

    let outputs: Vec<(String, Result<MeasureOutput, RatingError>)> = methodology
        .measures
        .par_iter()
        .map(|spec| {
            let column = prepared.column(&spec.name);
            let invalid = prepared
                .non_finite
                .iter()
                .find(|(_, measure)| *measure == spec.name);
            let output = match (invalid, spec.normalization) {
                (Some((provfs, _)), _) => Err(RatingError::NonFiniteValue {
                    measure: spec.name.clone(),
                    provfs: provfs.clone(),
                }),
                (None, Normalization::Winsorized) => {
                    winsorize(&spec.name, column, &methodology.winsor).map(MeasureOutput::Winsorized)
                }
                (None, Normalization::Probit) => {
                    percentile_probit(&spec.name, column, &methodology.percentile)
                        .map(MeasureOutput::Probit)
                }
            };
            (spec.name.clone(), output)
        })
        .collect();

    let mut normalized = Columns::new();
    let mut percentiles = Columns::new();
    let mut parameters = BaselineParameterSet::default();
    let mut failures = Vec::new();

    for (measure, output) in outputs {
        match output {
            Ok(MeasureOutput::Winsorized(result)) => {
                if !result.parameters.converged {
                    warn!(
                        measure = %measure,
                        iterations = result.parameters.iterations,
                        upper = result.parameters.upper_limit,
                        lower = result.parameters.lower_limit,
                        "winsorization hit the iteration cap without converging"
                    );
                }
                parameters.measures.insert(measure.clone(), result.parameters);
                normalized.insert(measure, result.scores);
            }
            Ok(MeasureOutput::Probit(result)) => {
                percentiles.insert(measure.clone(), result.percentiles);
                normalized.insert(measure, result.probits);
            }
            Err(error) => {
                warn!(measure = %measure, %error, "measure calibration failed");
                failures.push(MeasureFailure { measure, error });
            }
        }
    }

    let ranked = rank_facilities(&prepared.rows, &normalized, &percentiles, methodology);
    let (thresholds, cutoffs) = ranked.stars?;

    info!(
        boundaries = ?cutoffs.boundaries,
        failures = failures.len(),
        "baseline calibration complete"
    );

    Ok(CalibrationReport {
        facilities: ranked.facilities,
        parameters,
        thresholds,
        cutoffs,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::domain::{FacilityRecord, MeasureObservation};

    fn population(size: usize) -> FacilityTable {
        let records = (0..size)
            .map(|i| {
                let x = i as f64;
                let mut record = FacilityRecord::new(format!("{:06}", 100 + i), i % 7 == 0);
                for (slot, spec) in RatingMethodology::standard().measures.iter().enumerate() {
                    let value = ((x + 1.0) * (slot as f64 + 3.0)).sin() * 10.0 + x * 0.5;
                    record = record.with_value(&spec.name, Some(value));
                }
                record
            })
            .collect();
        FacilityTable::new(records)
    }

    #[test]
    fn calibration_freezes_only_winsorized_measures() {
        let report =
            calibrate(&population(60), &RatingMethodology::standard()).expect("calibrates");

        assert!(report.failures.is_empty());
        assert_eq!(report.parameters.measures.len(), 5);
        assert!(report.parameters.get("star_var6_f").is_none());
        assert!(report.parameters.unconverged().next().is_none());
        assert_eq!(report.facilities.len(), 60);
        assert!(report
            .facilities
            .windows(2)
            .all(|pair| pair[0].provfs < pair[1].provfs));

        let b = report.cutoffs.boundaries;
        assert!(b[0] < b[1] && b[1] < b[2] && b[2] < b[3]);
    }

    #[test]
    fn flat_measure_fails_alone() {
        let mut table = population(40);
        for record in &mut table.records {
            record
                .measures
                .insert("star_var2_f".to_string(), MeasureObservation::value(55.0));
        }

        let report = calibrate(&table, &RatingMethodology::standard()).expect("calibrates");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].error,
            RatingError::ZeroVariance {
                measure: "star_var2_f".to_string()
            }
        );
        assert!(report
            .facilities
            .iter()
            .all(|f| f.normalized.get("star_var2_f") == Some(&None)));
        assert!(report.facilities.iter().any(|f| f.composite.is_some()));
    }

    #[test]
    fn duplicate_facilities_abort_calibration() {
        let mut table = population(20);
        let copy = table.records[3].clone();
        table.records.push(copy);
        assert!(matches!(
            calibrate(&table, &RatingMethodology::standard()),
            Err(RatingError::DuplicateFacility(_))
        ));
    }
}
