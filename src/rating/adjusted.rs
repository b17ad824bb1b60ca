use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::current::CurrentPeriodReport;
use super::domain::FacilityId;

/// Externally derived multiplicative factors for one facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentFactors {
    pub provfs: FacilityId,
    pub factors: BTreeMap<String, f64>,
}

/// Current-period standardized measure values for one facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedMeasures {
    pub provfs: FacilityId,
    pub values: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustedMeasure {
    pub current: Option<f64>,
    pub factor: Option<f64>,
    pub adjusted: Option<f64>,
    /// Same value as `adjusted`; downstream consumers read it under this name.
    pub raw: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedRow {
    pub provfs: FacilityId,
    pub measures: BTreeMap<String, AdjustedMeasure>,
}

impl CurrentPeriodReport {
    /// Standardized values of the given measures, one entry per facility.
    pub fn standardized_measures(&self, measures: &[String]) -> Vec<StandardizedMeasures> {
        self.facilities
            .iter()
            .map(|facility| StandardizedMeasures {
                provfs: facility.provfs.clone(),
                values: measures
                    .iter()
                    .map(|name| {
                        let value = facility.normalized.get(name).copied().flatten();
                        (name.clone(), value)
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Inner join on facility identifier; each measure value is multiplied by
/// its matching factor. Output is ordered by facility identifier.
pub fn calculate_adjusted_measures(
    factors: &[AdjustmentFactors],
    current: &[StandardizedMeasures],
    measures: &[String],
) -> Vec<AdjustedRow> {
    let mut by_facility: BTreeMap<&FacilityId, &AdjustmentFactors> = BTreeMap::new();
    for row in factors {
        if by_facility.insert(&row.provfs, row).is_some() {
            warn!(provfs = %row.provfs, "duplicate adjustment factor row; keeping the last");
        }
    }

    let mut joined = BTreeSet::new();
    let mut rows: Vec<AdjustedRow> = current
        .iter()
        .filter_map(|standardized| {
            let factor_row = by_facility.get(&standardized.provfs)?;
            if !joined.insert(&standardized.provfs) {
                return None;
            }

            let measures = measures
                .iter()
                .map(|name| {
                    let current = standardized.values.get(name).copied().flatten();
                    let factor = factor_row.factors.get(name).copied();
                    let adjusted = current.zip(factor).map(|(value, factor)| value * factor);
                    (
                        name.clone(),
                        AdjustedMeasure {
                            current,
                            factor,
                            adjusted,
                            raw: adjusted,
                        },
                    )
                })
                .collect();

            Some(AdjustedRow {
                provfs: standardized.provfs.clone(),
                measures,
            })
        })
        .collect();

    rows.sort_by(|a, b| a.provfs.cmp(&b.provfs));
    debug!(
        factors = factors.len(),
        current = current.len(),
        joined = rows.len(),
        "adjusted measures calculated"
    );
    rows
}
