use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{FacilityRecord, MeasureObservation};

/// Scorability status of one measure for one facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityCode {
    Available,
    /// No eligible patients on a measure that is not exempt.
    ZeroPatients,
    /// Population, recency or volume exclusion.
    Excluded,
}

impl AvailabilityCode {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Available => "001",
            Self::ZeroPatients => "998",
            Self::Excluded => "999",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::ZeroPatients | Self::Excluded => "Not Available",
        }
    }

    pub const fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Inputs for a single classification.
#[derive(Debug, Clone, Copy)]
pub struct AvailabilityInput<'a> {
    pub measure: &'a str,
    pub certification_date: Option<NaiveDate>,
    pub eligibility: f64,
    pub patient_count: u32,
    pub pd_only: bool,
}

/// Thresholds that decide whether a measure is reportable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityPolicy {
    /// Facilities certified on or after this date are held to the volume
    /// minimum before any other rule applies.
    #[serde(default)]
    pub recency_cutoff: Option<NaiveDate>,
    pub default_eligibility_minimum: f64,
    #[serde(default)]
    pub eligibility_minimum: BTreeMap<String, f64>,
    pub zero_patient_exempt: Vec<String>,
    pub survey_measure: String,
    pub survey_min_patients: u32,
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        Self {
            recency_cutoff: None,
            default_eligibility_minimum: 11.0,
            eligibility_minimum: BTreeMap::new(),
            zero_patient_exempt: vec!["SRR".to_string(), "ED".to_string()],
            survey_measure: "SWR".to_string(),
            survey_min_patients: 11,
        }
    }
}

impl AvailabilityPolicy {
    pub fn eligibility_minimum_for(&self, measure: &str) -> f64 {
        self.eligibility_minimum
            .get(measure)
            .copied()
            .unwrap_or(self.default_eligibility_minimum)
    }

    /// First matching rule wins.
    pub fn classify(&self, input: &AvailabilityInput<'_>) -> AvailabilityCode {
        let minimum = self.eligibility_minimum_for(input.measure);
        let below_minimum = input.eligibility < minimum;

        // Rule 1 only binds facilities that are not PD-only.
        let recently_certified = match (self.recency_cutoff, input.certification_date) {
            (Some(cutoff), Some(certified)) => certified >= cutoff,
            _ => false,
        };
        if !input.pd_only && recently_certified && below_minimum {
            return AvailabilityCode::Excluded;
        }

        if input.patient_count == 0
            && !self
                .zero_patient_exempt
                .iter()
                .any(|exempt| exempt == input.measure)
        {
            return AvailabilityCode::ZeroPatients;
        }

        if below_minimum
            || (input.measure == self.survey_measure
                && input.patient_count < self.survey_min_patients)
        {
            return AvailabilityCode::Excluded;
        }

        AvailabilityCode::Available
    }

    /// Classifies an observation when both the patient count and the
    /// eligibility metric were supplied; otherwise the measure is unclassified.
    pub fn classify_observation(
        &self,
        measure: &str,
        record: &FacilityRecord,
        observation: &MeasureObservation,
    ) -> Option<AvailabilityCode> {
        let patient_count = observation.patient_count?;
        let eligibility = observation.eligibility?;
        Some(self.classify(&AvailabilityInput {
            measure,
            certification_date: record.certification_date,
            eligibility,
            patient_count,
            pd_only: record.pdflag,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AvailabilityPolicy {
        AvailabilityPolicy {
            recency_cutoff: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..AvailabilityPolicy::default()
        }
    }

    fn input(measure: &str) -> AvailabilityInput<'_> {
        AvailabilityInput {
            measure,
            certification_date: NaiveDate::from_ymd_opt(2020, 6, 1),
            eligibility: 40.0,
            patient_count: 25,
            pd_only: false,
        }
    }

    #[test]
    fn zero_patients_on_non_exempt_measure_is_998() {
        let code = policy().classify(&AvailabilityInput {
            patient_count: 0,
            ..input("STrR")
        });
        assert_eq!(code, AvailabilityCode::ZeroPatients);
        assert_eq!(code.code(), "998");
        assert_eq!(code.label(), "Not Available");
    }

    #[test]
    fn exempt_measures_skip_zero_patient_rule() {
        let code = policy().classify(&AvailabilityInput {
            patient_count: 0,
            ..input("SRR")
        });
        assert_eq!(code, AvailabilityCode::Available);
    }

    #[test]
    fn recent_certification_below_minimum_excludes_before_zero_patient_rule() {
        let code = policy().classify(&AvailabilityInput {
            certification_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            eligibility: 5.0,
            patient_count: 0,
            ..input("STrR")
        });
        assert_eq!(code, AvailabilityCode::Excluded);
    }

    #[test]
    fn pd_only_facilities_fall_through_recency_rule() {
        let code = policy().classify(&AvailabilityInput {
            certification_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            eligibility: 5.0,
            patient_count: 0,
            pd_only: true,
            ..input("STrR")
        });
        assert_eq!(code, AvailabilityCode::ZeroPatients);
    }

    #[test]
    fn pd_only_facility_with_patients_is_excluded_below_minimum() {
        let code = policy().classify(&AvailabilityInput {
            certification_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            eligibility: 5.0,
            patient_count: 25,
            pd_only: true,
            ..input("STrR")
        });
        assert_eq!(code, AvailabilityCode::Excluded);
    }

    #[test]
    fn older_facility_below_minimum_is_excluded_after_zero_patient_rule() {
        let older = AvailabilityInput {
            eligibility: 5.0,
            ..input("STrR")
        };
        assert_eq!(policy().classify(&older), AvailabilityCode::Excluded);

        let empty = AvailabilityInput {
            patient_count: 0,
            ..older
        };
        assert_eq!(policy().classify(&empty), AvailabilityCode::ZeroPatients);
    }

    #[test]
    fn survey_measure_requires_minimum_respondents() {
        let code = policy().classify(&AvailabilityInput {
            patient_count: 10,
            ..input("SWR")
        });
        assert_eq!(code, AvailabilityCode::Excluded);

        let code = policy().classify(&AvailabilityInput {
            patient_count: 11,
            ..input("SWR")
        });
        assert_eq!(code.code(), "001");
    }

    #[test]
    fn unclassified_without_patient_count() {
        let record = FacilityRecord::new("012345", false);
        let observation = MeasureObservation {
            value: Some(1.0),
            patient_count: None,
            eligibility: Some(20.0),
        };
        assert!(policy()
            .classify_observation("STrR", &record, &observation)
            .is_none());
    }
}
