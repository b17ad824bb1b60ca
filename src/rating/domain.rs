use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Facility identifier (`provfs`), stable across evaluation periods.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FacilityId(pub String);

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FacilityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Raw value of one measure for one facility plus the inputs used to decide
/// whether the measure is scorable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasureObservation {
    pub value: Option<f64>,
    pub patient_count: Option<u32>,
    /// Volume metric compared against the policy's eligibility minimum.
    pub eligibility: Option<f64>,
}

impl MeasureObservation {
    pub fn value(value: f64) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

}

/// One facility snapshot for a single period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub provfs: FacilityId,
    /// Alternate (PD-only) population whose composite omits domain 2.
    pub pdflag: bool,
    pub certification_date: Option<NaiveDate>,
    pub measures: BTreeMap<String, MeasureObservation>,
}

impl FacilityRecord {
    pub fn new(provfs: impl Into<String>, pdflag: bool) -> Self {
        Self {
            provfs: FacilityId(provfs.into()),
            pdflag,
            certification_date: None,
            measures: BTreeMap::new(),
        }
    }

    pub fn with_measure(mut self, name: &str, observation: MeasureObservation) -> Self {
        self.measures.insert(name.to_string(), observation);
        self
    }

    pub fn with_value(self, name: &str, value: Option<f64>) -> Self {
        self.with_measure(
            name,
            MeasureObservation {
                value,
                ..MeasureObservation::default()
            },
        )
    }

    pub fn with_certification_date(mut self, date: NaiveDate) -> Self {
        self.certification_date = Some(date);
        self
    }

    pub fn measure_value(&self, name: &str) -> Option<f64> {
        self.measures.get(name).and_then(|obs| obs.value)
    }
}

/// Input population for one scoring run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacilityTable {
    pub records: Vec<FacilityRecord>,
}

impl FacilityTable {
    pub fn new(records: Vec<FacilityRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column view of one measure, aligned with `records`.
    pub fn column(&self, measure: &str) -> Vec<Option<f64>> {
        self.records
            .iter()
            .map(|record| record.measure_value(measure))
            .collect()
    }
}

/// Sign convention applied once so that higher values always mean better care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    AsIs,
    ComplementOf100,
    Negate,
}

impl Orientation {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::AsIs => value,
            Self::ComplementOf100 => 100.0 - value,
            Self::Negate => -value,
        }
    }
}

/// How a measure is brought onto the common standardized scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Percentage measures: iterative winsorization with frozen parameters.
    Winsorized,
    /// Skewed ratio measures: coarse percentile rank then inverse-normal.
    Probit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureSpec {
    pub name: String,
    pub orientation: Orientation,
    pub normalization: Normalization,
    /// Clinical code the availability policy knows the measure by (`SRR`, `ED`, `SWR`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_code: Option<String>,
}

impl MeasureSpec {
    pub fn new(name: &str, orientation: Orientation, normalization: Normalization) -> Self {
        Self {
            name: name.to_string(),
            orientation,
            normalization,
            availability_code: None,
        }
    }

    pub fn with_availability_code(mut self, code: &str) -> Self {
        self.availability_code = Some(code.to_string());
        self
    }

    /// Key used for exemption and survey lookups; falls back to the column name.
    pub fn availability_key(&self) -> &str {
        self.availability_code.as_deref().unwrap_or(&self.name)
    }
}

/// The four quality domains, in composite order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    One,
    Two,
    Three,
    Four,
}

impl Domain {
    pub const fn ordered() -> [Self; 4] {
        [Self::One, Self::Two, Self::Three, Self::Four]
    }

    pub const fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
            Self::Three => 2,
            Self::Four => 3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::One => "factor1",
            Self::Two => "factor2",
            Self::Three => "factor3",
            Self::Four => "factor4",
        }
    }
}

/// Discrete 1..=5 star category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StarRank(u8);

impl StarRank {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for StarRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_flips_to_higher_is_better() {
        assert_eq!(Orientation::ComplementOf100.apply(12.5), 87.5);
        assert_eq!(Orientation::Negate.apply(1.3), -1.3);
        assert_eq!(Orientation::AsIs.apply(4.0), 4.0);
    }

    #[test]
    fn star_rank_rejects_out_of_range_values() {
        assert!(StarRank::new(0).is_none());
        assert!(StarRank::new(6).is_none());
        assert_eq!(StarRank::new(3).map(StarRank::get), Some(3));
    }

    #[test]
    fn column_keeps_missing_values_aligned() {
        let table = FacilityTable::new(vec![
            FacilityRecord::new("012345", false).with_value("m", Some(1.0)),
            FacilityRecord::new("012346", false),
            FacilityRecord::new("012347", false).with_value("m", None),
        ]);
        assert_eq!(table.column("m"), vec![Some(1.0), None, None]);
    }

    #[test]
    fn availability_key_prefers_the_clinical_code() {
        let plain = MeasureSpec::new("star_var1_f", Orientation::AsIs, Normalization::Winsorized);
        assert_eq!(plain.availability_key(), "star_var1_f");
        let coded = plain.with_availability_code("SWR");
        assert_eq!(coded.availability_key(), "SWR");
    }
}
