use super::domain::FacilityId;

/// Failures raised by the calibration and scoring stages.
///
/// Missing measure values are never errors; they propagate as `None`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RatingError {
    #[error("population is empty")]
    EmptyPopulation,
    #[error("measure {measure} has {found} non-missing values, at least {required} required")]
    InsufficientData {
        measure: String,
        found: usize,
        required: usize,
    },
    #[error("measure {measure} has zero variance; standardization is undefined")]
    ZeroVariance { measure: String },
    #[error("measure {measure} contains a non-finite value for facility {provfs}")]
    NonFiniteValue { measure: String, provfs: FacilityId },
    #[error("facility {0} appears more than once in the population")]
    DuplicateFacility(FacilityId),
    #[error("measure {0} is not declared in the methodology")]
    UnknownMeasure(String),
    #[error("invalid methodology: {0}")]
    InvalidMethodology(String),
    #[error("star rank {0} has no facilities; cutoff boundaries are undefined")]
    EmptyStarRank(u8),
    #[error("distribution error: {0}")]
    Distribution(String),
    #[error("percentile {value} for measure {measure} falls outside (0, 100)")]
    PercentileOutOfRange { measure: String, value: f64 },
}
