//! Composite star rating: baseline calibration and later-period scoring.

mod adjusted;
mod aggregate;
mod availability;
mod baseline;
mod current;
pub mod domain;
mod error;
mod methodology;
mod percentile;
mod scoring;
mod stars;
mod stats;
mod winsorize;

pub use adjusted::{
    calculate_adjusted_measures, AdjustedMeasure, AdjustedRow, AdjustmentFactors,
    StandardizedMeasures,
};
pub use aggregate::{composite_score, domain_score, CompositeWeights, DomainLayout, DomainScores};
pub use availability::{AvailabilityCode, AvailabilityInput, AvailabilityPolicy};
pub use baseline::{calibrate, BaselineParameterSet, CalibrationReport, MeasureFailure};
pub use current::{
    restandardize, score_current_period, CurrentPeriodOptions, CurrentPeriodReport,
    MomentSource, RestandardizedRow, SkipReason, SkippedRow, StandardizationMoments,
    TruncationFlag,
};
pub use domain::{
    Domain, FacilityId, FacilityRecord, FacilityTable, MeasureObservation, MeasureSpec,
    Normalization, Orientation, StarRank,
};
pub use error::RatingError;
pub use methodology::RatingMethodology;
pub use percentile::{average_ranks, percentile_probit, probit, PercentileSettings, ProbitScores};
pub use scoring::ScoredFacility;
pub use stars::{
    assign_star_ranks, star_cutoffs, star_thresholds, StarCutoffs, StarQuantiles, StarThresholds,
};
pub use winsorize::{
    winsorize, Convergence, FrozenMeasure, TruncationLimits, WinsorSettings, Winsorized,
};
