use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::aggregate::{CompositeWeights, DomainLayout};
use super::availability::AvailabilityPolicy;
use super::domain::{MeasureSpec, Normalization, Orientation};
use super::error::RatingError;
use super::percentile::PercentileSettings;
use super::stars::StarQuantiles;
use super::winsorize::WinsorSettings;

/// Everything that stays fixed between the calibration period and later
/// evaluation periods, apart from the frozen parameters themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingMethodology {
    pub measures: Vec<MeasureSpec>,
    pub layout: DomainLayout,
    #[serde(default)]
    pub weights: CompositeWeights,
    #[serde(default)]
    pub winsor: WinsorSettings,
    #[serde(default)]
    pub percentile: PercentileSettings,
    #[serde(default)]
    pub star_quantiles: StarQuantiles,
    #[serde(default)]
    pub availability: AvailabilityPolicy,
    /// Measures multiplied by externally supplied adjustment factors.
    #[serde(default)]
    pub adjusted_measures: Vec<String>,
}

impl RatingMethodology {
    /// Ten-measure layout: five percentage measures winsorized, five ratio
    /// measures probit-normalized.
    pub fn standard() -> Self {
        use Normalization::{Probit, Winsorized};
        use Orientation::{AsIs, ComplementOf100, Negate};

        let measures = vec![
            MeasureSpec::new("star_var1_f", AsIs, Winsorized),
            MeasureSpec::new("star_var2_f", AsIs, Winsorized),
            MeasureSpec::new("star_var3_f", ComplementOf100, Winsorized),
            MeasureSpec::new("star_var4_f", ComplementOf100, Winsorized),
            MeasureSpec::new("star_var5_f", AsIs, Winsorized),
            MeasureSpec::new("star_var6_f", Negate, Probit),
            MeasureSpec::new("star_var7_f", Negate, Probit),
            MeasureSpec::new("star_var8_f", Negate, Probit).with_availability_code("SRR"),
            MeasureSpec::new("star_var9_f", Negate, Probit).with_availability_code("ED"),
            MeasureSpec::new("star_var10_f", AsIs, Probit).with_availability_code("SWR"),
        ];

        let layout = DomainLayout {
            domains: [
                names(&["star_var1_f", "star_var2_f", "star_var3_f", "star_var4_f"]),
                names(&["star_var5_f", "star_var6_f"]),
                names(&["star_var7_f", "star_var8_f"]),
                names(&["star_var9_f", "star_var10_f"]),
            ],
        };

        Self {
            measures,
            layout,
            weights: CompositeWeights::default(),
            winsor: WinsorSettings::default(),
            percentile: PercentileSettings::default(),
            star_quantiles: StarQuantiles::default(),
            availability: AvailabilityPolicy::default(),
            adjusted_measures: names(&[
                "star_var1_f",
                "star_var2_f",
                "star_var3_f",
                "star_var4_f",
                "star_var5_f",
            ]),
        }
    }

    pub fn measure(&self, name: &str) -> Option<&MeasureSpec> {
        self.measures.iter().find(|spec| spec.name == name)
    }

    pub fn winsorized_measures(&self) -> impl Iterator<Item = &MeasureSpec> {
        self.measures
            .iter()
            .filter(|spec| spec.normalization == Normalization::Winsorized)
    }

    pub fn validate(&self) -> Result<(), RatingError> {
        let mut declared = BTreeSet::new();
        for spec in &self.measures {
            if !declared.insert(spec.name.as_str()) {
                return Err(RatingError::InvalidMethodology(format!(
                    "measure {} declared twice",
                    spec.name
                )));
            }
        }

        let mut assigned = BTreeSet::new();
        for (idx, members) in self.layout.domains.iter().enumerate() {
            if members.is_empty() {
                return Err(RatingError::InvalidMethodology(format!(
                    "domain {} has no measures",
                    idx + 1
                )));
            }
            for member in members {
                if !declared.contains(member.as_str()) {
                    return Err(RatingError::UnknownMeasure(member.clone()));
                }
                if !assigned.insert(member.as_str()) {
                    return Err(RatingError::InvalidMethodology(format!(
                        "measure {member} assigned to more than one domain"
                    )));
                }
            }
        }

        if let Some(unknown) = self
            .adjusted_measures
            .iter()
            .find(|name| !declared.contains(name.as_str()))
        {
            return Err(RatingError::UnknownMeasure(unknown.clone()));
        }

        let winsor = &self.winsor;
        if !(winsor.threshold > 0.0 && winsor.step > 0.0 && winsor.max_iterations > 0) {
            return Err(RatingError::InvalidMethodology(
                "winsorization threshold, step and iteration cap must be positive".to_string(),
            ));
        }
        if self.percentile.buckets < 2 {
            return Err(RatingError::InvalidMethodology(
                "percentile buckets must be at least 2".to_string(),
            ));
        }

        self.weights.validate()?;
        self.star_quantiles.validate()
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|name| name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_methodology_is_valid() {
        let methodology = RatingMethodology::standard();
        methodology.validate().expect("standard layout validates");
        assert_eq!(methodology.winsorized_measures().count(), 5);
        assert_eq!(
            methodology.measure("star_var3_f").map(|m| m.orientation),
            Some(Orientation::ComplementOf100)
        );
        let policy = &methodology.availability;
        let keys: Vec<&str> = methodology
            .measures
            .iter()
            .map(MeasureSpec::availability_key)
            .collect();
        assert!(policy
            .zero_patient_exempt
            .iter()
            .all(|code| keys.contains(&code.as_str())));
        assert!(keys.contains(&policy.survey_measure.as_str()));
    }

    #[test]
    fn layout_cannot_reference_undeclared_measures() {
        let mut methodology = RatingMethodology::standard();
        methodology.layout.domains[2].push("unknown".to_string());
        assert_eq!(
            methodology.validate(),
            Err(RatingError::UnknownMeasure("unknown".to_string()))
        );
    }

    #[test]
    fn measure_cannot_sit_in_two_domains() {
        let mut methodology = RatingMethodology::standard();
        methodology.layout.domains[3].push("star_var1_f".to_string());
        assert!(matches!(
            methodology.validate(),
            Err(RatingError::InvalidMethodology(_))
        ));
    }

    #[test]
    fn methodology_round_trips_through_json() {
        let methodology = RatingMethodology::standard();
        let json = serde_json::to_string(&methodology).expect("serializes");
        let parsed: RatingMethodology = serde_json::from_str(&json).expect("parses");
        assert_eq!(parsed, methodology);
    }
}
