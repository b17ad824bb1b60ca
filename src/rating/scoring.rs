//! Stages shared by the calibration and current-period runs: input
//! preparation before normalization, then domain, composite and star scoring.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::aggregate::{composite_score, domain_score, DomainScores};
use super::availability::AvailabilityCode;
use super::domain::{Domain, FacilityId, FacilityTable, StarRank};
use super::error::RatingError;
use super::methodology::RatingMethodology;
use super::stars::{assign_star_ranks, star_cutoffs, StarCutoffs, StarThresholds};

pub(crate) type Columns = BTreeMap<String, Vec<Option<f64>>>;

/// Output row of a scoring run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFacility {
    pub provfs: FacilityId,
    pub pdflag: bool,
    pub availability: BTreeMap<String, AvailabilityCode>,
    /// Coarse percentiles of probit-normalized measures.
    pub percentiles: BTreeMap<String, Option<f64>>,
    /// Standardized score of every measure on the common scale.
    pub normalized: BTreeMap<String, Option<f64>>,
    pub domains: DomainScores,
    pub composite: Option<f64>,
    pub star_rank: Option<StarRank>,
}

impl ScoredFacility {
    pub fn domain(&self, domain: Domain) -> Option<f64> {
        self.domains[domain.index()]
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PreparedRow {
    pub provfs: FacilityId,
    pub pdflag: bool,
    pub availability: BTreeMap<String, AvailabilityCode>,
}

/// Oriented, availability-masked measure columns aligned with `rows`,
/// which are sorted by facility identifier.
#[derive(Debug, Clone)]
pub(crate) struct PreparedTable {
    pub rows: Vec<PreparedRow>,
    pub columns: Columns,
    pub duplicates: Vec<FacilityId>,
    pub non_finite: Vec<(FacilityId, String)>,
}

impl PreparedTable {
    pub fn column(&self, measure: &str) -> &[Option<f64>] {
        self.columns
            .get(measure)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn facility_ids(&self) -> impl Iterator<Item = &FacilityId> {
        self.rows.iter().map(|row| &row.provfs)
    }
}

pub(crate) fn prepare(
    table: &FacilityTable,
    methodology: &RatingMethodology,
) -> Result<PreparedTable, RatingError> {
    if table.is_empty() {
        return Err(RatingError::EmptyPopulation);
    }

    let mut ordered: Vec<_> = table.records.iter().collect();
    ordered.sort_by(|a, b| a.provfs.cmp(&b.provfs));

    let mut seen = BTreeSet::new();
    let mut duplicates = Vec::new();
    ordered.retain(|record| {
        if seen.insert(record.provfs.clone()) {
            true
        } else {
            duplicates.push(record.provfs.clone());
            false
        }
    });

    let mut rows: Vec<PreparedRow> = ordered
        .iter()
        .map(|record| PreparedRow {
            provfs: record.provfs.clone(),
            pdflag: record.pdflag,
            availability: BTreeMap::new(),
        })
        .collect();

    let policy = &methodology.availability;
    let mut columns = Columns::new();
    let mut non_finite = Vec::new();

    for spec in &methodology.measures {
        let mut column = Vec::with_capacity(ordered.len());
        for (record, row) in ordered.iter().zip(rows.iter_mut()) {
            let Some(observation) = record.measures.get(&spec.name) else {
                column.push(None);
                continue;
            };

            let availability =
                policy.classify_observation(spec.availability_key(), record, observation);
            if let Some(code) = availability {
                row.availability.insert(spec.name.clone(), code);
            }

            let value = match observation.value {
                Some(v) if !v.is_finite() => {
                    non_finite.push((record.provfs.clone(), spec.name.clone()));
                    None
                }
                Some(_) if availability.is_some_and(|code| !code.is_available()) => None,
                Some(v) => Some(spec.orientation.apply(v)),
                None => None,
            };
            column.push(value);
        }
        columns.insert(spec.name.clone(), column);
    }

    if !duplicates.is_empty() {
        warn!(count = duplicates.len(), "duplicate facility rows found");
    }

    Ok(PreparedTable {
        rows,
        columns,
        duplicates,
        non_finite,
    })
}

pub(crate) struct Ranked {
    pub facilities: Vec<ScoredFacility>,
    pub stars: Result<(StarThresholds, StarCutoffs), RatingError>,
}

/// Domain, composite and star scoring over normalized columns. Measures with
/// no normalized column are treated as missing for every facility.
pub(crate) fn rank_facilities(
    rows: &[PreparedRow],
    normalized: &Columns,
    percentiles: &Columns,
    methodology: &RatingMethodology,
) -> Ranked {
    let cell = |columns: &Columns, measure: &str, idx: usize| {
        columns
            .get(measure)
            .and_then(|column| column.get(idx).copied().flatten())
    };

    let mut facilities: Vec<ScoredFacility> = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let mut domains: DomainScores = [None; 4];
            for domain in Domain::ordered() {
                let constituents: Vec<Option<f64>> = methodology
                    .layout
                    .members(domain)
                    .iter()
                    .map(|measure| cell(normalized, measure, idx))
                    .collect();
                domains[domain.index()] = domain_score(&constituents);
            }

            ScoredFacility {
                provfs: row.provfs.clone(),
                pdflag: row.pdflag,
                availability: row.availability.clone(),
                percentiles: percentiles
                    .keys()
                    .map(|measure| (measure.clone(), cell(percentiles, measure, idx)))
                    .collect(),
                normalized: methodology
                    .measures
                    .iter()
                    .map(|spec| (spec.name.clone(), cell(normalized, &spec.name, idx)))
                    .collect(),
                domains,
                composite: composite_score(&domains, row.pdflag, &methodology.weights),
                star_rank: None,
            }
        })
        .collect();

    let composites: Vec<Option<f64>> = facilities.iter().map(|f| f.composite).collect();
    let stars = assign_star_ranks(&composites, &methodology.star_quantiles).and_then(
        |(ranks, thresholds)| {
            for (facility, rank) in facilities.iter_mut().zip(ranks) {
                facility.star_rank = rank;
            }
            let cutoffs = star_cutoffs(
                facilities
                    .iter()
                    .filter_map(|f| Some((f.composite?, f.star_rank?))),
            )?;
            Ok((thresholds, cutoffs))
        },
    );

    debug!(
        facilities = facilities.len(),
        scored = composites.iter().flatten().count(),
        "composite scoring complete"
    );

    Ranked { facilities, stars }
}
