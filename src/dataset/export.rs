use super::DatasetError;
use crate::rating::{
    AdjustedRow, Domain, Normalization, RatingMethodology, RestandardizedRow, ScoredFacility,
    StarCutoffs,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Wide output: one row per facility with availability codes, percentiles
/// of probit measures, normalized scores, domain scores, composite and rank.
/// Cutoff columns repeat the same boundaries on every row when present.
pub fn write_scored_facilities<W: Write>(
    writer: W,
    facilities: &[ScoredFacility],
    methodology: &RatingMethodology,
    cutoffs: Option<&StarCutoffs>,
) -> Result<(), DatasetError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec!["provfs".to_string(), "pdflag".to_string()];
    for spec in &methodology.measures {
        header.push(format!("{}_avail", spec.name));
        if spec.normalization == Normalization::Probit {
            header.push(format!("{}_pct", spec.name));
        }
        header.push(format!("{}_z", spec.name));
    }
    header.extend(Domain::ordered().iter().map(|d| d.label().to_string()));
    header.push("final_score".to_string());
    header.push("starrank".to_string());
    if cutoffs.is_some() {
        header.extend((1..=4).map(|k| format!("cutoff_{}_{}", k, k + 1)));
    }
    csv_writer.write_record(&header)?;

    for facility in facilities {
        let mut record = vec![
            facility.provfs.to_string(),
            u8::from(facility.pdflag).to_string(),
        ];
        for spec in &methodology.measures {
            record.push(
                facility
                    .availability
                    .get(&spec.name)
                    .map(|code| code.code().to_string())
                    .unwrap_or_default(),
            );
            if spec.normalization == Normalization::Probit {
                record.push(number(facility.percentiles.get(&spec.name).copied().flatten()));
            }
            record.push(number(facility.normalized.get(&spec.name).copied().flatten()));
        }
        record.extend(facility.domains.iter().map(|domain| number(*domain)));
        record.push(number(facility.composite));
        record.push(
            facility
                .star_rank
                .map(|rank| rank.to_string())
                .unwrap_or_default(),
        );
        if let Some(cutoffs) = cutoffs {
            record.extend(cutoffs.boundaries.iter().map(|b| b.to_string()));
        }
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct RestandardizedCsvRow<'a> {
    measure: &'a str,
    provfs: &'a str,
    z_score: Option<f64>,
    truncated: Option<f64>,
    truncation_flag: u8,
    score: Option<f64>,
}

/// Long output of the current-period re-standardization, measure by measure.
pub fn write_restandardized<W: Write>(
    writer: W,
    restandardized: &BTreeMap<String, Vec<RestandardizedRow>>,
) -> Result<(), DatasetError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for (measure, rows) in restandardized {
        for row in rows {
            csv_writer.serialize(RestandardizedCsvRow {
                measure,
                provfs: &row.provfs.0,
                z_score: row.z_score,
                truncated: row.truncated,
                truncation_flag: row.flag.code(),
                score: row.score,
            })?;
        }
    }
    csv_writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct AdjustedCsvRow<'a> {
    provfs: &'a str,
    measure: &'a str,
    current: Option<f64>,
    factor: Option<f64>,
    adjusted: Option<f64>,
    raw: Option<f64>,
}

pub fn write_adjusted<W: Write>(writer: W, rows: &[AdjustedRow]) -> Result<(), DatasetError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        for (measure, value) in &row.measures {
            csv_writer.serialize(AdjustedCsvRow {
                provfs: &row.provfs.0,
                measure,
                current: value.current,
                factor: value.factor,
                adjusted: value.adjusted,
                raw: value.raw,
            })?;
        }
    }
    csv_writer.flush()?;
    Ok(())
}
