//! CSV and JSON files exchanged with the rating pipeline.

mod export;
mod parser;

pub use export::{write_adjusted, write_restandardized, write_scored_facilities};

use crate::rating::{AdjustmentFactors, BaselineParameterSet, FacilityTable, RatingMethodology};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug)]
pub enum DatasetError {
    Io(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
    MissingColumn(String),
    InvalidValue {
        line: u64,
        column: String,
        value: String,
    },
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetError::Io(err) => write!(f, "failed to access dataset: {}", err),
            DatasetError::Csv(err) => write!(f, "invalid CSV data: {}", err),
            DatasetError::Json(err) => write!(f, "invalid JSON document: {}", err),
            DatasetError::MissingColumn(column) => {
                write!(f, "required column '{}' is missing", column)
            }
            DatasetError::InvalidValue {
                line,
                column,
                value,
            } => write!(
                f,
                "line {}: column '{}' has unparseable value '{}'",
                line, column, value
            ),
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatasetError::Io(err) => Some(err),
            DatasetError::Csv(err) => Some(err),
            DatasetError::Json(err) => Some(err),
            DatasetError::MissingColumn(_) | DatasetError::InvalidValue { .. } => None,
        }
    }
}

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for DatasetError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

/// Reads wide facility tables: `provfs`, optional `pdflag` and `cert_date`,
/// then `<measure>`, `<measure>_pts` and `<measure>_elig` per declared measure.
pub struct FacilityTableImporter;

impl FacilityTableImporter {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        methodology: &RatingMethodology,
    ) -> Result<FacilityTable, DatasetError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, methodology)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        methodology: &RatingMethodology,
    ) -> Result<FacilityTable, DatasetError> {
        let measures: Vec<&str> = methodology.measures.iter().map(|m| m.name.as_str()).collect();
        parser::parse_facilities(reader, &measures).map(FacilityTable::new)
    }
}

/// Reads adjustment-factor tables: `provfs` plus `factor_<measure>` columns.
pub struct AdjustmentFactorImporter;

impl AdjustmentFactorImporter {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        measures: &[String],
    ) -> Result<Vec<AdjustmentFactors>, DatasetError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, measures)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        measures: &[String],
    ) -> Result<Vec<AdjustmentFactors>, DatasetError> {
        parser::parse_factors(reader, measures)
    }
}

pub fn read_parameters<P: AsRef<Path>>(path: P) -> Result<BaselineParameterSet, DatasetError> {
    read_json(path)
}

pub fn write_parameters<P: AsRef<Path>>(
    path: P,
    parameters: &BaselineParameterSet,
) -> Result<(), DatasetError> {
    write_json(path, parameters)
}

pub fn read_methodology<P: AsRef<Path>>(path: P) -> Result<RatingMethodology, DatasetError> {
    read_json(path)
}

pub fn write_methodology<W: Write>(
    writer: W,
    methodology: &RatingMethodology,
) -> Result<(), DatasetError> {
    serde_json::to_writer_pretty(writer, methodology)?;
    Ok(())
}

fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, DatasetError> {
    let file = std::fs::File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

fn write_json<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<(), DatasetError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn importer_reads_declared_measures_only() {
        let csv = "provfs,pdflag,cert_date,star_var1_f,star_var1_f_pts,star_var1_f_elig,other\n\
012345,0,2019-04-01,71.5,30,28.5,9\n\
012346,1,,.,,,9\n";
        let table = FacilityTableImporter::from_reader(
            Cursor::new(csv),
            &RatingMethodology::standard(),
        )
        .expect("imports");

        assert_eq!(table.len(), 2);
        let first = &table.records[0];
        assert!(!first.pdflag);
        assert_eq!(first.measure_value("star_var1_f"), Some(71.5));
        let observation = &first.measures["star_var1_f"];
        assert_eq!(observation.patient_count, Some(30));
        assert_eq!(observation.eligibility, Some(28.5));
        assert!(!first.measures.contains_key("other"));

        let second = &table.records[1];
        assert!(second.pdflag);
        assert!(second.certification_date.is_none());
        assert_eq!(second.measure_value("star_var1_f"), None);
    }

    #[test]
    fn importer_requires_provfs() {
        let csv = "facility,star_var1_f\nA,1\n";
        match FacilityTableImporter::from_reader(Cursor::new(csv), &RatingMethodology::standard())
        {
            Err(DatasetError::MissingColumn(column)) => assert_eq!(column, "provfs"),
            other => panic!("expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn importer_reports_line_of_bad_value() {
        let csv = "provfs,star_var2_f\nA,1.5\nB,abc\n";
        match FacilityTableImporter::from_reader(Cursor::new(csv), &RatingMethodology::standard())
        {
            Err(DatasetError::InvalidValue { line, column, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(column, "star_var2_f");
            }
            other => panic!("expected invalid value, got {other:?}"),
        }
    }

    #[test]
    fn factor_importer_reads_prefixed_columns() {
        let csv = "provfs,factor_star_var1_f,factor_star_var2_f\nA,1.1,\n";
        let measures = vec!["star_var1_f".to_string(), "star_var2_f".to_string()];
        let factors =
            AdjustmentFactorImporter::from_reader(Cursor::new(csv), &measures).expect("imports");
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].factors.get("star_var1_f"), Some(&1.1));
        assert!(!factors[0].factors.contains_key("star_var2_f"));
    }

    #[test]
    fn parameters_from_path_propagates_io_errors() {
        match read_parameters("./does-not-exist.json") {
            Err(DatasetError::Io(_)) => {}
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
