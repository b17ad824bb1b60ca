use super::DatasetError;
use crate::rating::{AdjustmentFactors, FacilityId, FacilityRecord, MeasureObservation};
use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::str::FromStr;

const PROVFS: &str = "provfs";
const PDFLAG: &str = "pdflag";
const CERT_DATE: &str = "cert_date";
const FACTOR_PREFIX: &str = "factor_";

/// Header lookup for one CSV file.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, DatasetError> {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (normalize_header(name), idx))
            .collect();
        if !index.contains_key(PROVFS) {
            return Err(DatasetError::MissingColumn(PROVFS.to_string()));
        }
        Ok(Self { index })
    }

    /// Lookups go through the same normalization as the header row.
    fn position(&self, column: &str) -> Option<usize> {
        self.index.get(&normalize_header(column)).copied()
    }

    fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    fn cell<'r>(&self, record: &'r StringRecord, column: &str) -> Option<&'r str> {
        let idx = self.position(column)?;
        record.get(idx).filter(|value| !is_missing(value))
    }
}

struct Row<'a> {
    columns: &'a Columns,
    record: &'a StringRecord,
    line: u64,
}

impl Row<'_> {
    fn text(&self, column: &str) -> Option<&str> {
        self.columns.cell(self.record, column)
    }

    fn parse<T: FromStr>(&self, column: &str) -> Result<Option<T>, DatasetError> {
        match self.text(column) {
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| self.invalid(column, raw)),
            None => Ok(None),
        }
    }

    fn flag(&self, column: &str) -> Result<bool, DatasetError> {
        let Some(raw) = self.text(column) else {
            return Ok(false);
        };
        match raw.to_ascii_lowercase().as_str() {
            "0" | "false" | "no" => Ok(false),
            "1" | "true" | "yes" => Ok(true),
            _ => Err(self.invalid(column, raw)),
        }
    }

    fn date(&self, column: &str) -> Result<Option<NaiveDate>, DatasetError> {
        match self.text(column) {
            Some(raw) => parse_date(raw)
                .map(Some)
                .ok_or_else(|| self.invalid(column, raw)),
            None => Ok(None),
        }
    }

    fn provfs(&self) -> Result<FacilityId, DatasetError> {
        self.text(PROVFS)
            .map(FacilityId::from)
            .ok_or_else(|| self.invalid(PROVFS, ""))
    }

    fn invalid(&self, column: &str, value: &str) -> DatasetError {
        DatasetError::InvalidValue {
            line: self.line,
            column: column.to_string(),
            value: value.to_string(),
        }
    }
}

pub(super) fn parse_facilities<R: Read>(
    reader: R,
    measures: &[&str],
) -> Result<Vec<FacilityRecord>, DatasetError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let columns = Columns::from_headers(csv_reader.headers()?)?;

    let mut records = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        let row = Row {
            columns: &columns,
            record: &record,
            line: record.position().map(|pos| pos.line()).unwrap_or_default(),
        };

        let mut facility = FacilityRecord::new(row.provfs()?.0, row.flag(PDFLAG)?);
        facility.certification_date = row.date(CERT_DATE)?;

        for &measure in measures {
            if !columns.contains(measure) {
                continue;
            }
            let observation = MeasureObservation {
                value: row.parse::<f64>(measure)?,
                patient_count: row.parse::<u32>(&format!("{measure}_pts"))?,
                eligibility: row.parse::<f64>(&format!("{measure}_elig"))?,
            };
            facility.measures.insert(measure.to_string(), observation);
        }

        records.push(facility);
    }

    Ok(records)
}

pub(super) fn parse_factors<R: Read>(
    reader: R,
    measures: &[String],
) -> Result<Vec<AdjustmentFactors>, DatasetError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let columns = Columns::from_headers(csv_reader.headers()?)?;

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        let row = Row {
            columns: &columns,
            record: &record,
            line: record.position().map(|pos| pos.line()).unwrap_or_default(),
        };

        let mut factors = BTreeMap::new();
        for measure in measures {
            if let Some(factor) = row.parse::<f64>(&format!("{FACTOR_PREFIX}{measure}"))? {
                factors.insert(measure.clone(), factor);
            }
        }

        rows.push(AdjustmentFactors {
            provfs: row.provfs()?,
            factors,
        });
    }

    Ok(rows)
}

fn normalize_header(value: &str) -> String {
    value.replace('\u{feff}', "").trim().to_ascii_lowercase()
}

fn is_missing(value: &str) -> bool {
    matches!(value.trim(), "" | "." | "NA")
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%m/%d/%Y"))
        .ok()
}
