//! Input tables read from CSV files named in the run environment.

use std::path::Path;

use log::{debug, info};

use crate::environment::RunEnvironment;
use crate::error::{Result, SimError};
use crate::lookup::{Bin, LookupTable};
use crate::population::Sex;

pub const INCIDENCE_RATE: &str = "incidence_rate";
pub const PREVALENCE: &str = "prevalence";
pub const CSMR: &str = "csmr";
pub const ACMR: &str = "acmr";
pub const LIFE_EXPECTANCY: &str = "life_expectancy";
pub const DISABILITY_WEIGHT: &str = "disability_weight";
pub const EXPOSURE: &str = "family_history_or_adenoma_exposure";

/// Society-level inputs for one location and draw.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub raw_incidence_rate: LookupTable,
    pub raw_prevalence: LookupTable,
    pub csmr: LookupTable,
    pub acmr: LookupTable,
    pub life_expectancy: LookupTable,
    pub disability_weight: Option<LookupTable>,
    pub exposure: Option<LookupTable>,
}

impl Artifact {
    pub fn load<I>(env: &RunEnvironment<I>, location: &str, draw: u32) -> Result<Self> {
        let required = |key: &str| load_table(env.require_file(key)?, key, location, draw);
        let optional = |key: &str| {
            env.file(key)
                .map(|path| load_table(path, key, location, draw))
                .transpose()
        };
        let artifact = Self {
            raw_incidence_rate: required(INCIDENCE_RATE)?,
            raw_prevalence: required(PREVALENCE)?,
            csmr: required(CSMR)?,
            acmr: required(ACMR)?,
            life_expectancy: required(LIFE_EXPECTANCY)?,
            disability_weight: optional(DISABILITY_WEIGHT)?,
            exposure: optional(EXPOSURE)?,
        };
        info!("Loaded input data for {location}, draw {draw}");
        Ok(artifact)
    }
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

fn parse_field(record: &csv::StringRecord, idx: usize, key: &str) -> Result<f64> {
    let raw = record.get(idx).unwrap_or("").trim();
    raw.parse::<f64>()
        .map_err(|_| SimError::Data(format!("{key}: cannot parse '{raw}' as a number")))
}

/// Reads a table with columns `location?, sex?, age_start, age_end,
/// year_start?, year_end?` plus `draw_<draw>` (or `value`).
pub fn load_table(path: &Path, key: &str, location: &str, draw: u32) -> Result<LookupTable> {
    debug!("Reading {key} from {}", path.display());
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let draw_column = format!("draw_{draw}");
    let value_idx = column(&headers, &draw_column)
        .or_else(|| column(&headers, "value"))
        .ok_or_else(|| {
            SimError::MissingData(format!("{key}: no '{draw_column}' or 'value' column"))
        })?;
    let age_start_idx = column(&headers, "age_start")
        .ok_or_else(|| SimError::MissingData(format!("{key}: no age_start column")))?;
    let age_end_idx = column(&headers, "age_end")
        .ok_or_else(|| SimError::MissingData(format!("{key}: no age_end column")))?;
    let location_idx = column(&headers, "location");
    let sex_idx = column(&headers, "sex");
    let year_idx = match (column(&headers, "year_start"), column(&headers, "year_end")) {
        (Some(start), Some(end)) => Some((start, end)),
        (None, None) => None,
        _ => {
            return Err(SimError::Data(format!(
                "{key}: year_start and year_end must appear together"
            )));
        }
    };

    let mut bins = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if let Some(idx) = location_idx
            && record.get(idx).map(str::trim) != Some(location)
        {
            continue;
        }
        let sex = sex_idx
            .map(|idx| Sex::parse(record.get(idx).unwrap_or("")))
            .transpose()?;
        let (year_start, year_end) = match year_idx {
            Some((start, end)) => (
                Some(parse_field(&record, start, key)?),
                Some(parse_field(&record, end, key)?),
            ),
            None => (None, None),
        };
        bins.push(Bin {
            sex,
            age_start: parse_field(&record, age_start_idx, key)?,
            age_end: parse_field(&record, age_end_idx, key)?,
            year_start,
            year_end,
            value: parse_field(&record, value_idx, key)?,
        });
    }
    if bins.is_empty() {
        return Err(SimError::MissingData(format!(
            "{key}: no rows for location '{location}'"
        )));
    }
    LookupTable::from_bins(key, &bins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_table_selects_draw_and_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "incidence.csv",
            "location,sex,age_start,age_end,year_start,year_end,draw_0,draw_1\n\
             Here,Male,15,50,2020,2021,0.001,0.002\n\
             Here,Male,50,95,2020,2021,0.003,0.004\n\
             Here,Female,15,50,2020,2021,0.005,0.006\n\
             Here,Female,50,95,2020,2021,0.007,0.008\n\
             Elsewhere,Male,15,50,2020,2021,9,9\n",
        );
        let table = load_table(&path, "incidence_rate", "Here", 1).unwrap();
        assert_eq!(table.lookup(60.0, Sex::Male, 2020.0).unwrap(), 0.004);
        assert_eq!(table.lookup(20.0, Sex::Female, 2020.0).unwrap(), 0.006);
        assert!(load_table(&path, "incidence_rate", "Here", 5).is_err());
        assert!(load_table(&path, "incidence_rate", "Nowhere", 0).is_err());
    }

    #[test]
    fn test_load_table_without_sex_or_year() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "tmrle.csv",
            "age_start,age_end,value\n0,60,40.5\n60,125,12.25\n",
        );
        let table = load_table(&path, "life_expectancy", "Anywhere", 0).unwrap();
        assert_eq!(table.lookup(70.0, Sex::Female, 2030.0).unwrap(), 12.25);
    }

    #[test]
    fn test_load_table_reports_bad_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "bad.csv", "age_start,age_end,value\n0,60,abc\n");
        assert!(matches!(
            load_table(&path, "bad", "x", 0),
            Err(SimError::Data(_))
        ));
    }
}
