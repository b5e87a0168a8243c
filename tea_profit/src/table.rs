//! Loading of the model-results table.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::TeaError;

pub const YIELD: &str = "Yield";
pub const CONCENTRATION_A: &str = "Concentration A";
pub const CONCENTRATION_B: &str = "Concentration B";

pub const REQUIRED_COLUMNS: [&str; 3] = [YIELD, CONCENTRATION_A, CONCENTRATION_B];

/// One sampled fermentation condition and its predicted yield.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct InputRecord {
    /// Fraction of the theoretical maximum, nominally in [0, 1].
    pub yield_fraction: f64,
    /// g/kg
    pub concentration_a: f64,
    /// g/kg
    pub concentration_b: f64,
}

impl InputRecord {
    pub const fn new(yield_fraction: f64, concentration_a: f64, concentration_b: f64) -> Self {
        Self {
            yield_fraction,
            concentration_a,
            concentration_b,
        }
    }
}

/// The immutable table every recomputation reads from.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct InputTable {
    records: Vec<InputRecord>,
}

impl InputTable {
    pub fn new(records: Vec<InputRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[InputRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Parse a CSV table with a header row.
    ///
    /// The header is checked for all of [`REQUIRED_COLUMNS`] before any data row
    /// is read. Other columns are ignored. Empty cells become NaN; anything else
    /// that does not parse as a number is rejected with its 1-based data row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TeaError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = rdr.headers()?.clone();
        let [yield_idx, a_idx, b_idx] = locate_columns(&headers)?;

        let mut records = Vec::new();
        for (idx, result) in rdr.records().enumerate() {
            let row = result?;
            let line = idx + 1;
            records.push(InputRecord {
                yield_fraction: parse_cell(&row, yield_idx, YIELD, line)?,
                concentration_a: parse_cell(&row, a_idx, CONCENTRATION_A, line)?,
                concentration_b: parse_cell(&row, b_idx, CONCENTRATION_B, line)?,
            });
        }
        Ok(Self { records })
    }

    pub fn from_bytes(input: &[u8]) -> Result<Self, TeaError> {
        Self::from_reader(input)
    }

    pub fn load(path: &Path) -> Result<Self, TeaError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }
}

fn locate_columns(headers: &csv::StringRecord) -> Result<[usize; 3], TeaError> {
    let mut found = [None; 3];
    let mut missing = Vec::new();
    for (slot, name) in found.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers.iter().position(|h| h == name);
        if slot.is_none() {
            missing.push(name.to_string());
        }
    }
    match found {
        [Some(y), Some(a), Some(b)] => Ok([y, a, b]),
        _ => Err(TeaError::MissingColumns(missing)),
    }
}

fn parse_cell(
    row: &csv::StringRecord,
    idx: usize,
    column: &str,
    line: usize,
) -> Result<f64, TeaError> {
    let raw = row.get(idx).unwrap_or("");
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>().map_err(|_| TeaError::InvalidValue {
        row: line,
        column: column.to_string(),
        value: raw.to_string(),
    })
}
