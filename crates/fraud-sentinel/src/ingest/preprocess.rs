use std::io::Read;

use crate::scoring::FeatureVector;

const TIME_COLUMN: &str = "Time";
const CLASS_COLUMN: &str = "Class";
const AMOUNT_COLUMN: &str = "Amount";
pub const SCALED_AMOUNT_COLUMN: &str = "scaled_amount";

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("schema mismatch: expected {expected} feature columns, found {found} ({columns:?})")]
    SchemaMismatch {
        expected: usize,
        found: usize,
        columns: Vec<String>,
    },
    #[error("row {row} column '{column}' is not numeric: '{value}'")]
    NonNumeric {
        row: usize,
        column: String,
        value: String,
    },
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Header-driven rows exactly as read from a source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PreprocessError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }
}

/// Feature rows ready for scoring, plus the column order they follow.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    pub columns: Vec<String>,
    pub vectors: Vec<FeatureVector>,
}

/// Turns raw transaction tables into model-shaped feature vectors.
///
/// `Time` and `Class` are dropped, `Amount` is min-max scaled over the file
/// and moved to a trailing `scaled_amount` column, and every other column is
/// passed through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    input_dim: usize,
}

impl Preprocessor {
    pub fn new(input_dim: usize) -> Self {
        Self { input_dim }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn transform(&self, table: &RawTable) -> Result<FeatureBatch, PreprocessError> {
        let amount = table.column(AMOUNT_COLUMN);
        let passthrough: Vec<usize> = table
            .headers
            .iter()
            .enumerate()
            .filter(|(_, name)| !matches!(name.as_str(), TIME_COLUMN | CLASS_COLUMN | AMOUNT_COLUMN))
            .map(|(index, _)| index)
            .collect();

        let mut columns: Vec<String> = passthrough
            .iter()
            .map(|&index| table.headers[index].clone())
            .collect();
        if amount.is_some() {
            columns.push(SCALED_AMOUNT_COLUMN.to_string());
        }

        if columns.len() != self.input_dim {
            return Err(PreprocessError::SchemaMismatch {
                expected: self.input_dim,
                found: columns.len(),
                columns,
            });
        }

        let scaled = match amount {
            Some(index) => Some(min_max_scale(&parse_column(table, index)?)),
            None => None,
        };

        let mut vectors = Vec::with_capacity(table.rows.len());
        for (row_index, row) in table.rows.iter().enumerate() {
            let mut values = Vec::with_capacity(self.input_dim);
            for &column in &passthrough {
                values.push(parse_cell(table, row_index, column, row)?);
            }
            if let Some(scaled) = &scaled {
                values.push(scaled[row_index]);
            }
            vectors.push(FeatureVector::new(values));
        }

        Ok(FeatureBatch { columns, vectors })
    }
}

fn parse_column(table: &RawTable, column: usize) -> Result<Vec<f64>, PreprocessError> {
    table
        .rows
        .iter()
        .enumerate()
        .map(|(row_index, row)| parse_cell(table, row_index, column, row))
        .collect()
}

fn parse_cell(
    table: &RawTable,
    row_index: usize,
    column: usize,
    row: &[String],
) -> Result<f64, PreprocessError> {
    let raw = row.get(column).map(String::as_str).unwrap_or_default();
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| PreprocessError::NonNumeric {
            row: row_index,
            column: table.headers[column].clone(),
            value: raw.to_string(),
        })
}

/// Scales into [0, 1] over the given values. A constant column maps to 0.0.
fn min_max_scale(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    values
        .iter()
        .map(|value| {
            if range > 0.0 {
                (value - min) / range
            } else {
                0.0
            }
        })
        .collect()
}
