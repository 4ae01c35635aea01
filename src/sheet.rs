//! Persisted layout of an office table.
//!
//! A sheet is a header row (`Date`, period column, one column per resource)
//! followed by one string row per (date, period). Available cells carry the
//! literal sentinel `Disponible`; reserved cells carry the occupant name.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::config::FlexOfficeConfig;
use crate::model::*;

pub const AVAILABLE_SENTINEL: &str = "Disponible";

const DATE_FORMAT: &str = "%Y-%m-%d";
/// Spreadsheet exports write dates as midnight timestamps.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug)]
pub enum SheetError {
    Csv(csv::Error),
    Header { expected: Vec<String>, found: Vec<String> },
    Width { row: usize, expected: usize, found: usize },
    Date { row: usize, value: String },
    Period { row: usize, value: String },
    EmptyCell { row: usize, column: String },
    Table(TableError),
}

impl fmt::Display for SheetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetError::Csv(e) => write!(f, "csv: {e}"),
            SheetError::Header { expected, found } => {
                write!(f, "header mismatch: expected {expected:?}, found {found:?}")
            }
            SheetError::Width { row, expected, found } => {
                write!(f, "row {row}: expected {expected} fields, found {found}")
            }
            SheetError::Date { row, value } => write!(f, "row {row}: invalid date {value:?}"),
            SheetError::Period { row, value } => write!(f, "row {row}: invalid period {value:?}"),
            SheetError::EmptyCell { row, column } => {
                write!(f, "row {row}: empty cell in column {column:?}")
            }
            SheetError::Table(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SheetError {}

impl From<csv::Error> for SheetError {
    fn from(e: csv::Error) -> Self {
        SheetError::Csv(e)
    }
}

impl Sheet {
    /// CRC32 over every header and cell, each length-prefixed so that
    /// moving text between adjacent fields changes the value.
    pub fn fingerprint(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        let mut feed = |field: &str| {
            hasher.update(&(field.len() as u32).to_le_bytes());
            hasher.update(field.as_bytes());
        };
        for c in &self.columns {
            feed(c);
        }
        for row in &self.rows {
            for cell in row {
                feed(cell);
            }
        }
        hasher.finalize()
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, SheetError> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| SheetError::Csv(csv::Error::from(e.into_error())))
    }

    pub fn from_csv(bytes: &[u8]) -> Result<Self, SheetError> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { columns, rows })
    }
}

fn expected_header(office: &FlexOfficeConfig) -> Vec<String> {
    let mut header = vec![office.date_column.clone(), office.period_column.clone()];
    header.extend(office.resources.iter().cloned());
    header
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).ok().map(|dt| dt.date()))
}

/// Turn a stored sheet into a table, checking it against the office roster.
pub fn decode(sheet: &Sheet, office: &FlexOfficeConfig) -> Result<SlotTable, SheetError> {
    let expected = expected_header(office);
    let found: Vec<String> = sheet.columns.iter().map(|c| c.trim().to_string()).collect();
    if found != expected {
        return Err(SheetError::Header { expected, found });
    }

    let width = expected.len();
    let mut rows = Vec::with_capacity(sheet.rows.len());
    for (i, raw) in sheet.rows.iter().enumerate() {
        // Row numbers are reported 1-based, counting the header.
        let line = i + 2;
        if raw.len() != width {
            return Err(SheetError::Width {
                row: line,
                expected: width,
                found: raw.len(),
            });
        }
        let date = parse_date(&raw[0]).ok_or_else(|| SheetError::Date {
            row: line,
            value: raw[0].clone(),
        })?;
        let period = Period::from_label(&raw[1]).ok_or_else(|| SheetError::Period {
            row: line,
            value: raw[1].clone(),
        })?;
        let mut cells = Vec::with_capacity(office.resources.len());
        for (value, column) in raw[2..].iter().zip(&office.resources) {
            let value = value.trim();
            let state = match value {
                "" => {
                    return Err(SheetError::EmptyCell {
                        row: line,
                        column: column.clone(),
                    });
                }
                AVAILABLE_SENTINEL => CellState::Available,
                name => CellState::Reserved(name.to_string()),
            };
            cells.push(state);
        }
        rows.push(SlotRow { date, period, cells });
    }

    SlotTable::new(office.resources.clone(), rows).map_err(SheetError::Table)
}

/// Canonical sheet for a table: ISO dates, rows in `(date, period)` order.
pub fn encode(table: &SlotTable, office: &FlexOfficeConfig) -> Sheet {
    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut out = Vec::with_capacity(row.cells.len() + 2);
            out.push(row.date.format(DATE_FORMAT).to_string());
            out.push(row.period.label().to_string());
            out.extend(row.cells.iter().map(|c| match c {
                CellState::Available => AVAILABLE_SENTINEL.to_string(),
                CellState::Reserved(name) => name.clone(),
            }));
            out
        })
        .collect();
    Sheet {
        columns: expected_header(office),
        rows,
    }
}
