use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Half-day slot, the only granularity ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Period {
    Morning,
    Afternoon,
}

impl Period {
    /// Storage order: Morning before Afternoon.
    pub const ALL: [Period; 2] = [Period::Morning, Period::Afternoon];

    /// Label used in the persisted sheet.
    pub fn label(self) -> &'static str {
        match self {
            Period::Morning => "Matin",
            Period::Afternoon => "Après-midi",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Matin" => Some(Period::Morning),
            "Après-midi" => Some(Period::Afternoon),
            _ => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Period as requested by a caller. `Day` is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestedPeriod {
    Morning,
    Afternoon,
    Day,
}

impl RequestedPeriod {
    /// Atomic periods covered by this request, in storage order.
    pub fn expand(self) -> &'static [Period] {
        match self {
            RequestedPeriod::Morning => &[Period::Morning],
            RequestedPeriod::Afternoon => &[Period::Afternoon],
            RequestedPeriod::Day => &Period::ALL,
        }
    }

    /// `None` for `Day`, which filters nothing.
    pub fn atomic(self) -> Option<Period> {
        match self {
            RequestedPeriod::Morning => Some(Period::Morning),
            RequestedPeriod::Afternoon => Some(Period::Afternoon),
            RequestedPeriod::Day => None,
        }
    }
}

impl From<Period> for RequestedPeriod {
    fn from(p: Period) -> Self {
        match p {
            Period::Morning => RequestedPeriod::Morning,
            Period::Afternoon => RequestedPeriod::Afternoon,
        }
    }
}

impl fmt::Display for RequestedPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedPeriod::Morning => f.write_str(Period::Morning.label()),
            RequestedPeriod::Afternoon => f.write_str(Period::Afternoon.label()),
            RequestedPeriod::Day => f.write_str("Journée"),
        }
    }
}

impl FromStr for RequestedPeriod {
    type Err = String;

    /// Accepts English names and the sheet's French labels, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "morning" | "am" | "matin" => Ok(RequestedPeriod::Morning),
            "afternoon" | "pm" | "après-midi" | "apres-midi" => Ok(RequestedPeriod::Afternoon),
            "day" | "journée" | "journee" => Ok(RequestedPeriod::Day),
            other => Err(format!("unknown period: {other}")),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestedPeriod::from_str(s)?
            .atomic()
            .ok_or_else(|| format!("not an atomic period: {s}"))
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// State of one (date, period, resource) cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState {
    Available,
    Reserved(String),
}

impl CellState {
    pub fn is_available(&self) -> bool {
        matches!(self, CellState::Available)
    }

    pub fn occupant(&self) -> Option<&str> {
        match self {
            CellState::Available => None,
            CellState::Reserved(name) => Some(name),
        }
    }
}

/// Structured address of a single bookable cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub date: NaiveDate,
    pub period: Period,
    pub resource: String,
}

impl CellKey {
    pub fn new(date: NaiveDate, period: Period, resource: impl Into<String>) -> Self {
        Self {
            date,
            period,
            resource: resource.into(),
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.resource, self.date, self.period)
    }
}

/// One stored row. `cells` is aligned with the owning table's roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRow {
    pub date: NaiveDate,
    pub period: Period,
    pub cells: Vec<CellState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    EmptyRoster,
    DuplicateResource(String),
    DuplicateRow { date: NaiveDate, period: Period },
    RowWidth {
        date: NaiveDate,
        period: Period,
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::EmptyRoster => write!(f, "table has no resource columns"),
            TableError::DuplicateResource(name) => write!(f, "duplicate resource column: {name}"),
            TableError::DuplicateRow { date, period } => {
                write!(f, "duplicate row for {date} {period}")
            }
            TableError::RowWidth {
                date,
                period,
                expected,
                found,
            } => write!(
                f,
                "row {date} {period} has {found} cells, roster has {expected}"
            ),
        }
    }
}

impl std::error::Error for TableError {}

/// Bookable cells of one flex office, rows sorted by `(date, period)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    resources: Vec<String>,
    rows: Vec<SlotRow>,
}

impl SlotTable {
    pub fn new(resources: Vec<String>, mut rows: Vec<SlotRow>) -> Result<Self, TableError> {
        if resources.is_empty() {
            return Err(TableError::EmptyRoster);
        }
        for (i, name) in resources.iter().enumerate() {
            if resources[..i].contains(name) {
                return Err(TableError::DuplicateResource(name.clone()));
            }
        }
        for row in &rows {
            if row.cells.len() != resources.len() {
                return Err(TableError::RowWidth {
                    date: row.date,
                    period: row.period,
                    expected: resources.len(),
                    found: row.cells.len(),
                });
            }
        }
        rows.sort_by_key(|r| (r.date, r.period));
        if let Some(pair) = rows
            .windows(2)
            .find(|w| (w[0].date, w[0].period) == (w[1].date, w[1].period))
        {
            return Err(TableError::DuplicateRow {
                date: pair[0].date,
                period: pair[0].period,
            });
        }
        Ok(Self { resources, rows })
    }

    /// Fresh table with every weekday in `[from, from + days)` available.
    pub fn seed(resources: Vec<String>, from: NaiveDate, days: u32) -> Self {
        let width = resources.len();
        let rows = (0..u64::from(days))
            .filter_map(|offset| from.checked_add_days(Days::new(offset)))
            .filter(|d| !is_weekend(*d))
            .flat_map(|date| {
                Period::ALL.into_iter().map(move |period| SlotRow {
                    date,
                    period,
                    cells: vec![CellState::Available; width],
                })
            })
            .collect();
        Self { resources, rows }
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn rows(&self) -> &[SlotRow] {
        &self.rows
    }

    pub fn resource_index(&self, resource: &str) -> Option<usize> {
        self.resources.iter().position(|r| r == resource)
    }

    fn position(&self, date: NaiveDate, period: Period) -> Option<usize> {
        self.rows
            .binary_search_by_key(&(date, period), |r| (r.date, r.period))
            .ok()
    }

    pub fn row(&self, date: NaiveDate, period: Period) -> Option<&SlotRow> {
        self.position(date, period).map(|i| &self.rows[i])
    }

    /// True when at least one bookable row exists for `date`. Weekend rows never count.
    pub fn has_date(&self, date: NaiveDate) -> bool {
        !is_weekend(date) && Period::ALL.iter().any(|p| self.position(date, *p).is_some())
    }

    pub fn cell(&self, key: &CellKey) -> Option<&CellState> {
        let idx = self.resource_index(&key.resource)?;
        self.row(key.date, key.period).map(|r| &r.cells[idx])
    }

    /// Overwrite one cell. Returns false when the row does not exist.
    pub(crate) fn set_cell(
        &mut self,
        date: NaiveDate,
        period: Period,
        resource_idx: usize,
        state: CellState,
    ) -> bool {
        match self.position(date, period) {
            Some(i) => {
                self.rows[i].cells[resource_idx] = state;
                true
            }
            None => false,
        }
    }

    /// Rows with `start <= date < end`.
    /// Uses binary search on both bounds since rows are sorted by date.
    pub fn rows_between(&self, start: NaiveDate, end: NaiveDate) -> &[SlotRow] {
        let lo = self.rows.partition_point(|r| r.date < start);
        let hi = self.rows.partition_point(|r| r.date < end);
        if lo >= hi { &[] } else { &self.rows[lo..hi] }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Rows returned to a caller, paired with the roster that indexes their cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    pub resources: Vec<String>,
    pub rows: Vec<SlotRow>,
}

impl TableView {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, date: NaiveDate, period: Period, resource: &str) -> Option<&CellState> {
        let idx = self.resources.iter().position(|r| r == resource)?;
        self.rows
            .iter()
            .find(|r| r.date == date && r.period == period)
            .map(|r| &r.cells[idx])
    }

    /// Keys of every available cell, in row then roster order.
    pub fn available_cells(&self) -> Vec<CellKey> {
        self.rows
            .iter()
            .flat_map(|row| {
                row.cells
                    .iter()
                    .zip(&self.resources)
                    .filter(|(state, _)| state.is_available())
                    .map(|(_, resource)| CellKey::new(row.date, row.period, resource.clone()))
            })
            .collect()
    }
}

/// A cell that blocked a reservation, with whoever holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellConflict {
    pub cell: CellKey,
    pub occupant: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    Freed { previous: String },
    AlreadyAvailable,
}

/// Per-segment outcome of a cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRelease {
    pub period: Period,
    pub release: Release,
}
