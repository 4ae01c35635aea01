use chrono::NaiveDate;

use crate::config::FlexOfficeConfig;
use crate::limits::MAX_OCCUPANT_NAME_LEN;
use crate::model::*;
use crate::sheet::AVAILABLE_SENTINEL;

use super::EngineError;

/// Trimmed occupant name, or why it cannot be stored.
pub(crate) fn validate_occupant(name: &str) -> Result<String, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::Validation("occupant name is empty".into()));
    }
    if name.len() > MAX_OCCUPANT_NAME_LEN {
        return Err(EngineError::LimitExceeded("occupant name too long"));
    }
    // Would read back as an available cell.
    if name.eq_ignore_ascii_case(AVAILABLE_SENTINEL) {
        return Err(EngineError::Validation(format!(
            "{name:?} is reserved for available cells"
        )));
    }
    Ok(name.to_string())
}

pub(crate) fn validate_not_past(date: NaiveDate, today: NaiveDate) -> Result<(), EngineError> {
    if date < today {
        Err(EngineError::Validation(format!("{date} is in the past")))
    } else {
        Ok(())
    }
}

pub(crate) fn validate_resource(office: &FlexOfficeConfig, resource: &str) -> Result<(), EngineError> {
    if office.has_resource(resource) {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "{resource:?} is not a resource of {}",
            office.name
        )))
    }
}

/// Column of `resource` in a loaded table. The table was decoded against the
/// office roster, so a miss means the caller skipped `validate_resource`.
pub(crate) fn column(table: &SlotTable, resource: &str) -> Result<usize, EngineError> {
    table
        .resource_index(resource)
        .ok_or_else(|| EngineError::Validation(format!("unknown resource {resource:?}")))
}

/// Every cell in `cells` whose row is missing, or whose date is a weekend.
pub(crate) fn missing_rows<'a>(
    table: &SlotTable,
    cells: impl IntoIterator<Item = (NaiveDate, Period, &'a str)>,
) -> Vec<String> {
    cells
        .into_iter()
        .filter(|(date, period, _)| is_weekend(*date) || table.row(*date, *period).is_none())
        .map(|(date, period, resource)| format!("{resource} {date} {period}"))
        .collect()
}

/// Read every requested cell and report the ones that are not available.
/// Pure read: callers commit only when this comes back empty.
pub(crate) fn collect_conflicts<'a>(
    table: &SlotTable,
    cells: impl IntoIterator<Item = (NaiveDate, Period, &'a str)>,
) -> Vec<CellConflict> {
    cells
        .into_iter()
        .filter_map(|(date, period, resource)| {
            let key = CellKey::new(date, period, resource);
            match table.cell(&key) {
                Some(CellState::Reserved(occupant)) => Some(CellConflict {
                    occupant: occupant.clone(),
                    cell: key,
                }),
                _ => None,
            }
        })
        .collect()
}
