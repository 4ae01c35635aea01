use std::collections::BTreeSet;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::config::CancelPolicy;
use crate::limits::MAX_BULK_TARGETS;
use crate::model::*;
use crate::observability::{CELLS_FREED_TOTAL, CELLS_RESERVED_TOTAL, CONFLICTING_CELLS_TOTAL};
use crate::session::Session;

use super::conflict::{
    collect_conflicts, column, missing_rows, validate_not_past, validate_occupant, validate_resource,
};
use super::{record_operation, Engine, EngineError};

/// Reserve `resource` for every segment of `period` on `date`.
///
/// Check-all-then-commit-all: conflicts are collected over every segment
/// before anything is written, so a `Day` request never lands half-applied.
/// Returns the rows that were written.
pub fn apply_reservation(
    table: &mut SlotTable,
    date: NaiveDate,
    period: RequestedPeriod,
    resource: &str,
    occupant: &str,
) -> Result<TableView, EngineError> {
    let col = column(table, resource)?;
    if !table.has_date(date) {
        return Err(EngineError::NotFound(format!("no bookable slots on {date}")));
    }
    let segments = period.expand();
    let missing = missing_rows(table, segments.iter().map(|p| (date, *p, resource)));
    if !missing.is_empty() {
        return Err(EngineError::NotFound(missing.join(", ")));
    }

    let conflicts = collect_conflicts(table, segments.iter().map(|p| (date, *p, resource)));
    if !conflicts.is_empty() {
        return Err(EngineError::Conflict(conflicts));
    }

    for p in segments {
        table.set_cell(date, *p, col, CellState::Reserved(occupant.to_string()));
    }

    let rows = segments
        .iter()
        .filter_map(|p| table.row(date, *p).cloned())
        .collect();
    Ok(TableView {
        resources: table.resources().to_vec(),
        rows,
    })
}

/// Reserve every cell in `targets` for `occupant`, or none of them.
pub fn apply_bulk_reservation(
    table: &mut SlotTable,
    targets: &BTreeSet<CellKey>,
    occupant: &str,
) -> Result<(), EngineError> {
    let as_tuples = || targets.iter().map(|k| (k.date, k.period, k.resource.as_str()));

    let missing = missing_rows(table, as_tuples());
    if !missing.is_empty() {
        return Err(EngineError::NotFound(missing.join(", ")));
    }
    let conflicts = collect_conflicts(table, as_tuples());
    if !conflicts.is_empty() {
        return Err(EngineError::Conflict(conflicts));
    }

    for key in targets {
        let col = column(table, &key.resource)?;
        table.set_cell(key.date, key.period, col, CellState::Reserved(occupant.to_string()));
    }
    Ok(())
}

/// Free every reserved segment of `period` on `date`. Segments that are
/// already available are reported as such and left alone.
///
/// Under `OccupantOnly`, a segment held by anyone but `requester` makes the
/// whole request fail before anything is freed.
pub fn apply_cancellation(
    table: &mut SlotTable,
    date: NaiveDate,
    period: RequestedPeriod,
    resource: &str,
    policy: CancelPolicy,
    requester: Option<&str>,
) -> Result<Vec<SegmentRelease>, EngineError> {
    let col = column(table, resource)?;
    if !table.has_date(date) {
        return Err(EngineError::NotFound(format!("no bookable slots on {date}")));
    }
    let segments = period.expand();
    let missing = missing_rows(table, segments.iter().map(|p| (date, *p, resource)));
    if !missing.is_empty() {
        return Err(EngineError::NotFound(missing.join(", ")));
    }

    if policy == CancelPolicy::OccupantOnly {
        let foreign = collect_conflicts(table, segments.iter().map(|p| (date, *p, resource)))
            .into_iter()
            .find(|c| requester.is_none_or(|r| !same_person(r, &c.occupant)));
        if let Some(c) = foreign {
            return Err(EngineError::Forbidden(format!(
                "{} is reserved by {}",
                c.cell, c.occupant
            )));
        }
    }

    let mut released = Vec::with_capacity(segments.len());
    for p in segments {
        let key = CellKey::new(date, *p, resource);
        let release = match table.cell(&key) {
            Some(CellState::Reserved(previous)) => Release::Freed {
                previous: previous.clone(),
            },
            _ => Release::AlreadyAvailable,
        };
        if matches!(release, Release::Freed { .. }) {
            table.set_cell(date, *p, col, CellState::Available);
        }
        released.push(SegmentRelease { period: *p, release });
    }
    Ok(released)
}

/// Names match ignoring case, accented letters included.
fn same_person(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

impl Engine {
    pub async fn reserve(
        &self,
        session: &Session,
        office: &str,
        date: NaiveDate,
        period: RequestedPeriod,
        resource: &str,
        occupant: &str,
    ) -> Result<TableView, EngineError> {
        let started = Instant::now();
        let result = self
            .reserve_inner(session, office, date, period, resource, occupant)
            .await;
        self.count_conflicts(office, &result);
        record_operation("reserve", started, &result);
        result
    }

    async fn reserve_inner(
        &self,
        session: &Session,
        office: &str,
        date: NaiveDate,
        period: RequestedPeriod,
        resource: &str,
        occupant: &str,
    ) -> Result<TableView, EngineError> {
        Self::check_session(session)?;
        let office = self.office(office)?;
        validate_not_past(date, self.today())?;
        let occupant = validate_occupant(occupant)?;
        validate_resource(office, resource)?;

        let rows = self
            .transact(office, |table| {
                apply_reservation(table, date, period, resource, &occupant).map(|rows| (rows, true))
            })
            .await?;

        info!("reserved {resource} in {} on {date} ({period}) for {occupant}", office.name);
        metrics::counter!(CELLS_RESERVED_TOTAL, "office" => office.name.clone())
            .increment(period.expand().len() as u64);
        Ok(rows)
    }

    /// Reserve an explicit set of cells for one occupant, all or nothing.
    /// Duplicate targets collapse. Returns the reserved cells in table order.
    pub async fn reserve_bulk(
        &self,
        session: &Session,
        office: &str,
        targets: &[CellKey],
        occupant: &str,
    ) -> Result<Vec<CellKey>, EngineError> {
        let started = Instant::now();
        let result = self.reserve_bulk_inner(session, office, targets, occupant).await;
        self.count_conflicts(office, &result);
        record_operation("reserve_bulk", started, &result);
        result
    }

    async fn reserve_bulk_inner(
        &self,
        session: &Session,
        office: &str,
        targets: &[CellKey],
        occupant: &str,
    ) -> Result<Vec<CellKey>, EngineError> {
        Self::check_session(session)?;
        let office = self.office(office)?;
        let occupant = validate_occupant(occupant)?;
        if targets.is_empty() {
            return Err(EngineError::Validation("no cells selected".into()));
        }
        if targets.len() > MAX_BULK_TARGETS {
            return Err(EngineError::LimitExceeded("too many cells in one request"));
        }
        let today = self.today();
        for key in targets {
            validate_resource(office, &key.resource)?;
            validate_not_past(key.date, today)?;
            if is_weekend(key.date) {
                return Err(EngineError::Validation(format!(
                    "{key} falls on a weekend"
                )));
            }
        }
        let targets: BTreeSet<CellKey> = targets.iter().cloned().collect();

        self.transact(office, |table| {
            apply_bulk_reservation(table, &targets, &occupant).map(|()| ((), true))
        })
        .await?;

        info!(
            "reserved {} cells in {} for {occupant}",
            targets.len(),
            office.name
        );
        metrics::counter!(CELLS_RESERVED_TOTAL, "office" => office.name.clone())
            .increment(targets.len() as u64);
        Ok(targets.into_iter().collect())
    }

    pub async fn cancel(
        &self,
        session: &Session,
        office: &str,
        date: NaiveDate,
        period: RequestedPeriod,
        resource: &str,
    ) -> Result<Vec<SegmentRelease>, EngineError> {
        let started = Instant::now();
        let result = self.cancel_inner(session, office, date, period, resource).await;
        record_operation("cancel", started, &result);
        result
    }

    async fn cancel_inner(
        &self,
        session: &Session,
        office: &str,
        date: NaiveDate,
        period: RequestedPeriod,
        resource: &str,
    ) -> Result<Vec<SegmentRelease>, EngineError> {
        Self::check_session(session)?;
        let office = self.office(office)?;
        validate_resource(office, resource)?;
        let policy = office.cancel_policy;
        let requester = session.user.as_deref();

        let released = self
            .transact(office, |table| {
                let released =
                    apply_cancellation(table, date, period, resource, policy, requester)?;
                let changed = released
                    .iter()
                    .any(|s| matches!(s.release, Release::Freed { .. }));
                Ok((released, changed))
            })
            .await?;

        let freed = released
            .iter()
            .filter(|s| matches!(s.release, Release::Freed { .. }))
            .count();
        if freed > 0 {
            info!("freed {resource} in {} on {date} ({period}), {freed} segment(s)", office.name);
            metrics::counter!(CELLS_FREED_TOTAL, "office" => office.name.clone())
                .increment(freed as u64);
        } else {
            debug!("cancel of {resource} in {} on {date} ({period}) changed nothing", office.name);
        }
        Ok(released)
    }

    fn count_conflicts<T>(&self, office: &str, result: &Result<T, EngineError>) {
        if let Err(EngineError::Conflict(cells)) = result {
            metrics::counter!(CONFLICTING_CELLS_TOTAL, "office" => office.to_string())
                .increment(cells.len() as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn table() -> SlotTable {
        SlotTable::seed(vec!["Baloo".into(), "Stitch".into()], d(3), 5)
    }

    fn occupant_of(t: &SlotTable, date: NaiveDate, period: Period, resource: &str) -> Option<String> {
        t.cell(&CellKey::new(date, period, resource))
            .and_then(CellState::occupant)
            .map(str::to_string)
    }

    #[test]
    fn day_reservation_writes_both_segments() {
        let mut t = table();
        let rows = apply_reservation(&mut t, d(4), RequestedPeriod::Day, "Stitch", "Alice").unwrap();
        assert_eq!(rows.rows.len(), 2);
        assert_eq!(occupant_of(&t, d(4), Period::Morning, "Stitch").as_deref(), Some("Alice"));
        assert_eq!(occupant_of(&t, d(4), Period::Afternoon, "Stitch").as_deref(), Some("Alice"));
        assert_eq!(occupant_of(&t, d(4), Period::Morning, "Baloo"), None);
    }

    #[test]
    fn day_conflict_leaves_morning_untouched() {
        let mut t = table();
        apply_reservation(&mut t, d(3), RequestedPeriod::Afternoon, "Baloo", "Carl").unwrap();
        let before = t.clone();

        let err = apply_reservation(&mut t, d(3), RequestedPeriod::Day, "Baloo", "Alice").unwrap_err();
        match err {
            EngineError::Conflict(cells) => {
                assert_eq!(cells.len(), 1);
                assert_eq!(cells[0].cell.period, Period::Afternoon);
                assert_eq!(cells[0].occupant, "Carl");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(t, before);
    }

    #[test]
    fn weekend_reservation_not_found() {
        let mut t = table();
        let err = apply_reservation(&mut t, d(8), RequestedPeriod::Morning, "Baloo", "Alice").unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn bulk_conflict_reports_all_and_writes_nothing() {
        let mut t = table();
        apply_reservation(&mut t, d(3), RequestedPeriod::Morning, "Baloo", "Carl").unwrap();
        apply_reservation(&mut t, d(5), RequestedPeriod::Afternoon, "Stitch", "Dana").unwrap();
        let before = t.clone();

        let targets: BTreeSet<CellKey> = [
            CellKey::new(d(3), Period::Morning, "Baloo"),
            CellKey::new(d(4), Period::Morning, "Baloo"),
            CellKey::new(d(5), Period::Afternoon, "Stitch"),
        ]
        .into_iter()
        .collect();
        match apply_bulk_reservation(&mut t, &targets, "Alice") {
            Err(EngineError::Conflict(cells)) => {
                let occupants: Vec<_> = cells.iter().map(|c| c.occupant.as_str()).collect();
                assert_eq!(occupants, vec!["Carl", "Dana"]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(t, before);
    }

    #[test]
    fn bulk_missing_row_is_not_found() {
        let mut t = table();
        let targets: BTreeSet<CellKey> =
            [CellKey::new(d(28), Period::Morning, "Baloo")].into_iter().collect();
        assert!(matches!(
            apply_bulk_reservation(&mut t, &targets, "Alice"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn cancel_is_idempotent_per_segment() {
        let mut t = table();
        apply_reservation(&mut t, d(3), RequestedPeriod::Morning, "Baloo", "Alice").unwrap();

        let out = apply_cancellation(&mut t, d(3), RequestedPeriod::Day, "Baloo", CancelPolicy::Anyone, None)
            .unwrap();
        assert_eq!(
            out,
            vec![
                SegmentRelease {
                    period: Period::Morning,
                    release: Release::Freed { previous: "Alice".into() },
                },
                SegmentRelease {
                    period: Period::Afternoon,
                    release: Release::AlreadyAvailable,
                },
            ]
        );
        assert_eq!(occupant_of(&t, d(3), Period::Morning, "Baloo"), None);

        let again = apply_cancellation(&mut t, d(3), RequestedPeriod::Day, "Baloo", CancelPolicy::Anyone, None)
            .unwrap();
        assert!(again.iter().all(|s| s.release == Release::AlreadyAvailable));
    }

    #[test]
    fn occupant_only_policy_blocks_others() {
        let mut t = table();
        apply_reservation(&mut t, d(3), RequestedPeriod::Day, "Baloo", "Alice").unwrap();
        let before = t.clone();

        let err = apply_cancellation(
            &mut t,
            d(3),
            RequestedPeriod::Day,
            "Baloo",
            CancelPolicy::OccupantOnly,
            Some("Bob"),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
        assert_eq!(t, before);

        let ok = apply_cancellation(
            &mut t,
            d(3),
            RequestedPeriod::Day,
            "Baloo",
            CancelPolicy::OccupantOnly,
            Some("alice"),
        )
        .unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(occupant_of(&t, d(3), Period::Afternoon, "Baloo"), None);
    }

    #[test]
    fn occupant_match_folds_accented_case() {
        let mut t = table();
        apply_reservation(&mut t, d(4), RequestedPeriod::Morning, "Stitch", "Élodie").unwrap();

        let out = apply_cancellation(
            &mut t,
            d(4),
            RequestedPeriod::Morning,
            "Stitch",
            CancelPolicy::OccupantOnly,
            Some("élodie"),
        )
        .unwrap();
        assert_eq!(out[0].release, Release::Freed { previous: "Élodie".into() });
        assert!(!same_person("Élodie", "Elodie"));
    }

    #[test]
    fn occupant_only_without_user_can_still_noop() {
        let mut t = table();
        let out = apply_cancellation(
            &mut t,
            d(3),
            RequestedPeriod::Morning,
            "Baloo",
            CancelPolicy::OccupantOnly,
            None,
        )
        .unwrap();
        assert_eq!(out[0].release, Release::AlreadyAvailable);
    }
}
