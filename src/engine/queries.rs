use std::time::Instant;

use chrono::{Days, NaiveDate};

use crate::limits::MAX_QUERY_DAYS;
use crate::model::*;
use crate::session::Session;

use super::{record_operation, Engine, EngineError};

/// Check a query window and return its exclusive end date.
fn window_end(start: NaiveDate, days: u32, today: NaiveDate) -> Result<NaiveDate, EngineError> {
    if start < today {
        return Err(EngineError::Validation(format!(
            "start date {start} is in the past"
        )));
    }
    if days > MAX_QUERY_DAYS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    start
        .checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(|| EngineError::Validation("query window out of calendar range".into()))
}

/// Rows with `start <= date < start + days`, weekdays only, optionally one
/// period. Ordered by date, Morning before Afternoon.
pub fn select_rows(
    table: &SlotTable,
    start: NaiveDate,
    days: u32,
    period: Option<Period>,
    today: NaiveDate,
) -> Result<TableView, EngineError> {
    let end = window_end(start, days, today)?;

    let rows = table
        .rows_between(start, end)
        .iter()
        .filter(|r| !is_weekend(r.date))
        .filter(|r| period.is_none_or(|p| r.period == p))
        .cloned()
        .collect();

    Ok(TableView {
        resources: table.resources().to_vec(),
        rows,
    })
}

impl Engine {
    pub async fn query_availability(
        &self,
        session: &Session,
        office: &str,
        start: NaiveDate,
        days: u32,
        period: Option<Period>,
    ) -> Result<TableView, EngineError> {
        let started = Instant::now();
        let result = self.query_inner(session, office, start, days, period).await;
        record_operation("query", started, &result);
        result
    }

    async fn query_inner(
        &self,
        session: &Session,
        office: &str,
        start: NaiveDate,
        days: u32,
        period: Option<Period>,
    ) -> Result<TableView, EngineError> {
        Self::check_session(session)?;
        let office = self.office(office)?;
        let today = self.today();
        window_end(start, days, today)?;
        let loaded = self.load_table(office).await?;
        select_rows(&loaded.table, start, days, period, today)
    }

    /// Everything bookable from today through `today + horizon_days`, both
    /// ends included.
    pub async fn horizon_view(&self, session: &Session, office: &str) -> Result<TableView, EngineError> {
        Self::check_session(session)?;
        let horizon = self.office(office)?.horizon_days;
        let today = self.today();
        self.query_availability(session, office, today, horizon + 1, None)
            .await
    }
}
