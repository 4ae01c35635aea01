mod conflict;
mod error;
mod mutations;
mod persist;
mod queries;

pub use error::EngineError;
pub use persist::RetryPolicy;
pub use queries::select_rows;

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::{FlexOfficeConfig, OfficeDirectory};
use crate::model::*;
use crate::observability::{OPERATIONS_TOTAL, OPERATION_DURATION_SECONDS, STALE_WRITES_TOTAL};
use crate::session::Session;
use crate::sheet;
use crate::store::SheetStore;

use persist::with_retry;

/// Slot availability and reservation engine over a set of flex offices.
///
/// Every mutation runs as one critical section per office:
/// lock → load → check → commit → re-verify → save.
pub struct Engine {
    store: Arc<dyn SheetStore>,
    offices: OfficeDirectory,
    /// One async mutex per storage key, created on first use.
    locks: DashMap<String, Arc<Mutex<()>>>,
    retry: RetryPolicy,
    /// Fixed "today"; `None` follows the local clock.
    today: Option<NaiveDate>,
}

/// A table as loaded, with the fingerprint of the sheet it came from.
pub(super) struct Loaded {
    pub table: SlotTable,
    pub fingerprint: u32,
}

impl Engine {
    pub fn new(store: Arc<dyn SheetStore>, offices: OfficeDirectory) -> Self {
        Self {
            store,
            offices,
            locks: DashMap::new(),
            retry: RetryPolicy::default(),
            today: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Evaluate past-date rules against `today` instead of the clock.
    pub fn pinned_to(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    pub fn list_offices(&self) -> &[FlexOfficeConfig] {
        self.offices.offices()
    }

    pub fn office(&self, name: &str) -> Result<&FlexOfficeConfig, EngineError> {
        self.offices
            .get(name)
            .ok_or_else(|| EngineError::UnknownOffice(name.to_string()))
    }

    pub(super) fn check_session(session: &Session) -> Result<(), EngineError> {
        if session.is_authenticated() {
            Ok(())
        } else {
            Err(EngineError::Unauthorized)
        }
    }

    fn office_lock(&self, office: &FlexOfficeConfig) -> Arc<Mutex<()>> {
        self.locks
            .entry(office.storage_key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(super) async fn load_table(&self, office: &FlexOfficeConfig) -> Result<Loaded, EngineError> {
        let key = office.storage_key.as_str();
        let raw = with_retry(&self.retry, "load", key, || self.store.load(key)).await?;
        let fingerprint = raw.fingerprint();
        let table = sheet::decode(&raw, office)
            .map_err(|e| EngineError::Storage(format!("{}: {e}", office.name)))?;
        Ok(Loaded { table, fingerprint })
    }

    /// Re-read the stored sheet and write `table` only if nobody else
    /// replaced it since it was loaded.
    pub(super) async fn commit_table(
        &self,
        office: &FlexOfficeConfig,
        table: &SlotTable,
        loaded_fingerprint: u32,
    ) -> Result<(), EngineError> {
        let key = office.storage_key.as_str();
        let current = with_retry(&self.retry, "load", key, || self.store.load(key)).await?;
        if current.fingerprint() != loaded_fingerprint {
            warn!("refusing stale write to {}: sheet changed since load", office.name);
            metrics::counter!(STALE_WRITES_TOTAL).increment(1);
            return Err(EngineError::ConcurrentModification(office.name.clone()));
        }
        let encoded = sheet::encode(table, office);
        with_retry(&self.retry, "save", key, || self.store.save(key, &encoded)).await?;
        Ok(())
    }

    /// Run `apply` inside the office's critical section. `apply` returns its
    /// output and whether it changed the table; the table is saved only then.
    pub(super) async fn transact<T>(
        &self,
        office: &FlexOfficeConfig,
        apply: impl FnOnce(&mut SlotTable) -> Result<(T, bool), EngineError>,
    ) -> Result<T, EngineError> {
        let lock = self.office_lock(office);
        let _guard = lock.lock().await;

        let Loaded { mut table, fingerprint } = self.load_table(office).await?;
        let (out, changed) = apply(&mut table)?;
        if changed {
            self.commit_table(office, &table, fingerprint).await?;
        }
        Ok(out)
    }

    /// Write a fresh table covering `[from, from + days)` for an office.
    /// Refuses to replace an existing sheet unless `overwrite` is set.
    pub async fn seed_office(
        &self,
        session: &Session,
        office: &str,
        from: NaiveDate,
        days: u32,
        overwrite: bool,
    ) -> Result<usize, EngineError> {
        Self::check_session(session)?;
        let office = self.office(office)?;
        if days == 0 || days > crate::limits::MAX_HORIZON_DAYS {
            return Err(EngineError::LimitExceeded("seed horizon out of range"));
        }
        let lock = self.office_lock(office);
        let _guard = lock.lock().await;

        let key = office.storage_key.as_str();
        if !overwrite {
            match self.store.load(key).await {
                Ok(_) => {
                    return Err(EngineError::Validation(format!(
                        "{} already has a table",
                        office.name
                    )));
                }
                Err(crate::store::StoreError::Missing(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        let table = SlotTable::seed(office.resources.clone(), from, days);
        let encoded = sheet::encode(&table, office);
        with_retry(&self.retry, "save", key, || self.store.save(key, &encoded)).await?;
        tracing::info!("seeded {} with {} rows from {from}", office.name, table.rows().len());
        Ok(table.rows().len())
    }
}

/// Record outcome and latency of one engine operation.
pub(super) fn record_operation<T>(op: &'static str, started: Instant, result: &Result<T, EngineError>) {
    let status = crate::observability::status_label(result);
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}
