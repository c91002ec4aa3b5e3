//! Insert-or-update reconciliation for mapped incident records.

use delito_map_database::store::IncidentTransaction;
use delito_map_incident_models::IncidentRecord;
use serde::Serialize;

use crate::IngestError;

/// What the reconciliation engine did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// A row with this `object_id` did not exist; one was inserted.
    New,
    /// A row with this `object_id` existed and was overwritten in place.
    Updated,
}

impl ReconcileAction {
    /// One-letter tag used in per-feature progress lines.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::New => "N",
            Self::Updated => "U",
        }
    }
}

/// Running totals for one load run. `new + updated` always equals the
/// number of records reconciled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStats {
    /// Records inserted as new rows.
    pub new: u64,
    /// Records that overwrote an existing row.
    pub updated: u64,
}

/// Decides insert-vs-update per record on an open transaction.
///
/// When the run cleared the table first there is nothing to look up, so
/// every record is inserted directly.
pub struct Reconciler<'a> {
    txn: &'a dyn IncidentTransaction,
    skip_lookup: bool,
    stats: ReconcileStats,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler for one run. `cleared_first` must match
    /// whether the run emptied the table before the first record.
    #[must_use]
    pub fn new(txn: &'a dyn IncidentTransaction, cleared_first: bool) -> Self {
        Self {
            txn,
            skip_lookup: cleared_first,
            stats: ReconcileStats::default(),
        }
    }

    /// Persists one record, returning the tagged outcome.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Persistence`] if the lookup or write fails.
    pub async fn reconcile(
        &mut self,
        record: &IncidentRecord,
    ) -> Result<ReconcileAction, IngestError> {
        let action = if !self.skip_lookup && self.txn.contains(record.object_id).await? {
            self.txn.update(record).await?;
            ReconcileAction::Updated
        } else {
            self.txn.insert(record).await?;
            ReconcileAction::New
        };

        match action {
            ReconcileAction::New => self.stats.new += 1,
            ReconcileAction::Updated => self.stats.updated += 1,
        }

        Ok(action)
    }

    /// Totals accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> ReconcileStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use delito_map_database::store::{IncidentStore, MemoryStore};

    use super::*;

    fn record(object_id: i64, category_code: i32) -> IncidentRecord {
        let occurred_at = NaiveDate::from_ymd_opt(2020, 1, 5)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        IncidentRecord::from_parts(object_id, category_code, occurred_at, -110.95, 32.22)
    }

    #[tokio::test]
    async fn first_sighting_is_new_second_is_updated() {
        let store = MemoryStore::new();
        let txn = store.begin().await.unwrap();
        let mut reconciler = Reconciler::new(txn.as_ref(), false);

        assert_eq!(
            reconciler.reconcile(&record(1, 3)).await.unwrap(),
            ReconcileAction::New
        );
        assert_eq!(
            reconciler.reconcile(&record(1, 8)).await.unwrap(),
            ReconcileAction::Updated
        );

        let stats = reconciler.stats();
        assert_eq!(stats.new, 1);
        assert_eq!(stats.updated, 1);

        txn.commit().await.unwrap();
        let rows = store.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category_code, 8);
    }

    #[tokio::test]
    async fn cleared_run_skips_lookup_and_counts_everything_new() {
        let store = MemoryStore::new();

        // Seed a committed row that a cleared run would have deleted.
        let txn = store.begin().await.unwrap();
        txn.insert(&record(1, 3)).await.unwrap();
        txn.commit().await.unwrap();

        let txn = store.begin().await.unwrap();
        txn.clear().await.unwrap();
        let mut reconciler = Reconciler::new(txn.as_ref(), true);

        assert_eq!(
            reconciler.reconcile(&record(1, 5)).await.unwrap(),
            ReconcileAction::New
        );
        assert_eq!(
            reconciler.reconcile(&record(2, 3)).await.unwrap(),
            ReconcileAction::New
        );

        let stats = reconciler.stats();
        assert_eq!(stats.new, 2);
        assert_eq!(stats.updated, 0);
    }
}
