//! The incident store seam.
//!
//! [`IncidentStore`] hands out [`IncidentTransaction`]s; every mutation a
//! load run performs goes through one transaction, so a run either commits
//! wholesale or leaves the table untouched. [`PostgresStore`] is the real
//! `PostGIS` implementation; [`MemoryStore`] backs the pipeline tests and
//! dry local runs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use delito_map_incident_models::IncidentRecord;
use switchy_database::{Database, DatabaseTransaction, DatabaseValue};

use crate::DbError;

/// Hands out transactions against the incident table.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Opens a transaction covering a whole load run.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the underlying store cannot begin a
    /// transaction.
    async fn begin(&self) -> Result<Box<dyn IncidentTransaction>, DbError>;
}

/// All mutations and lookups a load run performs, scoped to one
/// transaction. Nothing is visible to other connections until
/// [`IncidentTransaction::commit`].
#[async_trait]
pub trait IncidentTransaction: Send + Sync {
    /// Deletes every row. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the delete fails.
    async fn clear(&self) -> Result<u64, DbError>;

    /// Whether a row with this `object_id` exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the lookup fails.
    async fn contains(&self, object_id: i64) -> Result<bool, DbError>;

    /// Inserts a new row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the insert fails, including on an
    /// `object_id` uniqueness violation.
    async fn insert(&self, record: &IncidentRecord) -> Result<(), DbError>;

    /// Overwrites every field of the row keyed by `record.object_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the update fails.
    async fn update(&self, record: &IncidentRecord) -> Result<(), DbError>;

    /// Makes the transaction's changes visible.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the commit fails.
    async fn commit(self: Box<Self>) -> Result<(), DbError>;

    /// Discards the transaction's changes.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the rollback fails.
    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}

// ── PostGIS implementation ───────────────────────────────────────────────

/// Incident store backed by the `crime_incidents` `PostGIS` table.
pub struct PostgresStore {
    db: Box<dyn Database>,
}

impl PostgresStore {
    /// Wraps an open database connection.
    #[must_use]
    pub fn new(db: Box<dyn Database>) -> Self {
        Self { db }
    }

    /// The underlying connection, for queries outside the store seam.
    #[must_use]
    pub fn database(&self) -> &dyn Database {
        self.db.as_ref()
    }
}

#[async_trait]
impl IncidentStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn IncidentTransaction>, DbError> {
        let txn = self.db.begin_transaction().await?;
        Ok(Box::new(PostgresTransaction { txn }))
    }
}

struct PostgresTransaction {
    txn: Box<dyn DatabaseTransaction>,
}

/// Builds the parameter list shared by insert and update: every column
/// except the key, in statement order `$2..=$11`.
fn record_params(record: &IncidentRecord) -> Vec<DatabaseValue> {
    vec![
        DatabaseValue::Int32(record.category_code),
        DatabaseValue::String(record.category_label.clone()),
        DatabaseValue::DateTime(record.occurred_at),
        DatabaseValue::String(record.occurred_date.to_string()),
        DatabaseValue::String(record.occurred_time.to_string()),
        DatabaseValue::Int32(record.occurred_year),
        DatabaseValue::Int32(i32::try_from(record.occurred_month).unwrap_or(0)),
        DatabaseValue::Int32(i32::try_from(record.occurred_day).unwrap_or(0)),
        DatabaseValue::Real64(record.longitude),
        DatabaseValue::Real64(record.latitude),
    ]
}

#[async_trait]
impl IncidentTransaction for PostgresTransaction {
    async fn clear(&self) -> Result<u64, DbError> {
        let removed = self
            .txn
            .as_ref()
            .exec_raw_params("DELETE FROM crime_incidents", &[])
            .await?;
        Ok(removed)
    }

    async fn contains(&self, object_id: i64) -> Result<bool, DbError> {
        let rows = self
            .txn
            .as_ref()
            .query_raw_params(
                "SELECT object_id FROM crime_incidents WHERE object_id = $1",
                &[DatabaseValue::Int64(object_id)],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn insert(&self, record: &IncidentRecord) -> Result<(), DbError> {
        let mut params = vec![DatabaseValue::Int64(record.object_id)];
        params.extend(record_params(record));

        self.txn
            .as_ref()
            .exec_raw_params(
                "INSERT INTO crime_incidents (
                    object_id, category_code, category_label,
                    occurred_at, occurred_date, occurred_time,
                    occurred_year, occurred_month, occurred_day,
                    location
                ) VALUES (
                    $1, $2, $3, $4, $5::date, $6::time, $7, $8, $9,
                    ST_SetSRID(ST_MakePoint($10, $11), 4326)::geography
                )",
                &params,
            )
            .await?;

        Ok(())
    }

    async fn update(&self, record: &IncidentRecord) -> Result<(), DbError> {
        let mut params = vec![DatabaseValue::Int64(record.object_id)];
        params.extend(record_params(record));

        self.txn
            .as_ref()
            .exec_raw_params(
                "UPDATE crime_incidents SET
                    category_code = $2,
                    category_label = $3,
                    occurred_at = $4,
                    occurred_date = $5::date,
                    occurred_time = $6::time,
                    occurred_year = $7,
                    occurred_month = $8,
                    occurred_day = $9,
                    location = ST_SetSRID(ST_MakePoint($10, $11), 4326)::geography
                 WHERE object_id = $1",
                &params,
            )
            .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.txn.rollback().await?;
        Ok(())
    }
}

// ── In-memory implementation ─────────────────────────────────────────────

type Rows = BTreeMap<i64, IncidentRecord>;

fn lock(rows: &Mutex<Rows>) -> MutexGuard<'_, Rows> {
    rows.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory incident store with transactional semantics.
///
/// Transactions stage a copy of the table and swap it in on commit, so
/// rollback (or dropping the transaction) leaves the shared state exactly
/// as it was — the same observable behavior as the `PostGIS` store.
#[derive(Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<Rows>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All committed rows, ordered by `object_id`.
    #[must_use]
    pub fn snapshot(&self) -> Vec<IncidentRecord> {
        lock(&self.rows).values().cloned().collect()
    }

    /// Number of committed rows.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    /// Whether the store holds no committed rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn IncidentTransaction>, DbError> {
        let staged = lock(&self.rows).clone();
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.rows),
            staged: Mutex::new(staged),
        }))
    }
}

struct MemoryTransaction {
    shared: Arc<Mutex<Rows>>,
    staged: Mutex<Rows>,
}

#[async_trait]
impl IncidentTransaction for MemoryTransaction {
    async fn clear(&self) -> Result<u64, DbError> {
        let mut staged = lock(&self.staged);
        let removed = staged.len() as u64;
        staged.clear();
        Ok(removed)
    }

    async fn contains(&self, object_id: i64) -> Result<bool, DbError> {
        Ok(lock(&self.staged).contains_key(&object_id))
    }

    async fn insert(&self, record: &IncidentRecord) -> Result<(), DbError> {
        let mut staged = lock(&self.staged);
        if staged.contains_key(&record.object_id) {
            return Err(DbError::DuplicateObjectId {
                object_id: record.object_id,
            });
        }
        staged.insert(record.object_id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &IncidentRecord) -> Result<(), DbError> {
        lock(&self.staged).insert(record.object_id, record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        let staged = self.staged.into_inner().unwrap_or_else(PoisonError::into_inner);
        *lock(&self.shared) = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        Ok(())
    }
}
