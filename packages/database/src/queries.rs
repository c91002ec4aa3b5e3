//! Plain (non-transactional) queries against the incident table.

use moosicbox_json_utils::database::ToValue as _;
use switchy_database::Database;

use crate::DbError;

/// Returns the number of rows currently in `crime_incidents`.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn count_incidents(db: &dyn Database) -> Result<u64, DbError> {
    let rows = db
        .query_raw_params("SELECT COUNT(*) as cnt FROM crime_incidents", &[])
        .await?;

    let count: i64 = rows
        .first()
        .map_or(Ok(0), |row| row.to_value("cnt"))
        .map_err(|e| DbError::Conversion {
            message: format!("Failed to parse incident count: {e}"),
        })?;

    Ok(u64::try_from(count).unwrap_or(0))
}
