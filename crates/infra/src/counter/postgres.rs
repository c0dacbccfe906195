//! Postgres-backed revocation counter.
//!
//! One row per principal that has ever been issued a refresh credential or
//! been revoked. A missing row reads as zero.
//!
//! ## Atomicity
//!
//! `increment_and_get` is a single `INSERT .. ON CONFLICT DO UPDATE ..
//! RETURNING` statement. Postgres serializes concurrent upserts on the same
//! primary key, so every caller observes a distinct value and no increment
//! is lost. A cancelled call either committed the statement or did not;
//! there is no intermediate state.
//!
//! ## Error Mapping
//!
//! | SQLx Error | CounterError |
//! |------------|--------------|
//! | Database | `Backend` (with SQLSTATE when present) |
//! | PoolClosed / PoolTimedOut | `Backend` |
//! | Other | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use gatekeep_auth::{CounterError, RevocationCounter};
use gatekeep_core::PrincipalId;

/// Schema for the counter table. Idempotent.
pub const MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS revocation_counters (
    principal_id BIGINT PRIMARY KEY,
    counter      BIGINT NOT NULL CHECK (counter >= 0)
)
"#;

#[derive(Debug, Clone)]
pub struct PostgresRevocationCounter {
    pool: Arc<PgPool>,
}

impl PostgresRevocationCounter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, CounterError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply [`MIGRATION`].
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), CounterError> {
        sqlx::query(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RevocationCounter for PostgresRevocationCounter {
    #[instrument(skip(self), fields(principal_id = %principal_id), err)]
    async fn get(&self, principal_id: PrincipalId) -> Result<u64, CounterError> {
        let key = to_key(principal_id)?;
        let value: Option<i64> =
            sqlx::query_scalar("SELECT counter FROM revocation_counters WHERE principal_id = $1")
                .bind(key)
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("get", e))?;

        value.map(from_value).transpose().map(Option::unwrap_or_default)
    }

    #[instrument(skip(self), fields(principal_id = %principal_id), err)]
    async fn increment_and_get(&self, principal_id: PrincipalId) -> Result<u64, CounterError> {
        let key = to_key(principal_id)?;
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO revocation_counters (principal_id, counter)
            VALUES ($1, 1)
            ON CONFLICT (principal_id)
            DO UPDATE SET counter = revocation_counters.counter + 1
            RETURNING counter
            "#,
        )
        .bind(key)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("increment_and_get", e))?;

        from_value(value)
    }

    #[instrument(skip(self), fields(principal_id = %principal_id), err)]
    async fn remove(&self, principal_id: PrincipalId) -> Result<(), CounterError> {
        let key = to_key(principal_id)?;
        sqlx::query("DELETE FROM revocation_counters WHERE principal_id = $1")
            .bind(key)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove", e))?;
        Ok(())
    }
}

// BIGINT is signed; ids above i64::MAX cannot be stored.
fn to_key(principal_id: PrincipalId) -> Result<i64, CounterError> {
    i64::try_from(principal_id.get()).map_err(|_| {
        CounterError::Backend(format!(
            "principal id {principal_id} exceeds the BIGINT range"
        ))
    })
}

fn from_value(value: i64) -> Result<u64, CounterError> {
    u64::try_from(value)
        .map_err(|_| CounterError::Backend(format!("negative counter value {value} in storage")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> CounterError {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => CounterError::Backend(format!(
                "database error in {operation} ({code}): {}",
                db_err.message()
            )),
            None => CounterError::Backend(format!(
                "database error in {operation}: {}",
                db_err.message()
            )),
        },
        sqlx::Error::PoolClosed => {
            CounterError::Backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            CounterError::Backend(format!("connection pool timed out in {operation}"))
        }
        other => CounterError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
