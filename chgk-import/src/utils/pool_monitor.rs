//! Instrumented transactions
//!
//! Package imports hold one write transaction for the whole tree. These
//! wrappers log how long the connection waited and how long it was held so
//! that slow imports show up in the logs next to the job that caused them.

use chgk_common::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::time::Instant;

/// Transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    /// Connection to run statements on
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(Error::Internal(format!(
                "{}: transaction already finished",
                self.caller
            ))),
        }
    }

    /// Commit and log how long the connection was held
    pub async fn commit(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.commit().await?;
        log_release(self.caller, self.acquired_at, "commit");
        Ok(())
    }

    /// Roll back and log how long the connection was held
    pub async fn rollback(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.rollback().await?;
        log_release(self.caller, self.acquired_at, "rollback");
        Ok(())
    }

    fn take(&mut self) -> Result<Transaction<'c, Sqlite>> {
        self.tx.take().ok_or_else(|| {
            Error::Internal(format!("{}: transaction already finished", self.caller))
        })
    }
}

impl Drop for MonitoredTransaction<'_> {
    fn drop(&mut self) {
        // sqlx rolls the inner transaction back when it is dropped unfinished
        if self.tx.is_some() {
            log_release(self.caller, self.acquired_at, "drop");
        }
    }
}

fn log_release(caller: &'static str, acquired_at: Instant, how: &'static str) {
    let held_ms = acquired_at.elapsed().as_millis();
    if held_ms > 2000 {
        tracing::warn!(
            caller,
            held_ms,
            release = how,
            "Long transaction - write lock held for extended period"
        );
    } else {
        tracing::debug!(caller, held_ms, release = how, "Connection released");
    }
}

/// Begin a monitored transaction
///
/// ```ignore
/// let mut tx = begin_monitored(&pool, "importer::write_package").await?;
/// sqlx::query("...").execute(tx.conn()?).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();

    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        // Every pooled connection is held elsewhere
        tracing::warn!(caller, wait_ms, "Slow connection acquisition - pool may be saturated");
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx: Some(tx),
        caller,
        acquired_at: Instant::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> sqlx::SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        sqlx::query("CREATE TABLE t (v INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let pool = memory_pool().await;

        let mut tx = begin_monitored(&pool, "test::commit").await.unwrap();
        sqlx::query("INSERT INTO t (v) VALUES (1)")
            .execute(tx.conn().unwrap())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let pool = memory_pool().await;

        {
            let mut tx = begin_monitored(&pool, "test::drop").await.unwrap();
            sqlx::query("INSERT INTO t (v) VALUES (1)")
                .execute(tx.conn().unwrap())
                .await
                .unwrap();
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
