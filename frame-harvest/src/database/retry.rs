//! Busy-lock retry for catalog writes.
//!
//! The coordinator and a concurrent `sync` or `info --resolve-names` can race
//! for the SQLite write lock. `BEGIN IMMEDIATE` fails fast with SQLITE_BUSY in
//! that case; the write is replayed after a short jittered pause.

use std::future::Future;
use std::time::Duration;

use rand::random;
use tracing::debug;

use crate::{Error, Result};

/// Replays after the first attempt.
const MAX_BUSY_REPLAYS: u32 = 8;
const BUSY_BASE_DELAY: Duration = Duration::from_millis(10);
const BUSY_MAX_DELAY: Duration = Duration::from_secs(2);

/// SQLITE_BUSY (5) or SQLITE_LOCKED (6), by code or by message.
fn is_catalog_busy(err: &Error) -> bool {
    let Error::DatabaseSqlx(sqlx_err) = err else {
        return false;
    };

    let message = match sqlx_err {
        sqlx::Error::Database(db_err) => {
            if matches!(db_err.code().as_deref(), Some("5" | "6")) {
                return true;
            }
            db_err.message().to_ascii_lowercase()
        }
        other => other.to_string().to_ascii_lowercase(),
    };
    message.contains("database is locked") || message.contains("database is busy")
}

/// Pause before replay number `replay` (0-based): doubling from the base,
/// capped, plus up to a quarter of jitter, never above the cap.
fn busy_delay(replay: u32) -> Duration {
    let backoff = BUSY_BASE_DELAY
        .saturating_mul(1u32 << replay.min(16))
        .min(BUSY_MAX_DELAY);
    let jitter_ms = random::<u64>() % (backoff.as_millis() as u64 / 4 + 1);
    (backoff + Duration::from_millis(jitter_ms)).min(BUSY_MAX_DELAY)
}

/// Run the catalog write `op`, replaying it while the database is busy.
/// Any other error is returned at once.
pub async fn retry_on_sqlite_busy<T, F, Fut>(operation: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut replay = 0u32;
    loop {
        match op().await {
            Err(err) if replay < MAX_BUSY_REPLAYS && is_catalog_busy(&err) => {
                let delay = busy_delay(replay);
                replay += 1;
                debug!(
                    operation,
                    delay_ms = delay.as_millis() as u64,
                    replay,
                    max_replays = MAX_BUSY_REPLAYS,
                    "Catalog busy, replaying write"
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}
