//! Append-only activity logs.
//!
//! Two interchangeable backends:
//! - `MemoryActivityStore`: transient, lost on restart
//! - `SqliteActivityStore`: durable, one table per activity kind
//!
//! Both purge lazily: expired records are dropped by the next count, never
//! by a background sweep.

pub mod cursor;
pub mod memory;
pub mod sqlite;

pub use cursor::CursorTable;
pub use memory::MemoryActivityStore;
pub use sqlite::SqliteActivityStore;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::{Activity, ActivityKind, Clock, Filter, Record, SubjectId, TenantId};
use crate::config::{StorageBackend, StorageConfig};
use crate::error::{GuardError, GuardResult, StoreResult};

/// Time-ordered record log for one activity kind.
pub trait ActivityStore: Send + Sync {
    /// Which activity kind this store holds.
    fn kind(&self) -> ActivityKind;

    /// Append a record stamped with the current clock time.
    fn insert(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
        activity: Activity,
    ) -> StoreResult<Record>;

    /// Undo an `insert`: drop the newest stored copy of `record`.
    /// Returns false when no copy is left.
    fn remove(&self, record: &Record) -> StoreResult<bool>;

    /// Delete every record older than `now - window`, for all tenants.
    /// Cursors older than the window start are dropped with them.
    fn purge_older_than(&self, window: Duration) -> StoreResult<usize>;

    /// Purge, then count the tenant's matching records inside the window.
    fn count_matching(
        &self,
        tenant_id: TenantId,
        filter: &Filter,
        window: Duration,
    ) -> StoreResult<usize>;

    /// Matching records newer than the key's cursor, oldest first.
    /// Advances the cursor to now, only once the read succeeded.
    fn fetch_unconsumed(&self, tenant_id: TenantId, filter: &Filter) -> StoreResult<Vec<Record>>;
}

// ── Timestamp helpers ───────────────────────────────────────────────

/// Current time truncated to the microsecond precision both backends keep.
pub(crate) fn stamp(clock: &dyn Clock) -> DateTime<Utc> {
    from_micros(clock.now().timestamp_micros())
}

pub(crate) fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Earliest timestamp still inside `window`, in microseconds.
pub(crate) fn window_start_micros(now: DateTime<Utc>, window: Duration) -> i64 {
    let window = i64::try_from(window.as_micros()).unwrap_or(i64::MAX);
    now.timestamp_micros().saturating_sub(window)
}

// ── Factory ─────────────────────────────────────────────────────────

/// The message and join logs the engine runs against.
#[derive(Clone)]
pub struct ActivityStores {
    /// Posted messages, counted per author.
    pub messages: Arc<dyn ActivityStore>,
    /// Member joins, counted per tenant.
    pub joins: Arc<dyn ActivityStore>,
}

/// Factory: open both stores for the configured backend.
pub fn open_stores(config: &StorageConfig, clock: Arc<dyn Clock>) -> GuardResult<ActivityStores> {
    match config.backend {
        StorageBackend::Memory => Ok(ActivityStores {
            messages: Arc::new(MemoryActivityStore::new(ActivityKind::Message, clock.clone())),
            joins: Arc::new(MemoryActivityStore::new(ActivityKind::Join, clock)),
        }),
        StorageBackend::Sqlite => {
            let path = config.path.as_deref().ok_or_else(|| {
                GuardError::Config("storage.backend = \"sqlite\" requires storage.path".into())
            })?;
            Ok(ActivityStores {
                messages: Arc::new(SqliteActivityStore::open(
                    path,
                    ActivityKind::Message,
                    clock.clone(),
                )?),
                joins: Arc::new(SqliteActivityStore::open(path, ActivityKind::Join, clock)?),
            })
        }
    }
}
