//! SQLite-backed activity store.
//!
//! Tables (one per activity kind, both created on open):
//! - `message_activity`: tenant_id, unix_time, user_id, channel_id, message_id
//! - `join_activity`: tenant_id, unix_time, user_id
//!
//! `unix_time` is microseconds since the epoch. Ids are stored as the
//! bit-identical `i64` of their `u64` value. Cursors stay in memory.

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{from_micros, stamp, window_start_micros, ActivityStore, CursorTable};
use crate::activity::{Activity, ActivityKind, Clock, Filter, Record, SubjectId, TenantId};
use crate::error::{StoreError, StoreResult};

/// Durable activity log for one activity kind.
pub struct SqliteActivityStore {
    kind: ActivityKind,
    conn: Mutex<Connection>,
    cursors: CursorTable,
    clock: Arc<dyn Clock>,
}

impl SqliteActivityStore {
    /// Open (or create) the activity database at the given path.
    /// Message and join stores may share one file.
    pub fn open(db_path: &Path, kind: ActivityKind, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        Self::from_connection(conn, kind, clock)
    }

    /// Private in-memory database (for tests).
    pub fn open_in_memory(kind: ActivityKind, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, kind, clock)
    }

    fn from_connection(
        conn: Connection,
        kind: ActivityKind,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            kind,
            conn: Mutex::new(conn),
            cursors: CursorTable::new(),
            clock,
        })
    }

    /// Number of fetch cursors currently tracked.
    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    fn select_columns(&self) -> &'static str {
        match self.kind {
            ActivityKind::Message => "tenant_id, unix_time, user_id, channel_id, message_id",
            ActivityKind::Join => "tenant_id, unix_time, user_id",
        }
    }

    fn read_record(&self, row: &Row<'_>) -> rusqlite::Result<Record> {
        let activity = match self.kind {
            ActivityKind::Message => Activity::MessagePosted {
                channel_id: from_sql_id(row.get(3)?),
                message_id: from_sql_id(row.get(4)?),
            },
            ActivityKind::Join => Activity::MemberJoined,
        };
        Ok(Record {
            tenant_id: from_sql_id(row.get(0)?),
            timestamp: from_micros(row.get(1)?),
            subject_id: from_sql_id(row.get(2)?),
            activity,
        })
    }
}

// ── Schema ──────────────────────────────────────────────────────────

/// Create both activity tables if missing.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS message_activity (
            tenant_id  INTEGER NOT NULL,
            unix_time  INTEGER NOT NULL,
            user_id    INTEGER NOT NULL,
            channel_id INTEGER NOT NULL,
            message_id INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_message_activity_tenant_time
            ON message_activity(tenant_id, unix_time);
        CREATE INDEX IF NOT EXISTS idx_message_activity_time ON message_activity(unix_time);

        CREATE TABLE IF NOT EXISTS join_activity (
            tenant_id INTEGER NOT NULL,
            unix_time INTEGER NOT NULL,
            user_id   INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_join_activity_tenant_time
            ON join_activity(tenant_id, unix_time);
        CREATE INDEX IF NOT EXISTS idx_join_activity_time ON join_activity(unix_time);",
    )
}

// ── Row helpers ─────────────────────────────────────────────────────

fn to_sql_id(id: u64) -> i64 {
    id as i64
}

fn from_sql_id(id: i64) -> u64 {
    id as u64
}

/// Build `AND "col" = ?n` clauses for the filter, numbering from `first_param`.
fn filter_clause(filter: &Filter, first_param: usize) -> (String, Vec<i64>) {
    let mut clause = String::new();
    let mut values = Vec::with_capacity(filter.conditions().len());
    for (i, (attribute, value)) in filter.conditions().iter().enumerate() {
        clause.push_str(&format!(" AND \"{}\" = ?{}", attribute.column(), first_param + i));
        values.push(to_sql_id(*value));
    }
    (clause, values)
}

fn delete_expired(conn: &Connection, table: &str, start_micros: i64) -> rusqlite::Result<usize> {
    conn.execute(
        &format!("DELETE FROM {table} WHERE unix_time < ?1"),
        params![start_micros],
    )
}

// ── ActivityStore impl ──────────────────────────────────────────────

impl ActivityStore for SqliteActivityStore {
    fn kind(&self) -> ActivityKind {
        self.kind
    }

    fn insert(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
        activity: Activity,
    ) -> StoreResult<Record> {
        if activity.kind() != self.kind {
            return Err(StoreError::KindMismatch {
                expected: self.kind,
                got: activity.kind(),
            });
        }
        let record = Record {
            timestamp: stamp(self.clock.as_ref()),
            tenant_id,
            subject_id,
            activity,
        };
        let unix_time = record.timestamp.timestamp_micros();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        match activity {
            Activity::MessagePosted {
                channel_id,
                message_id,
            } => {
                tx.execute(
                    "INSERT INTO message_activity (tenant_id, unix_time, user_id, channel_id, message_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        to_sql_id(tenant_id),
                        unix_time,
                        to_sql_id(subject_id),
                        to_sql_id(channel_id),
                        to_sql_id(message_id),
                    ],
                )?;
            }
            Activity::MemberJoined => {
                tx.execute(
                    "INSERT INTO join_activity (tenant_id, unix_time, user_id) VALUES (?1, ?2, ?3)",
                    params![to_sql_id(tenant_id), unix_time, to_sql_id(subject_id)],
                )?;
            }
        }
        tx.commit()?;
        Ok(record)
    }

    fn remove(&self, record: &Record) -> StoreResult<bool> {
        let table = self.kind.table_name();
        let mut bind = vec![
            to_sql_id(record.tenant_id),
            record.timestamp.timestamp_micros(),
            to_sql_id(record.subject_id),
        ];
        let mut clause = String::new();
        if let Activity::MessagePosted {
            channel_id,
            message_id,
        } = record.activity
        {
            clause.push_str(" AND channel_id = ?4 AND message_id = ?5");
            bind.push(to_sql_id(channel_id));
            bind.push(to_sql_id(message_id));
        }
        let sql = format!(
            "DELETE FROM {table} WHERE rowid = (
                SELECT MAX(rowid) FROM {table}
                WHERE tenant_id = ?1 AND unix_time = ?2 AND user_id = ?3{clause}
            )"
        );

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute(&sql, params_from_iter(bind))?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn purge_older_than(&self, window: Duration) -> StoreResult<usize> {
        let start = window_start_micros(self.clock.now(), window);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let removed = delete_expired(&tx, self.kind.table_name(), start)?;
        tx.commit()?;
        self.cursors.forget_before(from_micros(start));
        Ok(removed)
    }

    fn count_matching(
        &self,
        tenant_id: TenantId,
        filter: &Filter,
        window: Duration,
    ) -> StoreResult<usize> {
        filter.check_supported(self.kind)?;
        let table = self.kind.table_name();
        let start = window_start_micros(self.clock.now(), window);
        let (clause, values) = filter_clause(filter, 3);
        let sql = format!(
            "SELECT COUNT(*) FROM {table} WHERE tenant_id = ?1 AND unix_time >= ?2{clause}"
        );

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        delete_expired(&tx, table, start)?;
        let bind = [to_sql_id(tenant_id), start].into_iter().chain(values);
        let count: i64 = tx.query_row(&sql, params_from_iter(bind), |row| row.get(0))?;
        tx.commit()?;
        self.cursors.forget_before(from_micros(start));
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn fetch_unconsumed(&self, tenant_id: TenantId, filter: &Filter) -> StoreResult<Vec<Record>> {
        filter.check_supported(self.kind)?;
        let (clause, values) = filter_clause(filter, 3);
        let sql = format!(
            "SELECT {} FROM {} WHERE tenant_id = ?1 AND unix_time > ?2{clause} ORDER BY rowid",
            self.select_columns(),
            self.kind.table_name(),
        );

        let mut conn = self.conn.lock();
        let now = stamp(self.clock.as_ref());
        let since = self.cursors.peek(tenant_id, filter).timestamp_micros();
        let tx = conn.transaction()?;
        let records = {
            let mut stmt = tx.prepare(&sql)?;
            let bind = [to_sql_id(tenant_id), since].into_iter().chain(values);
            let rows = stmt.query_map(params_from_iter(bind), |row| self.read_record(row))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.commit()?;
        self.cursors.advance(tenant_id, filter, now);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{Attribute, ManualClock};
    use tempfile::TempDir;

    fn message(channel_id: u64, message_id: u64) -> Activity {
        Activity::MessagePosted {
            channel_id,
            message_id,
        }
    }

    fn store(kind: ActivityKind) -> (Arc<ManualClock>, SqliteActivityStore) {
        let clock = Arc::new(ManualClock::at_secs(1_700_000_000));
        let store = SqliteActivityStore::open_in_memory(kind, clock.clone()).unwrap();
        (clock, store)
    }

    #[test]
    fn insert_and_count() {
        let (_clock, store) = store(ActivityKind::Message);
        store.insert(1, 10, message(100, 1)).unwrap();
        store.insert(1, 11, message(100, 2)).unwrap();
        let window = Duration::from_secs(5);
        assert_eq!(store.count_matching(1, &Filter::subject(10), window).unwrap(), 1);
        assert_eq!(store.count_matching(1, &Filter::any(), window).unwrap(), 2);
        assert_eq!(store.count_matching(2, &Filter::any(), window).unwrap(), 0);
    }

    #[test]
    fn count_purges_expired_rows() {
        let (clock, store) = store(ActivityKind::Join);
        store.insert(1, 10, Activity::MemberJoined).unwrap();
        clock.advance(Duration::from_secs(4));
        store.insert(1, 11, Activity::MemberJoined).unwrap();
        clock.advance(Duration::from_secs(2));

        assert_eq!(
            store
                .count_matching(1, &Filter::any(), Duration::from_secs(3))
                .unwrap(),
            1
        );
        let remaining: i64 = store
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM join_activity", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn purge_is_idempotent() {
        let (clock, store) = store(ActivityKind::Message);
        store.insert(1, 10, message(100, 1)).unwrap();
        clock.advance(Duration::from_secs(10));
        let window = Duration::from_secs(5);
        assert_eq!(store.purge_older_than(window).unwrap(), 1);
        assert_eq!(store.purge_older_than(window).unwrap(), 0);
    }

    #[test]
    fn fetch_returns_typed_records_once() {
        let (clock, store) = store(ActivityKind::Message);
        let inserted = store.insert(1, 10, message(100, 1)).unwrap();
        store.insert(1, 10, message(200, 2)).unwrap();
        clock.advance(Duration::from_millis(1));

        let fetched = store.fetch_unconsumed(1, &Filter::subject(10)).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0], inserted);
        assert_eq!(fetched[1].attribute(Attribute::Channel), Some(200));
        assert!(store.fetch_unconsumed(1, &Filter::subject(10)).unwrap().is_empty());
    }

    #[test]
    fn remove_undoes_one_insert() {
        let (_clock, store) = store(ActivityKind::Message);
        let kept = store.insert(1, 10, message(100, 1)).unwrap();
        let undone = store.insert(1, 10, message(100, 2)).unwrap();

        assert!(store.remove(&undone).unwrap());
        assert!(!store.remove(&undone).unwrap());
        let left = store.fetch_unconsumed(1, &Filter::subject(10));
        assert_eq!(left.unwrap(), vec![kept]);
    }

    #[test]
    fn remove_join_record() {
        let (_clock, store) = store(ActivityKind::Join);
        let joined = store.insert(1, 10, Activity::MemberJoined).unwrap();
        store.insert(1, 11, Activity::MemberJoined).unwrap();
        assert!(store.remove(&joined).unwrap());
        assert_eq!(
            store
                .count_matching(1, &Filter::any(), Duration::from_secs(5))
                .unwrap(),
            1
        );
    }

    #[test]
    fn count_releases_stale_cursors() {
        let (clock, store) = store(ActivityKind::Message);
        store.insert(1, 10, message(100, 1)).unwrap();
        store.fetch_unconsumed(1, &Filter::subject(10)).unwrap();
        assert_eq!(store.cursor_count(), 1);

        clock.advance(Duration::from_secs(10));
        store
            .count_matching(1, &Filter::subject(10), Duration::from_secs(5))
            .unwrap();
        assert_eq!(store.cursor_count(), 0);
    }

    #[test]
    fn large_snowflakes_round_trip() {
        let (_clock, store) = store(ActivityKind::Message);
        let big = u64::MAX - 7;
        store.insert(big, big, message(big, big)).unwrap();
        let fetched = store.fetch_unconsumed(big, &Filter::subject(big)).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].tenant_id, big);
        assert_eq!(fetched[0].attribute(Attribute::Message), Some(big));
    }

    #[test]
    fn unsupported_filter_is_rejected() {
        let (_clock, store) = store(ActivityKind::Join);
        let filter = Filter::any().and(Attribute::Message, 1);
        assert!(matches!(
            store.count_matching(1, &filter, Duration::from_secs(1)),
            Err(StoreError::UnsupportedFilter { .. })
        ));
        assert!(matches!(
            store.fetch_unconsumed(1, &filter),
            Err(StoreError::UnsupportedFilter { .. })
        ));
    }

    #[test]
    fn records_survive_reopen_but_cursors_do_not() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("activity.db");
        let clock = Arc::new(ManualClock::at_secs(1_700_000_000));
        {
            let store =
                SqliteActivityStore::open(&path, ActivityKind::Join, clock.clone()).unwrap();
            store.insert(1, 10, Activity::MemberJoined).unwrap();
            clock.advance(Duration::from_millis(1));
            assert_eq!(store.fetch_unconsumed(1, &Filter::any()).unwrap().len(), 1);
        }

        let reopened = SqliteActivityStore::open(&path, ActivityKind::Join, clock).unwrap();
        assert_eq!(
            reopened
                .count_matching(1, &Filter::any(), Duration::from_secs(60))
                .unwrap(),
            1
        );
        assert_eq!(reopened.fetch_unconsumed(1, &Filter::any()).unwrap().len(), 1);
    }

    #[test]
    fn message_and_join_stores_share_a_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("activity.db");
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_secs(1_700_000_000));
        let messages =
            SqliteActivityStore::open(&path, ActivityKind::Message, clock.clone()).unwrap();
        let joins = SqliteActivityStore::open(&path, ActivityKind::Join, clock).unwrap();

        messages.insert(1, 10, message(100, 1)).unwrap();
        joins.insert(1, 10, Activity::MemberJoined).unwrap();
        joins.insert(1, 11, Activity::MemberJoined).unwrap();

        let window = Duration::from_secs(5);
        assert_eq!(messages.count_matching(1, &Filter::any(), window).unwrap(), 1);
        assert_eq!(joins.count_matching(1, &Filter::any(), window).unwrap(), 2);
    }
}
