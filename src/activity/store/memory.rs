use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::{from_micros, stamp, window_start_micros, ActivityStore, CursorTable};
use crate::activity::{Activity, ActivityKind, Clock, Filter, Record, SubjectId, TenantId};
use crate::error::{StoreError, StoreResult};

/// Transient activity log. Contents and cursors are lost on restart.
pub struct MemoryActivityStore {
    kind: ActivityKind,
    records: Mutex<Vec<Record>>,
    cursors: CursorTable,
    clock: Arc<dyn Clock>,
}

impl MemoryActivityStore {
    pub fn new(kind: ActivityKind, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            records: Mutex::new(Vec::new()),
            cursors: CursorTable::new(),
            clock,
        }
    }

    /// Number of records currently held, across tenants.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fetch cursors currently tracked.
    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }
}

impl ActivityStore for MemoryActivityStore {
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
        self.records.lock().push(record.clone());
        Ok(record)
    }

    fn remove(&self, record: &Record) -> StoreResult<bool> {
        let mut records = self.records.lock();
        match records.iter().rposition(|r| r == record) {
            Some(pos) => {
                records.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn purge_older_than(&self, window: Duration) -> StoreResult<usize> {
        let start = window_start_micros(self.clock.now(), window);
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| r.timestamp.timestamp_micros() >= start);
        self.cursors.forget_before(from_micros(start));
        Ok(before - records.len())
    }

    fn count_matching(
        &self,
        tenant_id: TenantId,
        filter: &Filter,
        window: Duration,
    ) -> StoreResult<usize> {
        filter.check_supported(self.kind)?;
        self.purge_older_than(window)?;
        let start = window_start_micros(self.clock.now(), window);
        let records = self.records.lock();
        Ok(records
            .iter()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.timestamp.timestamp_micros() >= start
                    && filter.matches(r)
            })
            .count())
    }

    fn fetch_unconsumed(&self, tenant_id: TenantId, filter: &Filter) -> StoreResult<Vec<Record>> {
        filter.check_supported(self.kind)?;
        let records = self.records.lock();
        let since = self
            .cursors
            .advance(tenant_id, filter, stamp(self.clock.as_ref()));
        Ok(records
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.timestamp > since && filter.matches(r))
            .cloned()
            .collect())
    }
}
