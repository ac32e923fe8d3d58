use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::activity::{Filter, TenantId};

/// Last-fetch timestamps per (tenant, filter) key.
///
/// Owned by one store instance and never persisted: a fresh process starts
/// with every cursor at the epoch, even over a durable backend.
#[derive(Debug, Default)]
pub struct CursorTable {
    last_fetched: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CursorTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(tenant_id: TenantId, filter: &Filter) -> String {
        format!("{tenant_id}:{filter}")
    }

    /// Current cursor for the key, without moving it.
    pub fn peek(&self, tenant_id: TenantId, filter: &Filter) -> DateTime<Utc> {
        self.last_fetched
            .lock()
            .get(&Self::key(tenant_id, filter))
            .copied()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Return the previous cursor for the key and move it to `now`.
    pub fn advance(&self, tenant_id: TenantId, filter: &Filter, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut cursors = self.last_fetched.lock();
        let slot = cursors
            .entry(Self::key(tenant_id, filter))
            .or_insert(DateTime::<Utc>::UNIX_EPOCH);
        let previous = *slot;
        if now > *slot {
            *slot = now;
        }
        previous
    }

    /// Drop cursors older than `start`. Once every record before `start` is
    /// purged, such a cursor selects the same records as a missing one.
    pub fn forget_before(&self, start: DateTime<Utc>) -> usize {
        let mut cursors = self.last_fetched.lock();
        let before = cursors.len();
        cursors.retain(|_, at| *at >= start);
        before - cursors.len()
    }

    pub fn len(&self) -> usize {
        self.last_fetched.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
