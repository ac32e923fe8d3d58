//! Per-key enforcement latch.
//!
//! Turns a raw "over limit" signal into one enforcement episode per burst:
//!
//! ```text
//!   Clear   --over-->  Tripped   (BulkDrain)
//!   Tripped --over-->  Tripped   (Single)
//!   Tripped --under--> Clear     (Ignore)
//!   Clear   --under--> Clear     (Ignore)
//! ```
//!
//! Only tripped latches are stored. A missing entry reads as `Clear`.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::activity::{ActivityKind, Filter, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatchState {
    #[default]
    Clear,
    Tripped,
}

/// What the engine should act on after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing to do.
    Ignore,
    /// Episode start: act on every buffered record for the key.
    BulkDrain,
    /// Episode continues: act on the newest record only.
    Single,
}

/// Pure transition function.
pub fn transition(state: LatchState, over_limit: bool) -> (LatchState, Step) {
    match (state, over_limit) {
        (LatchState::Clear, false) => (LatchState::Clear, Step::Ignore),
        (LatchState::Clear, true) => (LatchState::Tripped, Step::BulkDrain),
        (LatchState::Tripped, true) => (LatchState::Tripped, Step::Single),
        (LatchState::Tripped, false) => (LatchState::Clear, Step::Ignore),
    }
}

/// Identity of one latch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LatchKey {
    pub tenant_id: TenantId,
    /// Which limit the latch guards.
    pub kind: ActivityKind,
    /// Record key within the tenant (author for messages, empty for joins).
    pub filter: Filter,
}

impl LatchKey {
    pub fn new(tenant_id: TenantId, kind: ActivityKind, filter: Filter) -> Self {
        Self {
            tenant_id,
            kind,
            filter,
        }
    }
}

/// Latch table for every tripped (tenant, limit kind, key).
#[derive(Debug, Default)]
pub struct EnforcementController {
    latches: Mutex<HashMap<LatchKey, LatchState>>,
}

impl EnforcementController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one evaluation result to the key's latch.
    pub fn evaluate(&self, key: &LatchKey, over_limit: bool) -> Step {
        let mut latches = self.latches.lock();
        let state = latches.get(key).copied().unwrap_or_default();
        let (next, step) = transition(state, over_limit);
        store_state(&mut latches, key, next);
        step
    }

    pub fn state(&self, key: &LatchKey) -> LatchState {
        self.latches.lock().get(key).copied().unwrap_or_default()
    }

    /// Record a state computed with [`transition`]. Callers step the latch
    /// this way once every side effect of the step has succeeded.
    pub fn commit(&self, key: &LatchKey, next: LatchState) {
        store_state(&mut self.latches.lock(), key, next);
    }

    /// Number of latches held in memory.
    pub fn len(&self) -> usize {
        self.latches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every latch of a tenant (e.g. when the bot leaves a guild).
    pub fn clear_tenant(&self, tenant_id: TenantId) -> usize {
        let mut latches = self.latches.lock();
        let before = latches.len();
        latches.retain(|key, _| key.tenant_id != tenant_id);
        before - latches.len()
    }

    /// Number of tripped latches, across tenants.
    pub fn tripped_count(&self) -> usize {
        self.latches
            .lock()
            .values()
            .filter(|s| **s == LatchState::Tripped)
            .count()
    }
}

fn store_state(latches: &mut HashMap<LatchKey, LatchState>, key: &LatchKey, next: LatchState) {
    match next {
        LatchState::Clear => {
            latches.remove(key);
        }
        LatchState::Tripped => {
            latches.insert(key.clone(), next);
        }
    }
}
