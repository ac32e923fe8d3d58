//! Per-event entry point.
//!
//! For every inbound event: record it, evaluate the limit for its key, step
//! the key's latch, and turn the step into an `ActionPlan`. The decision half
//! is synchronous and runs under a per-tenant lock; only dispatch awaits.
//!
//! A store failure leaves the event unprocessed: the inserted record is
//! undone and the latch keeps its previous state.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::slice;
use std::sync::Arc;

use crate::activity::{
    open_stores, Activity, ActivityLimit, ActivityStores, ChannelId, Clock, Filter, MessageId,
    RateLimiter, Record, SubjectId, TenantId,
};
use crate::config::Config;
use crate::dispatch::{execute, DispatchReport, Dispatcher};
use crate::enforcement::{
    delete_messages, kick_members, transition, Action, ActionPlan, EnforcementController,
    LatchKey, LatchState, Step, FLOOD_NOTICE, RAID_KICK_REASON,
};
use crate::error::GuardResult;

// ── Inbound events ──────────────────────────────────────────────────

/// Kind of channel a message was posted in. Only text channels are policed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    Text,
    Voice,
    Other,
}

/// Inbound platform event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardEvent {
    MemberJoined {
        tenant_id: TenantId,
        subject_id: SubjectId,
    },
    MessagePosted {
        tenant_id: TenantId,
        /// Author of the message.
        subject_id: SubjectId,
        channel_id: ChannelId,
        message_id: MessageId,
        /// Defaults to `text` when the adapter does not say.
        #[serde(default)]
        channel_kind: ChannelKind,
        /// Only logged; never stored.
        #[serde(default)]
        content: String,
    },
    MemberLeft {
        tenant_id: TenantId,
        subject_id: SubjectId,
    },
}

impl GuardEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            Self::MemberJoined { tenant_id, .. }
            | Self::MessagePosted { tenant_id, .. }
            | Self::MemberLeft { tenant_id, .. } => *tenant_id,
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────────

/// Flood and raid protection engine.
pub struct AntiSpamEngine {
    enable_message_limit: bool,
    self_id: Option<SubjectId>,
    messages: RateLimiter,
    joins: RateLimiter,
    controller: EnforcementController,
    tenant_locks: Mutex<HashMap<TenantId, Arc<Mutex<()>>>>,
}

impl AntiSpamEngine {
    pub fn new(
        stores: ActivityStores,
        message_limit: ActivityLimit,
        join_limit: ActivityLimit,
        enable_message_limit: bool,
    ) -> Self {
        Self {
            enable_message_limit,
            self_id: None,
            messages: RateLimiter::new(stores.messages, message_limit),
            joins: RateLimiter::new(stores.joins, join_limit),
            controller: EnforcementController::new(),
            tenant_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Validate the config, open the configured stores and build the engine.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> GuardResult<Self> {
        config.validate()?;
        let stores = open_stores(&config.storage, clock)?;
        Ok(Self::new(
            stores,
            config.message_limit()?,
            config.join_limit()?,
            config.enable_message_limit,
        ))
    }

    /// Ignore messages authored by this account (the bot itself).
    #[must_use]
    pub fn with_self_id(mut self, self_id: SubjectId) -> Self {
        self.self_id = Some(self_id);
        self
    }

    pub fn controller(&self) -> &EnforcementController {
        &self.controller
    }

    pub fn message_limiter(&self) -> &RateLimiter {
        &self.messages
    }

    pub fn join_limiter(&self) -> &RateLimiter {
        &self.joins
    }

    /// Drop a tenant's latches and lock, e.g. after the bot leaves a guild.
    /// Returns the number of latches released.
    pub fn forget_tenant(&self, tenant_id: TenantId) -> usize {
        self.tenant_locks.lock().remove(&tenant_id);
        self.controller.clear_tenant(tenant_id)
    }

    /// Decide what to do about one event. A store error leaves the event
    /// unprocessed and is returned as is.
    pub fn decide(&self, event: &GuardEvent) -> GuardResult<ActionPlan> {
        match event {
            GuardEvent::MemberLeft {
                tenant_id,
                subject_id,
            } => {
                tracing::info!(tenant_id, subject_id, "member left");
                Ok(ActionPlan::empty())
            }
            GuardEvent::MemberJoined {
                tenant_id,
                subject_id,
            } => {
                let lock = self.tenant_lock(*tenant_id);
                let _guard = lock.lock();
                self.on_member_joined(*tenant_id, *subject_id)
            }
            GuardEvent::MessagePosted {
                tenant_id,
                subject_id,
                channel_id,
                message_id,
                channel_kind,
                content,
            } => {
                if !self.enable_message_limit
                    || *channel_kind != ChannelKind::Text
                    || self.self_id == Some(*subject_id)
                {
                    return Ok(ActionPlan::empty());
                }
                tracing::debug!(
                    tenant_id,
                    subject_id,
                    channel_id,
                    message_id,
                    len = content.len(),
                    "message posted"
                );
                let lock = self.tenant_lock(*tenant_id);
                let _guard = lock.lock();
                self.on_message_posted(*tenant_id, *subject_id, *channel_id, *message_id)
            }
        }
    }

    /// Decide, then run the plan through the dispatcher.
    pub async fn handle(
        &self,
        event: &GuardEvent,
        dispatcher: &dyn Dispatcher,
    ) -> GuardResult<DispatchReport> {
        let plan = self.decide(event)?;
        if plan.is_empty() {
            return Ok(DispatchReport::default());
        }
        Ok(execute(&plan, dispatcher).await)
    }

    fn tenant_lock(&self, tenant_id: TenantId) -> Arc<Mutex<()>> {
        self.tenant_locks
            .lock()
            .entry(tenant_id)
            .or_default()
            .clone()
    }

    // ── Per-kind decisions ──────────────────────────────────────────

    fn on_message_posted(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> GuardResult<ActionPlan> {
        let record = self.messages.store().insert(
            tenant_id,
            subject_id,
            Activity::MessagePosted {
                channel_id,
                message_id,
            },
        )?;
        let result = self.enforce_messages(tenant_id, subject_id, channel_id, &record);
        undo_on_error(&self.messages, &record, result)
    }

    fn enforce_messages(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
        channel_id: ChannelId,
        record: &Record,
    ) -> GuardResult<ActionPlan> {
        let key = self.latch_key(&self.messages, tenant_id, Filter::subject(subject_id));
        let (next, step) = self.step(&self.messages, &key)?;

        let mut plan = ActionPlan::empty();
        match step {
            Step::Ignore => {}
            Step::BulkDrain => {
                let drained = drain(&self.messages, &key, record)?;
                tracing::info!(tenant_id, subject_id, "hit the text message limit");
                plan.push(Action::Notify {
                    tenant_id,
                    channel_id,
                    text: FLOOD_NOTICE.to_string(),
                });
                plan.actions.extend(delete_messages(tenant_id, &drained));
            }
            Step::Single => {
                let newest = newest_unconsumed(&self.messages, &key, record)?;
                plan.actions
                    .extend(delete_messages(tenant_id, slice::from_ref(&newest)));
            }
        }
        self.controller.commit(&key, next);
        Ok(plan)
    }

    fn on_member_joined(&self, tenant_id: TenantId, subject_id: SubjectId) -> GuardResult<ActionPlan> {
        tracing::info!(tenant_id, subject_id, "member joined");
        let record = self
            .joins
            .store()
            .insert(tenant_id, subject_id, Activity::MemberJoined)?;
        let result = self.enforce_joins(tenant_id, &record);
        undo_on_error(&self.joins, &record, result)
    }

    fn enforce_joins(&self, tenant_id: TenantId, record: &Record) -> GuardResult<ActionPlan> {
        let key = self.latch_key(&self.joins, tenant_id, Filter::any());
        let (next, step) = self.step(&self.joins, &key)?;

        let mut plan = ActionPlan::empty();
        match step {
            Step::Ignore => {}
            Step::BulkDrain => {
                let drained = drain(&self.joins, &key, record)?;
                tracing::info!(tenant_id, "hit the join limit");
                plan.actions
                    .extend(kick_members(tenant_id, &drained, RAID_KICK_REASON));
            }
            Step::Single => {
                let newest = newest_unconsumed(&self.joins, &key, record)?;
                plan.actions.extend(kick_members(
                    tenant_id,
                    slice::from_ref(&newest),
                    RAID_KICK_REASON,
                ));
            }
        }
        self.controller.commit(&key, next);
        Ok(plan)
    }

    fn latch_key(&self, limiter: &RateLimiter, tenant_id: TenantId, filter: Filter) -> LatchKey {
        LatchKey::new(tenant_id, limiter.store().kind(), filter)
    }

    /// Evaluate the limit and compute the latch step without committing it.
    fn step(&self, limiter: &RateLimiter, key: &LatchKey) -> GuardResult<(LatchState, Step)> {
        let over_limit = limiter.over_limit(key.tenant_id, &key.filter)?;
        let (next, step) = transition(self.controller.state(key), over_limit);
        tracing::debug!(
            tenant_id = key.tenant_id,
            kind = %key.kind,
            key = %key.filter,
            over_limit,
            ?step,
            "evaluated limit"
        );
        Ok((next, step))
    }
}

// ── Store helpers ───────────────────────────────────────────────────

/// Undo the event's insert when a later store call failed.
fn undo_on_error(
    limiter: &RateLimiter,
    record: &Record,
    result: GuardResult<ActionPlan>,
) -> GuardResult<ActionPlan> {
    if result.is_err() {
        if let Err(e) = limiter.store().remove(record) {
            tracing::warn!(
                tenant_id = record.tenant_id,
                subject_id = record.subject_id,
                "failed to undo record of unprocessed event: {e}"
            );
        }
    }
    result
}

/// Every buffered record for the key. Falls back to the triggering record
/// when it shares a timestamp with the cursor.
fn drain(limiter: &RateLimiter, key: &LatchKey, record: &Record) -> GuardResult<Vec<Record>> {
    let drained = limiter.store().fetch_unconsumed(key.tenant_id, &key.filter)?;
    if drained.is_empty() {
        return Ok(vec![record.clone()]);
    }
    Ok(drained)
}

/// Consume the key's cursor and keep only the newest record.
fn newest_unconsumed(limiter: &RateLimiter, key: &LatchKey, record: &Record) -> GuardResult<Record> {
    let mut fresh = limiter.store().fetch_unconsumed(key.tenant_id, &key.filter)?;
    Ok(fresh.pop().unwrap_or_else(|| record.clone()))
}
