use serde::{Deserialize, Serialize};

use crate::activity::{Activity, ChannelId, MessageId, Record, SubjectId, TenantId};

/// Reason attached to raid kicks.
pub const RAID_KICK_REASON: &str = "raid protection";

/// Notice posted when a message flood episode starts.
pub const FLOOD_NOTICE: &str = "hit the text message limit";

/// Messages to remove from one channel, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBatch {
    pub channel_id: ChannelId,
    /// Deletion order; platforms with bulk delete may send them in one call.
    pub message_ids: Vec<MessageId>,
}

/// One outbound request for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Remove messages, grouped by channel in first-seen order.
    DeleteMessages {
        tenant_id: TenantId,
        batches: Vec<ChannelBatch>,
    },
    /// Remove a member from the tenant.
    KickMember {
        tenant_id: TenantId,
        subject_id: SubjectId,
        reason: String,
    },
    /// Post a text notice in a channel.
    Notify {
        tenant_id: TenantId,
        channel_id: ChannelId,
        text: String,
    },
}

/// Ordered actions produced for one inbound event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub actions: Vec<Action>,
}

impl ActionPlan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Message ids this plan deletes, in request order.
    pub fn deleted_messages(&self) -> Vec<MessageId> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                Action::DeleteMessages { batches, .. } => Some(batches),
                _ => None,
            })
            .flatten()
            .flat_map(|b| b.message_ids.iter().copied())
            .collect()
    }

    /// Members this plan kicks, in request order.
    pub fn kicked_members(&self) -> Vec<SubjectId> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                Action::KickMember { subject_id, .. } => Some(*subject_id),
                _ => None,
            })
            .collect()
    }
}

/// Group message records by channel, keeping first-seen channel order and
/// insertion order within each channel. Non-message records are skipped.
pub fn delete_messages(tenant_id: TenantId, records: &[Record]) -> Option<Action> {
    let mut batches: Vec<ChannelBatch> = Vec::new();
    for record in records {
        let Activity::MessagePosted {
            channel_id,
            message_id,
        } = record.activity
        else {
            continue;
        };
        match batches.iter_mut().find(|b| b.channel_id == channel_id) {
            Some(batch) => batch.message_ids.push(message_id),
            None => batches.push(ChannelBatch {
                channel_id,
                message_ids: vec![message_id],
            }),
        }
    }
    if batches.is_empty() {
        None
    } else {
        Some(Action::DeleteMessages { tenant_id, batches })
    }
}

/// One kick per distinct subject, in first-seen order.
pub fn kick_members(tenant_id: TenantId, records: &[Record], reason: &str) -> Vec<Action> {
    let mut seen: Vec<SubjectId> = Vec::new();
    for record in records {
        if !seen.contains(&record.subject_id) {
            seen.push(record.subject_id);
        }
    }
    seen.into_iter()
        .map(|subject_id| Action::KickMember {
            tenant_id,
            subject_id,
            reason: reason.to_string(),
        })
        .collect()
}
