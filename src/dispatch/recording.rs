use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::Dispatcher;
use crate::activity::{ChannelId, SubjectId, TenantId};
use crate::enforcement::{Action, ChannelBatch};

/// Dispatcher that keeps every request in memory (for tests and embedding).
///
/// `fail_kicks` makes every kick return an error, to exercise the engine's
/// no-retry path.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    calls: Mutex<Vec<Action>>,
    fail_kicks: bool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_kicks() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_kicks: true,
        }
    }

    pub fn calls(&self) -> Vec<Action> {
        self.calls.lock().clone()
    }

    /// Drain and return the recorded calls.
    pub fn take(&self) -> Vec<Action> {
        std::mem::take(&mut *self.calls.lock())
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn delete_messages(
        &self,
        tenant_id: TenantId,
        batches: &[ChannelBatch],
    ) -> anyhow::Result<()> {
        self.calls.lock().push(Action::DeleteMessages {
            tenant_id,
            batches: batches.to_vec(),
        });
        Ok(())
    }

    async fn kick_member(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
        reason: &str,
    ) -> anyhow::Result<()> {
        self.calls.lock().push(Action::KickMember {
            tenant_id,
            subject_id,
            reason: reason.to_string(),
        });
        if self.fail_kicks {
            anyhow::bail!("missing permission to kick member {subject_id}");
        }
        Ok(())
    }

    async fn notify(&self, tenant_id: TenantId, channel_id: ChannelId, text: &str) -> anyhow::Result<()> {
        self.calls.lock().push(Action::Notify {
            tenant_id,
            channel_id,
            text: text.to_string(),
        });
        Ok(())
    }
}
