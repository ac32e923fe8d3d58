use async_trait::async_trait;

use super::traits::Dispatcher;
use crate::activity::{ChannelId, SubjectId, TenantId};
use crate::enforcement::ChannelBatch;

/// Dry-run dispatcher: logs every request and never touches a platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl Dispatcher for LogDispatcher {
    fn name(&self) -> &str {
        "log"
    }

    async fn delete_messages(
        &self,
        tenant_id: TenantId,
        batches: &[ChannelBatch],
    ) -> anyhow::Result<()> {
        for batch in batches {
            tracing::info!(
                tenant_id,
                channel_id = batch.channel_id,
                count = batch.message_ids.len(),
                "would delete messages {:?}",
                batch.message_ids
            );
        }
        Ok(())
    }

    async fn kick_member(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
        reason: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(tenant_id, subject_id, reason, "would kick member");
        Ok(())
    }

    async fn notify(&self, tenant_id: TenantId, channel_id: ChannelId, text: &str) -> anyhow::Result<()> {
        tracing::info!(tenant_id, channel_id, "would notify: {text}");
        Ok(())
    }
}
