use async_trait::async_trait;

use crate::activity::{ChannelId, SubjectId, TenantId};
use crate::enforcement::ChannelBatch;

/// Chat-platform client that carries out enforcement requests.
///
/// Failures are reported back as errors; the engine logs them and moves on.
/// Retrying or alerting an admin is up to the implementation.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Human-readable platform name (used in logs).
    fn name(&self) -> &str;

    /// Remove messages, one batch per channel.
    async fn delete_messages(&self, tenant_id: TenantId, batches: &[ChannelBatch])
        -> anyhow::Result<()>;

    async fn kick_member(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
        reason: &str,
    ) -> anyhow::Result<()>;

    async fn notify(&self, tenant_id: TenantId, channel_id: ChannelId, text: &str)
        -> anyhow::Result<()>;
}
