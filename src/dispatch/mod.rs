//! Outbound side: the platform client trait and plan execution.

pub mod log;
pub mod recording;
pub mod traits;

pub use log::LogDispatcher;
pub use recording::RecordingDispatcher;
pub use traits::Dispatcher;

use crate::enforcement::{Action, ActionPlan};

/// Outcome of running one plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub attempted: usize,
    pub failed: usize,
}

/// Issue every action in order. Failures are logged and skipped: no retry,
/// and earlier actions stay issued.
pub async fn execute(plan: &ActionPlan, dispatcher: &dyn Dispatcher) -> DispatchReport {
    let mut report = DispatchReport::default();
    for action in &plan.actions {
        report.attempted += 1;
        let result = match action {
            Action::DeleteMessages { tenant_id, batches } => {
                dispatcher.delete_messages(*tenant_id, batches).await
            }
            Action::KickMember {
                tenant_id,
                subject_id,
                reason,
            } => dispatcher.kick_member(*tenant_id, *subject_id, reason).await,
            Action::Notify {
                tenant_id,
                channel_id,
                text,
            } => dispatcher.notify(*tenant_id, *channel_id, text).await,
        };
        if let Err(e) = result {
            report.failed += 1;
            tracing::warn!("{}: action {action:?} failed: {e}", dispatcher.name());
        }
    }
    report
}
