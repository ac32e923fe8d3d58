//! Enforcement decisions: latch state machine and action planning.
//!
//! Nothing here performs I/O. The engine feeds evaluation results in and
//! hands the resulting `ActionPlan` to a `Dispatcher`.

pub mod latch;
pub mod plan;

pub use latch::{transition, EnforcementController, LatchKey, LatchState, Step};
pub use plan::{
    delete_messages, kick_members, Action, ActionPlan, ChannelBatch, FLOOD_NOTICE,
    RAID_KICK_REASON,
};
