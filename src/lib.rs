//! Sliding-window flood and raid protection for chat communities.
//!
//! ## Design
//! - `activity`: timestamped records, pluggable stores, the window limiter
//! - `enforcement`: per-key latch and action planning (pure, no I/O)
//! - `engine`: per-event entry point tying the two together
//! - `dispatch`: the platform client trait that executes action plans
//!
//! The engine only decides. Deleting messages, kicking members and posting
//! notices is the dispatcher's job.

pub mod activity;
pub mod config;
pub mod dispatch;
pub mod enforcement;
pub mod engine;
pub mod error;

pub use activity::{ActivityLimit, ActivityStore, Clock, Filter, RateLimiter, Record};
pub use config::Config;
pub use dispatch::{DispatchReport, Dispatcher};
pub use enforcement::{Action, ActionPlan, EnforcementController};
pub use engine::{AntiSpamEngine, ChannelKind, GuardEvent};
pub use error::{GuardError, StoreError};
