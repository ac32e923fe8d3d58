//! Activity tracking: records, clocks, stores and the sliding-window limiter.

pub mod clock;
pub mod limiter;
pub mod record;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{ActivityLimit, RateLimiter};
pub use record::{
    Activity, ActivityKind, Attribute, ChannelId, Filter, MessageId, Record, SubjectId, TenantId,
};
pub use store::{
    open_stores, ActivityStore, ActivityStores, MemoryActivityStore, SqliteActivityStore,
};
