//! Sliding-window limit checks over an activity store.
//!
//! A key is over its limit when *more than* `threshold` matching records
//! fall inside the trailing `window`. Every check purges first, so expired
//! records are never counted.

use std::sync::Arc;
use std::time::Duration;

use super::{ActivityStore, Filter, TenantId};
use crate::error::{GuardError, GuardResult, StoreResult};

/// Window length plus count threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityLimit {
    pub window: Duration,
    pub threshold: u32,
}

impl ActivityLimit {
    pub fn new(window: Duration, threshold: u32) -> GuardResult<Self> {
        if window.is_zero() {
            return Err(GuardError::Config("limit window must be positive".into()));
        }
        Ok(Self { window, threshold })
    }

    /// Build from fractional seconds as written in config files.
    pub fn from_secs_f64(window_secs: f64, threshold: u32) -> GuardResult<Self> {
        if !window_secs.is_finite() || window_secs <= 0.0 {
            return Err(GuardError::Config(format!(
                "limit window must be a positive number of seconds, got {window_secs}"
            )));
        }
        let window = Duration::try_from_secs_f64(window_secs)
            .map_err(|e| GuardError::Config(format!("limit window {window_secs}s: {e}")))?;
        Self::new(window, threshold)
    }

    pub fn exceeded_by(&self, count: usize) -> bool {
        count > self.threshold as usize
    }
}

/// Binds a store to one limit.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn ActivityStore>,
    limit: ActivityLimit,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn ActivityStore>, limit: ActivityLimit) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> ActivityLimit {
        self.limit
    }

    pub fn store(&self) -> &Arc<dyn ActivityStore> {
        &self.store
    }

    /// Purge, then count the key's records inside the window.
    pub fn count(&self, tenant_id: TenantId, filter: &Filter) -> StoreResult<usize> {
        self.store.count_matching(tenant_id, filter, self.limit.window)
    }

    /// True when the key has more than `threshold` records in the window.
    pub fn over_limit(&self, tenant_id: TenantId, filter: &Filter) -> StoreResult<bool> {
        Ok(self.limit.exceeded_by(self.count(tenant_id, filter)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{Activity, ActivityKind, ManualClock, MemoryActivityStore};

    fn limiter(window_secs: u64, threshold: u32) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::at_secs(1_700_000_000));
        let store = Arc::new(MemoryActivityStore::new(ActivityKind::Join, clock.clone()));
        let limit = ActivityLimit::new(Duration::from_secs(window_secs), threshold).unwrap();
        (clock, RateLimiter::new(store, limit))
    }

    #[test]
    fn allows_up_to_threshold() {
        let (_clock, limiter) = limiter(3, 3);
        for subject in 0..3 {
            limiter.store().insert(1, subject, Activity::MemberJoined).unwrap();
            assert!(!limiter.over_limit(1, &Filter::any()).unwrap());
        }
    }

    #[test]
    fn trips_above_threshold() {
        let (_clock, limiter) = limiter(3, 3);
        for subject in 0..4 {
            limiter.store().insert(1, subject, Activity::MemberJoined).unwrap();
        }
        assert!(limiter.over_limit(1, &Filter::any()).unwrap());
        assert!(!limiter.over_limit(2, &Filter::any()).unwrap());
    }

    #[test]
    fn recovers_after_window() {
        let (clock, limiter) = limiter(3, 1);
        limiter.store().insert(1, 1, Activity::MemberJoined).unwrap();
        limiter.store().insert(1, 2, Activity::MemberJoined).unwrap();
        assert!(limiter.over_limit(1, &Filter::any()).unwrap());

        clock.advance(Duration::from_secs(4));
        assert!(!limiter.over_limit(1, &Filter::any()).unwrap());
        assert_eq!(limiter.count(1, &Filter::any()).unwrap(), 0);
    }

    #[test]
    fn zero_threshold_trips_on_first_record() {
        let (_clock, limiter) = limiter(3, 0);
        assert!(!limiter.over_limit(1, &Filter::any()).unwrap());
        limiter.store().insert(1, 1, Activity::MemberJoined).unwrap();
        assert!(limiter.over_limit(1, &Filter::any()).unwrap());
    }

    #[test]
    fn invalid_windows_are_config_errors() {
        assert!(matches!(
            ActivityLimit::from_secs_f64(0.0, 1),
            Err(GuardError::Config(_))
        ));
        assert!(matches!(
            ActivityLimit::from_secs_f64(f64::NAN, 1),
            Err(GuardError::Config(_))
        ));
        assert!(matches!(
            ActivityLimit::from_secs_f64(-2.5, 1),
            Err(GuardError::Config(_))
        ));
        let limit = ActivityLimit::from_secs_f64(2.5, 4).unwrap();
        assert_eq!(limit.window, Duration::from_millis(2_500));
    }
}
