//! Process-wide rate limit coordination.
//!
//! A single [`RateLimitCoordinator`] is shared by every API client and
//! worker in the process. It tracks request volume per clock hour, mirrors
//! the limit headers the API reports, and mediates a broadcast throttle
//! gate: when one worker hits the limit, all workers pause together and all
//! resume together.
//!
//! The coordinator is complemented by [`ApiPacer`], a proactive
//! requests-per-second smoother built on the `governor` crate. The pacer
//! spreads requests out; the coordinator stops the fleet when the hourly
//! quota is actually in danger.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

/// Default GitHub core API quota: 5000 requests per hour.
pub const DEFAULT_HOURLY_LIMIT: u32 = 5_000;

/// GitHub Enterprise Cloud quota, for deployments that have it.
pub const ENTERPRISE_HOURLY_LIMIT: u32 = 15_000;

/// Requests held back from the limit so other consumers of the same token
/// are not starved.
pub const SAFETY_BUFFER: u32 = 100;

/// Utilization fraction at which a warning is logged.
pub const WARNING_THRESHOLD: f64 = 0.80;

/// Utilization fraction at which a critical warning is logged.
pub const CRITICAL_THRESHOLD: f64 = 0.95;

/// Slack added after a reported reset time before resuming.
pub const RESET_BUFFER: Duration = Duration::from_secs(5);

/// Default proactive pacing: 5000/hour is ~1.4/sec, 10/sec allows bursts.
pub const DEFAULT_RPS: u32 = 10;

/// Rate limit information parsed from API response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Persisted coordinator state, one snapshot per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub hour_start: DateTime<Utc>,
    pub request_count: i64,
    pub api_remaining: Option<i64>,
    pub api_reset_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Errors crossing the persistence port are only ever logged, so the port
/// deals in boxed errors rather than a concrete store error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Persistence port for coordinator state, so quota accounting survives
/// restarts.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn load(&self) -> Result<Option<RateLimitRecord>, BoxError>;
    async fn save(&self, record: &RateLimitRecord) -> Result<(), BoxError>;
}

/// Point-in-time view of the coordinator, for display.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitSnapshot {
    pub hourly_limit: u32,
    pub hour_start: DateTime<Utc>,
    pub request_count: u32,
    pub api_remaining: Option<u32>,
    pub api_reset_at: Option<DateTime<Utc>>,
    pub throttled: bool,
    /// Fraction of the hourly limit consumed by locally counted requests.
    pub utilization: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Open,
    Closed { until: Instant, generation: u64 },
}

#[derive(Debug)]
struct QuotaState {
    hour_start: DateTime<Utc>,
    request_count: u32,
    api_remaining: Option<u32>,
    api_reset_at: Option<DateTime<Utc>>,
}

impl QuotaState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            hour_start: top_of_hour(now),
            request_count: 0,
            api_remaining: None,
            api_reset_at: None,
        }
    }

    /// Reset the bucket when the wall clock has crossed into a new hour.
    fn roll(&mut self, now: DateTime<Utc>) {
        let current = top_of_hour(now);
        if current > self.hour_start {
            tracing::debug!(
                previous_hour = %self.hour_start,
                requests = self.request_count,
                "Rolling rate limit bucket into new hour"
            );
            self.hour_start = current;
            self.request_count = 0;
        }
    }
}

/// Truncate a timestamp to the top of its hour.
fn top_of_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let secs = now.timestamp() - now.timestamp().rem_euclid(3600);
    DateTime::from_timestamp(secs, 0).unwrap_or(now)
}

fn to_std(delta: TimeDelta) -> Duration {
    delta.to_std().unwrap_or_default()
}

/// Shared coordinator for the hourly API quota and the throttle gate.
///
/// Construct once and share via `Arc`; every client and worker consults the
/// same instance.
pub struct RateLimitCoordinator {
    hourly_limit: u32,
    state: Mutex<QuotaState>,
    gate: watch::Sender<Gate>,
    generation: AtomicU64,
    store: Option<Arc<dyn RateLimitStore>>,
}

impl RateLimitCoordinator {
    /// Create a coordinator with the given hourly limit (see
    /// [`DEFAULT_HOURLY_LIMIT`] and [`ENTERPRISE_HOURLY_LIMIT`]).
    pub fn new(hourly_limit: u32) -> Self {
        let (gate, _) = watch::channel(Gate::Open);
        Self {
            hourly_limit,
            state: Mutex::new(QuotaState::new(Utc::now())),
            gate,
            generation: AtomicU64::new(0),
            store: None,
        }
    }

    /// Create a coordinator seeded from persisted state.
    ///
    /// The stored bucket is honored only when it belongs to the current
    /// clock hour; a stale snapshot must not throttle a fresh hour.
    pub async fn restore(hourly_limit: u32, store: Arc<dyn RateLimitStore>) -> Self {
        let mut coordinator = Self::new(hourly_limit);

        match store.load().await {
            Ok(Some(record)) => {
                let now = Utc::now();
                if record.hour_start == top_of_hour(now) {
                    let mut state = coordinator
                        .state
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    state.hour_start = record.hour_start;
                    state.request_count = record.request_count.max(0) as u32;
                    state.api_remaining = record.api_remaining.map(|r| r.max(0) as u32);
                    state.api_reset_at = record.api_reset_at;
                    tracing::info!(
                        requests = state.request_count,
                        hour_start = %state.hour_start,
                        "Restored rate limit state"
                    );
                } else {
                    tracing::debug!(
                        stored_hour = %record.hour_start,
                        "Ignoring stale persisted rate limit state"
                    );
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load persisted rate limit state");
            }
        }

        coordinator.store = Some(store);
        coordinator
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, QuotaState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Account for `count` requests and mirror the limit headers the API
    /// reported, if any. Persists a snapshot through the store port;
    /// persistence failures are logged, never fatal.
    pub async fn register_request(
        &self,
        count: u32,
        remaining: Option<u32>,
        reset_at: Option<DateTime<Utc>>,
    ) {
        let now = Utc::now();
        let record = {
            let mut state = self.lock_state();
            state.roll(now);

            let before = f64::from(state.request_count) / f64::from(self.hourly_limit);
            state.request_count = state.request_count.saturating_add(count);
            let after = f64::from(state.request_count) / f64::from(self.hourly_limit);

            if remaining.is_some() {
                state.api_remaining = remaining;
            }
            if reset_at.is_some() {
                state.api_reset_at = reset_at;
            }

            if before < CRITICAL_THRESHOLD && after >= CRITICAL_THRESHOLD {
                tracing::warn!(
                    requests = state.request_count,
                    limit = self.hourly_limit,
                    "Hourly API quota critically consumed"
                );
            } else if before < WARNING_THRESHOLD && after >= WARNING_THRESHOLD {
                tracing::warn!(
                    requests = state.request_count,
                    limit = self.hourly_limit,
                    "Hourly API quota above warning threshold"
                );
            }

            RateLimitRecord {
                hour_start: state.hour_start,
                request_count: i64::from(state.request_count),
                api_remaining: state.api_remaining.map(i64::from),
                api_reset_at: state.api_reset_at,
                updated_at: now,
            }
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&record).await {
                tracing::warn!(error = %e, "Failed to persist rate limit state");
            }
        }
    }

    /// Whether a throttle is warranted right now, and for how long.
    ///
    /// Returns a wait when the API-reported remaining budget is inside the
    /// safety buffer, or when the locally counted volume is within the
    /// buffer of the hourly limit.
    pub fn should_throttle(&self) -> Option<Duration> {
        let now = Utc::now();
        let mut state = self.lock_state();
        state.roll(now);

        if let (Some(remaining), Some(reset_at)) = (state.api_remaining, state.api_reset_at) {
            if remaining <= SAFETY_BUFFER && reset_at > now {
                return Some(to_std(reset_at - now) + RESET_BUFFER);
            }
        }

        if state.request_count.saturating_add(SAFETY_BUFFER) >= self.hourly_limit {
            let next_hour = state.hour_start + TimeDelta::hours(1);
            return Some(to_std(next_hour - now) + RESET_BUFFER);
        }

        None
    }

    /// Start a throttle preemptively if the quota state calls for one.
    pub fn check_and_throttle_if_needed(&self) {
        if let Some(wait) = self.should_throttle() {
            if !self.is_throttled() {
                tracing::warn!(
                    wait_secs = wait.as_secs(),
                    "Approaching API quota, throttling all workers"
                );
                self.start_throttle(wait);
            }
        }
    }

    /// Close the throttle gate for `duration`.
    ///
    /// Idempotent: a throttle already in flight is never re-armed, so a
    /// burst of 403s from concurrent workers produces one wait, not many.
    pub fn start_throttle(&self, duration: Duration) {
        let mut armed = None;
        self.gate.send_if_modified(|gate| {
            if matches!(gate, Gate::Closed { .. }) {
                return false;
            }
            let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
            let until = Instant::now() + duration;
            *gate = Gate::Closed { until, generation };
            armed = Some((until, generation));
            true
        });

        let Some((until, generation)) = armed else {
            tracing::debug!("Throttle already active, not re-arming");
            return;
        };

        tracing::info!(
            duration_secs = duration.as_secs(),
            "Throttle gate closed for all workers"
        );

        // Timer that reopens the gate, unless it was reopened (and possibly
        // re-closed) in the meantime.
        let gate = self.gate.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(until).await;
            gate.send_if_modified(|g| match g {
                Gate::Closed { generation: active, .. } if *active == generation => {
                    *g = Gate::Open;
                    true
                }
                _ => false,
            });
        });
    }

    /// Reopen the throttle gate, releasing all waiters at once.
    pub fn stop_throttle(&self) {
        self.gate.send_if_modified(|gate| {
            if matches!(gate, Gate::Open) {
                return false;
            }
            *gate = Gate::Open;
            tracing::info!("Throttle gate reopened");
            true
        });
    }

    /// Whether the gate is currently closed.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        matches!(*self.gate.borrow(), Gate::Closed { .. })
    }

    /// Block while the gate is closed.
    ///
    /// Every waiter parked here is released together when the gate opens
    /// (broadcast semantics). Returns `false` if `timeout` elapsed with the
    /// gate still closed.
    pub async fn wait_if_throttled(&self, timeout: Duration) -> bool {
        let mut rx = self.gate.subscribe();
        let deadline = Instant::now() + timeout;

        loop {
            let until = match *rx.borrow_and_update() {
                Gate::Open => return true,
                Gate::Closed { until, .. } => until,
            };

            let wake = until.min(deadline);
            tokio::select! {
                changed = rx.changed() => {
                    // Sender dropped means no coordinator left to gate us.
                    if changed.is_err() {
                        return true;
                    }
                }
                _ = tokio::time::sleep_until(wake) => {
                    if Instant::now() >= deadline {
                        return false;
                    }
                    // The throttle window elapsed before the timer task ran;
                    // reopen the gate ourselves.
                    self.stop_throttle();
                }
            }
        }
    }

    /// React to rate limit headers on a response.
    ///
    /// A reported remaining budget of zero starts a coordinated wait until
    /// the reported reset (plus slack). No-op while a throttle is already
    /// in flight.
    pub fn handle_rate_limit_response(&self, remaining: u32, reset_at: DateTime<Utc>) {
        if remaining > 0 || self.is_throttled() {
            return;
        }
        let now = Utc::now();
        let wait = if reset_at > now {
            to_std(reset_at - now) + RESET_BUFFER
        } else {
            RESET_BUFFER
        };
        tracing::warn!(
            reset_at = %reset_at,
            wait_secs = wait.as_secs(),
            "API reports exhausted quota, throttling all workers"
        );
        self.start_throttle(wait);
    }

    /// Current state for display.
    #[must_use]
    pub fn snapshot(&self) -> RateLimitSnapshot {
        let mut state = self.lock_state();
        state.roll(Utc::now());
        RateLimitSnapshot {
            hourly_limit: self.hourly_limit,
            hour_start: state.hour_start,
            request_count: state.request_count,
            api_remaining: state.api_remaining,
            api_reset_at: state.api_reset_at,
            throttled: self.is_throttled(),
            utilization: f64::from(state.request_count) / f64::from(self.hourly_limit),
        }
    }
}

/// Proactive request pacer built on the governor crate.
///
/// Smooths request bursts to a fixed requests-per-second budget. This is
/// complementary to [`RateLimitCoordinator`]: the pacer shapes traffic, the
/// coordinator reacts to the actual quota.
#[derive(Clone)]
pub struct ApiPacer {
    inner: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl ApiPacer {
    /// Create a pacer allowing `requests_per_second` (clamped to at least 1).
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Wait until the pacer allows another request.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}
