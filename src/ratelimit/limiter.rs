//! Core rate limiter implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use http::HeaderMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::client::request_key;
use super::window::{RateLimitDecision, RateWindow};
use crate::clock::{Clock, SystemClock};
use crate::config::LimiterConfig;

/// In-memory fixed-window rate limiter.
///
/// Each key gets a counter that starts over once its window has passed.
/// Expired windows are also evicted by a background sweep that runs on the
/// tokio runtime the limiter was built on; the sweep only bounds memory,
/// decisions never depend on it having run.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter {
    state: Arc<LimiterState>,
    sweeper: Mutex<Option<Sweeper>>,
}

struct LimiterState {
    /// Instance name used in log output
    name: String,
    /// Windows indexed by limiter key
    windows: DashMap<String, RateWindow>,
    window: chrono::Duration,
    limit: u64,
    clock: Arc<dyn Clock>,
}

/// Handle to the background sweep task.
struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RateLimiter {
    /// Create a limiter on the system clock.
    pub fn new(name: impl Into<String>, config: LimiterConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from `clock`.
    ///
    /// When called inside a tokio runtime the sweep task is started right
    /// away; outside of one the limiter still works, it just never sweeps.
    pub fn with_clock(name: impl Into<String>, config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let window = chrono::Duration::from_std(config.window()).unwrap_or(chrono::Duration::MAX);
        let state = Arc::new(LimiterState {
            name: name.into(),
            windows: DashMap::new(),
            window,
            limit: config.max_requests,
            clock,
        });

        let sweeper = match Handle::try_current() {
            Ok(handle) => Some(Sweeper::spawn(&handle, &state, config.cleanup_interval())),
            Err(_) => {
                warn!(
                    limiter = %state.name,
                    "No tokio runtime available, expired windows will not be swept"
                );
                None
            }
        };

        info!(
            limiter = %state.name,
            window_ms = config.window_ms,
            max_requests = config.max_requests,
            cleanup_interval_ms = config.cleanup_interval_ms,
            "Rate limiter initialized"
        );

        Self {
            state,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Check and count one request for `key`.
    pub fn is_allowed(&self, key: &str) -> RateLimitDecision {
        let state = &self.state;
        let now = state.clock.now();

        let (allowed, window) = match state.windows.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                let window = RateWindow::open(now, state.window);
                debug!(limiter = %state.name, key = %key, "Creating new rate window");
                vacant.insert(window);
                (true, window)
            }
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                if window.is_expired(now) {
                    *window = RateWindow::open(now, state.window);
                    (true, *window)
                } else {
                    let allowed = window.try_admit(state.limit);
                    (allowed, *window)
                }
            }
        };

        let remaining = if allowed { window.remaining(state.limit) } else { 0 };

        if allowed {
            trace!(limiter = %state.name, key = %key, remaining = remaining, "Request allowed");
        } else {
            debug!(
                limiter = %state.name,
                key = %key,
                reset_time = %window.reset_time,
                "Rate limit exceeded"
            );
        }

        RateLimitDecision {
            allowed,
            reset_time: window.reset_time,
            remaining,
            limit: state.limit,
        }
    }

    /// Check a request identified by its headers and route path.
    pub fn check_request(&self, headers: &HeaderMap, route: &str) -> RateLimitDecision {
        self.is_allowed(&request_key(headers, route))
    }

    /// Forget the window for `key`, restoring its full budget.
    pub fn reset(&self, key: &str) {
        if self.state.windows.remove(key).is_some() {
            info!(limiter = %self.state.name, key = %key, "Rate window reset");
        }
    }

    /// Evict every expired window. Returns the number of windows removed.
    pub fn sweep(&self) -> usize {
        self.state.sweep()
    }

    /// Stop the sweep task and drop all windows.
    ///
    /// Safe to call more than once. The limiter keeps answering afterwards,
    /// but nothing evicts expired windows any more.
    pub fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            // The task also exits if it observes the sender being dropped.
            let _ = sweeper.shutdown.send(true);
            sweeper.handle.abort();
            info!(limiter = %self.state.name, "Rate limiter sweep stopped");
        }
        self.state.windows.clear();
    }

    /// Whether the sweep task is still running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .map(|sweeper| !sweeper.handle.is_finished())
            .unwrap_or(false)
    }

    /// Get the number of tracked keys.
    pub fn len(&self) -> usize {
        self.state.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.windows.is_empty()
    }

    /// Get the request budget per window.
    pub fn limit(&self) -> u64 {
        self.state.limit
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }
}

impl LimiterState {
    fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.windows.retain(|_, window| {
            let keep = !window.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}

impl Sweeper {
    fn spawn(handle: &Handle, state: &Arc<LimiterState>, every: Duration) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = handle.spawn(run_sweeper(Arc::downgrade(state), every, shutdown_rx));
        Self { shutdown, handle }
    }
}

/// Sweep loop. Ends on shutdown or once the limiter itself has been dropped.
async fn run_sweeper(state: Weak<LimiterState>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(state) = state.upgrade() else { break };
                let removed = state.sweep();
                if removed > 0 {
                    debug!(
                        limiter = %state.name,
                        removed = removed,
                        remaining = state.windows.len(),
                        "Swept expired rate windows"
                    );
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
