use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;

const DEFAULT_MIN_DELAY: f64 = 0.1;
const DEFAULT_MAX_DELAY: f64 = 60.0;

/// Response-driven adaptive delay. One instance governs one host; `wait` and
/// `report` are safe under concurrent use from any number of workers.
pub struct AdaptiveThrottler {
    initial_delay: f64,
    min_delay: f64,
    max_delay: f64,
    state: Mutex<ThrottleState>,
}

struct ThrottleState {
    current_delay: f64,
    consecutive_errors: u32,
    is_throttled: bool,
    last_adjustment: Instant,
}

impl AdaptiveThrottler {
    pub fn new(initial_rate_limit: f64) -> Self {
        Self::with_bounds(initial_rate_limit, DEFAULT_MIN_DELAY, DEFAULT_MAX_DELAY)
    }

    pub fn with_bounds(initial_rate_limit: f64, min_delay: f64, max_delay: f64) -> Self {
        let initial_delay = if initial_rate_limit > 0.0 {
            1.0 / initial_rate_limit
        } else {
            0.0
        };
        Self {
            initial_delay,
            min_delay,
            max_delay,
            state: Mutex::new(ThrottleState {
                current_delay: initial_delay,
                consecutive_errors: 0,
                is_throttled: false,
                last_adjustment: Instant::now(),
            }),
        }
    }

    /// Sleep for the current delay. Jitter in [0.8, 1.2] keeps many workers
    /// sharing one instance from waking in lockstep.
    pub async fn wait(&self) {
        let delay = self.state.lock().current_delay;
        if delay > 0.0 {
            let jitter = rand::thread_rng().gen_range(0.8..=1.2);
            tokio::time::sleep(Duration::from_secs_f64(delay * jitter)).await;
        }
    }

    /// Feed a response status back into the state machine. Status 0 means a
    /// timeout or transport failure.
    pub fn report(&self, status_code: u16) {
        self.report_at(status_code, Instant::now());
    }

    fn report_at(&self, status_code: u16, now: Instant) {
        let mut state = self.state.lock();

        if status_code == 429 || (status_code == 403 && state.consecutive_errors > 5) {
            state.consecutive_errors += 1;
            state.is_throttled = true;
            state.current_delay = (state.current_delay * 2.0).max(1.0).min(self.max_delay);
            tracing::warn!(
                status = status_code,
                delay = state.current_delay,
                "rate limited, backing off"
            );
        } else if status_code == 0 {
            state.consecutive_errors += 1;
            if state.consecutive_errors > 3 {
                state.is_throttled = true;
                state.current_delay = (state.current_delay * 1.5).max(1.0).min(self.max_delay);
                tracing::warn!(delay = state.current_delay, "repeated timeouts, backing off");
            }
        } else if status_code < 500 {
            state.consecutive_errors = 0;
            // Gradual recovery: decay once per 5 s window so a single success
            // cannot defeat an ongoing block.
            if state.is_throttled && now.duration_since(state.last_adjustment).as_secs_f64() > 5.0
            {
                state.current_delay = (state.current_delay * 0.9).max(self.min_delay);
                if state.current_delay < self.initial_delay * 1.5 {
                    state.is_throttled = false;
                }
                state.last_adjustment = now;
            }
        }
        // 5xx other than a transport failure: no adjustment.
    }

    /// Raise the delay floor to match a suggested request rate (used when a
    /// WAF is detected ahead of active probing).
    pub fn slow_to(&self, rate_limit: f64) {
        if rate_limit <= 0.0 {
            return;
        }
        let floor = 1.0 / rate_limit;
        let mut state = self.state.lock();
        if state.current_delay < floor {
            state.current_delay = floor.min(self.max_delay);
        }
    }

    pub fn current_delay(&self) -> f64 {
        self.state.lock().current_delay
    }

    pub fn is_throttled(&self) -> bool {
        self.state.lock().is_throttled
    }
}

/// Per-host registry so every network-facing component shares one throttler
/// per target host.
#[derive(Clone)]
pub struct HostThrottlers {
    rate_limit: f64,
    hosts: Arc<DashMap<String, Arc<AdaptiveThrottler>>>,
}

impl HostThrottlers {
    pub fn new(rate_limit: f64) -> Self {
        Self {
            rate_limit,
            hosts: Arc::new(DashMap::new()),
        }
    }

    pub fn for_host(&self, host: &str) -> Arc<AdaptiveThrottler> {
        if let Some(existing) = self.hosts.get(host) {
            return existing.value().clone();
        }
        let throttler = Arc::new(AdaptiveThrottler::new(self.rate_limit));
        self.hosts.insert(host.to_string(), throttler.clone());
        throttler
    }
}
