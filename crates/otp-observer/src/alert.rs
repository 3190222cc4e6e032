//! Statistical alerting over each process's queue-depth samples: a
//! bounded ring buffer (oldest sample evicted once full, not rejected —
//! unlike this workspace's backpressure-signaling bounded queue, this one
//! exists to hold a rolling window) plus a mean + k·stddev threshold. The
//! running sum and sum-of-squares are kept alongside the buffer so
//! mean/stddev are O(1) per sample instead of a rescan of up to 1000
//! values every poll tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use otp_types::Pid;
use parking_lot::Mutex;

const RING_CAPACITY: usize = 1000;

/// Tunables for the alert model. Matches [`otp_config::ObserverConfig`]'s
/// field names so a host binary's loaded config maps onto this directly.
#[derive(Debug, Clone, Copy)]
pub struct AlertConfig {
    pub enabled: bool,
    pub sensitivity_multiplier: f64,
    pub min_samples: usize,
    pub cooldown: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitivity_multiplier: 2.0,
            min_samples: 30,
            cooldown: Duration::from_millis(10_000),
        }
    }
}

/// A partial update to [`AlertConfig`]; unset fields keep their current
/// value. Mirrors the `configure(partial)` contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertConfigUpdate {
    pub enabled: Option<bool>,
    pub sensitivity_multiplier: Option<f64>,
    pub min_samples: Option<usize>,
    pub cooldown: Option<Duration>,
}

/// What happened to a process's alert state when a new sample was
/// recorded.
#[derive(Debug, Clone, Copy)]
pub enum AlertTransition {
    Fired { threshold: f64, sample: u64 },
    Resolved,
}

/// A fixed-capacity rolling window with its running sum and sum-of-squares
/// kept in lockstep, so mean/stddev are O(1) instead of a pass over 1000
/// samples every poll tick.
struct Ring {
    samples: std::collections::VecDeque<u64>,
    sum: f64,
    sum_sq: f64,
}

impl Ring {
    fn new() -> Self {
        Self {
            samples: std::collections::VecDeque::with_capacity(RING_CAPACITY),
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    fn push(&mut self, value: u64) {
        if self.samples.len() == RING_CAPACITY {
            if let Some(evicted) = self.samples.pop_front() {
                let v = evicted as f64;
                self.sum -= v;
                self.sum_sq -= v * v;
            }
        }
        self.samples.push_back(value);
        let v = value as f64;
        self.sum += v;
        self.sum_sq += v * v;
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn mean(&self) -> f64 {
        self.sum / self.len() as f64
    }

    /// Population standard deviation. Clamped at 0 to absorb floating-point
    /// drift from the incremental sum/sum-of-squares bookkeeping.
    fn stddev(&self) -> f64 {
        let n = self.len() as f64;
        let mean = self.mean();
        ((self.sum_sq / n) - mean * mean).max(0.0).sqrt()
    }
}

struct ProcessAlertState {
    ring: Mutex<Ring>,
    in_alert: AtomicBool,
    last_fired_at: Mutex<Option<Instant>>,
}

impl ProcessAlertState {
    fn new() -> Self {
        Self {
            ring: Mutex::new(Ring::new()),
            in_alert: AtomicBool::new(false),
            last_fired_at: Mutex::new(None),
        }
    }

    fn record(&self, sample: u64, config: &AlertConfig, now: Instant) -> Option<AlertTransition> {
        let (len, mean, stddev) = {
            let mut ring = self.ring.lock();
            ring.push(sample);
            (ring.len(), ring.mean(), ring.stddev())
        };

        if !config.enabled || len < config.min_samples {
            return None;
        }

        let threshold = mean + config.sensitivity_multiplier * stddev;
        let was_in_alert = self.in_alert.load(Ordering::Acquire);

        if was_in_alert {
            if (sample as f64) <= threshold {
                self.in_alert.store(false, Ordering::Release);
                return Some(AlertTransition::Resolved);
            }
            return None;
        }

        if (sample as f64) <= threshold {
            return None;
        }

        let mut last_fired_at = self.last_fired_at.lock();
        if let Some(last) = *last_fired_at {
            if now.duration_since(last) < config.cooldown {
                return None;
            }
        }

        self.in_alert.store(true, Ordering::Release);
        *last_fired_at = Some(now);
        Some(AlertTransition::Fired { threshold, sample })
    }

    fn reset(&self) {
        *self.ring.lock() = Ring::new();
        self.in_alert.store(false, Ordering::Release);
        *self.last_fired_at.lock() = None;
    }
}

/// Per-process threshold alerting over queue-depth samples. Cheap to
/// clone; every clone shares the same per-process state and config.
#[derive(Clone)]
pub struct AlertManager {
    config: std::sync::Arc<Mutex<AlertConfig>>,
    states: std::sync::Arc<Mutex<HashMap<Pid, std::sync::Arc<ProcessAlertState>>>>,
}

impl AlertManager {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config: std::sync::Arc::new(Mutex::new(config)),
            states: std::sync::Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> AlertConfig {
        *self.config.lock()
    }

    /// Updates in place; unset fields in `update` keep their current
    /// value. Does not reset accumulated statistics.
    pub fn configure(&self, update: AlertConfigUpdate) {
        let mut config = self.config.lock();
        if let Some(enabled) = update.enabled {
            config.enabled = enabled;
        }
        if let Some(mult) = update.sensitivity_multiplier {
            config.sensitivity_multiplier = mult;
        }
        if let Some(min_samples) = update.min_samples {
            config.min_samples = min_samples;
        }
        if let Some(cooldown) = update.cooldown {
            config.cooldown = cooldown;
        }
    }

    /// Clears every process's ring buffer and active-alert state, without
    /// discarding the config set via [`Self::configure`].
    pub fn reset(&self) {
        for state in self.states.lock().values() {
            state.reset();
        }
    }

    /// Feeds one queue-depth sample for `pid`, returning a transition if
    /// this sample fired or resolved an alert.
    pub fn record(&self, pid: &Pid, sample: u64, now: Instant) -> Option<AlertTransition> {
        let state = {
            let mut states = self.states.lock();
            states
                .entry(pid.clone())
                .or_insert_with(|| std::sync::Arc::new(ProcessAlertState::new()))
                .clone()
        };
        let config = self.config();
        state.record(sample, &config, now)
    }

    /// Drops a terminated process's ring and alert state; otherwise a
    /// long-running node would accumulate one entry per process that ever
    /// existed.
    pub fn forget(&self, pid: &Pid) {
        self.states.lock().remove(pid);
    }
}
