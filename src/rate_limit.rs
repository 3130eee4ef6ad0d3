use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.now.set(at);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

// Closed windows are swept once this many keys are held.
const PRUNE_AT: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

/// At most `max_events` per key inside each fixed window. A window opens on
/// the first event for a key and closes `window` later.
#[derive(Debug)]
pub struct FixedWindowLimiter<C: Clock> {
    clock: C,
    max_events: u32,
    window: Duration,
    windows: HashMap<String, Window>,
}

impl<C: Clock> FixedWindowLimiter<C> {
    pub fn new(clock: C, max_events: u32, window: Duration) -> Self {
        Self {
            clock,
            max_events: max_events.max(1),
            window: window.max(Duration::seconds(1)),
            windows: HashMap::new(),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn max_events(&self) -> u32 {
        self.max_events
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&mut self, key: &str) -> RateDecision {
        if self.windows.len() >= PRUNE_AT {
            self.prune();
        }
        let now = self.clock.now();
        let window = self.window;
        let slot = self.windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if now.signed_duration_since(slot.started_at) >= window {
            *slot = Window {
                started_at: now,
                count: 0,
            };
        }

        if slot.count < self.max_events {
            slot.count += 1;
            RateDecision::Allowed {
                remaining: self.max_events - slot.count,
            }
        } else {
            RateDecision::Limited {
                retry_after: (slot.started_at + window).signed_duration_since(now),
            }
        }
    }

    /// Remaining events for `key` without consuming one.
    pub fn remaining(&self, key: &str) -> u32 {
        let now = self.clock.now();
        match self.windows.get(key) {
            Some(slot) if now.signed_duration_since(slot.started_at) < self.window => {
                self.max_events.saturating_sub(slot.count)
            }
            _ => self.max_events,
        }
    }

    /// Keys with a window currently held in memory.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    pub fn reset(&mut self, key: &str) {
        self.windows.remove(key);
    }

    /// Drops windows that have already closed.
    pub fn prune(&mut self) -> usize {
        let now = self.clock.now();
        let window = self.window;
        let before = self.windows.len();
        self.windows
            .retain(|_, slot| now.signed_duration_since(slot.started_at) < window);
        before - self.windows.len()
    }
}
