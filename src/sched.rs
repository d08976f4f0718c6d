//! Cooperative scheduling primitives: per-frame coalescing and cancellable
//! deadlines.
//!
//! The panel core is single-threaded and event-driven; the host drives it by
//! calling `on_frame` once per animation tick. Mutations that want deferred
//! work mark a key in a [`FrameScheduler`]; marking is idempotent, so many
//! rapid mutations collapse into a single unit of work on the next tick.
//! Timed behaviour (command auto-reset) is expressed as an owned
//! [`Deadline`] that the owner checks and drops, never a fire-and-forget
//! callback.

use std::collections::HashSet;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Coalesces repeated "needs work" marks into one entry per key per frame.
///
/// Keys are drained in first-marked order so downstream work is
/// deterministic.
#[derive(Debug)]
pub struct FrameScheduler<K: Eq + Hash + Clone> {
    pending: Vec<K>,
    seen: HashSet<K>,
}

impl<K: Eq + Hash + Clone> FrameScheduler<K> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Mark a key as needing work before the next tick. Returns `true` when
    /// the key was newly scheduled, `false` when a mark was already pending.
    pub fn mark(&mut self, key: K) -> bool {
        if self.seen.insert(key.clone()) {
            self.pending.push(key);
            true
        } else {
            false
        }
    }

    /// Whether a mark is pending for the given key.
    pub fn is_pending(&self, key: &K) -> bool {
        self.seen.contains(key)
    }

    /// Number of distinct pending keys.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take all pending keys (first-marked order), leaving the scheduler
    /// empty.
    pub fn take(&mut self) -> Vec<K> {
        self.seen.clear();
        std::mem::take(&mut self.pending)
    }

    /// Drop all pending marks without processing them.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.pending.clear();
    }
}

impl<K: Eq + Hash + Clone> Default for FrameScheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// A cancellable point in time owned by the component that scheduled it.
///
/// Dropping the `Deadline` cancels it; there is no callback to race against
/// a destroyed owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Create a deadline `delay` after `now`.
    pub fn after(now: Instant, delay: Duration) -> Self {
        Self { at: now + delay }
    }

    /// Whether the deadline has been reached at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.at
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────
