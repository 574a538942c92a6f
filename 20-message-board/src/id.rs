//! Post identity and creation instants.

use std::sync::atomic::{AtomicU64, Ordering};

use nanoid::nanoid;

use crate::post::PostId;

/// Dense process-wide post ids, starting at 1.
#[derive(Debug)]
pub struct OrdinalAllocator {
    next: AtomicU64,
}

impl OrdinalAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> PostId {
        PostId::Ordinal(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for OrdinalAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque document key, generated the way document stores mint auto-ids.
pub fn opaque_key() -> PostId {
    PostId::Key(nanoid!())
}

/// Hands out strictly increasing millisecond instants.
///
/// Two posts created within the same millisecond (or after the wall clock
/// steps backwards) get `last + 1`, so instants never repeat.
#[derive(Debug, Default)]
pub struct InstantClock {
    last: AtomicU64,
}

impl InstantClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_instant(&self) -> u64 {
        self.next_after(now_millis())
    }

    fn next_after(&self, now: u64) -> u64 {
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(successor(last, now))
            })
            .unwrap_or_else(|last| last);

        successor(previous, now)
    }
}

pub(crate) fn successor(last: u64, now: u64) -> u64 {
    now.max(last + 1)
}

pub(crate) fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
