// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Relaxed event counters for the FLASH class.

use core::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub(crate) struct Counters {
    sched_requests: AtomicU64,
    change_messages: AtomicU64,
    timeouts: AtomicU64,
    desyncs: AtomicU64,
    resched_requests: AtomicU64,
}

impl Counters {
    pub(crate) const fn new() -> Self {
        Self {
            sched_requests: AtomicU64::new(0),
            change_messages: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            desyncs: AtomicU64::new(0),
            resched_requests: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn sched_request(&self) {
        self.sched_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn change_message(&self) {
        self.change_messages.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn desync(&self) {
        self.desyncs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn resched_request(&self) {
        self.resched_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> FlashStats {
        FlashStats {
            sched_requests: self.sched_requests.load(Ordering::Relaxed),
            change_messages: self.change_messages.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            desyncs: self.desyncs.load(Ordering::Relaxed),
            resched_requests: self.resched_requests.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the class counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlashStats {
    /// Schedule requests issued to the accelerator.
    pub sched_requests: u64,
    /// Change messages written.
    pub change_messages: u64,
    /// Schedule requests that ran out of spin budget.
    pub timeouts: u64,
    /// Replies naming an entity the host could not resolve.
    pub desyncs: u64,
    /// Reschedules requested from the host core.
    pub resched_requests: u64,
}
