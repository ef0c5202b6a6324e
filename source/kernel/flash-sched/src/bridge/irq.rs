// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Latch for the accelerator's interrupt line.
//!
//! The interrupt handler stores the reply word and raises `pending`; the
//! consumer takes the value exactly once. Store order is word then flag, so a
//! consumer that observes `pending` also observes the word.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use flash_wire::{decode_reply, EntityId};

pub struct IrqLatch {
    pending: AtomicBool,
    next_task: AtomicU32,
}

impl IrqLatch {
    pub const fn new() -> Self {
        Self { pending: AtomicBool::new(false), next_task: AtomicU32::new(0) }
    }

    /// Interrupt-context entry: latch the device's reply word.
    ///
    /// A second interrupt before the consumer runs overwrites the first word.
    pub fn on_interrupt(&self, word: u32) {
        self.next_task.store(word, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Consumes the latched reply word, if any.
    pub fn take_word(&self) -> Option<u32> {
        if self.pending.swap(false, Ordering::AcqRel) {
            Some(self.next_task.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    /// Consumes the latched reply as an entity id.
    pub fn take(&self) -> Option<EntityId> {
        self.take_word().map(decode_reply)
    }
}

impl Default for IrqLatch {
    fn default() -> Self {
        Self::new()
    }
}
