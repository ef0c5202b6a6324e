// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-processor FLASH run queue
//! OWNERS: @kernel-sched-team
//! PUBLIC API: FlashRq (admit/remove/count)
//! DEPENDS_ON: client::AcceleratorClient
//! INVARIANTS: count never negative; moves only after the bridge accepts the message (+1 admit, -1 remove, clamped)
//!
//! The count is advisory. It feeds the load balancer only; scheduling order
//! lives in the accelerator. Mutation happens under the host's per-processor
//! lock, while other processors read the count lock-free when balancing.

use core::sync::atomic::{AtomicUsize, Ordering};

use flash_wire::{ChangeKind, TaskState};
use log::debug;

use crate::bridge::DeviceBridge;
use crate::client::AcceleratorClient;
use crate::error::Result;
use crate::types::Entity;

pub struct FlashRq {
    nr_running: AtomicUsize,
}

impl FlashRq {
    pub const fn new() -> Self {
        Self { nr_running: AtomicUsize::new(0) }
    }

    /// Announces `entity` to the accelerator and accounts it on this processor.
    ///
    /// The count only moves once the bridge has taken the message.
    pub fn admit<B: DeviceBridge>(&self, client: &AcceleratorClient<B>, entity: &Entity) -> Result<()> {
        client.notify_change(ChangeKind::NEW, entity)?;
        self.nr_running.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Retires `entity` in the accelerator and drops it from this processor.
    pub fn remove<B: DeviceBridge>(&self, client: &AcceleratorClient<B>, entity: &Entity) -> Result<()> {
        client.notify_change(ChangeKind::STATE_CHANGED, &entity.with_state(TaskState::DEAD))?;
        self.decrement(entity);
        Ok(())
    }

    fn decrement(&self, entity: &Entity) {
        let clamped = self
            .nr_running
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_err();
        if clamped {
            debug!(target: "flash::rq", "remove of {} on empty run queue", entity.id);
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.nr_running.load(Ordering::Relaxed)
    }
}

impl Default for FlashRq {
    fn default() -> Self {
        Self::new()
    }
}
