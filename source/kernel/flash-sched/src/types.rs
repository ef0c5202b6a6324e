// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Newtypes and host-facing traits shared by the FLASH class
//! OWNERS: @kernel-sched-team
//! PUBLIC API: CpuId, Entity, ClassKind, Schedulable, HostCore
//! INVARIANTS: The class never stores entities; the host owns them and resolves ids on demand

use core::fmt;

use flash_wire::{EntityId, TaskState};

/// Logical CPU identifier used by the run queues and the load balancer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct CpuId(u16);

impl CpuId {
    pub const BOOT: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

/// The scheduling-relevant view of one host task.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    pub id: EntityId,
    /// Opaque to the class; forwarded to the accelerator as-is.
    pub priority: u8,
    pub state: TaskState,
}

impl Entity {
    pub const fn new(id: EntityId, priority: u8, state: TaskState) -> Self {
        Self { id, priority, state }
    }

    /// Same entity with a different run state.
    pub const fn with_state(self, state: TaskState) -> Self {
        Self { state, ..self }
    }
}

/// Scheduling classes known to the host core, highest precedence first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClassKind {
    Deadline,
    Realtime,
    Flash,
    Fair,
    Idle,
}

impl ClassKind {
    /// Fixed-priority classes that the FLASH class never displaces.
    #[inline]
    pub const fn outranks_flash(self) -> bool {
        matches!(self, ClassKind::Deadline | ClassKind::Realtime)
    }
}

/// A host task handle as seen by the scheduling class.
pub trait Schedulable {
    /// Snapshot of the fields forwarded to the accelerator.
    fn entity(&self) -> Entity;
    /// Class the task currently belongs to.
    fn class(&self) -> ClassKind;
    /// Whether the host has the task queued as runnable.
    fn on_rq(&self) -> bool;
}

/// Services the host scheduler core provides to the class.
///
/// Implementations are called with the processor's scheduling lock held and
/// must not block.
pub trait HostCore {
    type Task: Schedulable;

    /// Resolves an accelerator id to a live host task.
    fn lookup(&self, id: EntityId) -> Option<Self::Task>;
    /// Task currently running on `cpu`, if any.
    fn current(&self, cpu: CpuId) -> Option<Self::Task>;
    /// Marks the task running on `cpu` for rescheduling at the next opportunity.
    fn resched_curr(&self, cpu: CpuId);
}
