// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-memory model of the FLASH accelerator for host builds
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: unit tests below; drives tests/class_host.rs and flash-ctl replay
//! PUBLIC API: SimAccelerator
//! DEPENDS_ON: parking_lot (backend-host), bridge::{Mmio, RegisterLayout, IrqLatch}
//! INVARIANTS: register-level behaviour only; picks rotate through runnable entities in admission order
//!
//! The model answers at register level so the real [`crate::MmioBridge`] can
//! be exercised end to end. Its picking rule (round robin over runnable
//! entities, priority ignored) is a stand-in for whatever the hardware does.

use std::collections::VecDeque;
use std::sync::Arc;
use std::vec::Vec;

use flash_wire::{encode_reply, ChangeKind, ChangeMessage, EntityId, TaskState};
use parking_lot::Mutex;

use crate::bridge::{IrqLatch, Mmio, RegisterLayout};

/// Reply register contents while no answer is available.
const NO_REPLY: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct SimEntity {
    id: EntityId,
    priority: u8,
    state: TaskState,
}

struct SimState {
    pending_low: Option<u32>,
    entities: VecDeque<SimEntity>,
    reply: u32,
    changes: Vec<ChangeMessage>,
    sched_requests: usize,
    responsive: bool,
}

impl SimState {
    fn apply(&mut self, msg: ChangeMessage) {
        self.changes.push(msg);
        let pos = self.entities.iter().position(|e| e.id == msg.id);
        if msg.kind.contains(ChangeKind::STATE_CHANGED) && msg.state == TaskState::DEAD {
            if let Some(pos) = pos {
                self.entities.remove(pos);
            }
            return;
        }
        match pos {
            Some(pos) => {
                let entity = &mut self.entities[pos];
                if msg.kind.contains(ChangeKind::PRI_CHANGED) {
                    entity.priority = msg.priority;
                }
                if msg.kind.contains(ChangeKind::STATE_CHANGED) {
                    entity.state = msg.state;
                }
            }
            None if msg.kind.is_admission() || msg.kind.contains(ChangeKind::STATE_CHANGED) => {
                self.entities.push_back(SimEntity { id: msg.id, priority: msg.priority, state: msg.state });
            }
            None => {}
        }
    }

    fn pick(&mut self) -> Option<EntityId> {
        for _ in 0..self.entities.len() {
            let entity = self.entities.pop_front()?;
            self.entities.push_back(entity);
            if entity.state == TaskState::RUNNABLE {
                return Some(entity.id);
            }
        }
        None
    }
}

/// Register-level accelerator model.
pub struct SimAccelerator {
    layout: RegisterLayout,
    irq: Option<Arc<IrqLatch>>,
    state: Mutex<SimState>,
}

impl SimAccelerator {
    pub fn new(layout: RegisterLayout) -> Self {
        Self {
            layout,
            irq: None,
            state: Mutex::new(SimState {
                pending_low: None,
                entities: VecDeque::new(),
                reply: NO_REPLY,
                changes: Vec::new(),
                sched_requests: 0,
                responsive: true,
            }),
        }
    }

    /// Deliver replies through `latch` instead of the reply register.
    pub fn with_irq_latch(mut self, latch: Arc<IrqLatch>) -> Self {
        self.irq = Some(latch);
        self
    }

    /// A silent model never answers schedule requests.
    pub fn set_responsive(&self, responsive: bool) {
        self.state.lock().responsive = responsive;
    }

    pub fn layout(&self) -> RegisterLayout {
        self.layout
    }

    /// Every change message decoded so far, oldest first.
    pub fn changes(&self) -> Vec<ChangeMessage> {
        self.state.lock().changes.clone()
    }

    pub fn sched_requests(&self) -> usize {
        self.state.lock().sched_requests
    }

    /// Ids of tracked entities in their current rotation order.
    pub fn tracked(&self) -> Vec<EntityId> {
        self.state.lock().entities.iter().map(|e| e.id).collect()
    }

    /// Last priority the model saw for `id`.
    pub fn priority_of(&self, id: EntityId) -> Option<u8> {
        self.state.lock().entities.iter().find(|e| e.id == id).map(|e| e.priority)
    }

    fn on_schedule(&self, state: &mut SimState) {
        state.sched_requests += 1;
        let picked = if state.responsive { state.pick() } else { None };
        let word = picked.map(encode_reply).unwrap_or(NO_REPLY);
        match (&self.irq, picked) {
            (Some(latch), Some(_)) => {
                state.reply = NO_REPLY;
                latch.on_interrupt(word);
            }
            _ => state.reply = word,
        }
    }
}

impl Mmio for SimAccelerator {
    unsafe fn write32(&self, offset: usize, value: u32) {
        let mut state = self.state.lock();
        if offset == self.layout.change {
            match state.pending_low.take() {
                Some(low) => state.apply(ChangeMessage::from_words(low, value)),
                None => state.pending_low = Some(value),
            }
        } else if offset == self.layout.schedule {
            self.on_schedule(&mut state);
        }
    }

    unsafe fn read32(&self, offset: usize) -> u32 {
        let state = self.state.lock();
        if offset == self.layout.reply {
            state.reply
        } else {
            NO_REPLY
        }
    }
}
