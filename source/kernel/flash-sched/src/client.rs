// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Accelerator client shared by every processor's run queue
//! OWNERS: @kernel-sched-team
//! PUBLIC API: AcceleratorClient (notify_change/query_next/stats)
//! DEPENDS_ON: bridge::DeviceBridge, flash_wire codec, spin::Mutex
//! INVARIANTS: one bridge transaction in flight at a time; no retries; no local ordering state

use flash_wire::{decode_reply, ChangeKind, ChangeMessage, EntityId};
use log::{debug, warn};

use crate::bridge::{DeviceBridge, Request, Response};
use crate::error::{Error, Result};
use crate::stats::{Counters, FlashStats};
use crate::types::Entity;

/// Issues change notifications and next-entity queries through a bridge.
///
/// The bridge is a single serial resource: every transaction is taken under
/// `lock`, so a two-word change message from one processor never interleaves
/// with a schedule request from another.
pub struct AcceleratorClient<B> {
    bridge: B,
    lock: spin::Mutex<()>,
    spin_budget: u32,
    counters: Counters,
}

impl<B: DeviceBridge> AcceleratorClient<B> {
    pub fn new(bridge: B, spin_budget: u32) -> Self {
        Self { bridge, lock: spin::Mutex::new(()), spin_budget: spin_budget.max(1), counters: Counters::new() }
    }

    fn transact(&self, request: Request) -> Result<Response> {
        let _guard = self.lock.lock();
        self.bridge.request(request)
    }

    /// Sends a change message for `entity`. The device never acknowledges.
    pub fn notify_change(&self, kind: ChangeKind, entity: &Entity) -> Result<()> {
        let msg = ChangeMessage::new(kind, entity.id, entity.priority, entity.state);
        debug!(
            target: "flash::client",
            "change kind={:?} id={} pri={} state={:?}",
            msg.kind, msg.id, msg.priority, msg.state
        );
        self.transact(Request::Change(msg))?;
        self.counters.change_message();
        Ok(())
    }

    /// Asks the accelerator which entity should run next.
    pub fn query_next(&self) -> Result<EntityId> {
        self.counters.sched_request();
        match self.transact(Request::Schedule { spin_budget: self.spin_budget }) {
            Ok(Response::Reply(word)) => {
                let id = decode_reply(word);
                debug!(target: "flash::client", "accelerator picked {}", id);
                Ok(id)
            }
            // A bridge that acknowledges a schedule request without a word is
            // treated like a silent device.
            Ok(Response::Accepted) => {
                self.counters.timeout();
                Err(Error::Timeout { spins: self.spin_budget })
            }
            Err(err @ Error::Timeout { .. }) => {
                self.counters.timeout();
                warn!(target: "flash::client", "{}", err);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub fn spin_budget(&self) -> u32 {
        self.spin_budget
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn stats(&self) -> FlashStats {
        self.counters.snapshot()
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.counters
    }
}

static_assertions::assert_impl_all!(AcceleratorClient<crate::bridge::MmioBridge<'static, crate::bridge::VolatileMmio>>: Send, Sync);
