// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Device bridge contract between the FLASH class and the accelerator
//! OWNERS: @kernel-sched-team
//! PUBLIC API: DeviceBridge, Request, Response, Attachment, Mmio, MmioBridge, RegisterLayout, IrqLatch
//! DEPENDS_ON: flash_wire (payload layout)
//! INVARIANTS: one request is one complete transaction; callers serialize transactions
//!
//! The bridge owns register access and interrupt delivery. Everything above it
//! sees a single `request -> response` call per transaction.

pub mod irq;
pub mod mmio;

pub use irq::IrqLatch;
pub use mmio::{Mmio, MmioBridge, RegisterLayout, VolatileMmio};

use flash_wire::ChangeMessage;

use crate::error::Result;

/// One transaction with the accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Deliver a change message. Fire-and-forget: the device never acknowledges.
    Change(ChangeMessage),
    /// Ask for the next entity, polling the reply at most `spin_budget` times.
    Schedule { spin_budget: u32 },
}

/// Device answer to a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// The change message was written.
    Accepted,
    /// Raw reply word of a schedule request.
    Reply(u32),
}

/// Transport to the accelerator.
///
/// Implementations need not be reentrant: the accelerator client holds a
/// lock across every call.
pub trait DeviceBridge {
    fn request(&self, request: Request) -> Result<Response>;
}

impl<B: DeviceBridge + ?Sized> DeviceBridge for &B {
    fn request(&self, request: Request) -> Result<Response> {
        (**self).request(request)
    }
}

/// Whether an accelerator is present when the class is installed.
#[derive(Debug)]
pub enum Attachment<B> {
    Attached(B),
    Detached,
}

impl<B> Attachment<B> {
    pub fn is_attached(&self) -> bool {
        matches!(self, Attachment::Attached(_))
    }
}

impl<B> From<Option<B>> for Attachment<B> {
    fn from(bridge: Option<B>) -> Self {
        match bridge {
            Some(bridge) => Attachment::Attached(bridge),
            None => Attachment::Detached,
        }
    }
}
