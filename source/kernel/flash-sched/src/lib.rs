// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: FLASH scheduling class: hardware-offloaded task selection
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: unit tests per module + tests/ (host backend)
//! PUBLIC API: FlashClass, SchedClass, HostCore, Schedulable, AcceleratorClient, FlashRq,
//!             DeviceBridge, MmioBridge, IrqLatch, FlashConfig, Error, SimAccelerator (backend-host)
//! DEPENDS_ON: flash-wire, spin, log, thiserror, parking_lot (backend-host)
//! INVARIANTS: accelerator is the only authority on scheduling order; bounded device waits
//!
//! The class forwards every runnable-state transition to an external
//! accelerator and asks it which entity to run. Locally it keeps only a
//! per-processor count of admitted entities, used to place new entities on
//! the least-loaded processor.
//!
//! ```text
//!  host core ──► FlashClass ──► AcceleratorClient ──► DeviceBridge ──► accelerator
//!                   │                  (flash-wire codec)     ▲
//!                   └── FlashRq[cpu] (counts)                 └── IrqLatch
//! ```
//!
//! Kernel builds disable default features (`backend-os`), which leaves the
//! crate `no_std` + `alloc`.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(not(test), forbid(clippy::unwrap_used))]

extern crate alloc;

pub mod balance;
pub mod bridge;
pub mod class;
pub mod client;
pub mod config;
pub mod error;
pub mod rq;
#[cfg(feature = "backend-host")]
pub mod sim;
mod stats;
pub mod types;

pub use bridge::{Attachment, DeviceBridge, IrqLatch, Mmio, MmioBridge, RegisterLayout, Request, Response};
pub use class::{FlashClass, SchedClass, TickOutcome};
pub use client::AcceleratorClient;
pub use config::{DesyncPolicy, FlashConfig, MAX_CPUS};
pub use error::{Error, Result};
pub use rq::FlashRq;
#[cfg(feature = "backend-host")]
pub use sim::SimAccelerator;
pub use stats::FlashStats;
pub use types::{ClassKind, CpuId, Entity, HostCore, Schedulable};

pub use flash_wire::{ChangeKind, ChangeMessage, EntityId, TaskState};
