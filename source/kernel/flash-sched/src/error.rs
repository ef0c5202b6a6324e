// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy of the FLASH scheduling class.

use flash_wire::EntityId;

use crate::types::CpuId;

/// Result alias for scheduling-class operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced while talking to the accelerator or the host core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No accelerator is attached; the class cannot be installed.
    #[error("accelerator not attached")]
    DeviceUnavailable,
    /// The accelerator did not answer a schedule request within the spin budget.
    #[error("accelerator reply timed out after {spins} spins")]
    Timeout { spins: u32 },
    /// The accelerator picked an id the host cannot resolve.
    #[error("accelerator returned unknown entity {id}")]
    UnknownEntity { id: EntityId },
    /// A callback named a processor outside the configured set.
    #[error("invalid cpu {cpu}")]
    InvalidCpu { cpu: CpuId },
}
