// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Tunables for the FLASH scheduling class
//! OWNERS: @kernel-sched-team
//! PUBLIC API: FlashConfig, DesyncPolicy, MAX_CPUS
//! INVARIANTS: reply_spin_budget >= 1; 1 <= max_cpus <= MAX_CPUS

/// Upper bound on processors a single class instance tracks.
pub const MAX_CPUS: usize = 64;

const DEFAULT_REPLY_SPIN_BUDGET: u32 = 1_000_000;
const DEFAULT_CPUS: usize = 4;

/// What the class does when the accelerator names an entity the host cannot resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesyncPolicy {
    /// Run nothing from this class for the tick.
    SkipTick,
    /// Skip the tick and tell the accelerator the id is dead so it stops picking it.
    RetireUnknown,
}

/// Configuration handed to [`crate::FlashClass::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashConfig {
    reply_spin_budget: u32,
    max_cpus: usize,
    desync_policy: DesyncPolicy,
}

impl FlashConfig {
    pub const fn new() -> Self {
        Self {
            reply_spin_budget: DEFAULT_REPLY_SPIN_BUDGET,
            max_cpus: DEFAULT_CPUS,
            desync_policy: DesyncPolicy::SkipTick,
        }
    }

    /// Polls of the reply register before a schedule request times out.
    ///
    /// Zero is clamped to one: a request always reads the reply at least once.
    pub const fn with_reply_spin_budget(mut self, spins: u32) -> Self {
        self.reply_spin_budget = if spins == 0 { 1 } else { spins };
        self
    }

    /// Number of processors with a FLASH run queue, clamped to `1..=MAX_CPUS`.
    pub const fn with_max_cpus(mut self, cpus: usize) -> Self {
        self.max_cpus = if cpus == 0 {
            1
        } else if cpus > MAX_CPUS {
            MAX_CPUS
        } else {
            cpus
        };
        self
    }

    pub const fn with_desync_policy(mut self, policy: DesyncPolicy) -> Self {
        self.desync_policy = policy;
        self
    }

    #[inline]
    pub const fn reply_spin_budget(&self) -> u32 {
        self.reply_spin_budget
    }

    #[inline]
    pub const fn max_cpus(&self) -> usize {
        self.max_cpus
    }

    #[inline]
    pub const fn desync_policy(&self) -> DesyncPolicy {
        self.desync_policy
    }
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self::new()
    }
}
