// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Wire format spoken between the FLASH scheduling class and the accelerator
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Stable (bit layout is fixed by the device)
//! TEST_COVERAGE: unit tests + proptest round trips (tests/codec.rs)
//! PUBLIC API: ChangeKind, ChangeMessage, EntityId, TaskState, RequestKind, decode_reply()
//! DEPENDS_ON: bitflags
//! INVARIANTS: 48-bit payload in two LE words; high word top 16 bits zero; NEW implies PRI|STATE
//!
//! Change message layout (bit-exact):
//!
//! ```text
//!  63        48 47        32 31    24 23          8 7      0
//! +------------+------------+--------+-------------+--------+
//! |    zero    |   state    |  prio  |     id      |  type  |
//! +------------+------------+--------+-------------+--------+
//!  \________ high word ____/ \_________ low word ___________/
//! ```
//!
//! Replies to a schedule request are a single word whose low 16 bits carry
//! the chosen entity id. The codec never validates device replies.

#![cfg_attr(not(test), no_std)]

use core::fmt;

use bitflags::bitflags;

bitflags! {
    /// Flag set carried in the `type` byte of a change message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangeKind: u8 {
        /// The entity's priority changed.
        const PRI_CHANGED = 0x1;
        /// The entity's run state changed.
        const STATE_CHANGED = 0x2;
        /// The entity was just admitted. Never sent on its own.
        const NEWLY_CREATED = 0x4;
        /// Admission: a new entity carries both a priority and a state.
        const NEW = Self::NEWLY_CREATED.bits() | Self::PRI_CHANGED.bits() | Self::STATE_CHANGED.bits();
    }
}

impl ChangeKind {
    /// Returns the flag set with the admission invariant applied.
    ///
    /// A set containing `NEWLY_CREATED` always gains `PRI_CHANGED` and
    /// `STATE_CHANGED`; anything else is returned untouched.
    #[inline]
    pub const fn normalized(self) -> Self {
        if self.contains(Self::NEWLY_CREATED) {
            self.union(Self::NEW)
        } else {
            self
        }
    }

    /// True when this kind announces a newly admitted entity.
    #[inline]
    pub const fn is_admission(self) -> bool {
        self.contains(Self::NEWLY_CREATED)
    }
}

/// Identifier of a schedulable entity as known to the accelerator.
///
/// Only 16 bits are meaningful on the wire; ids are reused once an entity
/// has been retired with a `DEAD` state change.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u16);

impl EntityId {
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for EntityId {
    #[inline]
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

/// Run state of an entity, using the host kernel's task-state encoding.
///
/// The value is opaque to the wire format; the scheduling class only ever
/// sends [`TaskState::RUNNABLE`] on admission and [`TaskState::DEAD`] on
/// removal. Unknown values survive a decode unchanged.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TaskState(u16);

impl TaskState {
    pub const RUNNABLE: Self = Self(0x0000);
    pub const INTERRUPTIBLE: Self = Self(0x0001);
    pub const UNINTERRUPTIBLE: Self = Self(0x0002);
    pub const STOPPED: Self = Self(0x0004);
    pub const TRACED: Self = Self(0x0008);
    pub const ZOMBIE: Self = Self(0x0010);
    pub const DEAD: Self = Self(0x0020);
    pub const WAKEKILL: Self = Self(0x0080);
    pub const WAKING: Self = Self(0x0100);
    pub const PARKED: Self = Self(0x0200);

    const NAMES: [(Self, &'static str); 10] = [
        (Self::RUNNABLE, "runnable"),
        (Self::INTERRUPTIBLE, "interruptible"),
        (Self::UNINTERRUPTIBLE, "uninterruptible"),
        (Self::STOPPED, "stopped"),
        (Self::TRACED, "traced"),
        (Self::ZOMBIE, "zombie"),
        (Self::DEAD, "dead"),
        (Self::WAKEKILL, "wakekill"),
        (Self::WAKING, "waking"),
        (Self::PARKED, "parked"),
    ];

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u16 {
        self.0
    }

    /// Returns the symbolic name for the well-known states.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMES.iter().find(|(state, _)| *state == self).map(|(_, name)| *name)
    }

    /// Parses a symbolic state name (as printed by [`TaskState::name`]).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES.iter().find(|(_, n)| n.eq_ignore_ascii_case(name)).map(|(state, _)| *state)
    }
}

impl fmt::Debug for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "TaskState({:#06x})", self.0),
        }
    }
}

/// Request kinds understood by the accelerator.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Ask the accelerator to pick the next entity.
    Schedule = 0,
    /// Deliver a change message.
    Change = 1,
}

/// Mask of the payload bits a change message may occupy.
pub const PAYLOAD_MASK: u64 = (1 << 48) - 1;

const ID_SHIFT: u32 = 8;
const PRIORITY_SHIFT: u32 = 24;
const STATE_SHIFT: u32 = 32;

/// A change notification for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeMessage {
    pub kind: ChangeKind,
    pub id: EntityId,
    pub priority: u8,
    pub state: TaskState,
}

impl ChangeMessage {
    /// Builds a message, applying [`ChangeKind::normalized`] to `kind`.
    pub const fn new(kind: ChangeKind, id: EntityId, priority: u8, state: TaskState) -> Self {
        Self { kind: kind.normalized(), id, priority, state }
    }

    /// Packs the message into its 48-bit payload.
    #[inline]
    pub const fn encode(&self) -> u64 {
        (self.kind.bits() as u64)
            | ((self.id.as_raw() as u64) << ID_SHIFT)
            | ((self.priority as u64) << PRIORITY_SHIFT)
            | ((self.state.as_raw() as u64) << STATE_SHIFT)
    }

    /// Unpacks a payload. Bits above 47 are ignored.
    #[inline]
    pub const fn decode(payload: u64) -> Self {
        Self {
            kind: ChangeKind::from_bits_retain(payload as u8),
            id: EntityId::from_raw((payload >> ID_SHIFT) as u16),
            priority: (payload >> PRIORITY_SHIFT) as u8,
            state: TaskState::from_raw((payload >> STATE_SHIFT) as u16),
        }
    }

    /// Splits the payload into the two register writes, low word first.
    #[inline]
    pub const fn to_words(&self) -> [u32; 2] {
        let payload = self.encode();
        [payload as u32, (payload >> 32) as u32]
    }

    /// Reassembles a message from the two register writes.
    #[inline]
    pub const fn from_words(low: u32, high: u32) -> Self {
        Self::decode(((high as u64) << 32) | low as u64)
    }
}

/// Decodes the reply word of a schedule request into an entity id.
#[inline]
pub const fn decode_reply(word: u32) -> EntityId {
    EntityId::from_raw(word as u16)
}

/// Encodes an entity id as a reply word (device side).
#[inline]
pub const fn encode_reply(id: EntityId) -> u32 {
    id.as_raw() as u32
}
