// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Least-loaded placement for newly admitted entities.
//!
//! Processors are scanned in ascending index order and the first strict
//! minimum wins, so ties always resolve to the lowest index. Entity priority and
//! affinity play no part.

use crate::rq::FlashRq;
use crate::types::CpuId;

/// Returns the index of the first minimum in `counts`, or `None` when empty.
pub fn least_loaded<I>(counts: I) -> Option<usize>
where
    I: IntoIterator<Item = usize>,
{
    let mut best: Option<(usize, usize)> = None;
    for (idx, count) in counts.into_iter().enumerate() {
        match best {
            Some((_, min)) if count >= min => {}
            _ => best = Some((idx, count)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Picks the processor whose run queue currently holds the fewest entities.
///
/// An empty set falls back to the boot processor.
pub fn choose_processor(rqs: &[FlashRq]) -> CpuId {
    least_loaded(rqs.iter().map(FlashRq::count))
        .map(|idx| CpuId::from_raw(idx as u16))
        .unwrap_or(CpuId::BOOT)
}
