//! # Channel Lifecycle
//!
//! Teardown of a channel slot after its last reference is dropped.
//!
//! ## Teardown Sequence
//!
//! ```text
//!  refcount 1 → 0 (under pool lock: take syncpoints, keep bit set)
//!        │
//!        ▼
//!  request_active ──fail──┐   (leak warning, slot marked DEGRADED)
//!        │                │
//!  stop_stream            │
//!  lower_priority (opt)   │
//!  release syncpoints     │
//!  release_active         │
//!        │                │
//!        ▼                ▼
//!  under pool lock: clear bit, identifier, device → notify waiters
//! ```
//!
//! While the sequence runs the slot has refcount 0 but its allocation bit
//! is still set, so `acquire` can neither alias it nor hand it out again.

use alloc::sync::Arc;

use arrayvec::ArrayVec;
use kiln_core::{ChannelId, DeviceData, Error, ResourcePolicy, SyncptId};

use crate::pool::ChannelPool;
use crate::slot::{SlotFlags, MAX_SYNCPTS};

// =============================================================================
// OUTCOMES
// =============================================================================

/// Result of a `release`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// References remain
    Released {
        /// Refcount after the release
        remaining: u32,
    },
    /// The last reference was dropped and the slot was torn down
    TornDown(TeardownReport),
    /// More references were released than held; nothing was changed
    Underflow {
        /// Count passed to `release`
        requested: u32,
        /// Refcount at the time of the call
        available: u32,
    },
}

impl ReleaseOutcome {
    /// Check if this release tore the slot down
    pub fn is_torn_down(&self) -> bool {
        matches!(self, Self::TornDown(_))
    }

    /// Error value of a rejected release
    ///
    /// `Some(Error::RefcountUnderflow)` for an underflow. The release itself
    /// still succeeded as a no-op.
    pub fn error(&self) -> Option<Error> {
        match self {
            Self::Underflow { .. } => Some(Error::RefcountUnderflow),
            Self::Released { .. } | Self::TornDown(_) => None,
        }
    }
}

/// What the teardown of one slot did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    /// Channel that was torn down
    pub channel: ChannelId,
    /// Syncpoints handed back to the syncpoint table
    pub syncpts_released: usize,
    /// Syncpoints left allocated because the device could not be powered
    pub syncpts_leaked: usize,
    /// Power-up failed; hardware steps were skipped
    pub degraded: bool,
    /// The slot returned to the free pool
    pub freed: bool,
}

// =============================================================================
// DETACHED SLOT
// =============================================================================

/// Teardown inputs taken out of a slot at its 1 → 0 transition
#[derive(Debug)]
pub(crate) struct DetachedSlot {
    pub(crate) index: usize,
    pub(crate) id: ChannelId,
    pub(crate) device: Option<Arc<DeviceData>>,
    pub(crate) syncpts: ArrayVec<SyncptId, MAX_SYNCPTS>,
    pub(crate) client_managed_syncpt: Option<SyncptId>,
}

// =============================================================================
// TEARDOWN
// =============================================================================

/// Tear down a detached slot and return it to the pool
pub(crate) fn unmap(pool: &ChannelPool, slot: DetachedSlot) -> TeardownReport {
    let mut report = TeardownReport {
        channel: slot.id,
        syncpts_released: 0,
        syncpts_leaked: 0,
        degraded: false,
        freed: false,
    };

    let Some(device) = slot.device else {
        log::error!("kiln: freeing unmapped channel {}", slot.id);
        return report;
    };

    let owned = slot.syncpts.len() + usize::from(slot.client_managed_syncpt.is_some());

    match pool.power.request_active() {
        Ok(()) => {
            pool.engine.stop_stream(slot.id);

            if pool.engine.caps().contains(kiln_core::EngineCaps::LOW_PRIORITY) {
                pool.engine.lower_priority(slot.id);
            }

            log::debug!("kiln: channel {} un-mapped from {}", slot.id, device.name);

            for id in slot.syncpts.iter().copied().chain(slot.client_managed_syncpt) {
                release_syncpt(pool, &device, id);
            }
            report.syncpts_released = owned;

            pool.power.release_active();
        },
        Err(err) => {
            log::warn!(
                "kiln: failed to power-up host ({}), leaking {} syncpts of channel {}",
                err,
                owned,
                slot.id
            );
            report.syncpts_leaked = owned;
            report.degraded = true;
        },
    }

    {
        let mut state = pool.state.lock();
        state.allocated.clear(slot.index);

        let entry = &mut state.slots[slot.index];
        entry.device = None;
        entry.identifier = None;
        if report.degraded {
            entry.flags.insert(SlotFlags::DEGRADED);
        }
    }
    report.freed = true;

    pool.waiter.notify();
    report
}

/// Hand one syncpoint back to the shared table
fn release_syncpt(pool: &ChannelPool, device: &DeviceData, id: SyncptId) {
    pool.syncpts.mark_unused(id);

    if device.resource_policy == ResourcePolicy::PerDevice {
        pool.syncpts.put_ref(id);
    }
}
