//! # Channel Slots
//!
//! A slot is one hardware channel managed by the pool. The pool mutates
//! slots only under its lock.

use alloc::sync::Arc;

use arrayvec::ArrayVec;
use kiln_core::{ChannelId, ClientTag, DeviceData, SyncptId};

/// Maximum number of syncpoints bound to one channel
pub const MAX_SYNCPTS: usize = 16;

bitflags::bitflags! {
    /// Slot status bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SlotFlags: u32 {
        /// Last teardown ran without power; its syncpoints were leaked
        const DEGRADED = 1 << 0;
    }
}

/// Handle to a mapped channel
///
/// Handles are plain references into the pool; the reference count lives
/// in the slot. Every `acquire` or `get_channel` must be matched by one
/// unit of `release`.
///
/// A handle names one allocation of its slot. Once the slot is torn down
/// and handed out again, the old handle is rejected with `NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub(crate) id: ChannelId,
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl ChannelHandle {
    /// Hardware channel id
    #[inline]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Slot index in the pool
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Allocation generation of the slot this handle was issued for
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Channel slot state
#[derive(Debug)]
pub(crate) struct ChannelSlot {
    /// Hardware channel id
    pub(crate) id: ChannelId,
    /// Client tag, `None` once freed or detached
    pub(crate) identifier: Option<ClientTag>,
    /// Live references
    pub(crate) refcount: u32,
    /// Device the channel is mapped to
    pub(crate) device: Option<Arc<DeviceData>>,
    /// Syncpoints bound to the channel
    pub(crate) syncpts: ArrayVec<SyncptId, MAX_SYNCPTS>,
    /// Syncpoint managed by the client itself
    pub(crate) client_managed_syncpt: Option<SyncptId>,
    /// Status bits
    pub(crate) flags: SlotFlags,
    /// Bumped every time the slot is allocated
    pub(crate) generation: u32,
}

impl ChannelSlot {
    pub(crate) fn new(id: ChannelId) -> Self {
        Self {
            id,
            identifier: None,
            refcount: 0,
            device: None,
            syncpts: ArrayVec::new(),
            client_managed_syncpt: None,
            flags: SlotFlags::empty(),
            generation: 0,
        }
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.refcount > 0
    }

    pub(crate) fn handle(&self, index: usize) -> ChannelHandle {
        ChannelHandle {
            id: self.id,
            index,
            generation: self.generation,
        }
    }

    pub(crate) fn status(&self, allocated: bool) -> SlotStatus {
        SlotStatus {
            id: self.id,
            allocated,
            refcount: self.refcount,
            identifier: self.identifier,
            device: self.device.as_ref().map(|d| d.name),
            syncpts: self.syncpts.len(),
            flags: self.flags,
        }
    }
}

/// Snapshot of a slot, for observation by upper layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    /// Hardware channel id
    pub id: ChannelId,
    /// Allocation bit
    pub allocated: bool,
    /// Live references
    pub refcount: u32,
    /// Client tag
    pub identifier: Option<ClientTag>,
    /// Name of the bound device
    pub device: Option<&'static str>,
    /// Number of bound syncpoints
    pub syncpts: usize,
    /// Status bits
    pub flags: SlotFlags,
}

impl SlotStatus {
    /// Check if the last teardown leaked resources
    pub fn is_degraded(&self) -> bool {
        self.flags.contains(SlotFlags::DEGRADED)
    }
}
