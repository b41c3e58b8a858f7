//! # KILN Core Types
//!
//! Strongly typed identifiers and descriptors used by both halves of the
//! driver.

use core::fmt;

// =============================================================================
// CHANNEL ID
// =============================================================================

/// Hardware channel identifier
///
/// Channel ids are assigned sequentially from the host's channel base, so
/// the id of a slot is `ch_base + index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ChannelId(u32);

impl ChannelId {
    /// Create from raw id
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get raw id
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// SYNCPOINT ID
// =============================================================================

/// Hardware syncpoint (completion counter) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SyncptId(u32);

impl SyncptId {
    /// Create from raw id
    ///
    /// Id 0 is reserved by the hardware as "no syncpoint".
    #[inline]
    pub const fn new(id: u32) -> Option<Self> {
        if id == 0 {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Get raw id
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

// =============================================================================
// MODULE ID
// =============================================================================

/// Logical engine/subsystem identifier
///
/// Bits 0..16 select the engine, bits 16.. select the instance for engines
/// that exist more than once (e.g. a second ISP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ModuleId(u32);

impl ModuleId {
    /// Shift of the instance field
    pub const INSTANCE_SHIFT: u32 = 16;

    /// The host controller itself
    pub const HOST: Self = Self(0);
    /// Image signal processor
    pub const ISP: Self = Self(1);
    /// Video input
    pub const VI: Self = Self(2);
    /// Video encoder
    pub const MSENC: Self = Self(3);
    /// Video image compositor
    pub const VIC: Self = Self(4);
    /// Video decoder
    pub const NVDEC: Self = Self(5);
    /// JPEG engine
    pub const NVJPG: Self = Self(6);

    /// Create from raw id
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get raw id
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Engine part of the id
    #[inline]
    pub const fn engine(self) -> u32 {
        self.0 & ((1 << Self::INSTANCE_SHIFT) - 1)
    }

    /// Instance number
    #[inline]
    pub const fn instance(self) -> u32 {
        self.0 >> Self::INSTANCE_SHIFT
    }

    /// Same engine, different instance
    #[inline]
    pub const fn with_instance(self, instance: u32) -> Self {
        Self(self.engine() | (instance << Self::INSTANCE_SHIFT))
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance() == 0 {
            write!(f, "{}", self.engine())
        } else {
            write!(f, "{}.{}", self.engine(), self.instance())
        }
    }
}

// =============================================================================
// CLIENT TAG
// =============================================================================

/// Opaque tag a client uses to find its channel again
///
/// The pool never interprets the value; it only compares tags for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ClientTag(u64);

impl ClientTag {
    /// Create from raw value
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get raw value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

// =============================================================================
// RESOURCE POLICY
// =============================================================================

/// How a client device owns its syncpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourcePolicy {
    /// Syncpoints are shared by all channels of the device and refcounted
    PerDevice,
    /// Each channel owns its syncpoints exclusively
    #[default]
    PerChannel,
}

// =============================================================================
// DEVICE DATA
// =============================================================================

/// Per-client-device data a channel is bound to while mapped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceData {
    /// Device name (for logs)
    pub name: &'static str,
    /// Module the device drives
    pub module: ModuleId,
    /// Syncpoint ownership policy
    pub resource_policy: ResourcePolicy,
}

impl DeviceData {
    /// Create device data
    pub const fn new(name: &'static str, module: ModuleId, resource_policy: ResourcePolicy) -> Self {
        Self {
            name,
            module,
            resource_policy,
        }
    }
}

// =============================================================================
// HOST INFO
// =============================================================================

/// Channel geometry of the host controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostInfo {
    /// Number of channel slots managed by this driver
    pub nb_channels: u32,
    /// Id of the first managed channel
    pub ch_base: u32,
    /// Number of channel ids the hardware exposes
    pub ch_limit: u32,
}

impl HostInfo {
    /// Create host info
    pub const fn new(nb_channels: u32, ch_base: u32, ch_limit: u32) -> Self {
        Self {
            nb_channels,
            ch_base,
            ch_limit,
        }
    }

    /// Channel id of a slot index
    #[inline]
    pub const fn id_from_index(&self, index: usize) -> ChannelId {
        ChannelId::new(self.ch_base + index as u32)
    }

    /// Slot index of a channel id, if the id belongs to this host
    #[inline]
    pub fn index_from_id(&self, id: ChannelId) -> Option<usize> {
        let index = id.raw().checked_sub(self.ch_base)?;
        if index < self.nb_channels {
            Some(index as usize)
        } else {
            None
        }
    }

    /// Check that every managed id is exposed by the hardware
    pub fn is_valid(&self) -> bool {
        self.nb_channels > 0
            && self
                .ch_base
                .checked_add(self.nb_channels)
                .is_some_and(|end| end <= self.ch_limit)
    }
}
