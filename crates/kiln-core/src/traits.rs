//! # KILN Collaborator Traits
//!
//! The channel pool drives hardware it does not own. Everything below the
//! pool (engine control, power, the shared syncpoint table) is reached
//! through these traits so each chip generation plugs in its own backend.
//!
//! ```text
//! ChannelPool
//!    │
//!    ├── EngineOps      (per-chip channel hooks)
//!    ├── PowerControl   (keep the host powered during teardown)
//!    └── SyncptTable    (shared syncpoint bookkeeping)
//! ```

use crate::error::Result;
use crate::types::*;

// =============================================================================
// ENGINE OPS
// =============================================================================

bitflags::bitflags! {
    /// Optional channel hooks a backend implements
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EngineCaps: u32 {
        /// `lower_priority` is meaningful
        const LOW_PRIORITY = 1 << 0;
        /// `init_gather_filter` is meaningful
        const GATHER_FILTER = 1 << 1;
    }
}

/// Job handed to the engine backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobDesc {
    /// Number of command buffers (gathers)
    pub num_cmdbufs: u32,
    /// Syncpoint incremented by the job
    pub syncpt: Option<SyncptId>,
    /// Number of increments the job performs
    pub syncpt_incrs: u32,
    /// Submit timeout in milliseconds, 0 for none
    pub timeout_ms: u32,
}

/// Hardware-specific channel operations
pub trait EngineOps: Send + Sync {
    /// Optional hooks this backend supports
    fn caps(&self) -> EngineCaps {
        EngineCaps::empty()
    }

    /// Initialize the hardware side of a channel slot
    fn init_channel(&self, channel: ChannelId) -> Result<()>;

    /// Stop the command stream of a channel
    fn stop_stream(&self, channel: ChannelId);

    /// Drop the channel to low scheduling priority
    fn lower_priority(&self, _channel: ChannelId) {}

    /// Program the gather filter of a channel
    fn init_gather_filter(&self, _channel: ChannelId) {}

    /// Submit a job, returning the syncpoint threshold it completes at
    fn submit(&self, channel: ChannelId, job: &JobDesc) -> Result<u32>;
}

// =============================================================================
// POWER CONTROL
// =============================================================================

/// Power management of the host device
pub trait PowerControl: Send + Sync {
    /// Keep the device powered until `release_active`
    fn request_active(&self) -> Result<()>;

    /// Drop a request taken with `request_active`
    fn release_active(&self);
}

// =============================================================================
// SYNCPOINT TABLE
// =============================================================================

/// Shared syncpoint bookkeeping
pub trait SyncptTable: Send + Sync {
    /// Mark a syncpoint as no longer used by hardware
    fn mark_unused(&self, id: SyncptId);

    /// Drop one reference on a shared syncpoint
    fn put_ref(&self, id: SyncptId);
}

static_assertions::assert_impl_all!(ChannelId: Send, Sync, Copy);
static_assertions::assert_impl_all!(DeviceData: Send, Sync, Clone);
