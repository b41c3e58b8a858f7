//! # Message Transport
//!
//! The queue-based substrate that carries command messages to the server
//! and back. KILN only drives it; bring-up of the underlying shared-memory
//! queues belongs to the platform.

use alloc::vec::Vec;

use arrayvec::ArrayVec;
use kiln_core::TransportErrorCode;

use crate::protocol::MSG_SIZE;

/// Maximum number of queues a transport context spans
pub const MAX_QUEUES: usize = 4;

/// Transport result type
pub type TransportResult<T> = core::result::Result<T, TransportErrorCode>;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Queue layout of the client transport context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Element size of each queue, in bytes
    pub queue_sizes: ArrayVec<usize, MAX_QUEUES>,
    /// Queue carrying command messages
    pub cmd_queue: usize,
    /// Elements per queue
    pub elem_count: usize,
}

impl QueueConfig {
    /// Default elements per queue
    pub const DEFAULT_ELEM_COUNT: usize = 3;

    /// Single command queue sized for one message
    pub fn single() -> Self {
        let mut queue_sizes = ArrayVec::new();
        queue_sizes.push(MSG_SIZE);

        Self {
            queue_sizes,
            cmd_queue: 0,
            elem_count: Self::DEFAULT_ELEM_COUNT,
        }
    }

    /// Check that the command queue exists and can hold a message
    pub fn is_valid(&self) -> bool {
        self.elem_count > 0
            && self
                .queue_sizes
                .get(self.cmd_queue)
                .is_some_and(|&size| size >= MSG_SIZE)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::single()
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Token naming a reply buffer owned by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplyToken(pub u64);

/// Reply handed back by [`Transport::exchange`]
///
/// The buffer stays reserved in the transport until its token is given
/// back through [`Transport::release`].
#[derive(Debug)]
pub struct ReplyBuffer {
    /// Release token
    pub token: ReplyToken,
    /// Reply bytes
    pub data: Vec<u8>,
}

/// Message transport to the virtualization server
pub trait Transport: Send + Sync {
    /// Bring up the client context
    fn init(&self, config: &QueueConfig) -> TransportResult<()>;

    /// Tear down the client context
    fn teardown(&self, config: &QueueConfig);

    /// Send `request` on the command queue and block for the reply
    fn exchange(&self, request: &[u8]) -> TransportResult<ReplyBuffer>;

    /// Return a reply buffer to the transport
    fn release(&self, token: ReplyToken);
}

static_assertions::assert_obj_safe!(Transport);
