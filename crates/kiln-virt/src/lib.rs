//! # KILN Virtualization
//!
//! Register access to host-owned hardware from inside a virtual machine.
//! Every access becomes a command message sent over a queue transport to
//! the server partition, which performs it on the real hardware.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ staging   user buffers ⇄ driver buffers     │
//! ├─────────────────────────────────────────────┤
//! │ regs      chunked REGRDWR round trips       │
//! ├─────────────────────────────────────────────┤
//! │ client    connections, send/receive         │
//! ├─────────────────────────────────────────────┤
//! │ protocol  256-byte wire messages            │
//! ├─────────────────────────────────────────────┤
//! │ transport (platform queue substrate)        │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - `trace-regs`: log every register offset and value at trace level

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod client;
pub mod modules;
pub mod protocol;
pub mod regs;
pub mod staging;
pub mod transport;

#[cfg(all(test, feature = "std"))]
mod test_helpers;

pub use client::{ConnState, VirtClient, VirtConfig, VirtConnection};
pub use modules::ModuleMap;
pub use protocol::{
    RemoteModuleId, VirtCmd, VirtReply, VirtRequest, WireMsg, MSG_SIZE, REGRDWR_ARRAY_SIZE,
};
pub use regs::{RegTransfer, RegValues};
pub use staging::{UserMemory, UserPtr, UserRegRequest};
pub use transport::{QueueConfig, ReplyBuffer, ReplyToken, Transport, TransportResult};
