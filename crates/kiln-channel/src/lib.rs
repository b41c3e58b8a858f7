//! # KILN Channel Pool
//!
//! Allocation and reference-counted lifecycle of the host's hardware
//! channel slots.
//!
//! ## Slot States
//!
//! ```text
//!              acquire                 release (last ref)
//!   ┌──────┐ ──────────▶ ┌──────┐ ────────────────────────▶ ┌──────────┐
//!   │ FREE │             │ LIVE │                           │ TEARDOWN │
//!   └──────┘ ◀─────────┐ └──────┘                           └────┬─────┘
//!                      │   ▲  │ acquire (same tag)               │
//!                      │   └──┘ get_channel                      │
//!                      └─────────────────────────────────────────┘
//!                              bit cleared, waiters notified
//! ```
//!
//! `FREE` slots have their allocation bit clear. `LIVE` slots hold at
//! least one reference. A `TEARDOWN` slot has no reference left but keeps
//! its bit set until the hardware has been quiesced.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bitmap;
pub mod lifecycle;
pub mod pool;
pub mod slot;

#[cfg(all(test, feature = "std"))]
mod test_helpers;

pub use bitmap::AllocBitmap;
pub use lifecycle::{ReleaseOutcome, TeardownReport};
pub use pool::{ChannelPool, PoolBackend, PoolConfig};
pub use slot::{ChannelHandle, SlotFlags, SlotStatus, MAX_SYNCPTS};
