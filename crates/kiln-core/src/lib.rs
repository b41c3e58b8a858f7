//! # KILN Core
//!
//! Foundational types shared by the KILN channel pool and the KILN
//! virtualization client.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       kiln-core                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Types     │  │   Traits    │  │   Error / Sync      │  │
//! │  │ (ChannelId, │  │ (EngineOps, │  │  (Error, Result,    │  │
//! │  │  ModuleId)  │  │  Power...)  │  │   SlotWaiter)       │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲                                     ▲
//!          │                                     │
//!   ┌──────┴───────┐                     ┌───────┴──────┐
//!   │ kiln-channel │                     │  kiln-virt   │
//!   └──────────────┘                     └──────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod sync;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result, TransportErrorCode};
pub use sync::{SlotWaiter, WaitStatus};
pub use traits::*;
pub use types::*;

#[cfg(feature = "std")]
pub use sync::CondvarWaiter;
