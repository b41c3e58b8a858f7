//! # KILN Error Handling
//!
//! Error types shared by the channel pool and the virtualization client.
//!
//! Error handling in KILN follows these principles:
//! - Errors are typed and categorized
//! - No panics in production code paths
//! - Teardown never fails: problems found while tearing a slot down are
//!   logged and recorded on the slot instead of being returned
//! - Errors are `no_std` compatible

use core::fmt;

use crate::types::ModuleId;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// KILN Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// KILN unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Invalid parameter provided
    InvalidParameter,
    /// Resource not found
    NotFound,
    /// Operation timed out
    Timeout,
    /// A fixed-capacity resource is full
    ResourceExhausted,

    // =========================================================================
    // Channel Pool Errors
    // =========================================================================
    /// Channel slot allocation or initialization failed
    AllocationFailed,
    /// A release asked for more references than the slot holds
    ///
    /// Carried by a rejected release outcome rather than returned.
    RefcountUnderflow,
    /// Device could not be kept powered
    ///
    /// Returned by `PowerControl` implementations that fail to power up.
    PowerFailed,

    // =========================================================================
    // Virtualization Errors
    // =========================================================================
    /// Module is not known to the virtualization server
    UnsupportedModule(ModuleId),
    /// No connection to the server for this module
    ConnectionFailed,
    /// The message transport failed
    Transport(TransportErrorCode),
    /// The server answered with a nonzero status
    RemoteStatus(i32),
    /// The reply does not match the request
    InvalidReply,

    // =========================================================================
    // Staging Errors
    // =========================================================================
    /// Copying to or from a caller buffer faulted
    CopyFault,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Generic
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::NotFound => write!(f, "resource not found"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::ResourceExhausted => write!(f, "resource exhausted"),

            // Channel pool
            Self::AllocationFailed => write!(f, "channel allocation failed"),
            Self::RefcountUnderflow => write!(f, "channel refcount underflow"),
            Self::PowerFailed => write!(f, "device power-up failed"),

            // Virtualization
            Self::UnsupportedModule(id) => write!(f, "module {} not virtualized", id),
            Self::ConnectionFailed => write!(f, "not connected to server"),
            Self::Transport(code) => write!(f, "transport error: {:?}", code),
            Self::RemoteStatus(ret) => write!(f, "server returned status {}", ret),
            Self::InvalidReply => write!(f, "invalid reply message"),

            // Staging
            Self::CopyFault => write!(f, "bad user buffer"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

// =============================================================================
// SUB-ERROR TYPES
// =============================================================================

/// Transport substrate error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorCode {
    /// Queue bring-up failed
    InitFailed,
    /// Transport is not initialized
    NotReady,
    /// Send side failed
    SendFailed,
    /// Receive side failed or was interrupted
    RecvFailed,
    /// Reply shorter than the request message
    ShortReply,
    /// Substrate-specific failure
    Other(i32),
}

// =============================================================================
// ERROR CONVERSION
// =============================================================================

impl From<TransportErrorCode> for Error {
    fn from(e: TransportErrorCode) -> Self {
        Error::Transport(e)
    }
}
