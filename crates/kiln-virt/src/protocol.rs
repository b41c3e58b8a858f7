//! # Wire Protocol
//!
//! Fixed-size command messages exchanged with the virtualization server.
//!
//! ## Message Layout
//!
//! ```text
//! ┌────────────────────────── 256 bytes ──────────────────────────┐
//! │ cmd: u32 │ ret: i32 │ handle: u64 │ params: [u8; 240]         │
//! └───────────────────────────────────────────────────────────────┘
//!                                       │
//!          ┌────────────────────────────┴──────────────┐
//!          ▼                                           ▼
//!   CONNECT: module, handle          REGRDWR: moduleid, count, write,
//!                                             regs: [u32; 56]
//! ```
//!
//! The server answers with a message of the same layout. `ret` carries the
//! protocol status, `params` the command's reply payload.

use arrayvec::ArrayVec;
use bytemuck::{Pod, Zeroable};
use core::mem::size_of;
use static_assertions::const_assert_eq;

use kiln_core::{Error, Result};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Size of one command message
pub const MSG_SIZE: usize = 256;

/// Size of the message header
pub const HEADER_SIZE: usize = size_of::<MsgHeader>();

/// Size of the parameter area
pub const PARAMS_SIZE: usize = MSG_SIZE - HEADER_SIZE;

/// Number of 32-bit slots in a register read/write payload
pub const REGRDWR_ARRAY_SIZE: usize = 56;

// =============================================================================
// COMMANDS
// =============================================================================

/// Command discriminant carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VirtCmd {
    /// Obtain a remote handle for a module
    Connect = 0,
    /// Drop a remote handle
    Disconnect = 1,
    /// Read or write host registers
    RegRdWr = 2,
}

impl VirtCmd {
    /// Parse a raw discriminant
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Connect),
            1 => Some(Self::Disconnect),
            2 => Some(Self::RegRdWr),
            _ => None,
        }
    }
}

/// Module id as numbered by the server
///
/// Same layout as [`kiln_core::ModuleId`]: engine in bits 0..16, instance
/// above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RemoteModuleId(u32);

impl RemoteModuleId {
    /// Host controller
    pub const HOST: Self = Self(0);
    /// Image signal processor
    pub const ISP: Self = Self(1);
    /// Video input
    pub const VI: Self = Self(2);
    /// Video encoder
    pub const MSENC: Self = Self(3);
    /// Video image compositor
    pub const VIC: Self = Self(4);

    /// Create from raw id
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get raw id
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Same engine, different instance
    pub const fn with_instance(self, instance: u32) -> Self {
        let shift = kiln_core::ModuleId::INSTANCE_SHIFT;
        Self((self.0 & ((1 << shift) - 1)) | (instance << shift))
    }
}

// =============================================================================
// WIRE STRUCTURES
// =============================================================================

/// Message header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct MsgHeader {
    /// [`VirtCmd`] discriminant
    pub cmd: u32,
    /// Protocol status, 0 on success
    pub ret: i32,
    /// Remote connection handle
    pub handle: u64,
}

/// CONNECT parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ConnectParams {
    /// Remote module id
    pub module: u32,
    /// Must be zero
    pub reserved: u32,
    /// Handle returned by the server
    pub handle: u64,
}

/// REGRDWR parameters
///
/// Writes pack `(offset, value)` pairs into `regs`; reads pack offsets and
/// get the register values back in their place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RegRdWrParams {
    /// Remote module id
    pub moduleid: u32,
    /// Number of register operations
    pub count: u32,
    /// Nonzero for a write
    pub write: u32,
    /// Must be zero
    pub reserved: u32,
    /// Offsets, offset/value pairs, or returned values
    pub regs: [u32; REGRDWR_ARRAY_SIZE],
}

/// Raw command message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct WireMsg {
    /// Header
    pub header: MsgHeader,
    /// Command parameters
    pub params: [u8; PARAMS_SIZE],
}

const_assert_eq!(size_of::<MsgHeader>(), 16);
const_assert_eq!(size_of::<ConnectParams>(), 16);
const_assert_eq!(size_of::<RegRdWrParams>(), 16 + 4 * REGRDWR_ARRAY_SIZE);
const_assert_eq!(size_of::<WireMsg>(), MSG_SIZE);
static_assertions::const_assert!(size_of::<RegRdWrParams>() <= PARAMS_SIZE);

mod sealed {
    pub trait Sealed {}
}

/// Parameter block that fits in [`WireMsg::params`]
pub trait Params: Pod + sealed::Sealed {}

impl sealed::Sealed for ConnectParams {}
impl sealed::Sealed for RegRdWrParams {}
impl Params for ConnectParams {}
impl Params for RegRdWrParams {}

impl WireMsg {
    /// Zeroed message for `cmd`
    pub fn new(cmd: VirtCmd) -> Self {
        let mut msg = Self::zeroed();
        msg.header.cmd = cmd as u32;
        msg
    }

    /// Read the parameter block as `P`
    pub fn params<P: Params>(&self) -> P {
        bytemuck::pod_read_unaligned(&self.params[..size_of::<P>()])
    }

    /// Overwrite the parameter block with `params`
    pub fn set_params<P: Params>(&mut self, params: &P) {
        self.params[..size_of::<P>()].copy_from_slice(bytemuck::bytes_of(params));
    }

    /// Message bytes
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Parse a message from the front of `bytes`
    ///
    /// Bytes past [`MSG_SIZE`] are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes
            .get(..MSG_SIZE)
            .map(bytemuck::pod_read_unaligned::<Self>)
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Request to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtRequest<'a> {
    /// Connect to a module
    Connect {
        /// Remote module id
        module: RemoteModuleId,
    },
    /// Drop a connection
    Disconnect {
        /// Handle to drop
        handle: u64,
    },
    /// One register round trip
    RegRdWr {
        /// Connection handle
        handle: u64,
        /// Module whose registers are accessed
        module: RemoteModuleId,
        /// Write if set, read otherwise
        write: bool,
        /// Packed offsets (read) or offset/value pairs (write)
        regs: &'a [u32],
    },
}

impl VirtRequest<'_> {
    /// Command discriminant of this request
    pub fn cmd(&self) -> VirtCmd {
        match self {
            Self::Connect { .. } => VirtCmd::Connect,
            Self::Disconnect { .. } => VirtCmd::Disconnect,
            Self::RegRdWr { .. } => VirtCmd::RegRdWr,
        }
    }

    /// Encode into a wire message
    pub fn encode(&self) -> Result<WireMsg> {
        let mut msg = WireMsg::new(self.cmd());

        match *self {
            Self::Connect { module } => {
                msg.set_params(&ConnectParams {
                    module: module.raw(),
                    reserved: 0,
                    handle: 0,
                });
            },
            Self::Disconnect { handle } => {
                msg.header.handle = handle;
            },
            Self::RegRdWr {
                handle,
                module,
                write,
                regs,
            } => {
                if regs.len() > REGRDWR_ARRAY_SIZE || (write && regs.len() % 2 != 0) {
                    return Err(Error::InvalidParameter);
                }

                let mut params = RegRdWrParams::zeroed();
                params.moduleid = module.raw();
                params.count = (if write { regs.len() / 2 } else { regs.len() }) as u32;
                params.write = u32::from(write);
                params.regs[..regs.len()].copy_from_slice(regs);

                msg.header.handle = handle;
                msg.set_params(&params);
            },
        }

        Ok(msg)
    }
}

// =============================================================================
// REPLIES
// =============================================================================

/// Decoded server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtReply {
    /// Connection result; a zero handle means refused
    Connect {
        /// Remote handle
        handle: u64,
    },
    /// Disconnect acknowledged
    Disconnect,
    /// Register round trip result
    RegRdWr {
        /// Direction echoed by the server
        write: bool,
        /// Register payload (values for a read)
        regs: ArrayVec<u32, REGRDWR_ARRAY_SIZE>,
    },
}

impl VirtReply {
    /// Decode the reply to a request of kind `expected`
    pub fn decode(expected: VirtCmd, msg: &WireMsg) -> Result<Self> {
        let cmd = VirtCmd::from_raw(msg.header.cmd).ok_or(Error::InvalidReply)?;
        if cmd != expected {
            log::warn!("kiln: reply to {:?} carries {:?}", expected, cmd);
            return Err(Error::InvalidReply);
        }

        if msg.header.ret != 0 {
            return Err(Error::RemoteStatus(msg.header.ret));
        }

        let reply = match cmd {
            VirtCmd::Connect => Self::Connect {
                handle: msg.params::<ConnectParams>().handle,
            },
            VirtCmd::Disconnect => Self::Disconnect,
            VirtCmd::RegRdWr => {
                let params = msg.params::<RegRdWrParams>();
                let write = params.write != 0;
                let len = params.count as usize * if write { 2 } else { 1 };

                let regs = params
                    .regs
                    .get(..len)
                    .and_then(|regs| ArrayVec::try_from(regs).ok())
                    .ok_or(Error::InvalidReply)?;

                Self::RegRdWr { write, regs }
            },
        };

        Ok(reply)
    }
}
