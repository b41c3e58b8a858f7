//! # Chunked Register Access
//!
//! Bulk register reads and writes forwarded to the server. A transfer is
//! split into as many REGRDWR round trips as the fixed payload requires.
//!
//! ## Offset Expansion
//!
//! ```text
//! offsets: [A, B]   block_size: 8 (2 registers per unit)
//!
//!   scalar ops:  A+0  A+4  B+0  B+4
//!   read round:  [off, off, off, off]          capacity ops
//!   write round: [off, val, off, val, ...]     capacity / 2 ops
//! ```

use arrayvec::ArrayVec;
use kiln_core::{Error, ModuleId, Result};

use crate::client::VirtClient;
use crate::protocol::{VirtReply, VirtRequest, REGRDWR_ARRAY_SIZE};

/// Bytes per register
const REG_SIZE: u32 = 4;

// =============================================================================
// REQUEST
// =============================================================================

/// Value buffer of a transfer
#[derive(Debug)]
pub enum RegValues<'a> {
    /// Values to write
    Write(&'a [u32]),
    /// Destination of the values read
    Read(&'a mut [u32]),
}

impl RegValues<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Write(values) => values.len(),
            Self::Read(values) => values.len(),
        }
    }
}

/// A bulk register transfer
///
/// Every unit is `block_size` bytes of consecutive registers starting at
/// its base offset. `values` holds the registers of all units in order.
#[derive(Debug)]
pub struct RegTransfer<'a> {
    /// Module whose registers are accessed
    pub module: ModuleId,
    /// Bytes per unit, a nonzero multiple of 4
    pub block_size: u32,
    /// Base offset of each unit
    pub offsets: &'a [u32],
    /// Values, `offsets.len() * block_size / 4` of them
    pub values: RegValues<'a>,
}

// =============================================================================
// OFFSET CURSOR
// =============================================================================

/// Walks the scalar register offsets of a transfer in order
#[derive(Debug, Clone)]
struct OffsetCursor<'a> {
    offsets: &'a [u32],
    per_unit: u32,
    unit: usize,
    step: u32,
}

impl<'a> OffsetCursor<'a> {
    fn new(offsets: &'a [u32], per_unit: u32) -> Self {
        Self {
            offsets,
            per_unit,
            unit: 0,
            step: 0,
        }
    }
}

impl Iterator for OffsetCursor<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let base = *self.offsets.get(self.unit)?;
        let offset = base.wrapping_add(self.step * REG_SIZE);

        self.step += 1;
        if self.step == self.per_unit {
            self.step = 0;
            self.unit += 1;
        }

        Some(offset)
    }
}

// =============================================================================
// TRANSFER
// =============================================================================

impl VirtClient {
    /// Run a register transfer over the connection of `conn_module`
    ///
    /// Any failed round trip aborts the transfer. Values read by earlier
    /// round trips stay in the output buffer, whose content is then
    /// unreliable as a whole.
    pub fn reg_transfer(&self, conn_module: ModuleId, transfer: RegTransfer<'_>) -> Result<()> {
        let RegTransfer {
            module,
            block_size,
            offsets,
            values,
        } = transfer;

        if block_size == 0 || block_size % REG_SIZE != 0 {
            return Err(Error::InvalidParameter);
        }
        let per_unit = block_size / REG_SIZE;
        let total = offsets
            .len()
            .checked_mul(per_unit as usize)
            .ok_or(Error::InvalidParameter)?;
        if values.len() != total {
            return Err(Error::InvalidParameter);
        }

        if total == 0 {
            return Ok(());
        }

        let handle = self.handle(conn_module)?;
        let remote = self.modules.translate(module)?;
        let read_capacity = self.config().regrdwr_capacity;
        let mut cursor = OffsetCursor::new(offsets, per_unit);

        match values {
            RegValues::Write(values) => {
                for chunk in values.chunks(read_capacity / 2) {
                    let mut regs = ArrayVec::<u32, REGRDWR_ARRAY_SIZE>::new();
                    for (offset, &value) in cursor.by_ref().zip(chunk) {
                        regs.push(offset);
                        regs.push(value);
                        trace_reg(offset, value);
                    }

                    self.round_trip(handle, remote, true, &regs)?;
                }
            },
            RegValues::Read(values) => {
                for chunk in values.chunks_mut(read_capacity) {
                    let regs: ArrayVec<u32, REGRDWR_ARRAY_SIZE> =
                        cursor.by_ref().take(chunk.len()).collect();

                    let reply = self.round_trip(handle, remote, false, &regs)?;
                    if reply.len() != chunk.len() {
                        log::warn!(
                            "kiln: read returned {} of {} registers",
                            reply.len(),
                            chunk.len()
                        );
                        return Err(Error::InvalidReply);
                    }
                    chunk.copy_from_slice(&reply);

                    for (&offset, &value) in regs.iter().zip(chunk.iter()) {
                        trace_reg(offset, value);
                    }
                }
            },
        }

        Ok(())
    }

    fn round_trip(
        &self,
        handle: u64,
        module: crate::protocol::RemoteModuleId,
        write: bool,
        regs: &[u32],
    ) -> Result<ArrayVec<u32, REGRDWR_ARRAY_SIZE>> {
        let request = VirtRequest::RegRdWr {
            handle,
            module,
            write,
            regs,
        };

        log::debug!(
            "kiln: regrdwr {} ops ({})",
            if write { regs.len() / 2 } else { regs.len() },
            if write { "write" } else { "read" }
        );

        match self.send_receive(&request)? {
            VirtReply::RegRdWr { regs, .. } => Ok(regs),
            _ => Err(Error::InvalidReply),
        }
    }
}

#[inline]
fn trace_reg(_offset: u32, _value: u32) {
    #[cfg(feature = "trace-regs")]
    log::trace!("kiln: reg {:#06x} = {:#010x}", _offset, _value);
}
