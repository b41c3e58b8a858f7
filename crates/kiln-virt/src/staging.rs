//! # User Buffer Staging
//!
//! Entry point for register transfers requested by user space. Offsets and
//! values are copied into driver-owned buffers before the transfer and the
//! values read are copied back out afterwards.
//!
//! A fault while copying surfaces as [`Error::CopyFault`], distinct from
//! any error of the transfer itself.

use alloc::vec::Vec;

use kiln_core::{Error, ModuleId, Result};

use crate::client::VirtClient;
use crate::regs::{RegTransfer, RegValues};

/// Address in the caller's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct UserPtr(pub u64);

/// Access to the caller's memory
pub trait UserMemory {
    /// Copy `dst.len()` words in from `src`
    fn copy_in(&self, src: UserPtr, dst: &mut [u32]) -> Result<()>;

    /// Copy `src` out to `dst`
    fn copy_out(&self, dst: UserPtr, src: &[u32]) -> Result<()>;
}

/// Register transfer as described by a user request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserRegRequest {
    /// Module whose registers are accessed
    pub module: ModuleId,
    /// Number of units (base offsets)
    pub num_offsets: u32,
    /// Bytes per unit
    pub block_size: u32,
    /// `num_offsets` base offsets
    pub offsets: UserPtr,
    /// `num_offsets * block_size` bytes of values
    pub values: UserPtr,
    /// Write if set, read otherwise
    pub write: bool,
}

fn staging_buffer(len: usize) -> Result<Vec<u32>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::AllocationFailed)?;
    buf.resize(len, 0);
    Ok(buf)
}

impl VirtClient {
    /// Run a user-requested register transfer over the primary connection
    pub fn rdwr_module_regs(&self, mem: &dyn UserMemory, request: &UserRegRequest) -> Result<()> {
        if request.block_size == 0 || request.block_size % 4 != 0 {
            return Err(Error::InvalidParameter);
        }

        let num_offsets = request.num_offsets as usize;
        let num_values = num_offsets
            .checked_mul((request.block_size / 4) as usize)
            .ok_or(Error::InvalidParameter)?;

        let mut offsets = staging_buffer(num_offsets)?;
        let mut values = staging_buffer(num_values)?;

        mem.copy_in(request.offsets, &mut offsets)
            .map_err(|_| Error::CopyFault)?;

        let values_ref = if request.write {
            mem.copy_in(request.values, &mut values)
                .map_err(|_| Error::CopyFault)?;
            RegValues::Write(&values)
        } else {
            RegValues::Read(&mut values)
        };

        self.reg_transfer(
            self.config().primary_module,
            RegTransfer {
                module: request.module,
                block_size: request.block_size,
                offsets: &offsets,
                values: values_ref,
            },
        )?;

        if !request.write {
            mem.copy_out(request.values, &values)
                .map_err(|_| Error::CopyFault)?;
        }

        Ok(())
    }
}
