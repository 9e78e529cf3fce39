//! Probe-then-fetch retrieval of the full mapping table.
//!
//! A single GET ioctl cannot size its result ahead of time, so listing is a
//! two-phase protocol. The probe goes out with no storage; the kernel either
//! succeeds outright (empty table) or fails `E2BIG` and reports the required
//! count. The fetch then retries with a buffer of that size. If the table
//! grew in between, the kernel fails `E2BIG` again with the new count and
//! the fetch regrows - this is the only automatic retry in the crate, and
//! it is bounded: a table that will not hold still for
//! [`MAX_LIST_ATTEMPTS`] rounds fails with a distinct error instead of
//! looping forever.

use std::ffi::CStr;

use nix::errno::Errno;
use tracing::debug;

use crate::adapter::KernelState;
use crate::codec::ListBuffer;
use crate::error::HyprlofsError;
use crate::kernel::IoctlCmd;
use crate::mapping::Mapping;

/// How many regrow rounds a fetch tolerates before giving up.
pub(crate) const MAX_LIST_ATTEMPTS: u32 = 32;

pub(crate) fn fetch_all(
    state: &mut KernelState,
    mountpoint: &CStr,
) -> Result<Vec<Mapping>, HyprlofsError> {
    let op = IoctlCmd::GetEntries.op_label();

    // Probe with an empty buffer: learns the count, or succeeds outright
    // when the table is empty.
    let mut probe = ListBuffer::probe();
    let outcome = state.ioctl_get(mountpoint, &mut probe)?;
    if outcome.is_ok() {
        return Ok(probe.decode());
    }
    if outcome.errno() != Errno::E2BIG {
        return Err(state.kernel_error(op, outcome));
    }

    let mut needed = probe.reported();
    for attempt in 1..=MAX_LIST_ATTEMPTS {
        let mut buffer = ListBuffer::with_capacity(needed, op, state.mountpoint())?;
        let outcome = state.ioctl_get(mountpoint, &mut buffer)?;
        if outcome.is_ok() {
            return Ok(buffer.decode());
        }
        if outcome.errno() != Errno::E2BIG {
            return Err(state.kernel_error(op, outcome));
        }

        // The table grew between probe and fetch; the buffer is dropped
        // here and the next round allocates to the newly reported count.
        needed = buffer.reported();
        debug!(attempt, needed, "mapping table grew during fetch");
    }

    Err(HyprlofsError::TableUnstable {
        attempts: MAX_LIST_ATTEMPTS,
        mountpoint: state.mountpoint().to_path_buf(),
    })
}
