//! Per-handle kernel call state: descriptor lifecycle, outcome recording,
//! and the policy edges around raw syscalls.
//!
//! One [`KernelState`] lives behind each handle's mutex. While an operation
//! is in flight it is touched only by the single blocking worker; while the
//! handle is idle, only by the caller. That serialization is guaranteed by
//! the handle's pending guard, so no further locking happens here.

use std::ffi::CStr;
use std::path::{Path, PathBuf};

use libc::c_int;
use nix::errno::Errno;
use tracing::debug;

use crate::codec::{EntryList, ListBuffer};
use crate::error::HyprlofsError;
use crate::kernel::{
    CallOutcome, DescriptorState, IoctlArg, IoctlCmd, KernelInterface, LastCall, OP_MOUNT,
    OP_OPEN, OP_UMOUNT,
};

pub(crate) struct KernelState {
    kernel: Box<dyn KernelInterface>,
    descriptor: DescriptorState,
    last_call: Option<LastCall>,
    mountpoint: PathBuf,
    debug: bool,
}

impl KernelState {
    pub(crate) fn new(kernel: Box<dyn KernelInterface>, mountpoint: PathBuf, debug: bool) -> Self {
        Self {
            kernel,
            descriptor: DescriptorState::Closed,
            last_call: None,
            mountpoint,
            debug,
        }
    }

    pub(crate) fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub(crate) fn last_call(&self) -> Option<LastCall> {
        self.last_call
    }

    /// Mount the filesystem read-only. Does not touch the descriptor.
    pub(crate) fn run_mount(&mut self, mountpoint: &CStr) -> Result<(), HyprlofsError> {
        if self.debug {
            debug!(mountpoint = %self.mountpoint.display(), "hyprlofs mount");
        }
        let outcome = self.kernel.mount(mountpoint);
        self.record(OP_MOUNT, outcome);
        self.outcome_to_result(OP_MOUNT, outcome)
    }

    /// Unmount the filesystem. Any open descriptor is closed first:
    /// unmounting while holding a descriptor of the old mount is undefined.
    /// It will be reopened as needed on the next ioctl.
    pub(crate) fn run_umount(&mut self, mountpoint: &CStr) -> Result<(), HyprlofsError> {
        if self.debug {
            debug!(mountpoint = %self.mountpoint.display(), "hyprlofs umount");
        }
        self.close_descriptor();
        let outcome = self.kernel.umount(mountpoint);
        self.record(OP_UMOUNT, outcome);
        self.outcome_to_result(OP_UMOUNT, outcome)
    }

    /// Run one of the batch ioctls (ADD, REMOVE, CLEAR) to completion.
    pub(crate) fn run_ioctl(
        &mut self,
        mountpoint: &CStr,
        cmd: IoctlCmd,
        batch: Option<&EntryList>,
    ) -> Result<(), HyprlofsError> {
        if self.debug && let Some(batch) = batch {
            for (i, entry) in batch.iter().enumerate() {
                debug!(
                    mountpoint = %self.mountpoint.display(),
                    cmd = cmd.name(),
                    "  {i:3}: {} -> {}",
                    entry.source.unwrap_or("-"),
                    entry.alias,
                );
            }
        }
        let arg = match batch {
            Some(batch) => IoctlArg::Entries(batch),
            None => IoctlArg::None,
        };
        let outcome = self.ioctl_raw(mountpoint, cmd, arg)?;
        self.outcome_to_result(cmd.op_label(), outcome)
    }

    /// Issue one GET ioctl into the given buffer. The list protocol drives
    /// this repeatedly; the outcome (including `E2BIG`) comes back raw.
    pub(crate) fn ioctl_get(
        &mut self,
        mountpoint: &CStr,
        buffer: &mut ListBuffer,
    ) -> Result<CallOutcome, HyprlofsError> {
        self.ioctl_raw(mountpoint, IoctlCmd::GetEntries, IoctlArg::List(buffer.header_mut()))
    }

    pub(crate) fn kernel_error(&self, op: &'static str, outcome: CallOutcome) -> HyprlofsError {
        HyprlofsError::kernel(op, outcome.errno, &self.mountpoint)
    }

    /// Ensure the descriptor is open, issue the ioctl, record its outcome,
    /// and take the stale-descriptor edge when the mount under us is no
    /// longer hyprlofs.
    fn ioctl_raw(
        &mut self,
        mountpoint: &CStr,
        cmd: IoctlCmd,
        arg: IoctlArg<'_>,
    ) -> Result<CallOutcome, HyprlofsError> {
        let fd = self.ensure_open(mountpoint)?;

        let outcome = self.kernel.ioctl(fd, cmd, arg);
        self.record(cmd.op_label(), outcome);

        if !outcome.is_ok() && outcome.errno() == Errno::ENOTTY {
            // The mountpoint stopped being hyprlofs-backed (unmounted or
            // remounted externally). Drop the stale descriptor so the next
            // attempt reopens cleanly.
            self.close_descriptor();
        }
        Ok(outcome)
    }

    /// Lazily open the mountpoint. Failure records the outcome and
    /// short-circuits the operation; no ioctl is attempted.
    fn ensure_open(&mut self, mountpoint: &CStr) -> Result<c_int, HyprlofsError> {
        if let DescriptorState::Open(fd) = self.descriptor {
            return Ok(fd);
        }
        if self.debug {
            debug!(mountpoint = %self.mountpoint.display(), "hyprlofs open");
        }
        match self.kernel.open(mountpoint) {
            Ok(fd) => {
                self.descriptor = DescriptorState::Open(fd);
                Ok(fd)
            }
            Err(errno) => {
                let outcome = CallOutcome::fail(errno);
                self.record(OP_OPEN, outcome);
                Err(self.kernel_error(OP_OPEN, outcome))
            }
        }
    }

    fn close_descriptor(&mut self) {
        if let DescriptorState::Open(fd) = self.descriptor {
            self.kernel.close(fd);
            self.descriptor = DescriptorState::Closed;
        }
    }

    fn record(&mut self, op: &'static str, outcome: CallOutcome) {
        self.last_call = Some(LastCall {
            op,
            rv: outcome.rv,
            errno: outcome.errno,
        });
        if self.debug {
            debug!(
                mountpoint = %self.mountpoint.display(),
                op,
                rv = outcome.rv,
                error = outcome.errno().desc(),
                "kernel call returned",
            );
        }
    }

    fn outcome_to_result(
        &self,
        op: &'static str,
        outcome: CallOutcome,
    ) -> Result<(), HyprlofsError> {
        if outcome.is_ok() {
            Ok(())
        } else {
            Err(self.kernel_error(op, outcome))
        }
    }
}

impl Drop for KernelState {
    fn drop(&mut self) {
        self.close_descriptor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockKernel;

    fn state(mock: &MockKernel) -> KernelState {
        KernelState::new(Box::new(mock.clone()), PathBuf::from("/mnt/h"), false)
    }

    #[test]
    fn descriptor_opens_lazily_and_once() {
        let mock = MockKernel::new();
        mock.set_mounted(true);
        let mut state = state(&mock);

        state.run_ioctl(c"/mnt/h", IoctlCmd::RmAll, None).unwrap();
        state.run_ioctl(c"/mnt/h", IoctlCmd::RmAll, None).unwrap();
        assert_eq!(mock.open_count(), 1);
        assert_eq!(mock.open_descriptors(), 1);
    }

    #[test]
    fn umount_closes_the_descriptor_first() {
        let mock = MockKernel::new();
        mock.set_mounted(true);
        let mut state = state(&mock);

        state.run_ioctl(c"/mnt/h", IoctlCmd::RmAll, None).unwrap();
        assert_eq!(mock.open_descriptors(), 1);

        state.run_umount(c"/mnt/h").unwrap();
        assert_eq!(mock.open_descriptors(), 0);
        // Close happened before the umount call itself.
        assert_eq!(mock.calls().last().map(String::as_str), Some("umount"));
    }

    #[test]
    fn enotty_invalidates_the_descriptor() {
        let mock = MockKernel::new();
        mock.set_mounted(true);
        let mut state = state(&mock);

        state.run_ioctl(c"/mnt/h", IoctlCmd::RmAll, None).unwrap();
        mock.set_mounted(false);

        let err = state.run_ioctl(c"/mnt/h", IoctlCmd::RmAll, None).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ENOTTY));
        assert_eq!(mock.open_descriptors(), 0, "stale descriptor must be closed");

        // Next attempt reopens cleanly.
        mock.set_mounted(true);
        state.run_ioctl(c"/mnt/h", IoctlCmd::RmAll, None).unwrap();
        assert_eq!(mock.open_count(), 2);
    }

    #[test]
    fn open_failure_short_circuits() {
        let mock = MockKernel::new();
        mock.set_mounted(true);
        mock.fail_next_open(Errno::EACCES as i32);
        let mut state = state(&mock);

        let err = state.run_ioctl(c"/mnt/h", IoctlCmd::RmAll, None).unwrap_err();
        assert_eq!(err.op(), Some("hyprlofs open"));
        assert_eq!(err.errno(), Some(Errno::EACCES));
        // The ioctl itself never ran.
        assert!(!mock.calls().iter().any(|c| c == "ioctl CLEAR"));

        let last = state.last_call().unwrap();
        assert_eq!(last.op, "hyprlofs open");
        assert_eq!(last.errno, Errno::EACCES as i32);
    }

    #[test]
    fn every_call_lands_in_last_call() {
        let mock = MockKernel::new();
        let mut state = state(&mock);

        state.run_mount(c"/mnt/h").unwrap();
        let last = state.last_call().unwrap();
        assert_eq!(last.op, "hyprlofs mount");
        assert_eq!(last.rv, 0);
        assert_eq!(last.errno, 0);
    }

    #[test]
    fn drop_closes_the_descriptor() {
        let mock = MockKernel::new();
        mock.set_mounted(true);
        {
            let mut state = state(&mock);
            state.run_ioctl(c"/mnt/h", IoctlCmd::RmAll, None).unwrap();
            assert_eq!(mock.open_descriptors(), 1);
        }
        assert_eq!(mock.open_descriptors(), 0);
    }
}
