//! The syscall seam: every kernel entry point the controller touches.
//!
//! [`KernelInterface`] abstracts open/close/mount/umount/ioctl so the
//! controller above it is testable anywhere. [`RawKernel`] issues the real
//! syscalls on illumos; [`UnsupportedKernel`] stands in elsewhere and fails
//! every call with `ENOSYS`; [`MockKernel`](crate::testing::MockKernel)
//! simulates the driver in memory.
//!
//! Nothing at this layer retries, interprets, or records; it reports the
//! raw return value and errno of a single call and leaves policy to the
//! adapter above.

use std::ffi::CStr;

use libc::c_int;
use nix::errno::Errno;

use crate::codec::EntryList;
use crate::sys;

/// Raw result of one kernel call: the syscall return value plus the errno
/// observed when it failed (0 on success).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallOutcome {
    /// Syscall return value.
    pub rv: c_int,
    /// errno when `rv` indicates failure, 0 otherwise.
    pub errno: c_int,
}

impl CallOutcome {
    /// A successful call.
    pub fn ok() -> Self {
        Self { rv: 0, errno: 0 }
    }

    /// A failed call with the given errno.
    pub fn fail(errno: c_int) -> Self {
        Self { rv: -1, errno }
    }

    /// Whether the call succeeded.
    pub fn is_ok(&self) -> bool {
        self.rv == 0
    }

    /// The errno as a typed value.
    pub fn errno(&self) -> Errno {
        Errno::from_raw(self.errno)
    }
}

/// Outcome of the most recent kernel call made on behalf of a handle.
///
/// Valid from the completion of one operation until the next is dispatched;
/// each call overwrites it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LastCall {
    /// Label of the call, e.g. `hyprlofs ioctl GET`.
    pub op: &'static str,
    /// Syscall return value.
    pub rv: i32,
    /// errno on failure, 0 on success.
    pub errno: i32,
}

pub(crate) const OP_OPEN: &str = "hyprlofs open";
pub(crate) const OP_MOUNT: &str = "hyprlofs mount";
pub(crate) const OP_UMOUNT: &str = "hyprlofs umount";

/// The four mapping-table ioctls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoctlCmd {
    /// Add a batch of mappings.
    AddEntries,
    /// Remove a batch of mappings by alias.
    RmEntries,
    /// Clear the whole table.
    RmAll,
    /// Fetch the current table.
    GetEntries,
}

impl IoctlCmd {
    /// The driver command number.
    pub fn raw(self) -> c_int {
        match self {
            Self::AddEntries => sys::HYPRLOFS_ADD_ENTRIES,
            Self::RmEntries => sys::HYPRLOFS_RM_ENTRIES,
            Self::RmAll => sys::HYPRLOFS_RM_ALL,
            Self::GetEntries => sys::HYPRLOFS_GET_ENTRIES,
        }
    }

    /// Short command name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::AddEntries => "ADD",
            Self::RmEntries => "REMOVE",
            Self::RmAll => "CLEAR",
            Self::GetEntries => "GET",
        }
    }

    /// Operation label recorded and carried on errors.
    pub fn op_label(self) -> &'static str {
        match self {
            Self::AddEntries => "hyprlofs ioctl ADD",
            Self::RmEntries => "hyprlofs ioctl REMOVE",
            Self::RmAll => "hyprlofs ioctl CLEAR",
            Self::GetEntries => "hyprlofs ioctl GET",
        }
    }
}

/// Argument passed along with an ioctl.
pub enum IoctlArg<'a> {
    /// An encoded add or remove batch.
    Entries(&'a EntryList),
    /// The header of a list fetch; the kernel writes through it.
    List(&'a mut sys::CurrEntries),
    /// No argument (CLEAR).
    None,
}

/// The blocking syscall boundary.
///
/// One call in, one raw outcome out. Implementations do not retry and do
/// not keep per-handle state beyond what the real kernel would; descriptor
/// lifecycle and error policy live in the handle that owns the boxed
/// implementation.
pub trait KernelInterface: Send {
    /// Open the mountpoint read-only, returning a descriptor that will not
    /// be inherited across exec. Errors return the raw errno.
    fn open(&mut self, mountpoint: &CStr) -> Result<c_int, c_int>;

    /// Close a descriptor previously returned by [`open`](Self::open).
    fn close(&mut self, fd: c_int);

    /// Mount a hyprlofs instance read-only on the mountpoint.
    fn mount(&mut self, mountpoint: &CStr) -> CallOutcome;

    /// Unmount the mountpoint.
    fn umount(&mut self, mountpoint: &CStr) -> CallOutcome;

    /// Issue one mapping-table ioctl against an open descriptor.
    fn ioctl(&mut self, fd: c_int, cmd: IoctlCmd, arg: IoctlArg<'_>) -> CallOutcome;
}

/// Descriptor lifecycle of a handle.
///
/// The only transitions are `Closed -> Open` (lazy open before an ioctl)
/// and `Open -> Closed`, taken on unmount, on handle drop, and when an
/// ioctl fails with `ENOTTY` (the mount under the descriptor is no longer
/// hyprlofs, so the descriptor is stale).
#[derive(Debug)]
pub(crate) enum DescriptorState {
    Closed,
    Open(c_int),
}

/// The kernel implementation for this platform: the real syscalls on
/// illumos, the `ENOSYS` stub everywhere else.
pub(crate) fn platform_kernel() -> Box<dyn KernelInterface> {
    #[cfg(any(target_os = "illumos", target_os = "solaris"))]
    {
        Box::new(RawKernel)
    }
    #[cfg(not(any(target_os = "illumos", target_os = "solaris")))]
    {
        Box::new(UnsupportedKernel)
    }
}

/// Issues the real hyprlofs syscalls. illumos only.
#[cfg(any(target_os = "illumos", target_os = "solaris"))]
pub struct RawKernel;

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
impl RawKernel {
    fn outcome(rv: c_int) -> CallOutcome {
        if rv == 0 {
            CallOutcome::ok()
        } else {
            CallOutcome::fail(Errno::last_raw())
        }
    }
}

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
impl KernelInterface for RawKernel {
    fn open(&mut self, mountpoint: &CStr) -> Result<c_int, c_int> {
        // SAFETY: plain syscalls on a NUL-terminated path.
        let fd = unsafe { libc::open(mountpoint.as_ptr(), libc::O_RDONLY) };
        if fd < 0 {
            return Err(Errno::last_raw());
        }
        // The descriptor must not leak into exec'd children.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            if flags != -1 {
                let _ = libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
            }
        }
        Ok(fd)
    }

    fn close(&mut self, fd: c_int) {
        // SAFETY: fd came from our own open().
        unsafe {
            let _ = libc::close(fd);
        }
    }

    fn mount(&mut self, mountpoint: &CStr) -> CallOutcome {
        // The kernel writes the resolved options back, so the option
        // string rides in a writable buffer.
        let mut optstr = [0 as libc::c_char; 256];
        optstr[0] = b'r' as libc::c_char;
        optstr[1] = b'o' as libc::c_char;

        // SAFETY: all pointers reference NUL-terminated storage that
        // outlives the call.
        let rv = unsafe {
            sys::mount(
                c"swap".as_ptr(),
                mountpoint.as_ptr(),
                sys::MS_OPTIONSTR,
                c"hyprlofs".as_ptr(),
                std::ptr::null(),
                0,
                optstr.as_mut_ptr(),
                optstr.len() as c_int,
            )
        };
        Self::outcome(rv)
    }

    fn umount(&mut self, mountpoint: &CStr) -> CallOutcome {
        // SAFETY: NUL-terminated path.
        let rv = unsafe { sys::umount(mountpoint.as_ptr()) };
        Self::outcome(rv)
    }

    fn ioctl(&mut self, fd: c_int, cmd: IoctlCmd, arg: IoctlArg<'_>) -> CallOutcome {
        let ptr: *mut libc::c_void = match arg {
            IoctlArg::Entries(list) => list.header_ptr() as *mut libc::c_void,
            IoctlArg::List(header) => header as *mut sys::CurrEntries as *mut libc::c_void,
            IoctlArg::None => std::ptr::null_mut(),
        };
        // SAFETY: fd is open and ptr follows the command's ABI.
        let rv = unsafe { libc::ioctl(fd, cmd.raw(), ptr) };
        Self::outcome(rv)
    }
}

/// Stands in on platforms without the hyprlofs driver: every call fails
/// with `ENOSYS`.
pub struct UnsupportedKernel;

impl KernelInterface for UnsupportedKernel {
    fn open(&mut self, _mountpoint: &CStr) -> Result<c_int, c_int> {
        Err(Errno::ENOSYS as c_int)
    }

    fn close(&mut self, _fd: c_int) {}

    fn mount(&mut self, _mountpoint: &CStr) -> CallOutcome {
        CallOutcome::fail(Errno::ENOSYS as c_int)
    }

    fn umount(&mut self, _mountpoint: &CStr) -> CallOutcome {
        CallOutcome::fail(Errno::ENOSYS as c_int)
    }

    fn ioctl(&mut self, _fd: c_int, _cmd: IoctlCmd, _arg: IoctlArg<'_>) -> CallOutcome {
        CallOutcome::fail(Errno::ENOSYS as c_int)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_accessors() {
        assert!(CallOutcome::ok().is_ok());
        let failed = CallOutcome::fail(libc::E2BIG);
        assert!(!failed.is_ok());
        assert_eq!(failed.errno(), Errno::E2BIG);
    }

    #[test]
    fn ioctl_labels() {
        assert_eq!(IoctlCmd::AddEntries.name(), "ADD");
        assert_eq!(IoctlCmd::RmAll.op_label(), "hyprlofs ioctl CLEAR");
        assert_eq!(IoctlCmd::GetEntries.raw(), sys::HYPRLOFS_GET_ENTRIES);
    }

    #[test]
    fn unsupported_kernel_reports_enosys() {
        let mut kernel = UnsupportedKernel;
        assert_eq!(
            kernel.mount(c"/mnt").errno(),
            Errno::ENOSYS,
        );
        assert_eq!(kernel.open(c"/mnt"), Err(Errno::ENOSYS as c_int));
        assert_eq!(
            kernel.ioctl(3, IoctlCmd::RmAll, IoctlArg::None).errno(),
            Errno::ENOSYS,
        );
    }
}
