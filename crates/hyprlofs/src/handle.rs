//! The per-mountpoint handle and its single-outstanding-operation
//! dispatcher.
//!
//! A [`Filesystem`] serializes everything it does: the `pending` guard
//! admits one operation at a time, and a second call fails [`Busy`]
//! immediately instead of queueing. The accepted operation's blocking work
//! (open/mount/umount/ioctl) runs on tokio's blocking pool; the guard is
//! released the moment that work finishes - before the caller's future
//! resolves - so completion code may immediately start the next operation.
//!
//! Several invariants hold for the shared state behind the mutex:
//!
//! - while an operation is in flight, only its worker touches the
//!   descriptor and `last_call`;
//! - while the handle is idle, only the caller's context does;
//! - validation failures (`InvalidArgument`, `InvalidMapping`) happen
//!   before the guard is taken and mutate nothing.
//!
//! [`Busy`]: HyprlofsError::Busy

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::instrument;

use crate::adapter::KernelState;
use crate::codec::EntryList;
use crate::config;
use crate::error::HyprlofsError;
use crate::kernel::{self, IoctlCmd, KernelInterface, LastCall};
use crate::list;
use crate::mapping::Mapping;

/// Construction options for a [`Filesystem`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    /// Log every kernel call this handle makes, including per-entry dumps
    /// of add/remove batches. ORed with the `HYPRLOFS_DEBUG` environment
    /// override.
    pub debug: bool,
}

/// A handle to one hyprlofs mountpoint.
///
/// Construction never touches the kernel; the mountpoint is not validated
/// until the first operation needs it. The handle owns at most one open
/// descriptor on the mountpoint, opened lazily before the first ioctl and
/// closed on unmount, on a stale-descriptor error, and on drop.
///
/// All methods take `&self`; wrap the handle in [`Arc`] to share it with a
/// completion path. At most one operation is ever in flight - see
/// [`HyprlofsError::Busy`].
pub struct Filesystem {
    mountpoint: PathBuf,
    pending: Arc<AtomicBool>,
    inner: Arc<Mutex<KernelState>>,
}

impl Filesystem {
    /// Create a handle with default [`Options`].
    pub fn new(mountpoint: impl Into<PathBuf>) -> Self {
        Self::with_options(mountpoint, Options::default())
    }

    /// Create a handle with explicit options, using this platform's kernel
    /// (the real driver on illumos, an `ENOSYS` stub elsewhere).
    pub fn with_options(mountpoint: impl Into<PathBuf>, options: Options) -> Self {
        Self::with_kernel(mountpoint, options, kernel::platform_kernel())
    }

    /// Create a handle over a caller-supplied kernel boundary.
    ///
    /// This is the seam tests and simulations use; see
    /// [`testing::MockKernel`](crate::testing::MockKernel).
    pub fn with_kernel(
        mountpoint: impl Into<PathBuf>,
        options: Options,
        kernel: Box<dyn KernelInterface>,
    ) -> Self {
        let mountpoint = mountpoint.into();
        let debug = options.debug || config::debug_override();
        Self {
            inner: Arc::new(Mutex::new(KernelState::new(
                kernel,
                mountpoint.clone(),
                debug,
            ))),
            pending: Arc::new(AtomicBool::new(false)),
            mountpoint,
        }
    }

    /// The mountpoint this handle manages.
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Whether an operation is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Outcome of the most recent kernel call, if any. Overwritten by each
    /// operation; meaningful between a completion and the next dispatch.
    pub fn last_call(&self) -> Option<LastCall> {
        self.inner.lock().last_call()
    }

    /// Mount a hyprlofs instance read-only on the mountpoint.
    #[instrument(level = "debug", skip_all, fields(mountpoint = %self.mountpoint.display()))]
    pub async fn mount(&self) -> Result<(), HyprlofsError> {
        let mountpoint = self.mountpoint_c()?;
        self.dispatch("mount", move |state| state.run_mount(&mountpoint))
            .await
    }

    /// Unmount the mountpoint. Closes the handle's descriptor first; it is
    /// reopened as needed by a later operation.
    #[instrument(level = "debug", skip_all, fields(mountpoint = %self.mountpoint.display()))]
    pub async fn unmount(&self) -> Result<(), HyprlofsError> {
        let mountpoint = self.mountpoint_c()?;
        self.dispatch("unmount", move |state| state.run_umount(&mountpoint))
            .await
    }

    /// Add mappings to the table.
    ///
    /// The batch is validated and encoded before dispatch: a malformed
    /// element fails with [`HyprlofsError::InvalidMapping`] without
    /// touching the kernel or the busy guard.
    #[instrument(level = "debug", skip_all, fields(mountpoint = %self.mountpoint.display()))]
    pub async fn add_mappings<I>(&self, mappings: I) -> Result<(), HyprlofsError>
    where
        I: IntoIterator<Item = Mapping>,
    {
        let mountpoint = self.mountpoint_c()?;
        let mappings: Vec<Mapping> = mappings.into_iter().collect();
        let batch = EntryList::for_add(&mappings)?;
        self.dispatch("add_mappings", move |state| {
            state.run_ioctl(&mountpoint, IoctlCmd::AddEntries, Some(&batch))
        })
        .await
    }

    /// Remove mappings from the table by alias.
    #[instrument(level = "debug", skip_all, fields(mountpoint = %self.mountpoint.display()))]
    pub async fn remove_mappings<I, S>(&self, aliases: I) -> Result<(), HyprlofsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mountpoint = self.mountpoint_c()?;
        let aliases: Vec<String> = aliases.into_iter().map(Into::into).collect();
        let batch = EntryList::for_remove(&aliases)?;
        self.dispatch("remove_mappings", move |state| {
            state.run_ioctl(&mountpoint, IoctlCmd::RmEntries, Some(&batch))
        })
        .await
    }

    /// Remove every mapping. Succeeds on an already-empty table.
    #[instrument(level = "debug", skip_all, fields(mountpoint = %self.mountpoint.display()))]
    pub async fn remove_all(&self) -> Result<(), HyprlofsError> {
        let mountpoint = self.mountpoint_c()?;
        self.dispatch("remove_all", move |state| {
            state.run_ioctl(&mountpoint, IoctlCmd::RmAll, None)
        })
        .await
    }

    /// Fetch the current mapping table.
    ///
    /// Always reads from the kernel - nothing is cached. Order follows the
    /// kernel's internal storage and is not stable; treat the result as a
    /// set.
    #[instrument(level = "debug", skip_all, fields(mountpoint = %self.mountpoint.display()))]
    pub async fn list_mappings(&self) -> Result<Vec<Mapping>, HyprlofsError> {
        let mountpoint = self.mountpoint_c()?;
        self.dispatch("list_mappings", move |state| {
            list::fetch_all(state, &mountpoint)
        })
        .await
    }

    fn mountpoint_c(&self) -> Result<CString, HyprlofsError> {
        CString::new(self.mountpoint.as_os_str().as_bytes()).map_err(|_| {
            HyprlofsError::InvalidArgument("mountpoint contains a NUL byte".to_string())
        })
    }

    /// Take the pending guard or fail `Busy` without queueing.
    fn begin(&self, op: &'static str) -> Result<OpGuard, HyprlofsError> {
        if self
            .pending
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(HyprlofsError::Busy { op });
        }
        Ok(OpGuard {
            pending: Arc::clone(&self.pending),
        })
    }

    /// Run one unit of blocking kernel work with the guard held.
    ///
    /// The guard travels into the worker and drops when the work finishes,
    /// strictly before the returned future resolves. Dropping the future
    /// does not cancel anything: the worker runs to completion on the
    /// blocking pool and releases the guard itself.
    async fn dispatch<T, F>(&self, op: &'static str, work: F) -> Result<T, HyprlofsError>
    where
        T: Send + 'static,
        F: FnOnce(&mut KernelState) -> Result<T, HyprlofsError> + Send + 'static,
    {
        let guard = self.begin(op)?;
        let inner = Arc::clone(&self.inner);
        let join = tokio::task::spawn_blocking(move || {
            let result = {
                let mut state = inner.lock();
                work(&mut state)
            };
            // Mutex released above; only now does the handle go idle.
            drop(guard);
            result
        });
        match join.await {
            Ok(result) => result,
            Err(source) => Err(HyprlofsError::Worker { op, source }),
        }
    }
}

/// Clears the pending flag when the operation's blocking work is done.
#[derive(Debug)]
struct OpGuard {
    pending: Arc<AtomicBool>,
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        self.pending.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockKernel;

    fn handle() -> (MockKernel, Filesystem) {
        let mock = MockKernel::new();
        let fs = Filesystem::with_kernel("/mnt/h", Options::default(), Box::new(mock.clone()));
        (mock, fs)
    }

    #[test]
    fn construction_does_not_touch_the_kernel() {
        let (mock, fs) = handle();
        assert_eq!(fs.mountpoint(), Path::new("/mnt/h"));
        assert!(!fs.is_busy());
        assert!(fs.last_call().is_none());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn nul_in_mountpoint_is_an_argument_error() {
        let mock = MockKernel::new();
        let fs = Filesystem::with_kernel("/mnt/\0bad", Options::default(), Box::new(mock.clone()));
        let err = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fs.mount())
            .unwrap_err();
        assert!(matches!(err, HyprlofsError::InvalidArgument(_)));
        assert!(mock.calls().is_empty());
        assert!(!fs.is_busy());
    }

    #[test]
    fn guard_admits_one_holder() {
        let (_mock, fs) = handle();
        let first = fs.begin("mount").unwrap();
        let err = fs.begin("unmount").unwrap_err();
        assert!(matches!(err, HyprlofsError::Busy { op: "unmount" }));
        drop(first);
        let _second = fs.begin("unmount").unwrap();
    }
}
