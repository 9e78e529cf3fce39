//! Test doubles for the kernel boundary.
//!
//! [`MockKernel`] simulates the hyprlofs driver in memory: a mapping table,
//! a mounted flag, descriptor bookkeeping, scripted failures, and scripted
//! table growth for exercising the list protocol's regrow path. It is
//! cloneable; hand one clone to
//! [`Filesystem::with_kernel`](crate::Filesystem::with_kernel) and keep
//! another to inspect and steer the "kernel" from the test.
//!
//! ```
//! use hyprlofs::testing::MockKernel;
//! use hyprlofs::{Filesystem, Options};
//!
//! let mock = MockKernel::new();
//! let fs = Filesystem::with_kernel("/mnt/h", Options::default(), Box::new(mock.clone()));
//! assert!(!mock.mounted());
//! ```

use std::collections::VecDeque;
use std::ffi::CStr;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use libc::{c_char, c_int};
use nix::errno::Errno;

use crate::kernel::{CallOutcome, IoctlArg, IoctlCmd, KernelInterface};
use crate::sys;

/// Write a (path, name) pair into a GET output slot, the way the driver's
/// copyout would. Truncates to fit the fixed fields.
pub fn write_curr_entry(slot: &mut sys::CurrEntry, path: &str, name: &str) {
    write_fixed(&mut slot.path, path);
    write_fixed(&mut slot.name, name);
}

fn write_fixed(field: &mut [c_char; sys::MAXPATHLEN], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(sys::MAXPATHLEN - 1);
    for (dst, &src) in field.iter_mut().zip(bytes[..len].iter()) {
        *dst = src as c_char;
    }
    field[len] = 0;
}

#[derive(Default)]
struct MockState {
    mounted: bool,
    table: Vec<(String, String)>,
    next_fd: c_int,
    open_fds: Vec<c_int>,
    open_count: u32,
    calls: Vec<String>,
    fail_open: Option<c_int>,
    fail_mount: Option<c_int>,
    fail_umount: Option<c_int>,
    fail_ioctl: Option<c_int>,
    /// Entries appended to the table right before each GET, front first.
    growth: VecDeque<Vec<(String, String)>>,
    gate: Option<Arc<GateInner>>,
}

/// An in-memory stand-in for the hyprlofs driver.
#[derive(Clone, Default)]
pub struct MockKernel {
    state: Arc<Mutex<MockState>>,
}

impl MockKernel {
    /// A fresh kernel: nothing mounted, empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a hyprlofs instance is currently "mounted".
    pub fn mounted(&self) -> bool {
        self.state.lock().unwrap().mounted
    }

    /// Force the mounted flag, e.g. to simulate an external unmount while
    /// a handle still holds a descriptor.
    pub fn set_mounted(&self, mounted: bool) {
        self.state.lock().unwrap().mounted = mounted;
    }

    /// Snapshot of the kernel-side mapping table.
    pub fn table(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().table.clone()
    }

    /// Replace the kernel-side mapping table.
    pub fn set_table(&self, table: Vec<(String, String)>) {
        self.state.lock().unwrap().table = table;
    }

    /// Queue entries to be appended right before the next GET call, one
    /// batch per call. Simulates a table growing concurrently with a fetch.
    pub fn grow_before_get(&self, batch: Vec<(String, String)>) {
        self.state.lock().unwrap().growth.push_back(batch);
    }

    /// How many times the mountpoint has been opened.
    pub fn open_count(&self) -> u32 {
        self.state.lock().unwrap().open_count
    }

    /// How many descriptors are currently open.
    pub fn open_descriptors(&self) -> usize {
        self.state.lock().unwrap().open_fds.len()
    }

    /// Names of every call made so far, in order (`open`, `close`, `mount`,
    /// `umount`, `ioctl ADD`, ...).
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Fail the next open with the given errno.
    pub fn fail_next_open(&self, errno: i32) {
        self.state.lock().unwrap().fail_open = Some(errno);
    }

    /// Fail the next mount with the given errno.
    pub fn fail_next_mount(&self, errno: i32) {
        self.state.lock().unwrap().fail_mount = Some(errno);
    }

    /// Fail the next umount with the given errno.
    pub fn fail_next_umount(&self, errno: i32) {
        self.state.lock().unwrap().fail_umount = Some(errno);
    }

    /// Fail the next ioctl with the given errno.
    pub fn fail_next_ioctl(&self, errno: i32) {
        self.state.lock().unwrap().fail_ioctl = Some(errno);
    }

    /// Hold the next kernel call open: it signals arrival and then blocks
    /// until the returned gate is released. Lets a test pin an operation
    /// in flight deterministically.
    pub fn gate_next_call(&self) -> OpGate {
        let inner = Arc::new(GateInner::default());
        self.state.lock().unwrap().gate = Some(Arc::clone(&inner));
        OpGate { inner }
    }

    fn log(&self, call: impl Into<String>) {
        self.state.lock().unwrap().calls.push(call.into());
    }

    /// Take and pass any armed gate. Runs without the state lock held so
    /// test-side inspection stays possible while a call is pinned.
    fn pass_gate(&self) {
        let gate = self.state.lock().unwrap().gate.take();
        if let Some(gate) = gate {
            gate.enter_and_wait();
        }
    }

    fn take_failure(slot: &mut Option<c_int>) -> Option<CallOutcome> {
        slot.take().map(CallOutcome::fail)
    }
}

impl KernelInterface for MockKernel {
    fn open(&mut self, _mountpoint: &CStr) -> Result<c_int, c_int> {
        self.log("open");
        self.pass_gate();
        let mut state = self.state.lock().unwrap();
        if let Some(errno) = state.fail_open.take() {
            return Err(errno);
        }
        state.next_fd += 1;
        let fd = state.next_fd;
        state.open_fds.push(fd);
        state.open_count += 1;
        Ok(fd)
    }

    fn close(&mut self, fd: c_int) {
        self.log("close");
        self.state.lock().unwrap().open_fds.retain(|&open| open != fd);
    }

    fn mount(&mut self, _mountpoint: &CStr) -> CallOutcome {
        self.log("mount");
        self.pass_gate();
        let mut state = self.state.lock().unwrap();
        if let Some(outcome) = Self::take_failure(&mut state.fail_mount) {
            return outcome;
        }
        if state.mounted {
            return CallOutcome::fail(Errno::EBUSY as c_int);
        }
        state.mounted = true;
        CallOutcome::ok()
    }

    fn umount(&mut self, _mountpoint: &CStr) -> CallOutcome {
        self.log("umount");
        self.pass_gate();
        let mut state = self.state.lock().unwrap();
        if let Some(outcome) = Self::take_failure(&mut state.fail_umount) {
            return outcome;
        }
        if !state.mounted {
            return CallOutcome::fail(Errno::EINVAL as c_int);
        }
        state.mounted = false;
        CallOutcome::ok()
    }

    fn ioctl(&mut self, _fd: c_int, cmd: IoctlCmd, arg: IoctlArg<'_>) -> CallOutcome {
        self.log(format!("ioctl {}", cmd.name()));
        self.pass_gate();
        let mut state = self.state.lock().unwrap();
        if let Some(outcome) = Self::take_failure(&mut state.fail_ioctl) {
            return outcome;
        }
        // A directory that is not hyprlofs-backed rejects the commands the
        // way any non-matching device would.
        if !state.mounted {
            return CallOutcome::fail(Errno::ENOTTY as c_int);
        }

        match (cmd, arg) {
            (IoctlCmd::AddEntries, IoctlArg::Entries(batch)) => {
                for entry in batch.iter() {
                    let Some(source) = entry.source else {
                        return CallOutcome::fail(Errno::EINVAL as c_int);
                    };
                    state.table.push((source.to_string(), entry.alias.to_string()));
                }
                CallOutcome::ok()
            }
            (IoctlCmd::RmEntries, IoctlArg::Entries(batch)) => {
                for entry in batch.iter() {
                    let Some(at) = state.table.iter().position(|(_, alias)| alias == entry.alias)
                    else {
                        return CallOutcome::fail(Errno::ENOENT as c_int);
                    };
                    state.table.remove(at);
                }
                CallOutcome::ok()
            }
            (IoctlCmd::RmAll, IoctlArg::None) => {
                state.table.clear();
                CallOutcome::ok()
            }
            (IoctlCmd::GetEntries, IoctlArg::List(header)) => {
                if let Some(batch) = state.growth.pop_front() {
                    state.table.extend(batch);
                }
                let table_len = state.table.len();
                let capacity = header.cnt as usize;
                if table_len > capacity {
                    header.cnt = table_len as libc::c_uint;
                    return CallOutcome::fail(Errno::E2BIG as c_int);
                }
                if table_len > 0 {
                    // SAFETY: the caller's header advertises `capacity`
                    // valid slots behind the pointer; this mirrors the
                    // driver's copyout.
                    let slots =
                        unsafe { std::slice::from_raw_parts_mut(header.entries, capacity) };
                    for (slot, (source, alias)) in slots.iter_mut().zip(state.table.iter()) {
                        write_curr_entry(slot, source, alias);
                    }
                }
                header.cnt = table_len as libc::c_uint;
                CallOutcome::ok()
            }
            _ => CallOutcome::fail(Errno::EINVAL as c_int),
        }
    }
}

#[derive(Default)]
struct GateInner {
    state: Mutex<GateState>,
    signal: Condvar,
}

#[derive(Default)]
struct GateState {
    entered: bool,
    released: bool,
}

impl GateInner {
    fn enter_and_wait(&self) {
        let mut state = self.state.lock().unwrap();
        state.entered = true;
        self.signal.notify_all();
        let _unused = self
            .signal
            .wait_timeout_while(state, Duration::from_secs(10), |state| !state.released)
            .unwrap();
    }
}

/// Test-side control of a gated kernel call; see
/// [`MockKernel::gate_next_call`].
pub struct OpGate {
    inner: Arc<GateInner>,
}

impl OpGate {
    /// Block until the gated call has arrived inside the mock kernel.
    /// Panics after ten seconds to keep a broken test from hanging.
    pub fn wait_until_entered(&self) {
        let state = self.inner.state.lock().unwrap();
        let (_state, timeout) = self
            .inner
            .signal
            .wait_timeout_while(state, Duration::from_secs(10), |state| !state.entered)
            .unwrap();
        assert!(!timeout.timed_out(), "gated kernel call never arrived");
    }

    /// Let the gated call proceed.
    pub fn release(&self) {
        self.inner.state.lock().unwrap().released = true;
        self.inner.signal.notify_all();
    }
}

impl Drop for OpGate {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{EntryList, ListBuffer};
    use crate::mapping::Mapping;
    use std::path::Path;

    fn get(mock: &mut MockKernel, buffer: &mut ListBuffer) -> CallOutcome {
        mock.ioctl(3, IoctlCmd::GetEntries, IoctlArg::List(buffer.header_mut()))
    }

    #[test]
    fn mount_then_unmount() {
        let mut mock = MockKernel::new();
        assert!(mock.mount(c"/mnt").is_ok());
        assert!(mock.mounted());
        // Mounting over an existing mount is refused.
        assert_eq!(mock.mount(c"/mnt").errno(), Errno::EBUSY);
        assert!(mock.umount(c"/mnt").is_ok());
        assert_eq!(mock.umount(c"/mnt").errno(), Errno::EINVAL);
    }

    #[test]
    fn ioctls_need_a_mounted_filesystem() {
        let mut mock = MockKernel::new();
        let outcome = mock.ioctl(3, IoctlCmd::RmAll, IoctlArg::None);
        assert_eq!(outcome.errno(), Errno::ENOTTY);
    }

    #[test]
    fn add_remove_and_clear() {
        let mut mock = MockKernel::new();
        mock.set_mounted(true);

        let batch = EntryList::for_add(&[
            Mapping::new("/etc/release", "rel"),
            Mapping::new("/bin/ls", "ls"),
        ])
        .unwrap();
        assert!(mock.ioctl(3, IoctlCmd::AddEntries, IoctlArg::Entries(&batch)).is_ok());
        assert_eq!(mock.table().len(), 2);

        let remove = EntryList::for_remove(&["rel".to_string()]).unwrap();
        assert!(mock.ioctl(3, IoctlCmd::RmEntries, IoctlArg::Entries(&remove)).is_ok());
        assert_eq!(mock.table(), vec![("/bin/ls".to_string(), "ls".to_string())]);

        let missing = EntryList::for_remove(&["ghost".to_string()]).unwrap();
        let outcome = mock.ioctl(3, IoctlCmd::RmEntries, IoctlArg::Entries(&missing));
        assert_eq!(outcome.errno(), Errno::ENOENT);

        assert!(mock.ioctl(3, IoctlCmd::RmAll, IoctlArg::None).is_ok());
        assert!(mock.table().is_empty());
    }

    #[test]
    fn get_reports_required_count_on_overflow() {
        let mut mock = MockKernel::new();
        mock.set_mounted(true);
        mock.set_table(vec![
            ("/a".to_string(), "a".to_string()),
            ("/b".to_string(), "b".to_string()),
        ]);

        let mut probe = ListBuffer::probe();
        let outcome = get(&mut mock, &mut probe);
        assert_eq!(outcome.errno(), Errno::E2BIG);
        assert_eq!(probe.reported(), 2);

        let mut sized = ListBuffer::with_capacity(2, "hyprlofs ioctl GET", Path::new("/mnt")).unwrap();
        assert!(get(&mut mock, &mut sized).is_ok());
        assert_eq!(sized.decode().len(), 2);
    }

    #[test]
    fn scripted_growth_applies_once_per_get() {
        let mut mock = MockKernel::new();
        mock.set_mounted(true);
        mock.grow_before_get(vec![("/a".to_string(), "a".to_string())]);

        let mut probe = ListBuffer::probe();
        assert_eq!(get(&mut mock, &mut probe).errno(), Errno::E2BIG);
        assert_eq!(mock.table().len(), 1);

        // No more scripted growth: the sized fetch succeeds.
        let mut sized = ListBuffer::with_capacity(1, "hyprlofs ioctl GET", Path::new("/mnt")).unwrap();
        assert!(get(&mut mock, &mut sized).is_ok());
    }

    #[test]
    fn injected_failures_fire_once() {
        let mut mock = MockKernel::new();
        mock.set_mounted(true);
        mock.fail_next_ioctl(Errno::EIO as c_int);
        assert_eq!(mock.ioctl(3, IoctlCmd::RmAll, IoctlArg::None).errno(), Errno::EIO);
        assert!(mock.ioctl(3, IoctlCmd::RmAll, IoctlArg::None).is_ok());
    }
}
