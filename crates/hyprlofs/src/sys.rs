//! Bit-exact mirrors of the hyprlofs driver ABI.
//!
//! These structs and command numbers must match `<sys/fs/hyprlofs.h>` on
//! illumos byte for byte; they are the wire format of the driver's ioctl
//! interface. Everything else in the crate goes through
//! [`KernelInterface`](crate::KernelInterface), so this module is the only
//! place where layout matters.

use libc::{c_char, c_int, c_uint};

/// illumos `MAXPATHLEN`: fixed size of each returned path field.
pub const MAXPATHLEN: usize = 1024;

/// Command group for the hyprlofs ioctls (`'H' << 8`).
const HYPRLOFS_IOC: c_int = (b'H' as c_int) << 8;

/// Add the entries described by a [`Entries`] batch to the mapping table.
pub const HYPRLOFS_ADD_ENTRIES: c_int = HYPRLOFS_IOC | 1;
/// Remove the named entries of a [`Entries`] batch from the mapping table.
pub const HYPRLOFS_RM_ENTRIES: c_int = HYPRLOFS_IOC | 2;
/// Remove every entry; takes no argument.
pub const HYPRLOFS_RM_ALL: c_int = HYPRLOFS_IOC | 3;
/// Copy the current table out through a [`CurrEntries`] header.
pub const HYPRLOFS_GET_ENTRIES: c_int = HYPRLOFS_IOC | 4;

/// `mount(2)` flag: the option string in `optptr` is parsed by the driver
/// and the resolved options are written back into the same buffer.
pub const MS_OPTIONSTR: c_int = 0x100;

/// One element of an add or remove batch (`hyprlofs_entry_t`).
///
/// `path` may be null in a remove batch; the driver removes by `name` alone.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Entry {
    /// Source path, NUL-terminated.
    pub path: *const c_char,
    /// Length of `path` excluding the terminator.
    pub plen: c_uint,
    /// Alias under the mount, NUL-terminated.
    pub name: *const c_char,
    /// Length of `name` excluding the terminator.
    pub nlen: c_uint,
}

/// Header of an add or remove batch (`hyprlofs_entries_t`).
#[repr(C)]
#[derive(Debug)]
pub struct Entries {
    /// Pointer to `len` contiguous [`Entry`] values.
    pub entries: *const Entry,
    /// Number of entries in the batch.
    pub len: c_uint,
}

/// One mapping as returned by the GET ioctl (`hyprlofs_curr_entry_t`).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CurrEntry {
    /// Source path, NUL-terminated within the fixed field.
    pub path: [c_char; MAXPATHLEN],
    /// Alias, NUL-terminated within the fixed field.
    pub name: [c_char; MAXPATHLEN],
}

impl CurrEntry {
    /// An all-zero entry, as the driver expects output slots to start.
    pub fn zeroed() -> Self {
        // SAFETY: CurrEntry is two plain byte arrays; all-zero is valid.
        unsafe { std::mem::zeroed() }
    }
}

/// Header for the GET ioctl (`hyprlofs_curr_entries_t`).
///
/// On entry `cnt` is the capacity of the array behind `entries`; on return
/// it is the number of mappings in the table. When the table does not fit,
/// the ioctl fails with `E2BIG` and `cnt` holds the required count.
#[repr(C)]
#[derive(Debug)]
pub struct CurrEntries {
    /// Pointer to `cnt` output slots, or null for a pure size probe.
    pub entries: *mut CurrEntry,
    /// Capacity in, table size out.
    pub cnt: c_uint,
}

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
unsafe extern "C" {
    /// illumos 8-argument `mount(2)`.
    pub fn mount(
        spec: *const c_char,
        dir: *const c_char,
        mflag: c_int,
        fstype: *const c_char,
        dataptr: *const c_char,
        datalen: c_int,
        optptr: *mut c_char,
        optlen: c_int,
    ) -> c_int;

    /// illumos `umount(2)`.
    pub fn umount(path: *const c_char) -> c_int;
}
