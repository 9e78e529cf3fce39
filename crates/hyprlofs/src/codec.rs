//! Encoding and decoding of mapping lists for the driver's ioctl buffers.
//!
//! [`EntryList`] owns the outbound layout for add/remove batches:
//! NUL-terminated string storage plus the pointer/length array the driver
//! walks. [`ListBuffer`] owns the inbound layout for the GET ioctl. Both are
//! owned by exactly one operation and release their storage on every exit
//! path when dropped, so no buffer survives across operations.

use std::ffi::{CStr, CString};
use std::path::Path;

use libc::{c_char, c_uint};

use crate::error::{HyprlofsError, MappingDefect};
use crate::mapping::Mapping;
use crate::sys;

/// An encoded add or remove batch.
///
/// Validation happens entirely at construction: a malformed element fails
/// with [`HyprlofsError::InvalidMapping`] before any kernel work, and
/// nothing partially encoded is left behind.
#[derive(Debug)]
pub struct EntryList {
    /// Owns the bytes every entry points into. Dropped last, with the list.
    strings: Vec<CString>,
    entries: Vec<sys::Entry>,
    header: sys::Entries,
}

// SAFETY: all pointers in `entries` and `header` target heap allocations
// owned by this value (`strings` and `entries`), which move with it.
unsafe impl Send for EntryList {}

impl EntryList {
    /// Encode an add batch. Each mapping needs a non-empty source and alias.
    pub fn for_add(mappings: &[Mapping]) -> Result<Self, HyprlofsError> {
        let mut strings = Vec::with_capacity(mappings.len() * 2);
        let mut entries = Vec::with_capacity(mappings.len());

        for (index, mapping) in mappings.iter().enumerate() {
            let defect = |defect| HyprlofsError::InvalidMapping { index, defect };
            if mapping.source.is_empty() {
                return Err(defect(MappingDefect::EmptySource));
            }
            if mapping.alias.is_empty() {
                return Err(defect(MappingDefect::EmptyAlias));
            }
            let path = CString::new(mapping.source.as_str())
                .map_err(|_| defect(MappingDefect::NulInSource))?;
            let name = CString::new(mapping.alias.as_str())
                .map_err(|_| defect(MappingDefect::NulInAlias))?;

            entries.push(sys::Entry {
                path: path.as_ptr(),
                plen: mapping.source.len() as c_uint,
                name: name.as_ptr(),
                nlen: mapping.alias.len() as c_uint,
            });
            strings.push(path);
            strings.push(name);
        }

        Ok(Self::seal(strings, entries))
    }

    /// Encode a remove batch. The driver removes by alias, so only the
    /// names are copied; every `path` pointer stays null.
    pub fn for_remove(aliases: &[String]) -> Result<Self, HyprlofsError> {
        let mut strings = Vec::with_capacity(aliases.len());
        let mut entries = Vec::with_capacity(aliases.len());

        for (index, alias) in aliases.iter().enumerate() {
            let defect = |defect| HyprlofsError::InvalidMapping { index, defect };
            if alias.is_empty() {
                return Err(defect(MappingDefect::EmptyAlias));
            }
            let name =
                CString::new(alias.as_str()).map_err(|_| defect(MappingDefect::NulInAlias))?;

            entries.push(sys::Entry {
                path: std::ptr::null(),
                plen: 0,
                name: name.as_ptr(),
                nlen: alias.len() as c_uint,
            });
            strings.push(name);
        }

        Ok(Self::seal(strings, entries))
    }

    /// Freeze the entry array and point the header at it. Nothing may be
    /// pushed afterwards; the heap buffers stay put when the list moves.
    fn seal(strings: Vec<CString>, entries: Vec<sys::Entry>) -> Self {
        let header = sys::Entries {
            entries: entries.as_ptr(),
            len: entries.len() as c_uint,
        };
        Self {
            strings,
            entries,
            header,
        }
    }

    /// Number of entries in the batch.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the batch holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pointer handed to the ioctl.
    pub fn header_ptr(&self) -> *const sys::Entries {
        &self.header
    }

    /// Walk the encoded entries. Used for debug dumps and by kernel doubles.
    pub fn iter(&self) -> impl Iterator<Item = EntryRef<'_>> {
        self.entries.iter().map(|entry| {
            // SAFETY: non-null pointers in `entries` reference the
            // NUL-terminated contents of `self.strings`.
            let source = (!entry.path.is_null())
                .then(|| unsafe { CStr::from_ptr(entry.path) }.to_str().unwrap_or(""));
            let alias = unsafe { CStr::from_ptr(entry.name) }.to_str().unwrap_or("");
            EntryRef { source, alias }
        })
    }
}

/// Borrowed view of one encoded entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryRef<'a> {
    /// Source path; `None` in remove batches.
    pub source: Option<&'a str>,
    /// Alias path.
    pub alias: &'a str,
}

/// The owned result buffer for one GET ioctl cycle.
///
/// A probe carries no storage (null pointer, count 0) and exists to learn
/// the table size. A sized buffer carries `capacity` zeroed slots for the
/// driver to copy into.
pub struct ListBuffer {
    entries: Vec<sys::CurrEntry>,
    header: sys::CurrEntries,
}

// SAFETY: `header.entries` is either null or points into the heap buffer of
// `entries`, which this value exclusively owns.
unsafe impl Send for ListBuffer {}

impl ListBuffer {
    /// A size probe: no storage, capacity zero.
    pub fn probe() -> Self {
        Self {
            entries: Vec::new(),
            header: sys::CurrEntries {
                entries: std::ptr::null_mut(),
                cnt: 0,
            },
        }
    }

    /// A buffer with `count` zeroed output slots.
    ///
    /// Allocation is fallible: the grow step of the list protocol can be
    /// asked for an arbitrarily large table, and failure must surface as an
    /// `ENOMEM` kernel-shaped error rather than abort the process.
    pub fn with_capacity(
        count: usize,
        op: &'static str,
        mountpoint: &Path,
    ) -> Result<Self, HyprlofsError> {
        let mut entries: Vec<sys::CurrEntry> = Vec::new();
        entries
            .try_reserve_exact(count)
            .map_err(|_| HyprlofsError::kernel(op, libc::ENOMEM, mountpoint))?;
        entries.resize(count, sys::CurrEntry::zeroed());

        let header = sys::CurrEntries {
            entries: entries.as_mut_ptr(),
            cnt: count as c_uint,
        };
        Ok(Self { entries, header })
    }

    /// Number of output slots allocated.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// The count the kernel last wrote into the header: the table size
    /// after a successful fetch, or the required capacity after `E2BIG`.
    pub fn reported(&self) -> usize {
        self.header.cnt as usize
    }

    /// Header handed to the ioctl.
    pub fn header_mut(&mut self) -> &mut sys::CurrEntries {
        &mut self.header
    }

    /// Decode the fetched entries, in the order the kernel returned them.
    /// That order is not stable; callers may only rely on set membership.
    pub fn decode(&self) -> Vec<Mapping> {
        let count = self.reported().min(self.capacity());
        self.entries[..count]
            .iter()
            .map(|entry| Mapping {
                source: fixed_field_to_string(&entry.path),
                alias: fixed_field_to_string(&entry.name),
            })
            .collect()
    }
}

/// Read a NUL-terminated string out of a fixed `MAXPATHLEN` field.
fn fixed_field_to_string(field: &[c_char; sys::MAXPATHLEN]) -> String {
    // SAFETY: reinterpreting c_char as u8 for the same length is exact.
    let bytes: &[u8; sys::MAXPATHLEN] =
        unsafe { &*(field as *const [c_char; sys::MAXPATHLEN] as *const [u8; sys::MAXPATHLEN]) };
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
