//! Asynchronous controller for SmartOS hyprlofs mapping tables.
//!
//! hyprlofs is an in-kernel pseudo-filesystem: a mounted instance exposes a
//! mutable table of mappings, each associating an alias path (visible under
//! the mount) with a source file elsewhere on the host. This crate manages
//! that table: it mounts and unmounts the filesystem and adds, removes,
//! clears, or enumerates mappings through the driver's ioctl interface.
//!
//! # Components
//!
//! - [`Filesystem`] - Handle bound to one mountpoint, serializing operations
//!   against it
//! - [`Mapping`] - A single (source, alias) association
//! - [`KernelInterface`] - The syscall seam; swap in [`testing::MockKernel`]
//!   to drive the controller without a real mount
//! - [`sys`] - Bit-exact mirrors of the driver ABI
//!
//! # Concurrency
//!
//! Every kernel-touching call may block (mount/umount syscalls, ioctls
//! against a potentially large table), so each operation runs on tokio's
//! blocking pool and the handle's methods are `async`. A handle admits at
//! most one operation at a time: a second call issued while one is
//! outstanding fails immediately with [`HyprlofsError::Busy`] - it is never
//! queued. Handles on the same mountpoint do not coordinate with each other;
//! keeping concurrent handles off one mount is the caller's responsibility.
//!
//! # Example
//!
//! ```ignore
//! use hyprlofs::{Filesystem, Mapping};
//!
//! let fs = Filesystem::new("/zones/app/root/lofs");
//! fs.mount().await?;
//! fs.add_mappings([Mapping::new("/etc/release", "rel")]).await?;
//! for mapping in fs.list_mappings().await? {
//!     println!("{mapping}");
//! }
//! fs.unmount().await?;
//! ```
//!
//! The real driver only exists on illumos; on other platforms every kernel
//! call fails with `ENOSYS`, while the full controller remains exercisable
//! through [`testing::MockKernel`].

#![warn(missing_docs)]
#![warn(clippy::all)]

mod adapter;
mod codec;
mod config;
mod error;
mod handle;
mod kernel;
mod list;
mod mapping;
pub mod sys;
pub mod testing;

pub use codec::{EntryList, EntryRef, ListBuffer};
pub use error::{HyprlofsError, MappingDefect};
pub use handle::{Filesystem, Options};
#[cfg(any(target_os = "illumos", target_os = "solaris"))]
pub use kernel::RawKernel;
pub use kernel::{CallOutcome, IoctlArg, IoctlCmd, KernelInterface, LastCall, UnsupportedKernel};
pub use mapping::Mapping;
