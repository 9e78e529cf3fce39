//! Error types for hyprlofs operations.

use std::fmt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use thiserror::Error;

/// Errors surfaced by [`Filesystem`](crate::Filesystem) operations.
///
/// `Busy`, `InvalidArgument`, and `InvalidMapping` are produced before any
/// kernel work is scheduled and never mutate handle state. `Kernel` and
/// `TableUnstable` are delivered through the operation's future after the
/// blocking work has finished. No variant is ever fatal to the process.
#[derive(Error, Debug)]
pub enum HyprlofsError {
    /// A second operation was issued while one is outstanding on the same
    /// handle. The call is rejected immediately; it is never queued.
    #[error("{op}: operation already in progress")]
    Busy {
        /// Name of the rejected method.
        op: &'static str,
    },

    /// A caller-supplied value cannot cross the kernel boundary (for
    /// example, a mountpoint containing a NUL byte).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A mapping or alias failed structural validation during encoding.
    /// Detected before dispatch; the kernel never sees the batch.
    #[error("invalid mapping at index {index}: {defect}")]
    InvalidMapping {
        /// Position of the offending element in the caller's list.
        index: usize,
        /// What was wrong with it.
        defect: MappingDefect,
    },

    /// A kernel entry point (open, mount, umount, or ioctl) failed.
    #[error("{op} ({}): {message} (errno {errno})", .mountpoint.display())]
    Kernel {
        /// Label of the failing call, e.g. `hyprlofs ioctl ADD`.
        op: &'static str,
        /// Raw errno reported by the kernel.
        errno: i32,
        /// Human-readable description of `errno`.
        message: String,
        /// Mountpoint the handle is bound to.
        mountpoint: PathBuf,
    },

    /// The mapping table kept growing between probe and fetch and listing
    /// gave up after the bounded number of regrows.
    #[error("mapping table at {} changed {attempts} times while listing", .mountpoint.display())]
    TableUnstable {
        /// How many regrow attempts were made before giving up.
        attempts: u32,
        /// Mountpoint the handle is bound to.
        mountpoint: PathBuf,
    },

    /// The blocking worker task could not be joined. Only happens if the
    /// worker panicked or the runtime is shutting down.
    #[error("{op}: worker task failed")]
    Worker {
        /// Name of the dispatched method.
        op: &'static str,
        /// The join failure reported by the runtime.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl HyprlofsError {
    pub(crate) fn kernel(op: &'static str, errno: i32, mountpoint: &Path) -> Self {
        Self::Kernel {
            op,
            errno,
            message: Errno::from_raw(errno).desc().to_string(),
            mountpoint: mountpoint.to_path_buf(),
        }
    }

    /// The kernel errno carried by this error, if it came from a kernel call.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Self::Kernel { errno, .. } => Some(Errno::from_raw(*errno)),
            _ => None,
        }
    }

    /// Label of the kernel call that failed, if any.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            Self::Busy { op } | Self::Kernel { op, .. } | Self::Worker { op, .. } => Some(op),
            _ => None,
        }
    }
}

/// Why a mapping element was rejected during encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappingDefect {
    /// The source path was empty.
    EmptySource,
    /// The alias was empty.
    EmptyAlias,
    /// The source path contained a NUL byte.
    NulInSource,
    /// The alias contained a NUL byte.
    NulInAlias,
}

impl fmt::Display for MappingDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            Self::EmptySource => "empty source path",
            Self::EmptyAlias => "empty alias",
            Self::NulInSource => "source path contains a NUL byte",
            Self::NulInAlias => "alias contains a NUL byte",
        };
        f.write_str(what)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_error_carries_all_fields() {
        let err = HyprlofsError::kernel("hyprlofs ioctl ADD", libc::ENOTTY, Path::new("/mnt/h"));
        let rendered = err.to_string();
        assert!(rendered.contains("hyprlofs ioctl ADD"), "{rendered}");
        assert!(rendered.contains("/mnt/h"), "{rendered}");
        assert!(rendered.contains(&libc::ENOTTY.to_string()), "{rendered}");
        assert_eq!(err.errno(), Some(Errno::ENOTTY));
        assert_eq!(err.op(), Some("hyprlofs ioctl ADD"));
    }

    #[test]
    fn busy_names_the_operation() {
        let err = HyprlofsError::Busy { op: "mount" };
        assert_eq!(err.to_string(), "mount: operation already in progress");
        assert_eq!(err.errno(), None);
    }

    #[test]
    fn mapping_defect_rendering() {
        let err = HyprlofsError::InvalidMapping {
            index: 3,
            defect: MappingDefect::EmptyAlias,
        };
        assert_eq!(err.to_string(), "invalid mapping at index 3: empty alias");
    }
}
