//! One module per subcommand.

pub mod add;
pub mod clear;
pub mod list;
pub mod mount;
pub mod remove;
pub mod unmount;

use std::path::Path;

use hyprlofs::{Filesystem, Options};

/// Build the handle every subcommand operates through.
pub fn filesystem(mountpoint: &Path, debug: bool) -> Filesystem {
    Filesystem::with_options(mountpoint.to_path_buf(), Options { debug })
}
