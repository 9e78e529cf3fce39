//! Process-wide debug override.

use std::sync::OnceLock;

static DEBUG_OVERRIDE: OnceLock<bool> = OnceLock::new();

/// Whether `HYPRLOFS_DEBUG` asks for kernel-call tracing process-wide.
///
/// Read once, at the first handle construction; it ORs with each handle's
/// own [`Options::debug`](crate::Options) flag. Unset, empty, and `0` all
/// mean off.
pub(crate) fn debug_override() -> bool {
    *DEBUG_OVERRIDE.get_or_init(|| {
        std::env::var_os("HYPRLOFS_DEBUG").is_some_and(|value| !value.is_empty() && value != "0")
    })
}
