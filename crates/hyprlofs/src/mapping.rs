//! The (source, alias) pair managed by a hyprlofs mount.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single hyprlofs mapping.
///
/// The kernel exposes `source` (an arbitrary host path) under `alias`
/// (a path relative to the mount root). This layer enforces no uniqueness;
/// the kernel table is authoritative for conflicts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mapping {
    /// Host path of the backing file.
    pub source: String,
    /// Alias path, relative to the mount root.
    pub alias: String,
}

impl Mapping {
    /// Create a mapping from a source path and an alias.
    pub fn new(source: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            alias: alias.into(),
        }
    }
}

impl<S: Into<String>, A: Into<String>> From<(S, A)> for Mapping {
    fn from((source, alias): (S, A)) -> Self {
        Self::new(source, alias)
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_tuple() {
        let mapping = Mapping::from(("/etc/release", "rel"));
        assert_eq!(mapping.source, "/etc/release");
        assert_eq!(mapping.alias, "rel");
    }

    #[test]
    fn display_shows_direction() {
        let mapping = Mapping::new("/a/b", "c");
        assert_eq!(mapping.to_string(), "/a/b -> c");
    }

    #[test]
    fn serde_round_trip() {
        let mapping = Mapping::new("/etc/release", "rel");
        let json = serde_json::to_string(&mapping).unwrap();
        assert_eq!(serde_json::from_str::<Mapping>(&json).unwrap(), mapping);
    }
}
