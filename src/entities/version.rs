//! Version identity and records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::attrs::VersionAttrs;

/// Identifies one rendered flipbook version: `(name, version)`.
///
/// The string form `<name>_v<NNN>` is the version's on-disk basename and the
/// key used in the metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionKey {
    pub name: String,
    pub version: u32,
}

impl VersionKey {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Tree label, e.g. `v001`.
    pub fn label(&self) -> String {
        format!("v{:03}", self.version)
    }

    /// Parse `<name>_v<digits>`. The name itself may contain `_v`.
    ///
    /// Only the canonical spelling is accepted (`a_v001`, not `a_v01` or
    /// `a_v0001`), so a parsed key always formats back to `basename`.
    pub fn parse(basename: &str) -> Option<Self> {
        let idx = basename.rfind("_v")?;
        let (name, rest) = (&basename[..idx], &basename[idx + 2..]);
        if name.is_empty() || rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let version = rest.parse::<u32>().ok()?;
        let key = Self::new(name, version);
        (version >= 1 && key.to_string() == basename).then_some(key)
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_v{:03}", self.name, self.version)
    }
}

/// One on-disk flipbook version plus its stored attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    pub key: VersionKey,
    /// Frame-sequence path containing the frame placeholder token.
    pub path: String,
    pub dir: PathBuf,
    pub attrs: VersionAttrs,
}

impl VersionRecord {
    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn version(&self) -> u32 {
        self.key.version
    }

    pub fn is_published(&self) -> bool {
        self.attrs.publish
    }
}
