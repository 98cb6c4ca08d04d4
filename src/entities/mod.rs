//! Data model: version identity, stored attributes, shot layout.

pub mod attrs;
pub mod layout;
pub mod version;

pub use attrs::VersionAttrs;
pub use layout::{ShotLayout, validate_name};
pub use version::{VersionKey, VersionRecord};
