//! FLIPBOOK - versioned flipbook bookkeeping library
//!
//! Re-exports all modules for use by the binary target.

// Core engine (store, probe, thumbnails, catalog, publish)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod panel;

// Re-export commonly used types from core
pub use core::{MetadataStore, PublishRecorder, SequenceInfo, ThumbnailCache, VersionCatalog};

// Re-export entities
pub use entities::{ShotLayout, VersionAttrs, VersionKey, VersionRecord};
pub use error::{FlipbookError, Result};
pub use panel::{Notice, NoticeLevel, Panel};
