//! Bookkeeping engine - store, sequence probe, thumbnails, catalog, publish
//!
//! Independent of any presentation layer.

pub mod catalog;
pub mod encoder;
pub mod host;
pub mod publish;
pub mod sequence;
pub mod store;
pub mod thumbs;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use catalog::{CatalogDelta, VersionCatalog};
pub use encoder::{Encoder, FfmpegEncoder, PlaybackTool, PreviewRequest};
pub use host::{CaptureRequest, DirectoryHost, HostContext, LocalTracker, Tracker};
pub use publish::{PublishOutcome, PublishRecorder};
pub use sequence::{INVALID_SEQUENCE, SequenceInfo};
pub use store::MetadataStore;
pub use thumbs::{ThumbnailCache, ThumbnailEvent, ThumbnailLoad};
