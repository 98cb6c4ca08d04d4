//! Thumbnail cache: serve stored bytes or regenerate from the middle frame.
//!
//! Generation runs the encoder on a background thread and reports back over a
//! channel. The owner drains completions with [`ThumbnailCache::poll`] (or
//! blocks with [`ThumbnailCache::wait`]) on its own thread and writes the bytes
//! into the version's attributes. While a version is in flight no second
//! generation is dispatched for it.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error, trace};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

use super::encoder::Encoder;
use super::sequence::SequenceInfo;
use crate::entities::{VersionAttrs, VersionKey};
use crate::error::{FlipbookError, Result};

/// Completion of one background generation.
#[derive(Debug)]
pub struct ThumbnailEvent {
    pub key: VersionKey,
    pub result: Result<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailLoad {
    Cached(Vec<u8>),
    Pending,
}

pub struct ThumbnailCache {
    encoder: Arc<dyn Encoder>,
    temp_dir: PathBuf,
    width: u32,
    in_flight: HashSet<VersionKey>,
    tx: Sender<ThumbnailEvent>,
    rx: Receiver<ThumbnailEvent>,
}

impl ThumbnailCache {
    pub fn new(encoder: Arc<dyn Encoder>, temp_dir: impl Into<PathBuf>, width: u32) -> Self {
        let (tx, rx) = unbounded();
        Self {
            encoder,
            temp_dir: temp_dir.into(),
            width,
            in_flight: HashSet::new(),
            tx,
            rx,
        }
    }

    /// Cached bytes if present, otherwise start generation.
    pub fn load(
        &mut self,
        key: &VersionKey,
        attrs: &VersionAttrs,
        seq: Option<&SequenceInfo>,
    ) -> Result<ThumbnailLoad> {
        if let Some(bytes) = attrs.thumbnail.as_ref().filter(|b| !b.is_empty()) {
            trace!("Thumbnail cache hit for {}", key);
            return Ok(ThumbnailLoad::Cached(bytes.clone()));
        }
        self.generate(key, seq)?;
        Ok(ThumbnailLoad::Pending)
    }

    /// Dispatch the encoder on the sequence's middle frame.
    pub fn generate(&mut self, key: &VersionKey, seq: Option<&SequenceInfo>) -> Result<()> {
        if self.in_flight.contains(key) {
            trace!("Thumbnail for {} already in flight", key);
            return Ok(());
        }

        let input = seq
            .and_then(|s| s.middle_frame())
            .map(Path::to_path_buf)
            .ok_or_else(|| FlipbookError::Thumbnail {
                key: key.to_string(),
                message: "sequence has no frames".into(),
            })?;

        fs::create_dir_all(&self.temp_dir)
            .map_err(|e| FlipbookError::io("create", &self.temp_dir, e))?;
        let output = self
            .temp_dir
            .join(format!("{}_{}.jpg", key, Uuid::new_v4().simple()));

        let encoder = Arc::clone(&self.encoder);
        let tx = self.tx.clone();
        let event_key = key.clone();
        let width = self.width;

        thread::Builder::new()
            .name(format!("flipbook-thumb-{}", key))
            .spawn(move || {
                let result = render(encoder.as_ref(), &input, &output, width);
                if let Err(e) = &result {
                    error!("Thumbnail for {} failed: {}", event_key, e);
                }
                // receiver gone means the panel closed; drop the result
                let _ = tx.send(ThumbnailEvent {
                    key: event_key,
                    result,
                });
            })
            .map_err(|e| FlipbookError::tool("thumbnail worker", e.to_string()))?;

        debug!("Dispatched thumbnail for {}", key);
        self.in_flight.insert(key.clone());
        Ok(())
    }

    pub fn is_pending(&self, key: &VersionKey) -> bool {
        self.in_flight.contains(key)
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Drain finished generations without blocking.
    pub fn poll(&mut self) -> Vec<ThumbnailEvent> {
        let events: Vec<ThumbnailEvent> = self.rx.try_iter().collect();
        for event in &events {
            self.in_flight.remove(&event.key);
        }
        events
    }

    /// Block for the next finished generation.
    pub fn wait(&mut self, timeout: Duration) -> Option<ThumbnailEvent> {
        if self.in_flight.is_empty() {
            return None;
        }
        let event = self.rx.recv_timeout(timeout).ok()?;
        self.in_flight.remove(&event.key);
        Some(event)
    }
}

fn render(encoder: &dyn Encoder, input: &Path, output: &Path, width: u32) -> Result<Vec<u8>> {
    if let Err(e) = encoder.thumbnail(input, output, width) {
        // a killed or failed encoder may leave a partial image
        fs::remove_file(output).ok();
        return Err(e);
    }
    let bytes = fs::read(output).map_err(|e| FlipbookError::io("read thumbnail", output, e))?;
    fs::remove_file(output).ok();
    if bytes.is_empty() {
        return Err(FlipbookError::tool("thumbnail", "encoder wrote an empty image"));
    }
    Ok(bytes)
}
