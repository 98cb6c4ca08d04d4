//! Flipbook panel controller, independent of any widget toolkit.
//!
//! Owns the catalog and thumbnail cache, validates the new-flipbook form,
//! turns user actions into catalog/publish calls and collects operator
//! notices. A front end renders [`Panel::rows`] and drains
//! [`Panel::take_notices`]; it calls [`Panel::poll_thumbnails`] from its event
//! loop so finished thumbnails land on the same thread as everything else.

use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::core::{
    CaptureRequest, CatalogDelta, Encoder, HostContext, PlaybackTool, PublishOutcome,
    PublishRecorder, ThumbnailCache, ThumbnailLoad, Tracker, VersionCatalog,
};
use crate::entities::{VersionKey, VersionRecord, validate_name};
use crate::error::{ErrorKind, FlipbookError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Message for the operator (modal box in a GUI, stderr in the CLI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Raw text of the "New Flipbook Settings" fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFlipbookForm {
    pub start: String,
    pub end: String,
    pub auto_resolution: bool,
    pub width: String,
    pub height: String,
    pub name: String,
    pub comment: String,
}

impl Default for NewFlipbookForm {
    fn default() -> Self {
        Self {
            start: String::new(),
            end: String::new(),
            auto_resolution: true,
            width: String::new(),
            height: String::new(),
            name: String::new(),
            comment: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedForm {
    pub name: String,
    pub range: (i64, i64),
    pub resolution: Option<(u32, u32)>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailCell {
    Image(Vec<u8>),
    Pending,
    Unavailable,
}

/// Columns: Flipbook Name, Thumbnail, Range, Comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRow {
    pub key: VersionKey,
    pub label: String,
    pub thumbnail: ThumbnailCell,
    pub range: String,
    pub comment: String,
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRow {
    pub name: String,
    pub items: Vec<ItemRow>,
}

pub struct Panel {
    settings: Settings,
    catalog: VersionCatalog,
    thumbs: ThumbnailCache,
    encoder: Arc<dyn Encoder>,
    player: PlaybackTool,
    host: Arc<dyn HostContext>,
    tracker: Arc<dyn Tracker>,
    notices: Vec<Notice>,
    thumbnails_enabled: bool,
    pub form: NewFlipbookForm,
}

impl Panel {
    pub fn new(
        settings: Settings,
        root: impl Into<PathBuf>,
        scratch_dir: impl Into<PathBuf>,
        host: Arc<dyn HostContext>,
        tracker: Arc<dyn Tracker>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        let catalog = VersionCatalog::new(settings.layout(root));
        let thumbs = ThumbnailCache::new(
            Arc::clone(&encoder),
            scratch_dir.into(),
            settings.thumbnail_width,
        );
        let player = PlaybackTool::new(settings.player.clone(), Some(settings.fps));
        Self {
            settings,
            catalog,
            thumbs,
            encoder,
            player,
            host,
            tracker,
            notices: Vec::new(),
            thumbnails_enabled: true,
            form: NewFlipbookForm::default(),
        }
    }

    /// When off, refreshes only reconcile the catalog; no encoder jobs start.
    pub fn set_thumbnails_enabled(&mut self, enabled: bool) {
        self.thumbnails_enabled = enabled;
    }

    pub fn catalog(&self) -> &VersionCatalog {
        &self.catalog
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Info => info!("{}", message),
            NoticeLevel::Warning => warn!("{}", message),
            NoticeLevel::Error => error!("{}", message),
        }
        self.notices.push(Notice { level, message });
    }

    fn notify_error(&mut self, err: &FlipbookError) {
        let level = match err.kind() {
            ErrorKind::UserInput | ErrorKind::Rejected | ErrorKind::NotFound => NoticeLevel::Warning,
            _ => NoticeLevel::Error,
        };
        self.notify(level, err.to_string());
    }

    // ========== Tree ==========

    /// Reconcile with disk, then start thumbnails for anything lacking one.
    pub fn refresh(&mut self) -> Option<CatalogDelta> {
        let delta = match self.catalog.refresh() {
            Ok(delta) => delta,
            Err(e) => {
                self.notify_error(&e);
                return None;
            }
        };
        for failure in &delta.failures {
            self.notify(NoticeLevel::Error, failure.clone());
        }
        if self.thumbnails_enabled {
            let added: HashSet<VersionKey> = delta.added.iter().map(|r| r.key.clone()).collect();
            self.load_thumbnails(&added);
        }
        Some(delta)
    }

    fn load_thumbnails(&mut self, newly_added: &HashSet<VersionKey>) {
        let wanted: Vec<(VersionKey, bool)> = self
            .catalog
            .records()
            .filter(|r| !r.attrs.has_thumbnail() && !self.thumbs.is_pending(&r.key))
            .map(|r| (r.key.clone(), self.catalog.sequence(&r.key).is_some()))
            .collect();

        for (key, has_frames) in wanted {
            // empty slots are reported once, when first seen
            if !has_frames && !newly_added.contains(&key) {
                continue;
            }
            let Some(record) = self.catalog.get(&key) else {
                continue;
            };
            let result = self
                .thumbs
                .load(&key, &record.attrs, self.catalog.sequence(&key));
            match result {
                Ok(ThumbnailLoad::Pending) => debug!("Generating thumbnail for {}", key),
                Ok(ThumbnailLoad::Cached(_)) => {}
                Err(e) => self.notify_error(&e),
            }
        }
    }

    /// Apply finished thumbnails. Returns how many were stored.
    pub fn poll_thumbnails(&mut self) -> usize {
        let events = self.thumbs.poll();
        let mut stored = 0;
        for event in events {
            if self.apply_thumbnail(event.key, event.result) {
                stored += 1;
            }
        }
        stored
    }

    /// Block until outstanding thumbnails finish or `timeout` passes.
    pub fn wait_for_thumbnails(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut stored = 0;
        while self.thumbs.pending_count() > 0 {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                warn!("{} thumbnail(s) still pending", self.thumbs.pending_count());
                break;
            }
            if let Some(event) = self.thumbs.wait(left) {
                if self.apply_thumbnail(event.key, event.result) {
                    stored += 1;
                }
            }
        }
        stored
    }

    fn apply_thumbnail(&mut self, key: VersionKey, result: Result<Vec<u8>>) -> bool {
        match result {
            Ok(bytes) => {
                // the version may have been deleted while the encoder ran
                if self.catalog.get(&key).is_none() {
                    return false;
                }
                match self.catalog.set_thumbnail(&key, bytes) {
                    Ok(()) => true,
                    Err(e) => {
                        self.notify_error(&e);
                        false
                    }
                }
            }
            Err(e) => {
                self.notify(
                    NoticeLevel::Error,
                    format!("Failed to generate thumbnail for {}: {}", key, e),
                );
                false
            }
        }
    }

    pub fn rows(&self) -> Vec<GroupRow> {
        self.catalog
            .groups()
            .map(|(name, records)| GroupRow {
                name: name.to_string(),
                items: records.iter().map(|r| self.item_row(r)).collect(),
            })
            .collect()
    }

    fn item_row(&self, record: &VersionRecord) -> ItemRow {
        let thumbnail = match &record.attrs.thumbnail {
            Some(bytes) if !bytes.is_empty() => ThumbnailCell::Image(bytes.clone()),
            _ if self.thumbs.is_pending(&record.key) => ThumbnailCell::Pending,
            _ => ThumbnailCell::Unavailable,
        };
        ItemRow {
            key: record.key.clone(),
            label: record.key.label(),
            thumbnail,
            range: self.catalog.range_display(&record.key),
            comment: record.attrs.comment.clone().unwrap_or_default(),
            published: record.is_published(),
        }
    }

    /// Clicking an item puts its flipbook name into the form.
    pub fn select(&mut self, key: &VersionKey) {
        self.form.name = key.name.clone();
    }

    // ========== New flipbook ==========

    pub fn validate_form(&self) -> Result<ValidatedForm> {
        let (start_ph, end_ph) = &self.settings.range_placeholders;
        let start = self.resolve_frame(&self.form.start, start_ph);
        let end = self.resolve_frame(&self.form.end, end_ph);
        let range = match (start, end) {
            (Some(s), Some(e)) if s >= 1 && e >= 1 && s <= e => (s, e),
            _ => return Err(FlipbookError::UserInput("Incorrect flipbook ranges!".into())),
        };

        let resolution = if self.form.auto_resolution {
            None
        } else {
            let (w_ph, h_ph) = self.settings.resolution_placeholders;
            let w = parse_dimension(&self.form.width, w_ph);
            let h = parse_dimension(&self.form.height, h_ph);
            match (w, h) {
                (Some(w), Some(h)) if w >= 10 && h >= 10 => Some((w, h)),
                _ => {
                    return Err(FlipbookError::UserInput(
                        "Incorrect flipbook resolution!".into(),
                    ));
                }
            }
        };

        let name = match self.form.name.trim() {
            "" => self.settings.name_placeholder.clone(),
            n => n.to_string(),
        };
        validate_name(&name)?;

        let comment = Some(self.form.comment.trim().to_string()).filter(|c| !c.is_empty());
        Ok(ValidatedForm {
            name,
            range,
            resolution,
            comment,
        })
    }

    fn resolve_frame(&self, text: &str, placeholder: &str) -> Option<i64> {
        let text = match text.trim() {
            "" => placeholder,
            t => t,
        };
        let value = if is_digits(text) {
            text.to_string()
        } else {
            self.host.expand(text)?
        };
        if !is_digits(&value) {
            return None;
        }
        value.parse().ok()
    }

    /// Validate, reserve the next version, capture, refresh.
    pub fn create_flipbook(&mut self) -> Option<VersionRecord> {
        let form = match self.validate_form() {
            Ok(form) => form,
            Err(e) => {
                self.notify_error(&e);
                return None;
            }
        };

        let record = match self.catalog.create(&form.name, form.range, form.comment) {
            Ok(record) => record,
            Err(e) => {
                self.notify_error(&e);
                return None;
            }
        };

        let request = CaptureRequest {
            session_label: format!("flipbook_{}", std::process::id()),
            output_pattern: record.path.clone(),
            first_frame: form.range.0,
            last_frame: form.range.1,
            resolution: form.resolution,
        };
        if let Err(e) = self.host.capture(&request) {
            // the slot stays reserved; the operator can retry or delete it
            self.notify_error(&e);
        }

        self.refresh();
        Some(record)
    }

    // ========== Actions on selection ==========

    /// Delete each version; published ones are refused individually.
    pub fn delete(&mut self, keys: &[VersionKey]) -> usize {
        let mut deleted = 0;
        for key in keys {
            match self.catalog.delete(key) {
                Ok(()) => deleted += 1,
                Err(e) => self.notify_error(&e),
            }
        }
        self.refresh();
        deleted
    }

    pub fn set_comment(&mut self, key: &VersionKey, comment: &str) -> bool {
        match self.catalog.set_comment(key, comment) {
            Ok(()) => true,
            Err(e) => {
                self.notify_error(&e);
                false
            }
        }
    }

    /// Open the selection in the playback tool.
    pub fn play(&mut self, keys: &[VersionKey]) -> Option<u32> {
        let patterns: Vec<String> = keys
            .iter()
            .filter_map(|k| self.catalog.get(k))
            .map(|r| r.path.clone())
            .collect();
        match self.player.launch(&patterns) {
            Ok(pid) => pid,
            Err(e) => {
                self.notify_error(&e);
                None
            }
        }
    }

    /// One `<pattern with ####> <first>-<last>` line per version with frames.
    pub fn copy_to_clipboard(&mut self, keys: &[VersionKey]) -> Option<String> {
        let layout = self.catalog.layout();
        let mut lines = Vec::new();
        let mut skipped = Vec::new();
        for key in keys {
            match (self.catalog.get(key), self.catalog.sequence(key)) {
                (Some(record), Some(seq)) => lines.push(format!(
                    "{} {}-{}",
                    layout.to_hashes(&record.path),
                    seq.first_frame,
                    seq.last_frame
                )),
                _ => skipped.push(key.to_string()),
            }
        }
        for key in skipped {
            self.notify(NoticeLevel::Warning, format!("{} has no frames to copy", key));
        }
        if lines.is_empty() {
            return None;
        }
        let text = lines.join("\n");
        self.host.set_clipboard(&text);
        Some(text)
    }

    pub fn publish(&mut self, key: &VersionKey) -> Option<PublishOutcome> {
        let recorder = PublishRecorder::new(
            self.host.as_ref(),
            self.tracker.as_ref(),
            self.encoder.as_ref(),
            self.settings.fps,
        );
        match recorder.publish(&mut self.catalog, key) {
            Ok(outcome) => {
                self.notify(NoticeLevel::Info, format!("Published {}", key));
                Some(outcome)
            }
            Err(e) => {
                self.notify_error(&e);
                None
            }
        }
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn parse_dimension(text: &str, placeholder: u32) -> Option<u32> {
    match text.trim() {
        "" => Some(placeholder),
        t if is_digits(t) => t.parse().ok(),
        _ => None,
    }
}
