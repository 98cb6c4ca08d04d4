//! Publish pipeline for one flipbook version.
//!
//! Steps run in order and the first failure aborts the rest:
//! backup the scene, register the backup and the frame sequence, encode a
//! preview movie, create the review record, upload the movie. Only then is
//! `publish` set and persisted. Completed steps are not rolled back; a failed
//! publish can leave a backup file or a movie behind.

use log::{error, info};
use std::fs;
use std::path::PathBuf;

use super::catalog::VersionCatalog;
use super::encoder::{Encoder, PreviewRequest};
use super::host::{
    ArtifactKind, ArtifactRequest, HostContext, PublishedArtifact, ReviewRecord, ReviewRequest,
    Tracker,
};
use super::sequence;
use crate::entities::VersionKey;
use crate::error::{FlipbookError, PublishStep, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct PublishOutcome {
    pub backup: PublishedArtifact,
    pub sequence: PublishedArtifact,
    pub review: ReviewRecord,
    pub movie: PathBuf,
}

pub struct PublishRecorder<'a> {
    host: &'a dyn HostContext,
    tracker: &'a dyn Tracker,
    encoder: &'a dyn Encoder,
    fps: f32,
}

impl<'a> PublishRecorder<'a> {
    pub fn new(
        host: &'a dyn HostContext,
        tracker: &'a dyn Tracker,
        encoder: &'a dyn Encoder,
        fps: f32,
    ) -> Self {
        Self {
            host,
            tracker,
            encoder,
            fps,
        }
    }

    pub fn publish(&self, catalog: &mut VersionCatalog, key: &VersionKey) -> Result<PublishOutcome> {
        let result = self.run(catalog, key);
        if let Err(e) = &result {
            error!("Publish of {} aborted: {}", key, e);
        }
        result
    }

    fn run(&self, catalog: &mut VersionCatalog, key: &VersionKey) -> Result<PublishOutcome> {
        let record = catalog
            .get(key)
            .cloned()
            .ok_or_else(|| FlipbookError::UnknownVersion(key.to_string()))?;
        if record.is_published() {
            return Err(FlipbookError::AlreadyPublished(key.to_string()));
        }
        let layout = catalog.layout().clone();

        let seq = sequence::probe(&layout, &record.path).map_err(|e| e.at_step(PublishStep::Probe))?;

        // (a) scene backup
        let scene = self.host.scene_file().ok_or_else(|| {
            FlipbookError::UserInput("No scene file is open".into()).at_step(PublishStep::Backup)
        })?;
        let publish_dir = layout.publish_dir(&key.name);
        let scene_name = scene
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scene".into());
        let backup_path = publish_dir.join(format!("{}_{}", key, scene_name));
        fs::create_dir_all(&publish_dir)
            .and_then(|_| fs::copy(&scene, &backup_path))
            .map_err(|e| FlipbookError::io("back up scene to", &backup_path, e).at_step(PublishStep::Backup))?;
        info!("[{}] scene backed up to {}", key, backup_path.display());

        // (b) register artifacts
        let backup_path_str = backup_path.to_string_lossy().into_owned();
        let backup = self
            .tracker
            .register_artifact(&ArtifactRequest {
                path: backup_path_str.clone(),
                display_name: format!("{} scene", key.name),
                version: key.version,
                kind: ArtifactKind::SceneBackup,
                dependencies: Vec::new(),
            })
            .map_err(|e| e.at_step(PublishStep::Register))?;
        let sequence_artifact = self
            .tracker
            .register_artifact(&ArtifactRequest {
                path: record.path.clone(),
                display_name: key.name.clone(),
                version: key.version,
                kind: ArtifactKind::FlipbookSequence,
                dependencies: vec![backup_path_str],
            })
            .map_err(|e| e.at_step(PublishStep::Register))?;
        info!("[{}] registered sequence and backup", key);

        // (c) preview movie
        let movie = publish_dir.join(format!("{}.mp4", key));
        self.encoder
            .preview(&PreviewRequest {
                input_pattern: layout.to_printf(&record.path),
                output: movie.clone(),
                first_frame: seq.first_frame,
                last_frame: seq.last_frame,
                fps: self.fps,
                title: format!("{} {}", key.name, key.label()),
                comment: record.attrs.comment.clone(),
            })
            .map_err(|e| e.at_step(PublishStep::Encode))?;

        // (d) review record
        let review = self
            .tracker
            .create_review(&ReviewRequest {
                code: key.to_string(),
                first_frame: seq.first_frame,
                last_frame: seq.last_frame,
                comment: record.attrs.comment.clone(),
                frames_path: record.path.clone(),
                movie_path: movie.to_string_lossy().into_owned(),
                artifacts: vec![sequence_artifact.id, backup.id],
            })
            .map_err(|e| e.at_step(PublishStep::Review))?;

        // (e) upload
        self.tracker
            .upload_movie(&review, &movie)
            .map_err(|e| e.at_step(PublishStep::Upload))?;

        catalog
            .mark_published(key)
            .map_err(|e| e.at_step(PublishStep::Record))?;
        info!("Published {} as review {}", key, review.id);

        Ok(PublishOutcome {
            backup,
            sequence: sequence_artifact,
            review,
            movie,
        })
    }
}
