//! In-process stand-ins for the encoder, host and tracking service.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use super::encoder::{Encoder, PreviewRequest};
use super::host::{
    ArtifactRequest, CaptureRequest, HostContext, PublishedArtifact, ReviewRecord, ReviewRequest,
    Tracker,
};
use crate::entities::ShotLayout;
use crate::error::{FlipbookError, Result};

#[derive(Default)]
pub struct FakeEncoder {
    pub thumbnail_calls: AtomicUsize,
    pub preview_calls: AtomicUsize,
    fail: bool,
}

impl FakeEncoder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl Encoder for FakeEncoder {
    fn thumbnail(&self, input: &Path, output: &Path, _width: u32) -> Result<()> {
        self.thumbnail_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            // half-written output, as a crashing encoder leaves it
            fs::write(output, b"partial").unwrap();
            return Err(FlipbookError::tool("fake-ffmpeg", "exit status: 1"));
        }
        let name = input.file_name().unwrap().to_string_lossy();
        fs::write(output, format!("thumb:{}", name)).unwrap();
        Ok(())
    }

    fn preview(&self, request: &PreviewRequest) -> Result<()> {
        self.preview_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FlipbookError::tool("fake-ffmpeg", "exit status: 1"));
        }
        fs::create_dir_all(request.output.parent().unwrap()).unwrap();
        fs::write(&request.output, b"movie").unwrap();
        Ok(())
    }
}

/// Host that writes one small file per requested frame.
pub struct FakeHost {
    layout: ShotLayout,
    pub scene: Option<PathBuf>,
    pub variables: HashMap<String, String>,
    pub captures: Mutex<Vec<CaptureRequest>>,
    pub clipboard: Mutex<Option<String>>,
}

impl FakeHost {
    pub fn new(layout: ShotLayout) -> Self {
        Self {
            layout,
            scene: None,
            variables: HashMap::new(),
            captures: Mutex::new(Vec::new()),
            clipboard: Mutex::new(None),
        }
    }

    pub fn with_scene(mut self, scene: PathBuf) -> Self {
        self.scene = Some(scene);
        self
    }
}

impl HostContext for FakeHost {
    fn scene_file(&self) -> Option<PathBuf> {
        self.scene.clone()
    }

    fn expand(&self, expr: &str) -> Option<String> {
        self.variables.get(expr.trim_start_matches('$')).cloned()
    }

    fn capture(&self, request: &CaptureRequest) -> Result<()> {
        for frame in request.first_frame..=request.last_frame {
            let path = self.layout.frame_path(&request.output_pattern, frame);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"px").unwrap();
        }
        self.captures.lock().unwrap().push(request.clone());
        Ok(())
    }

    fn set_clipboard(&self, text: &str) {
        *self.clipboard.lock().unwrap() = Some(text.to_string());
    }
}

#[derive(Default)]
pub struct FakeTracker {
    pub artifacts: Mutex<Vec<ArtifactRequest>>,
    pub reviews: Mutex<Vec<ReviewRequest>>,
    pub uploads: AtomicUsize,
    /// Fail the named call: "register", "review" or "upload".
    pub fail_at: Option<&'static str>,
}

impl FakeTracker {
    pub fn failing_at(call: &'static str) -> Self {
        Self {
            fail_at: Some(call),
            ..Self::default()
        }
    }

    fn check(&self, call: &str) -> Result<()> {
        if self.fail_at == Some(call) {
            return Err(FlipbookError::Tracker(format!("{} refused", call)));
        }
        Ok(())
    }
}

impl Tracker for FakeTracker {
    fn register_artifact(&self, request: &ArtifactRequest) -> Result<PublishedArtifact> {
        self.check("register")?;
        self.artifacts.lock().unwrap().push(request.clone());
        Ok(PublishedArtifact {
            id: Uuid::new_v4(),
            path: request.path.clone(),
            kind: request.kind,
            version: request.version,
        })
    }

    fn create_review(&self, request: &ReviewRequest) -> Result<ReviewRecord> {
        self.check("review")?;
        self.reviews.lock().unwrap().push(request.clone());
        Ok(ReviewRecord {
            id: Uuid::new_v4(),
            code: request.code.clone(),
        })
    }

    fn upload_movie(&self, _review: &ReviewRecord, movie: &Path) -> Result<()> {
        self.check("upload")?;
        assert!(movie.is_file());
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
