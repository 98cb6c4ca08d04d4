//! Host application and tracking-service seams.
//!
//! [`HostContext`] stands in for the 3D application (scene file, expression
//! expansion, viewport capture, clipboard). [`Tracker`] stands in for the
//! pipeline/tracking service. Local implementations back the CLI: captures
//! copy frames from an existing sequence and publishes land in a JSON ledger.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use super::sequence;
use super::store::write_atomic;
use crate::entities::ShotLayout;
use crate::error::{FlipbookError, Result};

/// Viewport capture request handed to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub session_label: String,
    /// Output path with the frame token.
    pub output_pattern: String,
    pub first_frame: i64,
    pub last_frame: i64,
    /// `None` means the viewport's own resolution.
    pub resolution: Option<(u32, u32)>,
}

pub trait HostContext {
    /// The authoring file currently open, if any.
    fn scene_file(&self) -> Option<PathBuf>;

    /// Expand a host expression such as `$FSTART`. `None` if unknown.
    fn expand(&self, expr: &str) -> Option<String>;

    /// Render frames to disk. Blocks until the capture is written.
    fn capture(&self, request: &CaptureRequest) -> Result<()>;

    fn set_clipboard(&self, text: &str);
}

/// Kind of artifact registered with the tracking service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    FlipbookSequence,
    SceneBackup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRequest {
    pub path: String,
    pub display_name: String,
    pub version: u32,
    pub kind: ArtifactKind,
    /// Paths of artifacts this one depends on.
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub id: Uuid,
    pub path: String,
    pub kind: ArtifactKind,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub code: String,
    pub first_frame: i64,
    pub last_frame: i64,
    pub comment: Option<String>,
    pub frames_path: String,
    pub movie_path: String,
    pub artifacts: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: Uuid,
    pub code: String,
}

/// Remote calls to the tracking service. Any of them may fail.
pub trait Tracker {
    fn register_artifact(&self, request: &ArtifactRequest) -> Result<PublishedArtifact>;
    fn create_review(&self, request: &ReviewRequest) -> Result<ReviewRecord>;
    fn upload_movie(&self, review: &ReviewRecord, movie: &Path) -> Result<()>;
}

// ============================================================================
// Local implementations
// ============================================================================

/// Host for headless use: "captures" by copying frames of an existing sequence.
pub struct DirectoryHost {
    layout: ShotLayout,
    source: Option<String>,
    scene: Option<PathBuf>,
    variables: HashMap<String, String>,
}

impl DirectoryHost {
    pub fn new(layout: ShotLayout) -> Self {
        Self {
            layout,
            source: None,
            scene: None,
            variables: HashMap::new(),
        }
    }

    /// Source frames, as a pattern using the layout's frame token.
    pub fn with_source(mut self, pattern: impl Into<String>) -> Self {
        self.source = Some(pattern.into());
        self
    }

    pub fn with_scene(mut self, scene: impl Into<PathBuf>) -> Self {
        self.scene = Some(scene.into());
        self
    }

    pub fn with_variable(mut self, name: &str, value: impl Into<String>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }
}

impl HostContext for DirectoryHost {
    fn scene_file(&self) -> Option<PathBuf> {
        self.scene.clone()
    }

    fn expand(&self, expr: &str) -> Option<String> {
        let name = expr.trim().trim_start_matches('$');
        self.variables.get(name).cloned()
    }

    fn capture(&self, request: &CaptureRequest) -> Result<()> {
        let source = self.source.as_deref().ok_or_else(|| {
            FlipbookError::tool("capture", "no source sequence configured")
        })?;
        let seq = sequence::probe(&self.layout, source)?;

        let mut copied = 0usize;
        for (frame, path) in &seq.frames {
            if *frame < request.first_frame || *frame > request.last_frame {
                continue;
            }
            let target = self.layout.frame_path(&request.output_pattern, *frame);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| FlipbookError::io("create", parent, e))?;
            }
            fs::copy(path, &target).map_err(|e| FlipbookError::io("copy frame to", &target, e))?;
            copied += 1;
        }

        if copied == 0 {
            return Err(FlipbookError::NotFound(format!(
                "{} in {}-{}",
                source, request.first_frame, request.last_frame
            )));
        }
        info!(
            "Captured {} frame(s) into {} ({})",
            copied, request.output_pattern, request.session_label
        );
        Ok(())
    }

    fn set_clipboard(&self, text: &str) {
        println!("{}", text);
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    #[serde(default)]
    artifacts: Vec<PublishedArtifact>,
    #[serde(default)]
    reviews: Vec<(ReviewRecord, ReviewRequest)>,
    #[serde(default)]
    uploads: Vec<(Uuid, String)>,
}

/// Tracking service backed by a JSON ledger file.
pub struct LocalTracker {
    path: PathBuf,
    ledger: Mutex<Ledger>,
}

impl LocalTracker {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ledger = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| FlipbookError::Json {
                context: format!("parse {}", path.display()),
                source: e,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ledger::default(),
            Err(e) => return Err(FlipbookError::io("read", &path, e)),
        };
        Ok(Self {
            path,
            ledger: Mutex::new(ledger),
        })
    }

    pub fn artifacts(&self) -> Vec<PublishedArtifact> {
        self.lock().artifacts.clone()
    }

    pub fn review_count(&self) -> usize {
        self.lock().reviews.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        let json = serde_json::to_string_pretty(ledger).map_err(|e| FlipbookError::Json {
            context: format!("serialize {}", self.path.display()),
            source: e,
        })?;
        write_atomic(&self.path, json.as_bytes())
    }
}

impl Tracker for LocalTracker {
    fn register_artifact(&self, request: &ArtifactRequest) -> Result<PublishedArtifact> {
        if !Path::new(&request.path).exists() && request.kind == ArtifactKind::SceneBackup {
            return Err(FlipbookError::Tracker(format!("missing file {}", request.path)));
        }
        let artifact = PublishedArtifact {
            id: Uuid::new_v4(),
            path: request.path.clone(),
            kind: request.kind,
            version: request.version,
        };
        let mut ledger = self.lock();
        ledger.artifacts.push(artifact.clone());
        self.save(&ledger)?;
        debug!("Registered {:?} {} as {}", request.kind, request.display_name, artifact.id);
        Ok(artifact)
    }

    fn create_review(&self, request: &ReviewRequest) -> Result<ReviewRecord> {
        let record = ReviewRecord {
            id: Uuid::new_v4(),
            code: request.code.clone(),
        };
        let mut ledger = self.lock();
        ledger.reviews.push((record.clone(), request.clone()));
        self.save(&ledger)?;
        debug!("Created review {} ({})", record.code, record.id);
        Ok(record)
    }

    fn upload_movie(&self, review: &ReviewRecord, movie: &Path) -> Result<()> {
        if !movie.is_file() {
            return Err(FlipbookError::Tracker(format!(
                "movie not found: {}",
                movie.display()
            )));
        }
        let mut ledger = self.lock();
        ledger
            .uploads
            .push((review.id, movie.to_string_lossy().into_owned()));
        self.save(&ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_host_copies_range() {
        let tmp = TempDir::new().unwrap();
        let layout = ShotLayout::new(tmp.path(), "$F4", "exr");
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        for f in 1..=5 {
            fs::write(src.join(format!("render.{:04}.exr", f)), b"px").unwrap();
        }
        let host = DirectoryHost::new(layout.clone())
            .with_source(src.join("render.$F4.exr").to_string_lossy());

        let out = tmp.path().join("out").join("a_v001.$F4.exr");
        host.capture(&CaptureRequest {
            session_label: "flipbook_1".into(),
            output_pattern: out.to_string_lossy().into_owned(),
            first_frame: 2,
            last_frame: 4,
            resolution: None,
        })
        .unwrap();

        let seq = sequence::probe(&layout, &out.to_string_lossy()).unwrap();
        assert_eq!((seq.first_frame, seq.last_frame, seq.len()), (2, 4, 3));
    }

    #[test]
    fn test_expand_variables() {
        let tmp = TempDir::new().unwrap();
        let host = DirectoryHost::new(ShotLayout::new(tmp.path(), "$F4", "exr"))
            .with_variable("FSTART", "1001");
        assert_eq!(host.expand("$FSTART").as_deref(), Some("1001"));
        assert_eq!(host.expand("$FEND"), None);
    }

    #[test]
    fn test_ledger_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("publishes.json");
        let tracker = LocalTracker::open(&path).unwrap();
        tracker
            .register_artifact(&ArtifactRequest {
                path: "/x/a_v001.$F4.exr".into(),
                display_name: "a".into(),
                version: 1,
                kind: ArtifactKind::FlipbookSequence,
                dependencies: vec![],
            })
            .unwrap();

        let reopened = LocalTracker::open(&path).unwrap();
        assert_eq!(reopened.artifacts().len(), 1);
    }

    #[test]
    fn test_upload_requires_movie() {
        let tmp = TempDir::new().unwrap();
        let tracker = LocalTracker::open(tmp.path().join("l.json")).unwrap();
        let review = ReviewRecord {
            id: Uuid::new_v4(),
            code: "a_v001".into(),
        };
        let err = tracker
            .upload_movie(&review, &tmp.path().join("nope.mp4"))
            .unwrap_err();
        assert!(matches!(err, FlipbookError::Tracker(_)));
    }
}
