//! External encoder and playback tool invocation.
//!
//! Both tools are opaque subprocesses. The encoder is called with
//! `-i <input> -y -vf scale=<w>:-1 <output.jpg>` for thumbnails and with a
//! frame-rate / start-frame / metadata argument list for preview videos.

use log::{debug, info, warn};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

use crate::error::{FlipbookError, Result};

/// Parameters for one preview-video encode.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRequest {
    /// printf-style input pattern, e.g. `.../a_v001.%04d.exr`.
    pub input_pattern: String,
    pub output: PathBuf,
    pub first_frame: i64,
    pub last_frame: i64,
    pub fps: f32,
    pub title: String,
    pub comment: Option<String>,
}

impl PreviewRequest {
    pub fn frame_count(&self) -> i64 {
        self.last_frame - self.first_frame + 1
    }
}

/// Seam between the bookkeeping code and the video encoder.
pub trait Encoder: Send + Sync {
    /// Scale one frame down to `width` pixels wide and write it as an image.
    fn thumbnail(&self, input: &Path, output: &Path, width: u32) -> Result<()>;

    /// Encode a frame range into a single preview video. Blocks until done.
    fn preview(&self, request: &PreviewRequest) -> Result<()>;
}

/// `ffmpeg` subprocess encoder.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    exec: PathBuf,
    timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(exec: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            exec: exec.into(),
            timeout,
        }
    }

    pub fn thumbnail_args(input: &Path, output: &Path, width: u32) -> Vec<String> {
        vec![
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-y".into(),
            "-vf".into(),
            format!("scale={}:-1", width),
            output.to_string_lossy().into_owned(),
        ]
    }

    pub fn preview_args(request: &PreviewRequest) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-framerate".into(),
            format_fps(request.fps),
            "-start_number".into(),
            request.first_frame.to_string(),
            "-i".into(),
            request.input_pattern.clone(),
            "-frames:v".into(),
            request.frame_count().to_string(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-metadata".into(),
            format!("title={}", request.title),
        ];
        if let Some(comment) = request.comment.as_deref().filter(|c| !c.is_empty()) {
            args.push("-metadata".into());
            args.push(format!("comment={}", comment));
        }
        args.push(request.output.to_string_lossy().into_owned());
        args
    }

    fn run(&self, args: &[String]) -> Result<()> {
        let tool = self.exec.to_string_lossy().into_owned();
        debug!("{} {}", tool, args.join(" "));

        // quiet logging keeps the stderr pipe from filling while we wait
        let mut child = Command::new(&self.exec)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FlipbookError::tool(&tool, format!("cannot start: {}", e)))?;

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                child.kill().ok();
                child.wait().ok();
                return Err(FlipbookError::tool(
                    &tool,
                    format!("timed out after {}s", self.timeout.as_secs()),
                ));
            }
            Err(e) => return Err(FlipbookError::tool(&tool, format!("wait failed: {}", e))),
        };

        if status.success() {
            return Ok(());
        }

        let mut stderr = String::new();
        if let Some(mut err) = child.stderr.take() {
            err.read_to_string(&mut stderr).ok();
        }
        let tail = stderr.lines().last().unwrap_or("").trim().to_string();
        warn!("{} failed ({}): {}", tool, status, tail);
        Err(FlipbookError::tool(tool, format!("{} {}", status, tail).trim().to_string()))
    }
}

impl Encoder for FfmpegEncoder {
    fn thumbnail(&self, input: &Path, output: &Path, width: u32) -> Result<()> {
        self.run(&Self::thumbnail_args(input, output, width))
    }

    fn preview(&self, request: &PreviewRequest) -> Result<()> {
        info!(
            "Encoding preview {} ({} frames) -> {}",
            request.title,
            request.frame_count(),
            request.output.display()
        );
        self.run(&Self::preview_args(request))
    }
}

fn format_fps(fps: f32) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as i64)
    } else {
        format!("{}", fps)
    }
}

/// Image-sequence playback tool (e.g. `mplay`).
#[derive(Debug, Clone)]
pub struct PlaybackTool {
    exec: PathBuf,
    fps: Option<f32>,
}

impl PlaybackTool {
    pub fn new(exec: impl Into<PathBuf>, fps: Option<f32>) -> Self {
        Self {
            exec: exec.into(),
            fps,
        }
    }

    pub fn args(&self, patterns: &[String]) -> Vec<String> {
        let mut args: Vec<String> = patterns.to_vec();
        args.push("-g".into());
        if let Some(fps) = self.fps {
            args.push("-r".into());
            args.push(format_fps(fps));
        }
        args
    }

    /// Spawn the player detached. Nothing is spawned for an empty list.
    pub fn launch(&self, patterns: &[String]) -> Result<Option<u32>> {
        if patterns.is_empty() {
            return Ok(None);
        }
        let tool = self.exec.to_string_lossy().into_owned();
        let child = Command::new(&self.exec)
            .args(self.args(patterns))
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| FlipbookError::tool(&tool, format!("cannot start: {}", e)))?;
        info!("Started {} (pid {}) with {} sequence(s)", tool, child.id(), patterns.len());
        Ok(Some(child.id()))
    }
}
