use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::entities::ShotLayout;

pub const SETTINGS_FILE: &str = "flipbook.json";
pub const LOG_FILE: &str = "flipbook.log";

const CONFIG_DIR_ENV: &str = "FLIPBOOK_CONFIG_DIR";

/// Where settings, logs and thumbnail scratch files live.
///
/// An explicit directory (`--config-dir`, then `FLIPBOOK_CONFIG_DIR`) is used
/// for everything. Without one, a working directory that already holds
/// `flipbook.json` or `flipbook.log` is used; otherwise the platform config
/// and data dirs, each with a `flipbook` subfolder.
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from));
        Self { config_dir }
    }

    fn config_dir(&self) -> PathBuf {
        self.resolve(dirs_next::config_dir())
    }

    fn data_dir(&self) -> PathBuf {
        self.resolve(dirs_next::data_dir())
    }

    fn resolve(&self, platform: Option<PathBuf>) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        let cwd = std::env::current_dir().ok();
        if let Some(cwd) = cwd.filter(|d| [SETTINGS_FILE, LOG_FILE].iter().any(|f| d.join(f).exists())) {
            return cwd;
        }
        platform
            .map(|d| d.join("flipbook"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config.config_dir().join(name)
}

pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    config.data_dir().join(name)
}

pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    for dir in [config.config_dir(), config.data_dir()] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Create directory {}", dir.display()))?;
    }
    Ok(())
}

/// Tool locations and defaults, persisted as `flipbook.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub encoder: PathBuf,
    pub player: PathBuf,
    pub thumbnail_width: u32,
    pub fps: f32,
    pub frame_ext: String,
    pub frame_token: String,
    pub encoder_timeout_secs: u64,
    pub range_placeholders: (String, String),
    pub resolution_placeholders: (u32, u32),
    pub name_placeholder: String,
}

impl Default for Settings {
    fn default() -> Self {
        let encoder = std::env::var("FLIPBOOK_FFMPEG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ffmpeg"));
        let player = std::env::var("HFS")
            .map(|hfs| PathBuf::from(hfs).join("bin").join("mplay-bin"))
            .unwrap_or_else(|_| PathBuf::from("mplay"));
        Self {
            encoder,
            player,
            thumbnail_width: 80,
            fps: 24.0,
            frame_ext: "exr".into(),
            frame_token: "$F4".into(),
            encoder_timeout_secs: 300,
            range_placeholders: ("$FSTART".into(), "$FEND".into()),
            resolution_placeholders: (1280, 720),
            name_placeholder: "flipbook".into(),
        }
    }
}

impl Settings {
    /// Missing file gives defaults; a malformed one is reported and ignored.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(settings) => {
                    debug!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    warn!("Ignoring malformed settings {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Serialize settings")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Create {}", parent.display()))?;
        }
        std::fs::write(path, json).with_context(|| format!("Write {}", path.display()))?;
        Ok(())
    }

    pub fn layout(&self, root: impl Into<PathBuf>) -> ShotLayout {
        ShotLayout::new(root, &self.frame_token, &self.frame_ext)
    }
}
