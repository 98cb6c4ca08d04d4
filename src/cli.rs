use clap::{Parser, Subcommand};
use regex::Regex;
use std::path::PathBuf;

// Build version with tool info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Encoder: ffmpeg (external)\n",
    "Player:  mplay (external)\n",
    "Target:  ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Versioned flipbook bookkeeping for a shot
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Shot flipbook root (contains one directory per flipbook name)
    #[arg(short = 'r', long = "root", value_name = "DIR", env = "FLIPBOOK_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Enable debug logging to file (default: flipbook.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Scene file recorded as the authoring file on publish
    #[arg(short = 's', long = "scene", value_name = "FILE", global = true)]
    pub scene: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List flipbooks grouped by name
    List {
        /// Generate missing thumbnails and wait for them
        #[arg(long)]
        thumbs: bool,
    },

    /// Reserve the next version of NAME and capture frames into it
    Create {
        #[arg(value_name = "NAME")]
        name: Option<String>,

        /// First frame (number or host expression such as $FSTART)
        #[arg(long, value_name = "N")]
        start: Option<String>,

        /// Last frame (number or host expression such as $FEND)
        #[arg(long, value_name = "N")]
        end: Option<String>,

        /// Capture resolution, e.g. 1280x720 (default: viewport)
        #[arg(long = "res", value_name = "WxH", value_parser = parse_resolution)]
        resolution: Option<(u32, u32)>,

        #[arg(long, value_name = "TEXT")]
        comment: Option<String>,

        /// Source frames to capture from, using the frame token (e.g. render/beauty.$F4.exr)
        #[arg(long = "from", value_name = "PATTERN")]
        source: String,

        /// Host variable for expression expansion (NAME=VALUE)
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_variable)]
        variables: Vec<(String, String)>,
    },

    /// Delete unpublished versions
    Delete {
        #[arg(value_name = "KEY", required = true)]
        keys: Vec<String>,
    },

    /// Set or clear a version comment
    Comment {
        #[arg(value_name = "KEY")]
        key: String,
        #[arg(value_name = "TEXT", default_value = "")]
        text: String,
    },

    /// Publish a version: scene backup, registration, preview movie, review
    Publish {
        #[arg(value_name = "KEY")]
        key: String,
    },

    /// Open versions in the playback tool
    Play {
        #[arg(value_name = "KEY", required = true)]
        keys: Vec<String>,
    },

    /// Print `<pattern> <first>-<last>` lines for versions
    Copy {
        #[arg(value_name = "KEY", required = true)]
        keys: Vec<String>,
    },
}

/// Parse `WxH` into a resolution.
pub fn parse_resolution(s: &str) -> Result<(u32, u32), String> {
    let re = Regex::new(r"^\s*(\d+)\s*[xX]\s*(\d+)\s*$")
        .map_err(|e| format!("Regex error: {}", e))?;
    let caps = re
        .captures(s)
        .ok_or_else(|| format!("expected WxH, got '{}'", s))?;
    let w = caps[1].parse().map_err(|_| format!("width out of range: {}", &caps[1]))?;
    let h = caps[2].parse().map_err(|_| format!("height out of range: {}", &caps[2]))?;
    Ok((w, h))
}

fn parse_variable(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let name = name.trim().trim_start_matches('$');
    if name.is_empty() {
        return Err(format!("empty variable name in '{}'", s));
    }
    Ok((name.to_string(), value.to_string()))
}
