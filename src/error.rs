//! Error taxonomy shared by the catalog, store, thumbnail and publish layers.
//!
//! Each variant maps onto one operator-facing category (see [`ErrorKind`]):
//! input mistakes are reported before any side effect, missing sequences degrade
//! to a sentinel, tool and publish failures abort the current action only.

use std::fmt;
use std::io;
use std::path::Path;

/// Steps of the publish pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    Probe,
    Backup,
    Register,
    Encode,
    Review,
    Upload,
    Record,
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStep::Probe => write!(f, "sequence probe"),
            PublishStep::Backup => write!(f, "scene backup"),
            PublishStep::Register => write!(f, "artifact registration"),
            PublishStep::Encode => write!(f, "preview encode"),
            PublishStep::Review => write!(f, "review record"),
            PublishStep::Upload => write!(f, "video upload"),
            PublishStep::Record => write!(f, "metadata update"),
        }
    }
}

/// Coarse classification used by the panel to pick a notice level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserInput,
    NotFound,
    ExternalTool,
    PublishPipeline,
    Rejected,
    Storage,
}

#[derive(Debug, thiserror::Error)]
pub enum FlipbookError {
    #[error("{0}")]
    UserInput(String),

    #[error("no sequence files match {0}")]
    NotFound(String),

    #[error("{tool}: {message}")]
    ExternalTool { tool: String, message: String },

    #[error("publish failed during {step}: {source}")]
    Publish {
        step: PublishStep,
        #[source]
        source: Box<FlipbookError>,
    },

    #[error("{0} is published and cannot be deleted")]
    PublishedVersion(String),

    #[error("{0} is already published")]
    AlreadyPublished(String),

    #[error("version slot already exists: {0}")]
    VersionExists(String),

    #[error("unknown version {0}")]
    UnknownVersion(String),

    #[error("thumbnail for {key}: {message}")]
    Thumbnail { key: String, message: String },

    #[error("tracking service: {0}")]
    Tracker(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, FlipbookError>;

impl FlipbookError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlipbookError::UserInput(_) => ErrorKind::UserInput,
            FlipbookError::NotFound(_) | FlipbookError::UnknownVersion(_) => ErrorKind::NotFound,
            FlipbookError::ExternalTool { .. } | FlipbookError::Thumbnail { .. } => {
                ErrorKind::ExternalTool
            }
            FlipbookError::Publish { .. } | FlipbookError::Tracker(_) => {
                ErrorKind::PublishPipeline
            }
            FlipbookError::PublishedVersion(_)
            | FlipbookError::AlreadyPublished(_)
            | FlipbookError::VersionExists(_) => ErrorKind::Rejected,
            FlipbookError::Io { .. } | FlipbookError::Json { .. } => ErrorKind::Storage,
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        FlipbookError::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Wrap an error as the failure of one publish step.
    pub fn at_step(self, step: PublishStep) -> Self {
        FlipbookError::Publish {
            step,
            source: Box::new(self),
        }
    }

    pub(crate) fn io(action: &str, path: &Path, source: io::Error) -> Self {
        FlipbookError::Io {
            context: format!("{} {}", action, path.display()),
            source,
        }
    }
}
