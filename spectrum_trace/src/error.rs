use std::path::PathBuf;
use thiserror::Error;

/// Failures that end a video's analysis (or the whole batch). Per-frame
/// problems are never errors; they are `Rejection`s.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("cannot read video folder {}: {source}", path.display())]
    FolderUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no videos with extensions {extensions:?} found in {}", path.display())]
    NoVideos { path: PathBuf, extensions: Vec<String> },
    #[error("cannot open video {}: {reason}", path.display())]
    VideoUnavailable { path: PathBuf, reason: String },
    #[error("first frame of {} is unreadable", path.display())]
    FirstFrameUnreadable { path: PathBuf },
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("cannot write {}: {source}", path.display())]
    OutputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("video task failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
