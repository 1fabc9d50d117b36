//! Errors raised inside a download job.
//!
//! None of these escape the worker: the download strategy turns every
//! variant into a log line.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// The extractor could not be started or exited with an error.
    #[error("yt-dlp failed: {0}")]
    Extractor(String),

    /// The extractor printed something that is not valid metadata.
    #[error("invalid metadata from yt-dlp: {0}")]
    Metadata(#[from] serde_json::Error),

    /// No video-only stream exists at the requested resolution.
    #[error("No video stream available in {0}")]
    MissingVideoStream(String),

    /// The source offers no audio-only stream to merge.
    #[error("No audio stream available")]
    MissingAudioStream,

    /// The transcoder exited with a non-zero status.
    #[error("ffmpeg exited with {status}: {stderr}")]
    Transcoder { status: String, stderr: String },

    /// The transcoder binary could not be launched at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// True for failures of the merge step.
    pub fn is_processing(&self) -> bool {
        matches!(self, DownloadError::Transcoder { .. })
    }
}
