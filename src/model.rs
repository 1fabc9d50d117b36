use std::path::PathBuf;

/// A single queued download, as entered by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Video URL handed to the extractor
    pub source_identifier: String,
    /// Folder the final file is written to
    pub destination_directory: String,
    /// Resolution label such as "1080p"
    pub requested_quality: String,
}

impl DownloadRequest {
    pub fn new(
        source_identifier: impl Into<String>,
        destination_directory: impl Into<String>,
        requested_quality: impl Into<String>,
    ) -> Self {
        Self {
            source_identifier: source_identifier.into(),
            destination_directory: destination_directory.into(),
            requested_quality: requested_quality.into(),
        }
    }

    /// True when no field is blank.
    pub fn is_complete(&self) -> bool {
        !self.source_identifier.trim().is_empty()
            && !self.destination_directory.trim().is_empty()
            && !self.requested_quality.trim().is_empty()
    }
}

/// What a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Video and audio in one file
    Progressive,
    /// Video track only, needs an audio stream merged in
    VideoOnly,
    /// Audio track only
    AudioOnly,
}

/// One downloadable format reported by the extractor
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub format_id: String,
    pub kind: StreamKind,
    /// "720p" style label, absent for audio
    pub resolution: Option<String>,
    /// Average audio bitrate in kbps
    pub audio_bitrate: Option<f64>,
    /// Container extension, e.g. "mp4"
    pub ext: String,
}

impl Stream {
    pub fn has_resolution(&self, quality: &str) -> bool {
        self.resolution.as_deref() == Some(quality)
    }
}

/// Title plus every stream available for a source
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub title: String,
    pub streams: Vec<Stream>,
}

impl VideoMetadata {
    pub fn progressive_at(&self, quality: &str) -> Option<&Stream> {
        self.streams
            .iter()
            .find(|s| s.kind == StreamKind::Progressive && s.has_resolution(quality))
    }

    pub fn video_only_at(&self, quality: &str) -> Option<&Stream> {
        self.streams
            .iter()
            .find(|s| s.kind == StreamKind::VideoOnly && s.has_resolution(quality))
    }

    /// Audio-only stream with the highest bitrate; streams without a bitrate rank last.
    pub fn best_audio(&self) -> Option<&Stream> {
        self.streams
            .iter()
            .filter(|s| s.kind == StreamKind::AudioOnly)
            .fold(None, |best: Option<&Stream>, s| match best {
                Some(b) if b.audio_bitrate.unwrap_or(-1.0) >= s.audio_bitrate.unwrap_or(-1.0) => {
                    Some(b)
                }
                _ => Some(s),
            })
    }
}

/// How a single job ended. Only used for logging and tests; the queue
/// advances the same way for every variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Final file written at this path
    Completed(PathBuf),
    /// An error was logged and the job stopped
    Failed,
    /// The transcoder was missing; the installer was launched instead
    Abandoned,
}
