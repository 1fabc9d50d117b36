//! One download job: preflight, stream selection, download, and merge.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;

use crate::error::DownloadError;
use crate::events::LogSink;
use crate::extractor::Extractor;
use crate::model::{DownloadRequest, JobOutcome, Stream, VideoMetadata};
use crate::preflight::ensure_transcoder_available;
use crate::queue::JobRunner;
use crate::transcoder::{Installer, Transcoder};

/// Temporary name for the video-only stream on the split path
pub const VIDEO_TEMP_NAME: &str = "video.mp4";
/// Temporary name for the audio-only stream on the split path
pub const AUDIO_TEMP_NAME: &str = "audio.mp4";

/// Which streams a job will fetch
#[derive(Debug, PartialEq)]
pub enum DownloadPlan<'a> {
    /// One file already holding audio and video
    Progressive(&'a Stream),
    /// Separate streams merged by the transcoder
    Split { video: &'a Stream, audio: &'a Stream },
}

/// Progressive at the exact resolution wins; otherwise video-only at that
/// resolution plus the highest-bitrate audio.
pub fn plan<'a>(meta: &'a VideoMetadata, quality: &str) -> Result<DownloadPlan<'a>, DownloadError> {
    if let Some(stream) = meta.progressive_at(quality) {
        return Ok(DownloadPlan::Progressive(stream));
    }
    let video = meta
        .video_only_at(quality)
        .ok_or_else(|| DownloadError::MissingVideoStream(quality.to_string()))?;
    let audio = meta.best_audio().ok_or(DownloadError::MissingAudioStream)?;
    Ok(DownloadPlan::Split { video, audio })
}

/// File name derived from a video title.
pub fn output_file_name(title: &str, ext: &str) -> String {
    let mut stem = sanitize_filename::sanitize(title.trim());
    if stem.is_empty() {
        stem = "download".to_string();
    }
    format!("{}.{}", stem, ext)
}

/// Name of the merged file. It must differ from both temporary inputs, which
/// are deleted once the merge succeeds.
pub fn merged_file_name(title: &str) -> String {
    let name = output_file_name(title, "mp4");
    let clashes = [VIDEO_TEMP_NAME, AUDIO_TEMP_NAME]
        .iter()
        .any(|temp| temp.eq_ignore_ascii_case(&name));
    if clashes {
        format!("{} (1).mp4", &name[..name.len() - ".mp4".len()])
    } else {
        name
    }
}

pub struct Downloader {
    extractor: Arc<dyn Extractor>,
    transcoder: Arc<dyn Transcoder>,
    installer: Arc<dyn Installer>,
}

impl Downloader {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        transcoder: Arc<dyn Transcoder>,
        installer: Arc<dyn Installer>,
    ) -> Self {
        Self { extractor, transcoder, installer }
    }

    /// Runs a job to completion. Every error ends up in `log`; the returned
    /// outcome is informational.
    pub async fn download(&self, request: &DownloadRequest, log: &LogSink) -> JobOutcome {
        if !request.is_complete() {
            log.log("Please enter a URL, select a path, and choose a quality.");
            return JobOutcome::Failed;
        }

        if !ensure_transcoder_available(self.transcoder.as_ref(), self.installer.as_ref(), log).await {
            return JobOutcome::Abandoned;
        }

        match self.fetch(request, log).await {
            Ok(path) => JobOutcome::Completed(path),
            Err(e) if e.is_processing() => {
                tracing::error!("merge failed for {}: {}", request.source_identifier, e);
                log.log(format!("An error occurred during ffmpeg processing: {}", e));
                JobOutcome::Failed
            }
            Err(e) => {
                tracing::error!("download failed for {}: {}", request.source_identifier, e);
                log.log(format!("An error occurred: {}", e));
                JobOutcome::Failed
            }
        }
    }

    async fn fetch(&self, request: &DownloadRequest, log: &LogSink) -> Result<PathBuf, DownloadError> {
        let source = request.source_identifier.as_str();
        let quality = request.requested_quality.as_str();
        let dir = Path::new(&request.destination_directory);

        let meta = self.extractor.fetch_metadata(source).await?;
        tracing::debug!("{} streams for \"{}\"", meta.streams.len(), meta.title);

        let path = match plan(&meta, quality)? {
            DownloadPlan::Progressive(stream) => {
                log.log(format!("Downloading video in {}...", quality));
                let target = dir.join(output_file_name(&meta.title, &stream.ext));
                log.progress(0.0);
                let file = self.extractor.download_stream(source, stream, &target, log).await?;
                log.log(format!("Video downloaded to {}", file.display()));
                file
            }
            DownloadPlan::Split { video, audio } => {
                log.log(format!("Downloading video in {}...", quality));
                log.progress(0.0);
                let video_file = self
                    .extractor
                    .download_stream(source, video, &dir.join(VIDEO_TEMP_NAME), log)
                    .await?;
                log.log(format!("Video downloaded to {}", video_file.display()));

                log.log("Downloading audio...");
                log.progress(0.0);
                let audio_file = self
                    .extractor
                    .download_stream(source, audio, &dir.join(AUDIO_TEMP_NAME), log)
                    .await?;
                log.log(format!("Audio downloaded to {}", audio_file.display()));

                let output = dir.join(merged_file_name(&meta.title));
                log.log(format!("Merging video and audio to {}...", output.display()));
                self.transcoder.merge(&video_file, &audio_file, &output).await?;

                tokio::fs::remove_file(&video_file).await?;
                tokio::fs::remove_file(&audio_file).await?;
                output
            }
        };

        log.log(format!(
            "Video \"{}\" has been successfully downloaded in {} quality.",
            meta.title, quality
        ));
        Ok(path)
    }
}

#[async_trait]
impl JobRunner for Downloader {
    async fn run(&self, request: DownloadRequest, log: LogSink) -> JobOutcome {
        self.download(&request, &log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::fakes::FakeExtractor;
    use crate::events::{drain, log_lines};
    use crate::model::StreamKind;
    use crate::transcoder::fakes::{CountingInstaller, FakeTranscoder};

    fn stream(id: &str, kind: StreamKind, res: Option<&str>, abr: Option<f64>) -> Stream {
        Stream {
            format_id: id.to_string(),
            kind,
            resolution: res.map(str::to_string),
            audio_bitrate: abr,
            ext: "mp4".to_string(),
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    struct Harness {
        extractor: Arc<FakeExtractor>,
        transcoder: Arc<FakeTranscoder>,
        installer: Arc<CountingInstaller>,
        downloader: Downloader,
    }

    fn harness(extractor: FakeExtractor, transcoder: FakeTranscoder) -> Harness {
        let extractor = Arc::new(extractor);
        let transcoder = Arc::new(transcoder);
        let installer = Arc::new(CountingInstaller::default());
        let downloader = Downloader::new(extractor.clone(), transcoder.clone(), installer.clone());
        Harness { extractor, transcoder, installer, downloader }
    }

    fn clip(streams: Vec<Stream>) -> VideoMetadata {
        VideoMetadata { title: "My Clip".to_string(), streams }
    }

    #[tokio::test]
    async fn progressive_stream_is_downloaded_directly() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            FakeExtractor::new(clip(vec![
                stream("22", StreamKind::Progressive, Some("720p"), Some(128.0)),
                stream("137", StreamKind::VideoOnly, Some("1080p"), None),
            ])),
            FakeTranscoder::default(),
        );
        let (log, mut rx) = LogSink::channel();
        let request = DownloadRequest::new("https://valid/video", dir.path().to_string_lossy(), "720p");

        let outcome = h.downloader.download(&request, &log).await;

        let expected = dir.path().join("My Clip.mp4");
        assert_eq!(outcome, JobOutcome::Completed(expected.clone()));
        assert!(expected.exists());
        assert_eq!(files_in(dir.path()), vec!["My Clip.mp4"]);
        assert_eq!(h.transcoder.merge_count(), 0);

        let lines = log_lines(&drain(&mut rx));
        assert_eq!(lines.first().map(String::as_str), Some("Downloading video in 720p..."));
        let last = lines.last().unwrap();
        assert!(last.contains("720p") && last.contains("My Clip") && last.contains("successfully"));
    }

    #[tokio::test]
    async fn split_streams_are_merged_and_temp_files_removed() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            FakeExtractor::new(clip(vec![
                stream("136", StreamKind::VideoOnly, Some("720p"), None),
                stream("139", StreamKind::AudioOnly, None, Some(48.0)),
                stream("251", StreamKind::AudioOnly, None, Some(160.0)),
            ])),
            FakeTranscoder::default(),
        );
        let (log, mut rx) = LogSink::channel();
        let request = DownloadRequest::new("https://valid/video", dir.path().to_string_lossy(), "720p");

        let outcome = h.downloader.download(&request, &log).await;

        assert_eq!(outcome, JobOutcome::Completed(dir.path().join("My Clip.mp4")));
        let downloaded = h.extractor.downloaded();
        assert_eq!(
            downloaded,
            vec![
                ("136".to_string(), dir.path().join(VIDEO_TEMP_NAME)),
                ("251".to_string(), dir.path().join(AUDIO_TEMP_NAME)),
            ]
        );
        assert_eq!(h.transcoder.merge_count(), 1);
        assert_eq!(files_in(dir.path()), vec!["My Clip.mp4"]);

        let lines = log_lines(&drain(&mut rx));
        assert!(lines.iter().any(|l| l == "Downloading audio..."));
        assert!(lines.iter().any(|l| l.starts_with("Merging video and audio to")));
        assert!(lines.last().unwrap().contains("successfully"));
    }

    #[tokio::test]
    async fn missing_transcoder_abandons_request() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            FakeExtractor::new(clip(vec![stream("22", StreamKind::Progressive, Some("720p"), None)])),
            FakeTranscoder { missing: true, ..Default::default() },
        );
        let (log, _rx) = LogSink::channel();
        let request = DownloadRequest::new("https://valid/video", dir.path().to_string_lossy(), "720p");

        let outcome = h.downloader.download(&request, &log).await;

        assert_eq!(outcome, JobOutcome::Abandoned);
        assert_eq!(h.installer.count(), 1);
        assert_eq!(h.extractor.lookup_count(), 0);
        assert!(h.extractor.downloaded().is_empty());
        assert_eq!(h.transcoder.merge_count(), 0);
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn merge_failure_is_reported_as_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            FakeExtractor::new(clip(vec![
                stream("136", StreamKind::VideoOnly, Some("720p"), None),
                stream("251", StreamKind::AudioOnly, None, Some(160.0)),
            ])),
            FakeTranscoder { fail_merge: true, ..Default::default() },
        );
        let (log, mut rx) = LogSink::channel();
        let request = DownloadRequest::new("https://valid/video", dir.path().to_string_lossy(), "720p");

        assert_eq!(h.downloader.download(&request, &log).await, JobOutcome::Failed);

        let last = log_lines(&drain(&mut rx)).pop().unwrap();
        assert!(last.starts_with("An error occurred during ffmpeg processing"));
        assert!(last.contains("Invalid data found"));
    }

    #[tokio::test]
    async fn missing_video_stream_fails_with_message() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            FakeExtractor::new(clip(vec![stream("251", StreamKind::AudioOnly, None, Some(160.0))])),
            FakeTranscoder::default(),
        );
        let (log, mut rx) = LogSink::channel();
        let request = DownloadRequest::new("https://valid/video", dir.path().to_string_lossy(), "1080p");

        assert_eq!(h.downloader.download(&request, &log).await, JobOutcome::Failed);
        let last = log_lines(&drain(&mut rx)).pop().unwrap();
        assert_eq!(last, "An error occurred: No video stream available in 1080p");
        assert!(h.extractor.downloaded().is_empty());
    }

    #[tokio::test]
    async fn extractor_error_is_logged_not_raised() {
        let h = harness(FakeExtractor::failing("Video unavailable"), FakeTranscoder::default());
        let (log, mut rx) = LogSink::channel();
        let request = DownloadRequest::new("https://valid/private", "/tmp/out", "720p");

        assert_eq!(h.downloader.download(&request, &log).await, JobOutcome::Failed);
        let last = log_lines(&drain(&mut rx)).pop().unwrap();
        assert!(last.starts_with("An error occurred:") && last.contains("Video unavailable"));
    }

    #[test]
    fn titles_become_safe_file_names() {
        assert_eq!(output_file_name("a/b: c", "mp4"), "ab c.mp4");
        assert_eq!(output_file_name("   ", "webm"), "download.webm");
    }

    #[test]
    fn merged_name_never_matches_a_temp_file() {
        assert_eq!(merged_file_name("My Clip"), "My Clip.mp4");
        assert_eq!(merged_file_name("video"), "video (1).mp4");
        assert_eq!(merged_file_name("Audio"), "Audio (1).mp4");
        assert_eq!(merged_file_name(""), "download.mp4");
    }

    #[tokio::test]
    async fn merged_output_survives_temp_cleanup_for_any_title() {
        for (title, expected) in [
            ("   ", "download.mp4"),
            ("video", "video (1).mp4"),
            ("audio", "audio (1).mp4"),
        ] {
            let dir = tempfile::tempdir().unwrap();
            let h = harness(
                FakeExtractor::new(VideoMetadata {
                    title: title.to_string(),
                    streams: vec![
                        stream("136", StreamKind::VideoOnly, Some("720p"), None),
                        stream("251", StreamKind::AudioOnly, None, Some(160.0)),
                    ],
                }),
                FakeTranscoder::default(),
            );
            let (log, _rx) = LogSink::channel();
            let request = DownloadRequest::new("https://valid/video", dir.path().to_string_lossy(), "720p");

            let outcome = h.downloader.download(&request, &log).await;

            let output = dir.path().join(expected);
            assert_eq!(outcome, JobOutcome::Completed(output.clone()), "title {:?}", title);
            assert!(output.exists(), "title {:?}", title);
            assert_eq!(files_in(dir.path()), vec![expected], "title {:?}", title);
        }
    }

    #[tokio::test]
    async fn missing_audio_stream_fails_with_message() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            FakeExtractor::new(clip(vec![stream("136", StreamKind::VideoOnly, Some("720p"), None)])),
            FakeTranscoder::default(),
        );
        let (log, mut rx) = LogSink::channel();
        let request = DownloadRequest::new("https://valid/video", dir.path().to_string_lossy(), "720p");

        assert_eq!(h.downloader.download(&request, &log).await, JobOutcome::Failed);
        let last = log_lines(&drain(&mut rx)).pop().unwrap();
        assert_eq!(last, "An error occurred: No audio stream available");
        assert!(h.extractor.downloaded().is_empty());
        assert_eq!(h.transcoder.merge_count(), 0);
        assert!(files_in(dir.path()).is_empty());
    }

    #[test]
    fn plan_prefers_progressive_at_exact_resolution() {
        let meta = clip(vec![
            stream("18", StreamKind::Progressive, Some("360p"), None),
            stream("136", StreamKind::VideoOnly, Some("720p"), None),
            stream("251", StreamKind::AudioOnly, None, Some(160.0)),
        ]);
        assert!(matches!(plan(&meta, "360p"), Ok(DownloadPlan::Progressive(s)) if s.format_id == "18"));
        assert!(matches!(
            plan(&meta, "720p"),
            Ok(DownloadPlan::Split { video, audio }) if video.format_id == "136" && audio.format_id == "251"
        ));
    }
}
