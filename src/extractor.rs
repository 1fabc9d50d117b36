//! Stream metadata and stream downloads through yt-dlp.
//!
//! A platform binary placed in `assets/` is bundled into the executable and
//! unpacked to the temp directory on first use; otherwise `yt-dlp` is taken
//! from `PATH`.

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use rust_embed::RustEmbed;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
};

use crate::error::DownloadError;
use crate::events::LogSink;
use crate::model::{Stream, StreamKind, VideoMetadata};
use crate::progress::{parse_progress_from_line, progress_template};

#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

/// Source of stream listings and stream bytes.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Resolves title and available streams for a URL.
    async fn fetch_metadata(&self, source: &str) -> Result<VideoMetadata, DownloadError>;

    /// Writes one stream to `target`, reporting byte progress to `log`.
    async fn download_stream(
        &self,
        source: &str,
        stream: &Stream,
        target: &Path,
        log: &LogSink,
    ) -> Result<PathBuf, DownloadError>;
}

/// yt-dlp backed extractor
#[derive(Debug, Clone, Default)]
pub struct YtDlp {
    /// Explicit binary from settings; bundled or `PATH` lookup otherwise
    binary: Option<PathBuf>,
}

static BUNDLED_BINARY: OnceCell<PathBuf> = OnceCell::new();

fn binary_name() -> &'static str {
    if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" }
}

/// Unpacks the bundled binary once, or falls back to the bare name.
fn bundled_binary() -> Result<PathBuf, DownloadError> {
    BUNDLED_BINARY
        .get_or_try_init(|| {
            let bin = binary_name();
            let Some(data) = Asset::get(bin) else {
                tracing::debug!("no bundled {}, using PATH", bin);
                return Ok(PathBuf::from(bin));
            };
            let tmp = std::env::temp_dir().join(bin);
            if !tmp.exists() {
                let mut f = File::create(&tmp)?;
                f.write_all(&data.data)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))?;
                }
                tracing::info!("unpacked bundled yt-dlp to {}", tmp.display());
            }
            Ok(tmp)
        })
        .cloned()
}

impl YtDlp {
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self { binary }
    }

    fn binary(&self) -> Result<PathBuf, DownloadError> {
        match &self.binary {
            Some(path) => Ok(path.clone()),
            None => bundled_binary(),
        }
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn fetch_metadata(&self, source: &str) -> Result<VideoMetadata, DownloadError> {
        let bin = self.binary()?;
        let output = Command::new(&bin)
            .args(["--dump-json", "--no-playlist", "--no-warnings", source])
            .kill_on_drop(true)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DownloadError::Extractor(format!("cannot run {}: {}", bin.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::Extractor(stderr.trim().to_string()));
        }
        parse_metadata(&output.stdout)
    }

    async fn download_stream(
        &self,
        source: &str,
        stream: &Stream,
        target: &Path,
        log: &LogSink,
    ) -> Result<PathBuf, DownloadError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bin = self.binary()?;
        let args = vec![
            "-f".to_owned(),
            stream.format_id.clone(),
            "--no-playlist".to_owned(),
            "--force-overwrites".to_owned(),
            "--no-part".to_owned(),
            "--newline".to_owned(),
            "--progress-template".to_owned(),
            progress_template(),
            "-o".to_owned(),
            target.to_string_lossy().into_owned(),
            source.to_owned(),
        ];

        let mut child = Command::new(&bin)
            .args(&args)
            .kill_on_drop(true)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DownloadError::Extractor(format!("cannot run {}: {}", bin.display(), e)))?;

        // Drain stderr alongside stdout so a chatty child never blocks on a full pipe.
        let stderr_task = child.stderr.take().map(|mut err| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = err.read_to_string(&mut buf).await;
                buf
            })
        });

        // File names echoed by yt-dlp follow the console code page, so stdout
        // is not guaranteed UTF-8. Read raw lines and keep going until EOF.
        if let Some(out) = child.stdout.take() {
            let mut lines = BufReader::new(out).split(b'\n');
            loop {
                match lines.next_segment().await {
                    Ok(Some(raw)) => {
                        let line = String::from_utf8_lossy(&raw);
                        tracing::trace!("yt-dlp> {}", line.trim_end());
                        if let Some(pct) = parse_progress_from_line(&line) {
                            log.progress(pct);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("stopped reading yt-dlp output: {}", e);
                        break;
                    }
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if !status.success() {
            return Err(DownloadError::Extractor(stderr.trim().to_string()));
        }
        Ok(target.to_path_buf())
    }
}

#[derive(Deserialize)]
struct RawInfo {
    title: String,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Deserialize)]
struct RawFormat {
    format_id: String,
    #[serde(default)]
    ext: String,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    abr: Option<f64>,
}

fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref().is_some_and(|c| c != "none")
}

/// Maps `yt-dlp --dump-json` output to our metadata model.
///
/// Formats without any codec (storyboards, manifests with unknown codecs)
/// are skipped.
pub fn parse_metadata(json: &[u8]) -> Result<VideoMetadata, DownloadError> {
    let raw: RawInfo = serde_json::from_slice(json)?;
    let streams = raw
        .formats
        .into_iter()
        .filter_map(|f| {
            let kind = match (has_codec(&f.vcodec), has_codec(&f.acodec)) {
                (true, true) => StreamKind::Progressive,
                (true, false) => StreamKind::VideoOnly,
                (false, true) => StreamKind::AudioOnly,
                (false, false) => return None,
            };
            let resolution = match kind {
                StreamKind::AudioOnly => None,
                _ => f.height.map(|h| format!("{}p", h)),
            };
            Some(Stream {
                format_id: f.format_id,
                kind,
                resolution,
                audio_bitrate: f.abr,
                ext: f.ext,
            })
        })
        .collect();

    Ok(VideoMetadata { title: raw.title, streams })
}

#[cfg(test)]
pub mod fakes {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::DownloadError;
    use crate::events::LogSink;
    use super::Extractor;
    use crate::model::{Stream, VideoMetadata};

    /// Extractor serving canned metadata and writing small placeholder files.
    pub struct FakeExtractor {
        meta: Result<VideoMetadata, String>,
        pub lookups: AtomicUsize,
        pub downloads: Mutex<Vec<(String, PathBuf)>>,
    }

    impl FakeExtractor {
        pub fn new(meta: VideoMetadata) -> Self {
            Self {
                meta: Ok(meta),
                lookups: AtomicUsize::new(0),
                downloads: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                meta: Err(message.to_string()),
                lookups: AtomicUsize::new(0),
                downloads: Mutex::new(Vec::new()),
            }
        }

        pub fn lookup_count(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }

        pub fn downloaded(&self) -> Vec<(String, PathBuf)> {
            self.downloads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn fetch_metadata(&self, _source: &str) -> Result<VideoMetadata, DownloadError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.meta.clone().map_err(DownloadError::Extractor)
        }

        async fn download_stream(
            &self,
            _source: &str,
            stream: &Stream,
            target: &Path,
            log: &LogSink,
        ) -> Result<PathBuf, DownloadError> {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(target, stream.format_id.as_bytes())?;
            log.progress(1.0);
            self.downloads
                .lock()
                .unwrap()
                .push((stream.format_id.clone(), target.to_path_buf()));
            Ok(target.to_path_buf())
        }
    }
}
