use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::DownloadError;

/// External muxer used on the split path.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Runs the version query; `true` on a zero exit code.
    async fn is_available(&self) -> bool;

    /// Copies the video track, re-encodes audio to AAC, writes `output`.
    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError>;
}

/// Launches a transcoder install without waiting for it.
pub trait Installer: Send + Sync {
    fn launch_install(&self);
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    binary: PathBuf,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Ffmpeg {
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self {
            binary: binary.unwrap_or_else(|| PathBuf::from("ffmpeg")),
        }
    }
}

/// Argument list for the merge call, in ffmpeg's expected order.
pub fn merge_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_owned(),
        "-i".to_owned(),
        video.to_string_lossy().into_owned(),
        "-i".to_owned(),
        audio.to_string_lossy().into_owned(),
        "-c:v".to_owned(),
        "copy".to_owned(),
        "-c:a".to_owned(),
        "aac".to_owned(),
        output.to_string_lossy().into_owned(),
    ]
}

#[async_trait]
impl Transcoder for Ffmpeg {
    async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
        let result = Command::new(&self.binary)
            .args(merge_args(video, audio, output))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| DownloadError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(DownloadError::Transcoder {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Opens a terminal running the platform package manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellInstaller;

impl ShellInstaller {
    fn command() -> std::process::Command {
        #[cfg(target_os = "windows")]
        {
            let mut cmd = std::process::Command::new("powershell");
            cmd.args([
                "-Command",
                "Start-Process powershell -ArgumentList '-NoExit -Command \"winget install \\\"FFmpeg (Essentials Build)\\\"\"'",
            ]);
            cmd
        }
        #[cfg(target_os = "macos")]
        {
            let mut cmd = std::process::Command::new("osascript");
            cmd.args(["-e", "tell application \"Terminal\" to do script \"brew install ffmpeg\""]);
            cmd
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            let mut cmd = std::process::Command::new("x-terminal-emulator");
            cmd.args(["-e", "sh", "-c", "sudo apt-get install -y ffmpeg"]);
            cmd
        }
    }
}

impl Installer for ShellInstaller {
    fn launch_install(&self) {
        // The child is detached; dropping the handle does not kill it.
        match Self::command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => tracing::info!("ffmpeg installer launched (pid {})", child.id()),
            Err(e) => tracing::warn!("could not launch ffmpeg installer: {}", e),
        }
    }
}
