use crate::events::LogSink;
use crate::transcoder::{Installer, Transcoder};

/// Checks that the transcoder runs. When it does not, launches the installer
/// without waiting for it and tells the user to restart afterwards.
pub async fn ensure_transcoder_available(
    transcoder: &dyn Transcoder,
    installer: &dyn Installer,
    log: &LogSink,
) -> bool {
    if transcoder.is_available().await {
        return true;
    }

    tracing::warn!("ffmpeg not available, launching installer");
    log.log("FFmpeg not found. Installing...");
    installer.launch_install();
    log.log("FFmpeg is being installed. Please restart the computer after installation is completed.");
    false
}
