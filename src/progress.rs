/// Prefix printed by yt-dlp through `--progress-template`
pub const PROGRESS_PREFIX: &str = "downloaded_bytes:";

/// Template passed to yt-dlp so every download progress line is machine readable.
pub fn progress_template() -> String {
    format!("download:{}%(progress._percent_str)s", PROGRESS_PREFIX)
}

/// Parses a line like `downloaded_bytes: 42.5%` into a 0.0-1.0 fraction.
pub fn parse_progress_from_line(line: &str) -> Option<f32> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let number = rest.trim().strip_suffix('%')?;
    let value = number.trim().parse::<f32>().ok()?;
    Some((value / 100.0).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_padded_percentage() {
        assert_eq!(parse_progress_from_line("downloaded_bytes:  42.0%"), Some(0.42));
        assert_eq!(parse_progress_from_line("downloaded_bytes:100.0%"), Some(1.0));
    }

    #[test]
    fn ignores_other_output() {
        assert_eq!(parse_progress_from_line("[youtube] abc: Downloading webpage"), None);
        assert_eq!(parse_progress_from_line("downloaded_bytes:N/A"), None);
        assert_eq!(parse_progress_from_line("downloaded_bytes:12.5"), None);
    }

    #[test]
    fn template_targets_download_lines() {
        assert_eq!(
            progress_template(),
            "download:downloaded_bytes:%(progress._percent_str)s"
        );
    }
}
