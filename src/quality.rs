use crate::extractor::Extractor;
use crate::model::{StreamKind, VideoMetadata};

/// Numeric part of a label like "1080p" or "720p60".
pub fn resolution_value(label: &str) -> Option<u32> {
    let digits: String = label.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Resolutions offered as progressive or video-only streams, highest first,
/// without duplicates. Labels keep their first-seen order on ties.
pub fn available_qualities(meta: &VideoMetadata) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    let candidates = meta
        .streams
        .iter()
        .filter(|s| matches!(s.kind, StreamKind::Progressive | StreamKind::VideoOnly))
        .filter_map(|s| s.resolution.as_deref());

    for label in candidates {
        if resolution_value(label).is_some() && !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }

    // sort_by is stable
    labels.sort_by(|a, b| resolution_value(b).cmp(&resolution_value(a)));
    labels
}

/// Qualities for a URL; any lookup failure yields an empty list.
pub async fn resolve_qualities(extractor: &dyn Extractor, source: &str) -> Vec<String> {
    match extractor.fetch_metadata(source).await {
        Ok(meta) => available_qualities(&meta),
        Err(e) => {
            tracing::debug!("no qualities for {}: {}", source, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::fakes::FakeExtractor;
    use crate::model::Stream;

    fn video(kind: StreamKind, res: &str) -> Stream {
        Stream {
            format_id: format!("{:?}-{}", kind, res),
            kind,
            resolution: Some(res.to_string()),
            audio_bitrate: None,
            ext: "mp4".to_string(),
        }
    }

    fn meta(streams: Vec<Stream>) -> VideoMetadata {
        VideoMetadata { title: "t".to_string(), streams }
    }

    #[test]
    fn union_is_sorted_descending_without_duplicates() {
        let m = meta(vec![
            video(StreamKind::Progressive, "360p"),
            video(StreamKind::VideoOnly, "1080p"),
            video(StreamKind::VideoOnly, "144p"),
            video(StreamKind::Progressive, "720p"),
            video(StreamKind::VideoOnly, "720p"),
            video(StreamKind::VideoOnly, "360p"),
            video(StreamKind::VideoOnly, "2160p"),
        ]);
        let q = available_qualities(&m);
        assert_eq!(q, vec!["2160p", "1080p", "720p", "360p", "144p"]);

        let values: Vec<u32> = q.iter().filter_map(|l| resolution_value(l)).collect();
        assert!(values.windows(2).all(|w| w[0] > w[1]));
        for label in &q {
            assert!(m.streams.iter().any(|s| s.has_resolution(label)));
        }
    }

    #[test]
    fn audio_only_streams_do_not_contribute() {
        let mut audio = video(StreamKind::AudioOnly, "999p");
        audio.resolution = None;
        let m = meta(vec![audio, video(StreamKind::VideoOnly, "480p")]);
        assert_eq!(available_qualities(&m), vec!["480p"]);
    }

    #[test]
    fn resolution_value_reads_leading_digits() {
        assert_eq!(resolution_value("1080p"), Some(1080));
        assert_eq!(resolution_value("720p60"), Some(720));
        assert_eq!(resolution_value("audio"), None);
    }

    #[tokio::test]
    async fn failed_lookup_yields_empty_list() {
        let extractor = FakeExtractor::failing("ERROR: [generic] 'not a url' is not a valid URL");
        assert!(resolve_qualities(&extractor, "not a url").await.is_empty());
    }

    #[tokio::test]
    async fn resolves_through_extractor() {
        let extractor = FakeExtractor::new(meta(vec![
            video(StreamKind::Progressive, "360p"),
            video(StreamKind::VideoOnly, "1080p"),
        ]));
        assert_eq!(
            resolve_qualities(&extractor, "https://valid/video").await,
            vec!["1080p", "360p"]
        );
    }
}
