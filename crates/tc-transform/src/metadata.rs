//! Media metadata via the transcoder's probe companion (`ffprobe`).
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and keeps only what the transform pipeline needs: stream kinds, video
//! dimensions and container duration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tc_toolchain::ToolCommand;

use crate::geometry::Dimensions;

const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// A metadata prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    ffprobe_path: PathBuf,
}

impl MediaProbe {
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    /// Probe `path`.
    ///
    /// # Errors
    ///
    /// [`tc_core::Error::MetadataUnavailable`] if ffprobe fails or its
    /// output cannot be parsed.
    pub async fn probe(&self, path: &Path) -> tc_core::Result<MediaMetadata> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());
        cmd.timeout(PROBE_TIMEOUT);

        let output = cmd.execute().await.map_err(|e| {
            tc_core::Error::MetadataUnavailable(format!("{}: {e}", path.display()))
        })?;

        MediaMetadata::from_json(&output.stdout)
            .map_err(|e| tc_core::Error::MetadataUnavailable(format!("{}: {e}", path.display())))
    }
}

// ---------------------------------------------------------------------------
// Parsed metadata
// ---------------------------------------------------------------------------

/// Kind of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub kind: StreamKind,
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// What the transform pipeline knows about a media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaMetadata {
    /// Container duration in seconds.
    pub duration: Option<f64>,
    pub streams: Vec<StreamInfo>,
}

impl MediaMetadata {
    /// Parse ffprobe's JSON output.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: FfprobeOutput = serde_json::from_str(json)?;

        let duration = raw
            .format
            .and_then(|f| f.duration)
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0);

        let streams = raw
            .streams
            .into_iter()
            .map(|s| StreamInfo {
                kind: match s.codec_type.as_deref() {
                    Some("video") => StreamKind::Video,
                    Some("audio") => StreamKind::Audio,
                    Some("subtitle") => StreamKind::Subtitle,
                    _ => StreamKind::Other,
                },
                codec: s.codec_name,
                width: s.width,
                height: s.height,
            })
            .collect();

        Ok(Self { duration, streams })
    }

    pub fn has_video(&self) -> bool {
        self.streams.iter().any(|s| s.kind == StreamKind::Video)
    }

    /// Dimensions of the first video stream.
    ///
    /// # Errors
    ///
    /// [`tc_core::Error::MetadataUnavailable`] when there is no video stream
    /// or it reports a zero/absent dimension.
    pub fn video_dimensions(&self) -> tc_core::Result<Dimensions> {
        let video = self
            .streams
            .iter()
            .find(|s| s.kind == StreamKind::Video)
            .ok_or_else(|| tc_core::Error::MetadataUnavailable("no video stream".into()))?;

        match (video.width, video.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Ok(Dimensions::new(w, h)),
            (w, h) => Err(tc_core::Error::MetadataUnavailable(format!(
                "video stream has unusable dimensions {}x{}",
                w.unwrap_or(0),
                h.unwrap_or(0)
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANDSCAPE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264",
             "width": 1920, "height": 1080},
            {"index": 1, "codec_type": "audio", "codec_name": "aac", "channels": 2}
        ],
        "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "61.500000"}
    }"#;

    #[test]
    fn parses_streams_and_duration() {
        let meta = MediaMetadata::from_json(LANDSCAPE).unwrap();
        assert_eq!(meta.duration, Some(61.5));
        assert_eq!(meta.streams.len(), 2);
        assert!(meta.has_video());
        assert_eq!(meta.video_dimensions().unwrap(), Dimensions::new(1920, 1080));
        assert_eq!(meta.streams[1].codec.as_deref(), Some("aac"));
    }

    #[test]
    fn no_streams_is_metadata_unavailable() {
        let meta = MediaMetadata::from_json(r#"{"streams": [], "format": {}}"#).unwrap();
        assert!(!meta.has_video());
        assert!(meta.duration.is_none());
        let err = meta.video_dimensions().unwrap_err();
        assert!(matches!(err, tc_core::Error::MetadataUnavailable(_)));
    }

    #[test]
    fn audio_only_has_no_dimensions() {
        let meta = MediaMetadata::from_json(
            r#"{"streams": [{"codec_type": "audio", "codec_name": "mp3"}]}"#,
        )
        .unwrap();
        assert!(meta.video_dimensions().is_err());
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let meta = MediaMetadata::from_json(
            r#"{"streams": [{"codec_type": "video", "width": 0, "height": 1080}]}"#,
        )
        .unwrap();
        let err = meta.video_dimensions().unwrap_err();
        assert!(err.to_string().contains("0x1080"));
    }

    #[test]
    fn malformed_json_is_error() {
        assert!(MediaMetadata::from_json("not json").is_err());
        assert!(MediaMetadata::from_json("").is_err());
    }

    #[test]
    fn unparseable_duration_is_none() {
        let meta = MediaMetadata::from_json(r#"{"format": {"duration": "N/A"}}"#).unwrap();
        assert!(meta.duration.is_none());
    }

    #[tokio::test]
    async fn missing_ffprobe_is_metadata_unavailable() {
        let probe = MediaProbe::new(PathBuf::from("/nonexistent/ffprobe-xyz"));
        let err = probe.probe(Path::new("whatever.mp4")).await.unwrap_err();
        assert!(matches!(err, tc_core::Error::MetadataUnavailable(_)));
    }
}
