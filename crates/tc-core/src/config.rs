//! Application configuration types.
//!
//! The top-level [`Config`] deserializes from JSON. Every section defaults
//! sensibly so an empty `{}` document is valid. Environment overrides
//! (`TRENDCLIP_BASE`, `FFMPEG_BIN`) are applied on top of whatever the file
//! said.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::tool::{default_tools, Platform, ToolSpec, VerificationPolicy};
use crate::Error;

/// Environment variable overriding the base install directory.
pub const ENV_BASE_DIR: &str = "TRENDCLIP_BASE";

/// Environment variable overriding the transcoder executable.
pub const ENV_TRANSCODER: &str = "FFMPEG_BIN";

const DEFAULT_BASE_DIR: &str = "~/TrendClipOne";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub toolchain: ToolchainConfig,
    pub transform: TransformConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::InvalidInput(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Apply `TRENDCLIP_BASE` / `FFMPEG_BIN` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment, in
    /// production). Empty values are ignored.
    pub fn apply_overrides_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(base) = get(ENV_BASE_DIR) {
            tracing::debug!("{ENV_BASE_DIR} overrides base directory: {base}");
            self.toolchain.base_dir = expand_path(&base);
        }
        if let Some(bin) = get(ENV_TRANSCODER) {
            tracing::debug!("{ENV_TRANSCODER} overrides transcoder path: {bin}");
            self.toolchain.transcoder_path = Some(expand_path(&bin));
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.toolchain.verification == VerificationPolicy::Skip {
            warnings.push(
                "toolchain.verification is 'skip'; downloaded artifacts will not be checked".into(),
            );
        }
        if self.toolchain.probe_timeout.is_zero() {
            warnings.push("toolchain.probe_timeout is 0; every probe will time out".into());
        }
        if self.toolchain.download_timeout.is_zero() {
            warnings.push("toolchain.download_timeout is 0; every download will time out".into());
        }
        if let Some(ref p) = self.toolchain.transcoder_path {
            if !p.exists() {
                warnings.push(format!(
                    "toolchain.transcoder_path {} does not exist",
                    p.display()
                ));
            }
        }
        for spec in &self.toolchain.extra_tools {
            if let Err(e) = spec.validate() {
                warnings.push(format!("toolchain.extra_tools: {e}"));
            }
        }

        if !is_aspect_like(&self.transform.target_aspect) {
            warnings.push(format!(
                "transform.target_aspect '{}' is not of the form W:H",
                self.transform.target_aspect
            ));
        }
        if self.transform.duration_secs == 0 {
            warnings.push("transform.duration_secs is 0; outputs will be empty".into());
        }
        if self.transform.crf > 51 {
            warnings.push(format!(
                "transform.crf {} is outside the x264 range 0-51",
                self.transform.crf
            ));
        }
        if self.transform.long_edge < 2 {
            warnings.push("transform.long_edge must be at least 2 pixels".into());
        }

        warnings
    }
}

fn is_aspect_like(s: &str) -> bool {
    s.split_once(':').is_some_and(|(w, h)| {
        matches!(
            (w.trim().parse::<u32>(), h.trim().parse::<u32>()),
            (Ok(w), Ok(h)) if w > 0 && h > 0
        )
    })
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Managed toolchain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Base install directory; managed tools live in `<base>/tools`.
    pub base_dir: PathBuf,
    /// Transcoder override (takes precedence over the managed copy).
    pub transcoder_path: Option<PathBuf>,
    pub verification: VerificationPolicy,
    #[serde(with = "duration_secs")]
    pub probe_timeout: Duration,
    /// Total time allowed for one artifact download.
    #[serde(with = "duration_secs")]
    pub download_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Tools managed in addition to the built-in transcoder and downloader.
    pub extra_tools: Vec<ToolSpec>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            base_dir: expand_path(DEFAULT_BASE_DIR),
            transcoder_path: None,
            verification: VerificationPolicy::Enforce,
            probe_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(30),
            extra_tools: Vec::new(),
        }
    }
}

impl ToolchainConfig {
    /// The managed tools directory.
    pub fn tools_dir(&self) -> PathBuf {
        self.base_dir.join("tools")
    }

    /// Built-in tool specs for `platform` followed by any configured extras.
    pub fn tool_specs(&self, platform: Option<Platform>) -> Vec<ToolSpec> {
        let mut specs = default_tools(platform, self.transcoder_path.clone());
        specs.extend(self.extra_tools.iter().cloned());
        specs
    }
}

/// Target loudness for the `loudnorm` filter (EBU R128).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessTarget {
    /// Integrated loudness, LUFS.
    pub integrated: f32,
    /// Maximum true peak, dBTP.
    pub true_peak: f32,
    /// Loudness range, LU.
    pub range: f32,
}

impl Default for LoudnessTarget {
    fn default() -> Self {
        Self {
            integrated: -16.0,
            true_peak: -1.5,
            range: 11.0,
        }
    }
}

/// Vertical transform and encode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub target_aspect: String,
    pub duration_secs: u32,
    /// Output size along the longer axis; the other axis follows the aspect.
    pub long_edge: u32,
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
    pub pixel_format: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub loudness: LoudnessTarget,
    /// Outputs smaller than this are rejected as truncated.
    pub min_output_bytes: u64,
    /// Upper bound on one transcoder invocation.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            target_aspect: "9:16".into(),
            duration_secs: 60,
            long_edge: 1920,
            video_codec: "libx264".into(),
            preset: "veryfast".into(),
            crf: 23,
            pixel_format: "yuv420p".into(),
            audio_codec: "aac".into(),
            audio_bitrate: "128k".into(),
            sample_rate: 48_000,
            channels: 2,
            loudness: LoudnessTarget::default(),
            min_output_bytes: 1024,
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Serde helpers to (de)serialize `Duration` as whole seconds.
mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_json_is_default() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.transform.target_aspect, "9:16");
        assert_eq!(cfg.transform.duration_secs, 60);
        assert_eq!(cfg.toolchain.probe_timeout, Duration::from_secs(10));
        assert_eq!(cfg.toolchain.verification, VerificationPolicy::Enforce);
        assert!(cfg.toolchain.base_dir.ends_with("TrendClipOne"));
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let cfg = Config::from_json(
            r#"{"transform": {"crf": 28, "timeout": 90}, "toolchain": {"verification": "skip"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.transform.crf, 28);
        assert_eq!(cfg.transform.timeout, Duration::from_secs(90));
        assert_eq!(cfg.transform.preset, "veryfast");
        assert_eq!(cfg.toolchain.verification, VerificationPolicy::Skip);
    }

    #[test]
    fn invalid_json_is_rejected() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(Some(&dir.path().join("absent.json")));
        assert_eq!(cfg.transform.long_edge, 1920);
    }

    #[test]
    fn load_or_default_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trendclip.json");
        std::fs::write(&path, r#"{"transform": {"duration_secs": 15}}"#).unwrap();
        let cfg = Config::load_or_default(Some(&path));
        assert_eq!(cfg.transform.duration_secs, 15);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            (ENV_BASE_DIR, "/srv/trendclip"),
            (ENV_TRANSCODER, "/opt/ffmpeg/bin/ffmpeg"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_overrides_with(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.toolchain.base_dir, PathBuf::from("/srv/trendclip"));
        assert_eq!(cfg.toolchain.tools_dir(), PathBuf::from("/srv/trendclip/tools"));
        assert_eq!(
            cfg.toolchain.transcoder_path,
            Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"))
        );
        let specs = cfg.toolchain.tool_specs(Some(Platform::LinuxX64));
        assert_eq!(
            specs[0].path_override,
            Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"))
        );
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut cfg = Config::default();
        let before = cfg.toolchain.base_dir.clone();
        cfg.apply_overrides_with(|_| Some("  ".to_string()));
        assert_eq!(cfg.toolchain.base_dir, before);
        assert!(cfg.toolchain.transcoder_path.is_none());
    }

    #[test]
    fn validate_flags_bad_values() {
        let mut cfg = Config::default();
        cfg.transform.target_aspect = "portrait".into();
        cfg.transform.crf = 70;
        cfg.toolchain.verification = VerificationPolicy::Skip;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("target_aspect")));
        assert!(warnings.iter().any(|w| w.contains("crf")));
        assert!(warnings.iter().any(|w| w.contains("verification")));
    }

    #[test]
    fn default_config_has_no_warnings() {
        assert!(Config::default().validate().is_empty());
    }
}
