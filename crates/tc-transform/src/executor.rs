//! Runs the vertical reframe encode and validates what it produced.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tc_core::config::{LoudnessTarget, TransformConfig};
use tc_toolchain::{ToolCommand, Toolchain};
use tokio_util::sync::CancellationToken;

use crate::geometry::{self, GeometryPlan};
use crate::job::{check_paths, JobState, TransformJob};
use crate::metadata::MediaProbe;
use crate::validate::validate_output;

/// Lines of transcoder stderr kept in a [`tc_core::Error::TransformFailed`].
const STDERR_TAIL_LINES: usize = 20;

// ---------------------------------------------------------------------------
// Tool resolution
// ---------------------------------------------------------------------------

/// Resolved transcoder executables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

/// Something that can hand the executor a working transcoder.
#[async_trait]
pub trait TranscoderLocator: Send + Sync {
    /// # Errors
    ///
    /// [`tc_core::Error::ToolUnavailable`] if either executable cannot be
    /// resolved.
    async fn locate(&self) -> tc_core::Result<TranscoderPaths>;
}

/// A locator returning fixed paths, for callers that resolved the tools
/// themselves.
#[derive(Debug, Clone)]
pub struct FixedLocator(pub TranscoderPaths);

#[async_trait]
impl TranscoderLocator for FixedLocator {
    async fn locate(&self) -> tc_core::Result<TranscoderPaths> {
        Ok(self.0.clone())
    }
}

/// Resolves the managed transcoder without installing it; healing is left
/// to [`Toolchain::ensure`].
#[async_trait]
impl TranscoderLocator for Toolchain {
    async fn locate(&self) -> tc_core::Result<TranscoderPaths> {
        let name = tc_core::TRANSCODER;
        let state = self.check(name).await?;
        let ffmpeg = state
            .path
            .clone()
            .ok_or_else(|| tc_core::Error::tool_unavailable(name, "probe reported no path"))?;

        let probe_exe = self
            .spec(name)
            .and_then(|s| s.executables.get(1).cloned())
            .unwrap_or_else(|| tc_core::TRANSCODER_PROBE.to_string());
        let ffprobe = tc_toolchain::companion(&state, &probe_exe).ok_or_else(|| {
            tc_core::Error::tool_unavailable(
                tc_core::TRANSCODER_PROBE,
                format!("not found next to {} or on PATH", ffmpeg.display()),
            )
        })?;

        Ok(TranscoderPaths { ffmpeg, ffprobe })
    }
}

// ---------------------------------------------------------------------------
// Encode settings
// ---------------------------------------------------------------------------

/// Codec parameters for the vertical encode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
    pub pixel_format: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub loudness: LoudnessTarget,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self::from(&TransformConfig::default())
    }
}

impl From<&TransformConfig> for EncodeSettings {
    fn from(c: &TransformConfig) -> Self {
        Self {
            video_codec: c.video_codec.clone(),
            preset: c.preset.clone(),
            crf: c.crf,
            pixel_format: c.pixel_format.clone(),
            audio_codec: c.audio_codec.clone(),
            audio_bitrate: c.audio_bitrate.clone(),
            sample_rate: c.sample_rate,
            channels: c.channels,
            loudness: c.loudness,
        }
    }
}

impl EncodeSettings {
    /// The `loudnorm` audio filter for the configured target.
    pub fn loudnorm_filter(&self) -> String {
        format!(
            "loudnorm=I={}:TP={}:LRA={}",
            self.loudness.integrated, self.loudness.true_peak, self.loudness.range
        )
    }
}

/// Full ffmpeg argument list for `job` under `plan`.
pub fn transform_args(
    job: &TransformJob,
    plan: &GeometryPlan,
    settings: &EncodeSettings,
) -> Vec<String> {
    let options: [(&str, String); 13] = [
        ("-i", job.input.to_string_lossy().to_string()),
        ("-t", job.duration_secs.to_string()),
        ("-vf", plan.filter_chain()),
        ("-c:v", settings.video_codec.clone()),
        ("-preset", settings.preset.clone()),
        ("-crf", settings.crf.to_string()),
        ("-pix_fmt", settings.pixel_format.clone()),
        ("-c:a", settings.audio_codec.clone()),
        ("-b:a", settings.audio_bitrate.clone()),
        ("-ar", settings.sample_rate.to_string()),
        ("-ac", settings.channels.to_string()),
        ("-af", settings.loudnorm_filter()),
        ("-movflags", "+faststart".to_string()),
    ];

    let mut args = vec!["-y".to_string()];
    for (flag, value) in options {
        args.push(flag.to_string());
        args.push(value);
    }
    args.push(job.output.to_string_lossy().to_string());
    args
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Executes [`TransformJob`]s against a located transcoder.
#[derive(Clone)]
pub struct TransformExecutor {
    locator: Arc<dyn TranscoderLocator>,
    settings: EncodeSettings,
    long_edge: u32,
    min_output_bytes: u64,
    timeout: Duration,
}

impl TransformExecutor {
    pub fn new(locator: Arc<dyn TranscoderLocator>, config: &TransformConfig) -> Self {
        Self {
            locator,
            settings: EncodeSettings::from(config),
            long_edge: config.long_edge,
            min_output_bytes: config.min_output_bytes,
            timeout: config.timeout,
        }
    }

    /// Reframe `job.input` into `job.output`.
    ///
    /// Once the transcoder has started, the output file is removed on any
    /// failure and when this future is dropped before it completes.
    ///
    /// # Errors
    ///
    /// - [`tc_core::Error::InvalidInput`] for a zero duration, a missing
    ///   input, or an output path equal to the input.
    /// - [`tc_core::Error::ToolUnavailable`] if the transcoder cannot be resolved.
    /// - [`tc_core::Error::TransformFailed`] on a non-zero transcoder exit.
    /// - [`tc_core::Error::OutputInvalid`] if the result fails validation.
    /// - [`tc_core::Error::Tool`] / [`tc_core::Error::Cancelled`] on timeout
    ///   or cancellation.
    pub async fn run(
        &self,
        job: &TransformJob,
        cancel: &CancellationToken,
    ) -> tc_core::Result<PathBuf> {
        let mut state = JobState::Pending;
        match self.drive(job, cancel, &mut state).await {
            Ok(path) => Ok(path),
            Err(e) => {
                advance(&mut state, JobState::Failed, job);
                tracing::error!("Transform of {} failed: {e}", job.input.display());
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        job: &TransformJob,
        cancel: &CancellationToken,
        state: &mut JobState,
    ) -> tc_core::Result<PathBuf> {
        job.validate()?;

        let tools = self.locator.locate().await?;
        advance(state, JobState::ToolResolved, job);

        let probe = MediaProbe::new(tools.ffprobe.clone());
        let plan =
            geometry::plan_for_source(&probe, &job.input, job.aspect, self.long_edge).await;
        advance(state, JobState::PlanComputed, job);

        ensure_parent(&job.output).await?;
        let args = transform_args(job, &plan, &self.settings);

        advance(state, JobState::Executing, job);
        let partial = PartialOutput::new(&job.output);
        tracing::info!(
            "Encoding {} -> {} ({}s, {}, {})",
            job.input.display(),
            job.output.display(),
            job.duration_secs,
            job.aspect,
            plan.output
        );
        self.run_transcoder(&tools.ffmpeg, args, cancel).await?;

        validate_output(&probe, &job.output, self.min_output_bytes).await?;
        partial.keep();
        advance(state, JobState::Validated, job);
        tracing::info!("Created vertical video {}", job.output.display());
        Ok(job.output.clone())
    }

    async fn run_transcoder(
        &self,
        ffmpeg: &Path,
        args: Vec<String>,
        cancel: &CancellationToken,
    ) -> tc_core::Result<()> {
        let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
        cmd.args(args);
        cmd.timeout(self.timeout).cancel_on(cancel.clone());

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(tc_core::Error::TransformFailed {
                status: output.status.to_string(),
                stderr: output.stderr_tail(STDERR_TAIL_LINES),
            });
        }
        Ok(())
    }

    /// Grab a single JPEG frame at `at` seconds into `input`.
    pub async fn create_thumbnail(
        &self,
        input: &Path,
        output: &Path,
        at: f64,
        cancel: &CancellationToken,
    ) -> tc_core::Result<PathBuf> {
        check_paths(input, output)?;
        if !at.is_finite() || at < 0.0 {
            return Err(tc_core::Error::InvalidInput(format!(
                "thumbnail time {at} must be a non-negative number of seconds"
            )));
        }
        let tools = self.locator.locate().await?;
        ensure_parent(output).await?;

        let args = vec![
            "-y".to_string(),
            "-ss".into(),
            format!("{at:.3}"),
            "-i".into(),
            input.to_string_lossy().to_string(),
            "-vframes".into(),
            "1".into(),
            "-q:v".into(),
            "2".into(),
            output.to_string_lossy().to_string(),
        ];
        self.run_side_job(&tools.ffmpeg, args, output, cancel).await?;
        tracing::info!("Created thumbnail {}", output.display());
        Ok(output.to_path_buf())
    }

    /// Copy `input`'s audio into `output`, re-encoded with the configured
    /// audio codec and bitrate.
    pub async fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> tc_core::Result<PathBuf> {
        check_paths(input, output)?;
        let tools = self.locator.locate().await?;
        ensure_parent(output).await?;

        let args = vec![
            "-y".to_string(),
            "-i".into(),
            input.to_string_lossy().to_string(),
            "-vn".into(),
            "-c:a".into(),
            self.settings.audio_codec.clone(),
            "-b:a".into(),
            self.settings.audio_bitrate.clone(),
            output.to_string_lossy().to_string(),
        ];
        self.run_side_job(&tools.ffmpeg, args, output, cancel).await?;
        tracing::info!("Extracted audio {}", output.display());
        Ok(output.to_path_buf())
    }

    /// Container duration of `input` in seconds.
    ///
    /// # Errors
    ///
    /// [`tc_core::Error::MetadataUnavailable`] when the duration is unknown.
    pub async fn media_duration(&self, input: &Path) -> tc_core::Result<f64> {
        let tools = self.locator.locate().await?;
        let meta = MediaProbe::new(tools.ffprobe).probe(input).await?;
        meta.duration.ok_or_else(|| {
            tc_core::Error::MetadataUnavailable(format!("{} reports no duration", input.display()))
        })
    }

    async fn run_side_job(
        &self,
        ffmpeg: &Path,
        args: Vec<String>,
        output: &Path,
        cancel: &CancellationToken,
    ) -> tc_core::Result<()> {
        let partial = PartialOutput::new(output);
        self.run_transcoder(ffmpeg, args, cancel).await?;
        match tokio::fs::metadata(output).await {
            Ok(m) if m.len() > 0 => {
                partial.keep();
                Ok(())
            }
            _ => Err(tc_core::Error::OutputInvalid(format!(
                "{} was not created",
                output.display()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn advance(state: &mut JobState, next: JobState, job: &TransformJob) {
    debug_assert!(state.can_advance_to(next), "{state} -> {next}");
    tracing::debug!("{}: {state} -> {next}", job.input.display());
    *state = next;
}

async fn ensure_parent(path: &Path) -> tc_core::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Deletes an output file on drop unless [`keep`](Self::keep) was called.
///
/// Covers early returns and a dropped (abandoned) future alike.
struct PartialOutput<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> PartialOutput<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialOutput<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(self.path) {
            Ok(()) => tracing::debug!("Removed partial output {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Could not remove partial output {}: {e}", self.path.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{plan, AspectRatio, Dimensions};

    #[test]
    fn transform_args_match_reference_command() {
        let job = TransformJob::new("in.mp4", "out.mp4").with_duration(45);
        let plan = plan(Dimensions::new(1920, 1080), AspectRatio::VERTICAL, 1920).unwrap();
        let args = transform_args(&job, &plan, &EncodeSettings::default());

        let expected = [
            "-y", "-i", "in.mp4", "-t", "45",
            "-vf",
            concat!(
                "crop=607:1080:656:0,",
                "scale=1080:1920:force_original_aspect_ratio=decrease,",
                "pad=1080:1920:(ow-iw)/2:(oh-ih)/2:black",
            ),
            "-c:v", "libx264", "-preset", "veryfast", "-crf", "23", "-pix_fmt", "yuv420p",
            "-c:a", "aac", "-b:a", "128k", "-ar", "48000", "-ac", "2",
            "-af", "loudnorm=I=-16:TP=-1.5:LRA=11",
            "-movflags", "+faststart",
            "out.mp4",
        ];
        assert_eq!(args, expected);
    }

    #[test]
    fn settings_follow_config() {
        let mut config = TransformConfig::default();
        config.crf = 28;
        config.loudness.integrated = -14.0;
        let settings = EncodeSettings::from(&config);
        assert_eq!(settings.crf, 28);
        assert_eq!(settings.loudnorm_filter(), "loudnorm=I=-14:TP=-1.5:LRA=11");
    }

    #[test]
    fn partial_output_is_removed_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let dropped = dir.path().join("dropped.mp4");
        let kept = dir.path().join("kept.mp4");
        std::fs::write(&dropped, b"partial").unwrap();
        std::fs::write(&kept, b"done").unwrap();

        drop(PartialOutput::new(&dropped));
        PartialOutput::new(&kept).keep();
        // Nothing to remove is not an error.
        drop(PartialOutput::new(&dir.path().join("never-written.mp4")));

        assert!(!dropped.exists());
        assert!(kept.exists());
    }
}
