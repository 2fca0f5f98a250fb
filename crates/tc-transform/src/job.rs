//! Transform job description and lifecycle states.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::geometry::AspectRatio;

/// One reframe-and-encode request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformJob {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Maximum output length in seconds.
    pub duration_secs: u32,
    pub aspect: AspectRatio,
}

impl TransformJob {
    /// A 60 second, 9:16 job.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            duration_secs: 60,
            aspect: AspectRatio::VERTICAL,
        }
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_aspect(mut self, aspect: AspectRatio) -> Self {
        self.aspect = aspect;
        self
    }

    /// Reject a job that cannot produce a clip, before any tool is touched.
    ///
    /// # Errors
    ///
    /// [`tc_core::Error::InvalidInput`] for a zero duration, a missing input,
    /// or an output path that resolves to the input.
    pub fn validate(&self) -> tc_core::Result<()> {
        if self.duration_secs == 0 {
            return Err(tc_core::Error::InvalidInput(
                "clip duration must be at least one second".to_string(),
            ));
        }
        check_paths(&self.input, &self.output)
    }
}

/// Reject a missing input and an output that would overwrite it.
pub fn check_paths(input: &Path, output: &Path) -> tc_core::Result<()> {
    if !input.is_file() {
        return Err(tc_core::Error::InvalidInput(format!(
            "input {} does not exist",
            input.display()
        )));
    }
    if normalize(input) == normalize(output) {
        return Err(tc_core::Error::InvalidInput(format!(
            "output {} would overwrite the input",
            output.display()
        )));
    }
    Ok(())
}

/// Canonical form of `path`, canonicalizing the parent when the file itself
/// does not exist yet.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(p) = path.canonicalize() {
        return p;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

/// Where a job is in its lifecycle.
///
/// Transitions are strictly forward:
/// `Pending -> ToolResolved -> PlanComputed -> Executing -> Validated`,
/// with `Failed` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    ToolResolved,
    PlanComputed,
    Executing,
    Validated,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Validated | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, ToolResolved)
                | (ToolResolved, PlanComputed)
                | (PlanComputed, Executing)
                | (Executing, Validated)
        ) || (!self.is_terminal() && next == Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::ToolResolved => "tool_resolved",
            Self::PlanComputed => "plan_computed",
            Self::Executing => "executing",
            Self::Validated => "validated",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_only() {
        assert!(JobState::Pending.can_advance_to(JobState::ToolResolved));
        assert!(JobState::Executing.can_advance_to(JobState::Validated));
        assert!(!JobState::Pending.can_advance_to(JobState::Executing));
        assert!(!JobState::PlanComputed.can_advance_to(JobState::ToolResolved));
    }

    #[test]
    fn failed_from_any_non_terminal() {
        for s in [
            JobState::Pending,
            JobState::ToolResolved,
            JobState::PlanComputed,
            JobState::Executing,
        ] {
            assert!(s.can_advance_to(JobState::Failed), "{s}");
        }
        assert!(!JobState::Validated.can_advance_to(JobState::Failed));
        assert!(!JobState::Failed.can_advance_to(JobState::Failed));
    }

    #[test]
    fn job_defaults() {
        let job = TransformJob::new("in.mp4", "out.mp4");
        assert_eq!(job.duration_secs, 60);
        assert_eq!(job.aspect.to_string(), "9:16");
        let job = job.with_duration(15);
        assert_eq!(job.duration_secs, 15);
    }

    #[test]
    fn zero_duration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"x").unwrap();

        let job = TransformJob::new(&input, dir.path().join("out.mp4"));
        assert!(job.validate().is_ok());

        let err = job.with_duration(0).validate().unwrap_err();
        assert!(matches!(err, tc_core::Error::InvalidInput(_)));
        assert!(err.to_string().contains("duration"));
    }

    #[test]
    fn same_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"x").unwrap();

        let err = check_paths(&input, &input).unwrap_err();
        assert!(matches!(err, tc_core::Error::InvalidInput(_)));

        let dotted = dir.path().join(".").join("clip.mp4");
        assert!(check_paths(&input, &dotted).is_err());
        assert!(check_paths(&input, &dir.path().join("out.mp4")).is_ok());
    }

    #[test]
    fn missing_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_paths(&dir.path().join("absent.mp4"), &dir.path().join("out.mp4"))
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn normalize_nonexistent_file_uses_parent() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("sub").join("..").join("new.mp4");
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        assert_eq!(normalize(&p), dir.path().canonicalize().unwrap().join("new.mp4"));
    }
}
