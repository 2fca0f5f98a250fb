//! Live tool probing.
//!
//! A tool counts as available only when one of its candidate paths exists
//! *and* running it with its version argument exits zero. Nothing is cached:
//! every call re-examines the filesystem and re-executes the tool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tc_core::{ToolSource, ToolSpec, ToolState};

use crate::command::ToolCommand;

/// Probes [`ToolSpec`]s against the override, managed directory and `PATH`.
#[derive(Debug, Clone)]
pub struct ToolProbe {
    tools_dir: PathBuf,
    timeout: Duration,
}

impl ToolProbe {
    pub fn new(tools_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tools_dir: tools_dir.into(),
            timeout,
        }
    }

    /// Root of the managed tools directory.
    pub fn tools_dir(&self) -> &Path {
        &self.tools_dir
    }

    /// Directory the installer places a tool's executables in.
    pub fn managed_bin_dir(&self, name: &str) -> PathBuf {
        self.tools_dir.join(name).join("bin")
    }

    /// Candidate locations for the tool's primary executable, in priority
    /// order. Only paths that currently exist are returned.
    pub fn candidates(&self, spec: &ToolSpec) -> Vec<(PathBuf, ToolSource)> {
        let exe = spec.primary_executable();
        let mut out: Vec<(PathBuf, ToolSource)> = Vec::new();
        let mut push = |path: PathBuf, source: ToolSource| {
            if path.is_file() && !out.iter().any(|(p, _)| *p == path) {
                out.push((path, source));
            }
        };

        if let Some(ref p) = spec.path_override {
            push(p.clone(), ToolSource::Override);
        }

        push(self.managed_bin_dir(&spec.name).join(exe), ToolSource::Managed);
        push(self.tools_dir.join(&spec.name).join(exe), ToolSource::Managed);
        push(self.tools_dir.join(exe), ToolSource::Managed);

        if let Ok(p) = which::which(exe) {
            push(p, ToolSource::SystemPath);
        }

        out
    }

    /// Probe `spec`, returning the first candidate that answers its version
    /// query with exit status zero.
    pub async fn probe(&self, spec: &ToolSpec) -> ToolState {
        if let Some(ref p) = spec.path_override {
            if !p.is_file() {
                tracing::warn!(
                    "Override path for {} does not exist: {}",
                    spec.name,
                    p.display()
                );
            }
        }

        for (path, source) in self.candidates(spec) {
            match self.run_version(&path, &spec.version_arg).await {
                Ok(version) => {
                    tracing::debug!(
                        "{} available at {} ({source}): {}",
                        spec.name,
                        path.display(),
                        version.as_deref().unwrap_or("unknown version")
                    );
                    return ToolState {
                        name: spec.name.clone(),
                        available: true,
                        path: Some(path),
                        version,
                        source: Some(source),
                    };
                }
                Err(e) => {
                    tracing::debug!("Candidate {} for {} failed: {e}", path.display(), spec.name);
                }
            }
        }

        tracing::debug!("{} is not available", spec.name);
        ToolState::unavailable(&spec.name)
    }

    /// Run `path <version_arg>` and return the first non-empty output line.
    async fn run_version(&self, path: &Path, version_arg: &str) -> tc_core::Result<Option<String>> {
        let mut cmd = ToolCommand::new(path.to_path_buf());
        cmd.arg(version_arg).timeout(self.timeout);
        let output = cmd.execute().await?;

        let first_line = |s: &str| {
            s.lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
        };
        Ok(first_line(&output.stdout).or_else(|| first_line(&output.stderr)))
    }
}

/// Resolve a companion executable (e.g. `ffprobe`) shipped alongside a
/// probed primary, falling back to `PATH`.
pub fn companion(state: &ToolState, executable: &str) -> Option<PathBuf> {
    let sibling = state
        .path
        .as_deref()
        .and_then(Path::parent)
        .map(|dir| dir.join(executable))
        .filter(|p| p.is_file());

    sibling.or_else(|| which::which(executable).ok())
}
