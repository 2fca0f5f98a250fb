//! Toolchain orchestration: probe, heal, and resolve managed tools.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tc_core::config::ToolchainConfig;
use tc_core::{DigestAlgorithm, ExpectedDigest, Platform, ToolSpec, ToolState};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::checksum;
use crate::download::Downloader;
use crate::env_script::{self, Environment, ScriptKind};
use crate::installer::{Installer, ProgressFn};
use crate::probe::ToolProbe;

/// Per-tool result of [`Toolchain::heal_all`].
#[derive(Debug, Clone, Serialize)]
pub struct HealOutcome {
    pub name: String,
    pub success: bool,
    /// Resolved path and version on success, the failure cause otherwise.
    pub detail: String,
}

/// Owns the managed tools directory and the set of tools it maintains.
///
/// Constructed explicitly from configuration and a spec list; there is no
/// process-wide registry. Concurrent `ensure` calls for the same tool are
/// serialized, so a tool is never installed twice in parallel.
pub struct Toolchain {
    base_dir: PathBuf,
    specs: Vec<ToolSpec>,
    probe: ToolProbe,
    installer: Installer,
    locks: HashMap<String, Arc<Mutex<()>>>,
    cancel: CancellationToken,
}

impl Toolchain {
    /// Build a toolchain over `specs`.
    ///
    /// # Errors
    ///
    /// [`tc_core::Error::InvalidInput`] for an inconsistent spec or a
    /// duplicated tool name.
    pub fn new(config: &ToolchainConfig, specs: Vec<ToolSpec>) -> tc_core::Result<Self> {
        let mut locks = HashMap::new();
        for spec in &specs {
            spec.validate()?;
            if locks
                .insert(spec.name.clone(), Arc::new(Mutex::new(())))
                .is_some()
            {
                return Err(tc_core::Error::InvalidInput(format!(
                    "tool '{}' is registered twice",
                    spec.name
                )));
            }
        }

        let probe = ToolProbe::new(config.tools_dir(), config.probe_timeout);
        let downloader = Downloader::new(config.download_timeout, config.connect_timeout)?;
        let installer = Installer::new(probe.clone(), downloader, config.verification);

        tracing::debug!(
            "Toolchain over {} tool(s) in {}",
            specs.len(),
            probe.tools_dir().display()
        );

        Ok(Self {
            base_dir: config.base_dir.clone(),
            specs,
            probe,
            installer,
            locks,
            cancel: CancellationToken::new(),
        })
    }

    /// Toolchain over the built-in catalogue for this host plus any
    /// configured extras.
    pub fn from_config(config: &ToolchainConfig) -> tc_core::Result<Self> {
        let platform = Platform::detect();
        if platform.is_none() {
            tracing::warn!(
                "No tool downloads are published for {}-{}; only existing installs will be used",
                std::env::consts::OS,
                std::env::consts::ARCH
            );
        }
        Self::new(config, config.tool_specs(platform))
    }

    /// Abort in-flight downloads when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Report download progress while installing.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.installer = self.installer.with_progress(progress);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn tools_dir(&self) -> &Path {
        self.probe.tools_dir()
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    fn require(&self, name: &str) -> tc_core::Result<&ToolSpec> {
        self.spec(name)
            .ok_or_else(|| tc_core::Error::tool_unavailable(name, "not a registered tool"))
    }

    /// Make `name` available, installing it if the probe fails.
    ///
    /// A healthy tool is returned without any network I/O.
    pub async fn ensure(&self, name: &str) -> tc_core::Result<ToolState> {
        let spec = self.require(name)?;
        let lock = self
            .locks
            .get(name)
            .cloned()
            .ok_or_else(|| tc_core::Error::tool_unavailable(name, "not a registered tool"))?;
        let _guard = lock.lock().await;

        let state = self.probe.probe(spec).await;
        if state.available {
            return Ok(state);
        }

        tracing::info!("{name} is missing or broken; installing {}", spec.version);
        self.installer.install(spec, &self.cancel).await
    }

    /// Ensure every registered tool concurrently. Failures are logged and
    /// reported as `false`; they never abort the other tools.
    pub async fn ensure_all(&self) -> BTreeMap<String, bool> {
        self.heal_all()
            .await
            .into_iter()
            .map(|o| (o.name, o.success))
            .collect()
    }

    /// Like [`ensure_all`](Self::ensure_all) with a human-readable detail
    /// per tool.
    pub async fn heal_all(&self) -> Vec<HealOutcome> {
        let results = join_all(self.specs.iter().map(|s| self.ensure(&s.name))).await;

        self.specs
            .iter()
            .zip(results)
            .map(|(spec, result)| match result {
                Ok(state) => {
                    let detail = format!(
                        "{} ({})",
                        state
                            .path
                            .as_deref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_default(),
                        state.version.as_deref().unwrap_or("unknown version")
                    );
                    tracing::info!("{}: ready at {detail}", spec.name);
                    HealOutcome {
                        name: spec.name.clone(),
                        success: true,
                        detail,
                    }
                }
                Err(e) => {
                    tracing::error!("{}: healing failed: {e}", spec.name);
                    HealOutcome {
                        name: spec.name.clone(),
                        success: false,
                        detail: e.to_string(),
                    }
                }
            })
            .collect()
    }

    /// Re-probe `name` without installing anything.
    ///
    /// # Errors
    ///
    /// [`tc_core::Error::ToolUnavailable`] if `name` is not registered or is
    /// not currently runnable.
    pub async fn check(&self, name: &str) -> tc_core::Result<ToolState> {
        let spec = self.require(name)?;
        let state = self.probe.probe(spec).await;
        if state.available {
            Ok(state)
        } else {
            Err(tc_core::Error::tool_unavailable(
                name,
                "not installed or not runnable; run `trendclip heal`",
            ))
        }
    }

    /// Resolved path of `name`'s primary executable, re-probed on every call.
    pub async fn path_of(&self, name: &str) -> Option<PathBuf> {
        let spec = self.spec(name)?;
        self.probe.probe(spec).await.path
    }

    /// Probe every registered tool without installing anything.
    pub async fn check_all(&self) -> Vec<ToolState> {
        join_all(self.specs.iter().map(|s| self.probe.probe(s))).await
    }

    /// Digests of the currently resolved primary executables.
    ///
    /// Unavailable tools are left out.
    pub async fn installed_digests(
        &self,
        algorithm: DigestAlgorithm,
    ) -> tc_core::Result<Vec<(String, ExpectedDigest)>> {
        let mut out = Vec::new();
        for state in self.check_all().await {
            let Some(path) = state.path else {
                tracing::debug!("{} is not available; no digest", state.name);
                continue;
            };
            let hex = tokio::task::spawn_blocking(move || checksum::digest(&path, algorithm))
                .await
                .map_err(|e| {
                    tc_core::Error::tool("checksum", format!("hashing task failed: {e}"))
                })??;
            out.push((state.name, ExpectedDigest::new(algorithm, hex)?));
        }
        Ok(out)
    }

    /// Write a script exporting the base directory, the transcoder path and
    /// the resolved tool directories. `.bat`/`.cmd` paths get batch syntax.
    pub async fn write_env_script(&self, path: &Path) -> tc_core::Result<()> {
        let states = self.check_all().await;

        let transcoder = states
            .iter()
            .find(|s| s.name == tc_core::TRANSCODER)
            .and_then(|s| s.path.clone());

        let mut path_dirs: Vec<PathBuf> = Vec::new();
        for dir in states
            .iter()
            .filter_map(|s| s.path.as_deref().and_then(Path::parent))
        {
            if !path_dirs.iter().any(|d| d == dir) {
                path_dirs.push(dir.to_path_buf());
            }
        }

        let env = Environment {
            base_dir: self.base_dir.clone(),
            transcoder,
            path_dirs,
        };
        let script = env_script::render(&env, ScriptKind::from_path(path));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, script).await?;

        if ScriptKind::from_path(path) == ScriptKind::Shell {
            crate::extract::make_executable(path)?;
        }

        tracing::info!("Wrote environment script {}", path.display());
        Ok(())
    }
}
