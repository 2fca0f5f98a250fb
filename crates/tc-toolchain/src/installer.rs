//! Download, verify, unpack and relocate a tool into the managed directory.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tc_core::{Artifact, ToolSpec, ToolState, VerificationPolicy};
use tokio_util::sync::CancellationToken;

use crate::checksum::{self, VerificationOutcome};
use crate::download::{DownloadProgress, Downloader};
use crate::extract;
use crate::probe::ToolProbe;

/// Observer for artifact downloads, called with the tool name.
pub type ProgressFn = Arc<dyn Fn(&str, DownloadProgress) + Send + Sync>;

/// Installs [`ToolSpec`]s into `<tools>/<name>/bin/`.
///
/// Every install stages its work in a temporary directory inside the tools
/// directory; the staging area is removed when the install returns, whether
/// it succeeded or not. Installs are never retried here.
#[derive(Clone)]
pub struct Installer {
    probe: ToolProbe,
    downloader: Downloader,
    policy: VerificationPolicy,
    progress: Option<ProgressFn>,
}

impl fmt::Debug for Installer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installer")
            .field("probe", &self.probe)
            .field("policy", &self.policy)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl Installer {
    pub fn new(probe: ToolProbe, downloader: Downloader, policy: VerificationPolicy) -> Self {
        Self {
            probe,
            downloader,
            policy,
            progress: None,
        }
    }

    /// Report download progress for every artifact this installer fetches.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Install `spec` and confirm it answers its probe.
    ///
    /// # Errors
    ///
    /// - [`tc_core::Error::ToolUnavailable`] if no URL is published for this platform.
    /// - [`tc_core::Error::DownloadFailed`] / [`tc_core::Error::Cancelled`] while fetching.
    /// - [`tc_core::Error::VerificationFailed`] on a digest mismatch.
    /// - [`tc_core::Error::ExtractionFailed`] for a corrupt archive or missing member.
    /// - [`tc_core::Error::PostInstallProbeFailed`] if the relocated tool does not run.
    pub async fn install(
        &self,
        spec: &ToolSpec,
        cancel: &CancellationToken,
    ) -> tc_core::Result<ToolState> {
        spec.validate()?;
        let name = spec.name.as_str();
        let url = spec.url.as_deref().ok_or_else(|| {
            tc_core::Error::tool_unavailable(
                name,
                "no download URL is published for this platform; \
                 install it manually or set an override path",
            )
        })?;

        let tools_dir = self.probe.tools_dir();
        tokio::fs::create_dir_all(tools_dir).await?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(tools_dir)?;

        let artifact = staging.path().join(artifact_file_name(url));
        self.downloader
            .fetch(name, url, &artifact, cancel, |p| {
                if let Some(progress) = &self.progress {
                    progress(name, p);
                }
            })
            .await?;

        self.verify_artifact(spec, &artifact).await?;

        let sources = match &spec.artifact {
            Artifact::Binary => vec![artifact.clone()],
            Artifact::Archive { format, members } => {
                let tool = name.to_string();
                let archive = artifact.clone();
                let unpack_dir = staging.path().join("unpacked");
                let format = *format;
                let members = members.clone();
                tokio::task::spawn_blocking(move || {
                    extract::extract_archive(&tool, &archive, &unpack_dir, format)?;
                    members
                        .iter()
                        .map(|m| extract::locate_member(&tool, &unpack_dir, m))
                        .collect::<tc_core::Result<Vec<_>>>()
                })
                .await
                .map_err(|e| {
                    tc_core::Error::extraction(name, format!("extraction task failed: {e}"))
                })??
            }
        };

        let bin_dir = self.probe.managed_bin_dir(name);
        tokio::fs::create_dir_all(&bin_dir).await?;
        for (source, exe) in sources.iter().zip(&spec.executables) {
            let dest = bin_dir.join(exe);
            relocate(source, &dest).await?;
            extract::make_executable(&dest)?;
            tracing::debug!("Installed {}", dest.display());
        }

        let state = self.probe.probe(spec).await;
        if !state.available {
            return Err(tc_core::Error::post_install(
                name,
                format!(
                    "{} was installed but does not answer '{}'",
                    bin_dir.join(spec.primary_executable()).display(),
                    spec.version_arg
                ),
            ));
        }

        tracing::info!(
            "Installed {name} {} at {}",
            state.version.as_deref().unwrap_or(&spec.version),
            bin_dir.display()
        );
        Ok(state)
    }

    async fn verify_artifact(&self, spec: &ToolSpec, artifact: &Path) -> tc_core::Result<()> {
        let expected = spec.digest.clone();
        let policy = self.policy;
        let path = artifact.to_path_buf();
        let outcome =
            tokio::task::spawn_blocking(move || checksum::verify(&path, expected.as_ref(), policy))
                .await
                .map_err(|e| {
                    tc_core::Error::tool("checksum", format!("hashing task failed: {e}"))
                })??;

        if outcome == VerificationOutcome::Skipped {
            let reason = if self.policy == VerificationPolicy::Skip {
                "verification is disabled"
            } else {
                "no expected digest is configured"
            };
            tracing::warn!(
                "Installing {} without checksum verification: {reason}",
                spec.name
            );
        }
        Ok(())
    }
}

/// File name for the downloaded artifact, taken from the URL's last path
/// segment so archive extensions survive.
fn artifact_file_name(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|p| p.rsplit('/').next())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("artifact")
        .to_string()
}

/// Move `src` to `dest`, replacing any previous file, copying when a rename
/// is not possible.
async fn relocate(src: &Path, dest: &Path) -> tc_core::Result<()> {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    if tokio::fs::rename(src, dest).await.is_err() {
        tokio::fs::copy(src, dest).await?;
    }
    Ok(())
}
