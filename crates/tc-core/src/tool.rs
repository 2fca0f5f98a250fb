//! External tool data model: what a managed tool is, where it comes from,
//! and what probing it revealed.
//!
//! A [`ToolSpec`] is immutable once built and owns its install strategy
//! ([`Artifact`]), so installers never branch on the tool's name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, Result};

/// Name of the transcoder tool in the built-in catalogue.
pub const TRANSCODER: &str = "ffmpeg";

/// Name of the transcoder's metadata-probe companion executable.
pub const TRANSCODER_PROBE: &str = "ffprobe";

/// Name of the downloader tool in the built-in catalogue.
pub const DOWNLOADER: &str = "yt-dlp";

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// A supported host platform (OS + architecture).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    LinuxX64,
    LinuxArm64,
    MacosX64,
    MacosArm64,
    WindowsX64,
}

impl Platform {
    /// Detect the platform this binary was compiled for.
    ///
    /// Returns `None` on hosts no artifact is published for.
    pub fn detect() -> Option<Self> {
        match (std::env::consts::OS, std::env::consts::ARCH) {
            ("linux", "x86_64") => Some(Self::LinuxX64),
            ("linux", "aarch64") => Some(Self::LinuxArm64),
            ("macos", "x86_64") => Some(Self::MacosX64),
            ("macos", "aarch64") => Some(Self::MacosArm64),
            ("windows", "x86_64") => Some(Self::WindowsX64),
            _ => None,
        }
    }

    /// Whether executables on this platform carry an `.exe` suffix.
    pub fn is_windows(&self) -> bool {
        matches!(self, Self::WindowsX64)
    }

    /// Append the platform's executable suffix to a bare program name.
    pub fn executable_name(&self, stem: &str) -> String {
        if self.is_windows() {
            format!("{stem}.exe")
        } else {
            stem.to_string()
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinuxX64 => write!(f, "linux-x64"),
            Self::LinuxArm64 => write!(f, "linux-arm64"),
            Self::MacosX64 => write!(f, "macos-x64"),
            Self::MacosArm64 => write!(f, "macos-arm64"),
            Self::WindowsX64 => write!(f, "windows-x64"),
        }
    }
}

// ---------------------------------------------------------------------------
// Digests
// ---------------------------------------------------------------------------

/// Hash algorithms the checksum verifier supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => write!(f, "sha256"),
            Self::Sha512 => write!(f, "sha512"),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(Error::InvalidInput(format!(
                "unsupported digest algorithm '{other}' (expected sha256 or sha512)"
            ))),
        }
    }
}

/// A digest a downloaded artifact is expected to match.
///
/// Written as `sha256:<hex>` or bare hex (SHA-256 assumed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExpectedDigest {
    pub algorithm: DigestAlgorithm,
    /// Lowercase hex.
    pub hex: String,
}

impl ExpectedDigest {
    /// Build an expected SHA-256 digest from its hex form.
    pub fn sha256(hex: impl Into<String>) -> Result<Self> {
        Self::new(DigestAlgorithm::Sha256, hex)
    }

    /// Build an expected digest, validating the hex length for the algorithm.
    pub fn new(algorithm: DigestAlgorithm, hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into().trim().to_ascii_lowercase();
        let expected_len = match algorithm {
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha512 => 128,
        };
        if hex.len() != expected_len || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidInput(format!(
                "'{hex}' is not a valid {algorithm} digest ({expected_len} hex characters)"
            )));
        }
        Ok(Self { algorithm, hex })
    }
}

impl fmt::Display for ExpectedDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for ExpectedDigest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((algo, hex)) => Self::new(algo.parse()?, hex),
            None => Self::sha256(s),
        }
    }
}

impl TryFrom<String> for ExpectedDigest {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ExpectedDigest> for String {
    fn from(d: ExpectedDigest) -> Self {
        d.to_string()
    }
}

/// Whether digests are checked when a tool is installed.
///
/// `Skip` is an explicit, logged choice; a spec without an expected digest
/// is also installed unverified under `Enforce`, with the same warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationPolicy {
    #[default]
    Enforce,
    Skip,
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Archive container formats the installer can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    TarXz,
}

impl ArchiveFormat {
    /// Infer the format from a URL or file name.
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.to_ascii_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or(&lower);
        if path.ends_with(".zip") {
            Some(Self::Zip)
        } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if path.ends_with(".tar.xz") || path.ends_with(".txz") {
            Some(Self::TarXz)
        } else {
            None
        }
    }
}

/// How a tool's downloaded artifact turns into executables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Artifact {
    /// The download is the primary executable itself.
    Binary,
    /// The download is an archive; `members` are archive-relative paths of
    /// the executables, in the same order as [`ToolSpec::executables`].
    Archive {
        format: ArchiveFormat,
        members: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// ToolSpec
// ---------------------------------------------------------------------------

/// Identifies a required external tool and how to acquire it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name; also the name of its managed subdirectory.
    pub name: String,
    /// Version the download URL points at (informational).
    pub version: String,
    /// Download URL for the current platform, if one is published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Expected digest of the downloaded artifact; `None` skips verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<ExpectedDigest>,
    pub artifact: Artifact,
    /// Local executable file names. The first is the probed primary; the
    /// rest are companions installed alongside it.
    pub executables: Vec<String>,
    /// Harmless argument used for the health probe.
    #[serde(default = "default_version_arg")]
    pub version_arg: String,
    /// Explicit path that takes precedence over every other location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_override: Option<PathBuf>,
}

fn default_version_arg() -> String {
    "--version".to_string()
}

impl ToolSpec {
    /// Start a spec for a tool delivered as a single binary.
    pub fn binary(
        name: impl Into<String>,
        version: impl Into<String>,
        executable: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            url: None,
            digest: None,
            artifact: Artifact::Binary,
            executables: vec![executable.into()],
            version_arg: default_version_arg(),
            path_override: None,
        }
    }

    /// Start a spec for a tool delivered inside an archive.
    ///
    /// `entries` pairs each local executable name with its archive-relative
    /// member path; the first entry is the primary executable.
    pub fn archive<N, M>(
        name: impl Into<String>,
        version: impl Into<String>,
        format: ArchiveFormat,
        entries: impl IntoIterator<Item = (N, M)>,
    ) -> Self
    where
        N: Into<String>,
        M: Into<String>,
    {
        let (executables, members): (Vec<String>, Vec<String>) = entries
            .into_iter()
            .map(|(n, m)| (n.into(), m.into()))
            .unzip();
        Self {
            name: name.into(),
            version: version.into(),
            url: None,
            digest: None,
            artifact: Artifact::Archive { format, members },
            executables,
            version_arg: default_version_arg(),
            path_override: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_digest(mut self, digest: ExpectedDigest) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn with_version_arg(mut self, arg: impl Into<String>) -> Self {
        self.version_arg = arg.into();
        self
    }

    pub fn with_path_override(mut self, path: Option<PathBuf>) -> Self {
        self.path_override = path;
        self
    }

    /// The executable the health probe runs.
    pub fn primary_executable(&self) -> &str {
        self.executables.first().map(String::as_str).unwrap_or(&self.name)
    }

    /// Check internal consistency (non-empty name, members match executables).
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("tool name is empty".into()));
        }
        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(Error::InvalidInput(format!(
                "tool name '{}' cannot be used as a directory name",
                self.name
            )));
        }
        if self.executables.is_empty() {
            return Err(Error::InvalidInput(format!(
                "tool '{}' declares no executables",
                self.name
            )));
        }
        if let Artifact::Archive { members, .. } = &self.artifact {
            if members.len() != self.executables.len() {
                return Err(Error::InvalidInput(format!(
                    "tool '{}' lists {} executables but {} archive members",
                    self.name,
                    self.executables.len(),
                    members.len()
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ToolState
// ---------------------------------------------------------------------------

/// Where a probed tool was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolSource {
    /// An explicit path override (e.g. `FFMPEG_BIN`).
    Override,
    /// The managed tools directory.
    Managed,
    /// The host's executable search path.
    SystemPath,
}

impl fmt::Display for ToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Override => write!(f, "override"),
            Self::Managed => write!(f, "managed"),
            Self::SystemPath => write!(f, "PATH"),
        }
    }
}

/// Result of probing a [`ToolSpec`]. Recomputed on every probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolState {
    pub name: String,
    pub available: bool,
    pub path: Option<PathBuf>,
    /// First line of the version output.
    pub version: Option<String>,
    pub source: Option<ToolSource>,
}

impl ToolState {
    /// A state recording that no working candidate was found.
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: false,
            path: None,
            version: None,
            source: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in catalogue
// ---------------------------------------------------------------------------

const FFMPEG_VERSION: &str = "6.1";
const YTDLP_VERSION: &str = "2024.03.10";
const FFMPEG_RELEASES: &str = "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest";
const YTDLP_RELEASES: &str = "https://github.com/yt-dlp/yt-dlp/releases/latest/download";

/// The transcoder (`ffmpeg` + `ffprobe`) for `platform`.
///
/// Builds are only published for Linux and Windows; on macOS the returned `ToolSpec` has no
/// URL and the tool must come from `PATH` or `FFMPEG_BIN`.
pub fn transcoder_spec(platform: Option<Platform>, path_override: Option<PathBuf>) -> ToolSpec {
    let exe = |stem: &str| executable_for(platform, stem);

    let bundle = match platform {
        Some(Platform::WindowsX64) => Some(("win64", ArchiveFormat::Zip, "zip")),
        Some(Platform::LinuxX64) => Some(("linux64", ArchiveFormat::TarXz, "tar.xz")),
        Some(Platform::LinuxArm64) => Some(("linuxarm64", ArchiveFormat::TarXz, "tar.xz")),
        _ => None,
    }
    .map(|(target, format, ext)| (format!("ffmpeg-master-latest-{target}-gpl"), format, ext));

    let (format, root) = bundle
        .as_ref()
        .map(|(root, format, _)| (*format, root.as_str()))
        .unwrap_or((ArchiveFormat::Zip, "ffmpeg"));

    let ffmpeg = exe(TRANSCODER);
    let ffprobe = exe(TRANSCODER_PROBE);
    let spec = ToolSpec::archive(
        TRANSCODER,
        FFMPEG_VERSION,
        format,
        [
            (ffmpeg.clone(), format!("{root}/bin/{ffmpeg}")),
            (ffprobe.clone(), format!("{root}/bin/{ffprobe}")),
        ],
    )
    .with_version_arg("-version")
    .with_path_override(path_override);

    match bundle {
        Some((root, _, ext)) => spec.with_url(format!("{FFMPEG_RELEASES}/{root}.{ext}")),
        None => spec,
    }
}

/// The downloader (`yt-dlp`) for `platform`, published as a single binary.
pub fn downloader_spec(platform: Option<Platform>) -> ToolSpec {
    let exe = executable_for(platform, DOWNLOADER);

    let asset = match platform {
        Some(Platform::WindowsX64) => Some("yt-dlp.exe"),
        Some(Platform::LinuxX64) => Some("yt-dlp_linux"),
        Some(Platform::LinuxArm64) => Some("yt-dlp_linux_aarch64"),
        Some(Platform::MacosX64) | Some(Platform::MacosArm64) => Some("yt-dlp_macos"),
        None => None,
    };

    let spec = ToolSpec::binary(DOWNLOADER, YTDLP_VERSION, exe);
    match asset {
        Some(asset) => spec.with_url(format!("{YTDLP_RELEASES}/{asset}")),
        None => spec,
    }
}

/// `stem` as an executable name on `platform`; unknown hosts get no suffix.
fn executable_for(platform: Option<Platform>, stem: &str) -> String {
    platform.map_or_else(|| stem.to_string(), |p| p.executable_name(stem))
}

/// The default toolchain: transcoder and downloader.
pub fn default_tools(
    platform: Option<Platform>,
    transcoder_override: Option<PathBuf>,
) -> Vec<ToolSpec> {
    vec![
        transcoder_spec(platform, transcoder_override),
        downloader_spec(platform),
    ]
}
