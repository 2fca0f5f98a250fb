//! Shared fixtures for toolchain integration tests.
//!
//! Tools are tiny `sh` scripts, so these tests only run on unix.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use tc_core::config::ToolchainConfig;
use tc_core::{ToolSpec, VerificationPolicy};
use tc_toolchain::Toolchain;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A script that answers any version query.
pub const HEALTHY_SCRIPT: &str = "#!/bin/sh\necho \"fake tool 1.0\"\n";

/// A script that always fails.
pub const BROKEN_SCRIPT: &str = "#!/bin/sh\necho broken >&2\nexit 1\n";

pub struct TestHarness {
    pub dir: tempfile::TempDir,
    pub server: MockServer,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            server: MockServer::start().await,
        }
    }

    pub fn config(&self, verification: VerificationPolicy) -> ToolchainConfig {
        ToolchainConfig {
            base_dir: self.dir.path().to_path_buf(),
            verification,
            probe_timeout: Duration::from_secs(5),
            download_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    pub fn toolchain(&self, specs: Vec<ToolSpec>) -> Toolchain {
        Toolchain::new(&self.config(VerificationPolicy::Enforce), specs).unwrap()
    }

    pub fn url(&self, route: &str) -> String {
        format!("{}{route}", self.server.uri())
    }

    /// Serve `body` at `route`, expecting exactly `times` requests.
    pub async fn serve(&self, route: &str, body: Vec<u8>, times: u64) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    pub async fn serve_status(&self, route: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    pub fn managed_exe(&self, tool: &str, exe: &str) -> PathBuf {
        self.dir.path().join("tools").join(tool).join("bin").join(exe)
    }

    /// Pre-install a working tool in the managed directory.
    pub fn preinstall(&self, tool: &str) -> PathBuf {
        let exe = self.managed_exe(tool, tool);
        write_executable(&exe, HEALTHY_SCRIPT.as_bytes());
        exe
    }
}

pub fn write_executable(path: &Path, contents: &[u8]) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Build a `.tar.gz` holding executable `entries` (path, contents).
pub fn tar_gz(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append(&header, data.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::Digest;
    hex::encode(sha2::Sha256::digest(data))
}
