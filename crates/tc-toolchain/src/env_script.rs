//! Shell / batch script exporting the resolved toolchain to other programs.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tc_core::config::{ENV_BASE_DIR, ENV_TRANSCODER};

/// Script dialect, chosen from the output file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// POSIX `sh` (`export` lines).
    Shell,
    /// Windows `cmd` (`set` lines).
    Batch,
}

impl ScriptKind {
    /// `.bat` / `.cmd` select [`ScriptKind::Batch`]; anything else is shell.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("bat") | Some("cmd") => Self::Batch,
            _ => Self::Shell,
        }
    }
}

/// What the script exports.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub base_dir: PathBuf,
    pub transcoder: Option<PathBuf>,
    /// Directories prepended to `PATH`, in order.
    pub path_dirs: Vec<PathBuf>,
}

/// Render `env` in the given dialect.
pub fn render(env: &Environment, kind: ScriptKind) -> String {
    let mut out = String::new();
    let base = env.base_dir.display();

    match kind {
        ScriptKind::Shell => {
            out.push_str("#!/bin/sh\n# Generated by trendclip env-script\n");
            let _ = writeln!(out, "export {ENV_BASE_DIR}={}", sh_quote(&base.to_string()));
            if let Some(ref t) = env.transcoder {
                let quoted = sh_quote(&t.display().to_string());
                let _ = writeln!(out, "export {ENV_TRANSCODER}={quoted}");
            }
            if !env.path_dirs.is_empty() {
                let dirs: Vec<String> = env
                    .path_dirs
                    .iter()
                    .map(|d| sh_quote(&d.display().to_string()))
                    .collect();
                let _ = writeln!(out, "export PATH={}:\"$PATH\"", dirs.join(":"));
            }
        }
        ScriptKind::Batch => {
            out.push_str("@echo off\r\nrem Generated by trendclip env-script\r\n");
            let _ = write!(out, "set \"{ENV_BASE_DIR}={base}\"\r\n");
            if let Some(ref t) = env.transcoder {
                let _ = write!(out, "set \"{ENV_TRANSCODER}={}\"\r\n", t.display());
            }
            if !env.path_dirs.is_empty() {
                let dirs: Vec<String> = env
                    .path_dirs
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect();
                let _ = write!(out, "set \"PATH={};%PATH%\"\r\n", dirs.join(";"));
            }
        }
    }
    out
}

fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
