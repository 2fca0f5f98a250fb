//! Archive extraction for downloaded tool artifacts.
//!
//! Everything here is blocking I/O; async callers run it through
//! `tokio::task::spawn_blocking`. Entries that would land outside the
//! destination directory (absolute paths, `..` components, links) are
//! skipped.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use tc_core::ArchiveFormat;
use walkdir::WalkDir;

/// Extract `archive` into `dest` (created if missing).
///
/// `tool` only labels errors.
///
/// # Errors
///
/// [`tc_core::Error::ExtractionFailed`] for unreadable or corrupt archives.
pub fn extract_archive(
    tool: &str,
    archive: &Path,
    dest: &Path,
    format: ArchiveFormat,
) -> tc_core::Result<()> {
    tracing::debug!(
        "Extracting {format:?} archive {} into {}",
        archive.display(),
        dest.display()
    );
    fs::create_dir_all(dest)?;

    let fail = |e: &dyn std::fmt::Display| {
        tc_core::Error::extraction(tool, format!("{}: {e}", archive.display()))
    };

    let file = File::open(archive)?;
    match format {
        ArchiveFormat::Zip => extract_zip(file, dest).map_err(|e| fail(&e)),
        ArchiveFormat::TarGz => {
            let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
            extract_tar(decoder, dest).map_err(|e| fail(&e))
        }
        ArchiveFormat::TarXz => {
            let decoder = xz2::read::XzDecoder::new(BufReader::new(file));
            extract_tar(decoder, dest).map_err(|e| fail(&e))
        }
    }
}

fn extract_zip(file: File, dest: &Path) -> io::Result<()> {
    let mut archive = zip::ZipArchive::new(file).map_err(io::Error::other)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(io::Error::other)?;
        let Some(rel) = entry.enclosed_name() else {
            tracing::warn!("Skipping unsafe zip entry {}", entry.name());
            continue;
        };
        let out = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&out)?;
        io::copy(&mut entry, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o777))?;
            }
        }
    }
    Ok(())
}

fn extract_tar(reader: impl Read, dest: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            tracing::warn!("Skipping link entry in tar archive");
            continue;
        }

        let rel = entry.path()?.into_owned();
        if !is_enclosed(&rel) {
            tracing::warn!("Skipping unsafe tar entry {}", rel.display());
            continue;
        }

        let out = dest.join(&rel);
        if kind.is_dir() {
            fs::create_dir_all(&out)?;
        } else if kind.is_file() {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(&out)?;
        }
    }
    Ok(())
}

fn is_enclosed(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Find `member` (an archive-relative path) under an extraction `root`.
///
/// Falls back to a unique file with the same name anywhere under `root`,
/// since upstream bundles occasionally rename their top-level directory.
pub fn locate_member(tool: &str, root: &Path, member: &str) -> tc_core::Result<PathBuf> {
    let exact = root.join(member);
    if exact.is_file() {
        return Ok(exact);
    }

    let file_name = Path::new(member).file_name().ok_or_else(|| {
        tc_core::Error::extraction(tool, format!("invalid member path '{member}'"))
    })?;

    let mut matches: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == file_name)
        .map(walkdir::DirEntry::into_path)
        .collect();
    match matches.len() {
        1 => {
            let found = matches.remove(0);
            tracing::debug!("{member} not at expected path; using {}", found.display());
            Ok(found)
        }
        0 => Err(tc_core::Error::extraction(
            tool,
            format!("archive does not contain {member}"),
        )),
        n => Err(tc_core::Error::extraction(
            tool,
            format!("archive does not contain {member} ({n} files share its name)"),
        )),
    }
}

/// Set `rwxr-xr-x` on `path`. No-op off unix.
#[allow(unused_variables)]
pub fn make_executable(path: &Path) -> tc_core::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}
