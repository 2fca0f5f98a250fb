//! Post-encode output checks.

use std::path::Path;

use crate::metadata::MediaProbe;

/// Confirm `path` is a usable encode: it exists, holds at least `min_bytes`,
/// and the metadata probe finds a video stream in it.
///
/// # Errors
///
/// [`tc_core::Error::OutputInvalid`] naming the first check that failed.
pub async fn validate_output(
    probe: &MediaProbe,
    path: &Path,
    min_bytes: u64,
) -> tc_core::Result<()> {
    let size = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => {
            return Err(tc_core::Error::OutputInvalid(format!(
                "{} is not a regular file",
                path.display()
            )))
        }
        Err(_) => {
            return Err(tc_core::Error::OutputInvalid(format!(
                "{} was not created",
                path.display()
            )))
        }
    };

    if size < min_bytes {
        return Err(tc_core::Error::OutputInvalid(format!(
            "{} is {size} bytes (minimum {min_bytes})",
            path.display()
        )));
    }

    let meta = probe
        .probe(path)
        .await
        .map_err(|e| tc_core::Error::OutputInvalid(format!("cannot read output metadata: {e}")))?;
    if !meta.has_video() {
        return Err(tc_core::Error::OutputInvalid(format!(
            "{} contains no video stream",
            path.display()
        )));
    }

    tracing::debug!("Validated {} ({size} bytes)", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn no_probe() -> MediaProbe {
        MediaProbe::new(PathBuf::from("/nonexistent/ffprobe-xyz"))
    }

    #[tokio::test]
    async fn missing_output_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_output(&no_probe(), &dir.path().join("nope.mp4"), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, tc_core::Error::OutputInvalid(_)));
        assert!(err.to_string().contains("was not created"));
    }

    #[tokio::test]
    async fn empty_output_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        std::fs::write(&out, b"").unwrap();
        let err = validate_output(&no_probe(), &out, 1024).await.unwrap_err();
        assert!(err.to_string().contains("0 bytes"), "{err}");
    }

    #[tokio::test]
    async fn directory_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_output(&no_probe(), dir.path(), 1).await.unwrap_err();
        assert!(matches!(err, tc_core::Error::OutputInvalid(_)));
    }

    #[tokio::test]
    async fn unreadable_metadata_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        std::fs::write(&out, vec![0u8; 2048]).unwrap();
        let err = validate_output(&no_probe(), &out, 1024).await.unwrap_err();
        assert!(err.to_string().contains("metadata"), "{err}");
    }
}
