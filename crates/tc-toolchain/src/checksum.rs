//! Streaming file digests and policy-driven verification.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256, Sha512};
use tc_core::{DigestAlgorithm, ExpectedDigest, VerificationPolicy};

const CHUNK_SIZE: usize = 64 * 1024;

/// What [`verify`] concluded about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The computed digest matched the expected one.
    Verified { digest: ExpectedDigest },
    /// No comparison was made: no digest was expected or the policy is `Skip`.
    Skipped,
}

/// Compute the lowercase hex digest of the file at `path`.
///
/// The file is read in fixed-size chunks, so memory use does not depend on
/// the file size.
pub fn digest(path: &Path, algorithm: DigestAlgorithm) -> tc_core::Result<String> {
    let file = File::open(path)?;
    match algorithm {
        DigestAlgorithm::Sha256 => hash_reader::<Sha256>(file),
        DigestAlgorithm::Sha512 => hash_reader::<Sha512>(file),
    }
}

fn hash_reader<D: Digest>(mut reader: impl Read) -> tc_core::Result<String> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Check the file at `path` against `expected` under `policy`.
///
/// # Errors
///
/// - [`tc_core::Error::VerificationFailed`] when the digests differ.
/// - [`tc_core::Error::Io`] when the file cannot be read.
pub fn verify(
    path: &Path,
    expected: Option<&ExpectedDigest>,
    policy: VerificationPolicy,
) -> tc_core::Result<VerificationOutcome> {
    let expected = match (expected, policy) {
        (Some(expected), VerificationPolicy::Enforce) => expected,
        _ => return Ok(VerificationOutcome::Skipped),
    };

    let actual = digest(path, expected.algorithm)?;
    if !actual.eq_ignore_ascii_case(&expected.hex) {
        return Err(tc_core::Error::verification(
            path,
            expected,
            format!("{}:{actual}", expected.algorithm),
        ));
    }

    tracing::debug!("Verified {} ({expected})", path.display());
    Ok(VerificationOutcome::Verified {
        digest: expected.clone(),
    })
}
