//! Content digests for artifact integrity checks.
//!
//! Verification fails closed: a file that cannot be opened or read never
//! verifies, and callers treat that exactly like a mismatch.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::Path;

use crate::error::{DigestMismatchDetails, Error, Result};
use crate::utils::io;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }

    /// Extension of the sidecar file shipped next to the binary.
    pub fn sidecar_extension(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5sum",
            DigestAlgorithm::Sha256 => "sha256sum",
        }
    }
}

/// Whether the downloaded archive is checked against a caller-supplied digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestCheck {
    Skip,
    Verify,
}

impl std::str::FromStr for DigestCheck {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "verify" => Ok(DigestCheck::Verify),
            "false" | "no" | "0" | "skip" | "" => Ok(DigestCheck::Skip),
            other => Err(format!(
                "'{}' is not a digest check mode (use true/false, yes/no, verify/skip)",
                other
            )),
        }
    }
}

/// Compute the lowercase hex digest of a file, streaming its content.
pub fn compute_digest(path: &Path, algorithm: DigestAlgorithm) -> Result<String> {
    let mut file = File::open(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("open {}", path.display())))
    })?;

    let hex = match algorithm {
        DigestAlgorithm::Md5 => {
            let mut hasher = Md5::new();
            std::io::copy(&mut file, &mut hasher).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
            })?;
            format!("{:x}", hasher.finalize())
        }
        DigestAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            std::io::copy(&mut file, &mut hasher).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
            })?;
            format!("{:x}", hasher.finalize())
        }
    };

    Ok(hex)
}

/// Exact, case-sensitive comparison of a file digest against `expected`.
/// Unreadable files yield `false`.
pub fn verify_digest(path: &Path, expected: &str, algorithm: DigestAlgorithm) -> bool {
    log_status!("digest", "Verifying {} ({})", path.display(), algorithm.as_str());
    match compute_digest(path, algorithm) {
        Ok(actual) => actual == expected,
        Err(_) => false,
    }
}

/// [`verify_digest`] as a `Result`, for callers that halt on mismatch.
pub fn require_digest(path: &Path, expected: &str, algorithm: DigestAlgorithm) -> Result<()> {
    if verify_digest(path, expected, algorithm) {
        return Ok(());
    }

    Err(Error::digest_mismatch(DigestMismatchDetails {
        path: path.display().to_string(),
        algorithm: algorithm.as_str().to_string(),
        expected: expected.to_string(),
        actual: compute_digest(path, algorithm).ok(),
    }))
}

/// Compare a freshly computed digest of `target` with the one stored in
/// `sidecar`, trimmed. Returns the digest of `target` on a match.
pub fn require_sidecar(target: &Path, sidecar: &Path, algorithm: DigestAlgorithm) -> Result<String> {
    log_status!("digest", "Verifying {} ({})", target.display(), algorithm.as_str());
    let actual = compute_digest(target, algorithm).ok();
    let expected = io::read_trimmed(sidecar, "read digest sidecar").ok();

    match (actual, expected) {
        (Some(actual), Some(expected)) if actual == expected => Ok(actual),
        (actual, expected) => Err(Error::digest_mismatch(DigestMismatchDetails {
            path: target.display().to_string(),
            algorithm: algorithm.as_str().to_string(),
            expected: expected.unwrap_or_default(),
            actual,
        })
        .with_hint(format!(
            "Digest read from {} did not match the packaged binary",
            sidecar.display()
        ))),
    }
}
