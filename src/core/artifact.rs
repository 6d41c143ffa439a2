//! Local artifact preparation: download, verify, unpack, verify again.
//!
//! Nothing is cached between runs. Every run works in a fresh temporary
//! directory that is removed when the [`LocalArtifact`] is dropped.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive;
use crate::defaults::ArtifactConfig;
use crate::deploy::ReleasePayload;
use crate::digest::{self, DigestAlgorithm};
use crate::error::{Error, Result};
use crate::fetch::{self, FetchOptions};
use crate::release;
use crate::request::DeploymentRequest;

const WORKDIR_PREFIX: &str = "app";

/// A verified, extracted release owned by the current run.
#[derive(Debug)]
pub struct LocalArtifact {
    workdir: tempfile::TempDir,
    pub file_path: PathBuf,
    pub extracted_dir: PathBuf,
    pub binary_path: PathBuf,
    pub digest_file_path: PathBuf,
    /// Digest of `binary_path`, computed once while checking the sidecar.
    pub binary_digest: String,
    pub release_name: String,
}

/// Serializable view of a prepared artifact for command output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    pub package_name: String,
    pub release_name: String,
    pub binary_digest: String,
    pub archive_verified: bool,
}

impl LocalArtifact {
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Top-level entries of the extracted release, in name order.
    pub fn payload_entries(&self) -> Result<Vec<PathBuf>> {
        let read = fs::read_dir(&self.extracted_dir).map_err(|e| {
            Error::internal_io(
                e.to_string(),
                Some(format!("list {}", self.extracted_dir.display())),
            )
        })?;

        let mut entries = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| {
                Error::internal_io(
                    e.to_string(),
                    Some(format!("list {}", self.extracted_dir.display())),
                )
            })?;
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    /// What the orchestrator ships to every host.
    pub fn payload(&self) -> Result<ReleasePayload> {
        Ok(ReleasePayload {
            release_name: self.release_name.clone(),
            entries: self.payload_entries()?,
            staging_dir: self.workdir().to_path_buf(),
        })
    }
}

/// Create the per-run working directory.
pub fn create_workdir() -> Result<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix(WORKDIR_PREFIX)
        .tempdir()
        .map_err(|e| Error::internal_io(e.to_string(), Some("create working directory".to_string())))
}

/// Download the package named by `request` and prepare it.
pub fn fetch_and_prepare(
    request: &DeploymentRequest,
    config: &ArtifactConfig,
) -> Result<LocalArtifact> {
    let workdir = create_workdir()?;
    let options = FetchOptions {
        timeout: config.fetch_timeout(),
        max_redirects: config.max_redirects,
    };
    let archive = fetch::fetch(
        &config.base_url,
        request.package_name(),
        workdir.path(),
        &options,
    )?;
    prepare(workdir, &archive, request, config.digest_algorithm)
}

/// Verify and unpack an archive already sitting in `workdir`.
///
/// Order matters: the archive digest (if requested) is checked before
/// anything is extracted, and the binary digest before anything is returned.
pub fn prepare(
    workdir: tempfile::TempDir,
    archive: &Path,
    request: &DeploymentRequest,
    algorithm: DigestAlgorithm,
) -> Result<LocalArtifact> {
    if let Some(expected) = request.archive_digest() {
        digest::require_digest(archive, expected, algorithm).map_err(|e| {
            e.with_hint("The downloaded archive does not match --md5Value; nothing was deployed")
        })?;
        log_status!("digest", "Archive digest matches");
    }

    let release_name = release::derive_release_name(request.package_name())?;

    archive::extract_tar_gz(archive, workdir.path())?;

    let extracted_dir = locate_payload(workdir.path(), request.package_name(), &release_name)
        .ok_or_else(|| {
            Error::extract_failed(
                archive.display().to_string(),
                format!(
                    "archive has no top-level '{}' or '{}' directory",
                    release::strip_archive_suffix(request.package_name())
                        .unwrap_or(request.package_name()),
                    release_name
                ),
                None,
            )
        })?;

    let binary_path = extracted_dir.join(request.app_name());
    let digest_file_path = extracted_dir.join(format!(
        "{}.{}",
        request.app_name(),
        algorithm.sidecar_extension()
    ));
    let binary_digest = digest::require_sidecar(&binary_path, &digest_file_path, algorithm)?;
    log_status!(
        "digest",
        "{} matches {}",
        binary_path.display(),
        digest_file_path.display()
    );

    Ok(LocalArtifact {
        workdir,
        file_path: archive.to_path_buf(),
        extracted_dir,
        binary_path,
        digest_file_path,
        binary_digest,
        release_name,
    })
}

/// Payload directory: the package stem, falling back to the release name.
fn locate_payload(workdir: &Path, package_name: &str, release_name: &str) -> Option<PathBuf> {
    let stem = release::strip_archive_suffix(package_name)?;
    [stem, release_name]
        .iter()
        .map(|name| workdir.join(name))
        .find(|path| path.is_dir())
}

pub fn summarize(artifact: &LocalArtifact, request: &DeploymentRequest) -> ArtifactSummary {
    ArtifactSummary {
        package_name: request.package_name().to_string(),
        release_name: artifact.release_name.clone(),
        binary_digest: artifact.binary_digest.clone(),
        archive_verified: request.archive_digest().is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DigestCheck;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::File;

    const BINARY: &[u8] = b"\x7fELF fake binary";

    fn request(check: DigestCheck, expected: Option<&str>) -> DeploymentRequest {
        DeploymentRequest::new(
            "build_42_myapp.tar.gz",
            "myapp",
            check,
            expected,
            vec!["10.0.0.5".to_string()],
        )
        .unwrap()
    }

    fn append(builder: &mut tar::Builder<GzEncoder<File>>, path: &str, body: &[u8], mode: u32) {
        let mut header = tar::Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(body.len() as u64);
        header.set_mode(mode);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, body).unwrap();
    }

    fn package(dir: &Path, top: &str, sidecar: &str) -> PathBuf {
        let path = dir.join("build_42_myapp.tar.gz");
        let mut builder =
            tar::Builder::new(GzEncoder::new(File::create(&path).unwrap(), Compression::fast()));
        append(&mut builder, &format!("{}/myapp", top), BINARY, 0o755);
        append(
            &mut builder,
            &format!("{}/myapp.md5sum", top),
            sidecar.as_bytes(),
            0o644,
        );
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    fn binary_md5() -> String {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bin");
        fs::write(&path, BINARY).unwrap();
        digest::compute_digest(&path, DigestAlgorithm::Md5).unwrap()
    }

    #[test]
    fn prepares_package_stem_layout() {
        let workdir = create_workdir().unwrap();
        let archive = package(workdir.path(), "build_42_myapp", &format!("{}\n", binary_md5()));

        let artifact = prepare(
            workdir,
            &archive,
            &request(DigestCheck::Skip, None),
            DigestAlgorithm::Md5,
        )
        .unwrap();

        assert_eq!(artifact.release_name, "myapp");
        assert!(artifact.extracted_dir.ends_with("build_42_myapp"));
        assert_eq!(fs::read(&artifact.binary_path).unwrap(), BINARY);
        let payload = artifact.payload().unwrap();
        assert_eq!(payload.release_name, "myapp");
        assert_eq!(payload.entries.len(), 2);
        assert_eq!(payload.staging_dir, artifact.workdir());
    }

    #[test]
    fn falls_back_to_release_name_directory() {
        let workdir = create_workdir().unwrap();
        let archive = package(workdir.path(), "myapp", &binary_md5());

        let artifact = prepare(
            workdir,
            &archive,
            &request(DigestCheck::Skip, None),
            DigestAlgorithm::Md5,
        )
        .unwrap();
        assert!(artifact.extracted_dir.ends_with("myapp"));
    }

    #[test]
    fn wrong_archive_digest_stops_before_extraction() {
        let workdir = create_workdir().unwrap();
        let root = workdir.path().to_path_buf();
        let archive = package(&root, "build_42_myapp", &binary_md5());

        let err = prepare(
            workdir,
            &archive,
            &request(DigestCheck::Verify, Some("0000")),
            DigestAlgorithm::Md5,
        )
        .unwrap_err();

        assert_eq!(err.code.as_str(), "digest.mismatch");
        assert!(!root.join("build_42_myapp").exists());
    }

    #[test]
    fn binary_sidecar_mismatch_is_rejected() {
        let workdir = create_workdir().unwrap();
        let archive = package(workdir.path(), "build_42_myapp", "ffffffffffffffffffffffffffffffff");

        let err = prepare(
            workdir,
            &archive,
            &request(DigestCheck::Skip, None),
            DigestAlgorithm::Md5,
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "digest.mismatch");
    }

    #[test]
    fn matching_archive_digest_passes() {
        let workdir = create_workdir().unwrap();
        let archive = package(workdir.path(), "build_42_myapp", &binary_md5());
        let archive_md5 = digest::compute_digest(&archive, DigestAlgorithm::Md5).unwrap();

        let artifact = prepare(
            workdir,
            &archive,
            &request(DigestCheck::Verify, Some(&archive_md5)),
            DigestAlgorithm::Md5,
        )
        .unwrap();
        let summary = summarize(&artifact, &request(DigestCheck::Verify, Some(&archive_md5)));
        assert!(summary.archive_verified);
        assert_eq!(summary.binary_digest, binary_md5());
    }

    #[test]
    fn summary_reports_digest_from_preparation() {
        let workdir = create_workdir().unwrap();
        let archive = package(workdir.path(), "build_42_myapp", &binary_md5());
        let artifact = prepare(
            workdir,
            &archive,
            &request(DigestCheck::Skip, None),
            DigestAlgorithm::Md5,
        )
        .unwrap();
        assert_eq!(artifact.binary_digest, binary_md5());

        // Summarizing must not read the binary again.
        fs::remove_file(&artifact.binary_path).unwrap();
        let summary = summarize(&artifact, &request(DigestCheck::Skip, None));
        assert_eq!(summary.binary_digest, binary_md5());
        assert!(!summary.archive_verified);
    }

    #[test]
    fn padded_archive_digest_is_a_mismatch() {
        let workdir = create_workdir().unwrap();
        let archive = package(workdir.path(), "build_42_myapp", &binary_md5());
        let archive_md5 = digest::compute_digest(&archive, DigestAlgorithm::Md5).unwrap();

        let err = prepare(
            workdir,
            &archive,
            &request(DigestCheck::Verify, Some(&format!("{}\n", archive_md5))),
            DigestAlgorithm::Md5,
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "digest.mismatch");
    }

    #[test]
    fn workdir_removed_on_drop() {
        let workdir = create_workdir().unwrap();
        let archive = package(workdir.path(), "build_42_myapp", &binary_md5());
        let artifact = prepare(
            workdir,
            &archive,
            &request(DigestCheck::Skip, None),
            DigestAlgorithm::Md5,
        )
        .unwrap();
        let root = artifact.workdir().to_path_buf();
        assert!(root.exists());
        drop(artifact);
        assert!(!root.exists());
    }
}
