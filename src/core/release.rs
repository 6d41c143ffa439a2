use crate::error::{Error, Result};

/// Archive suffixes a package name may carry.
pub const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz"];

/// Leading underscore-delimited segments that carry build metadata.
const METADATA_SEGMENTS: usize = 2;

/// Package name with its archive suffix removed.
pub fn strip_archive_suffix(package_name: &str) -> Option<&str> {
    ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| package_name.strip_suffix(suffix))
}

/// Derive the per-release directory name from an artifact file name.
///
/// `build_42_myapp.tar.gz` -> `myapp`,
/// `web-api_dz_4f651c2_20250104171652.tar.gz` -> `4f651c2_20250104171652`.
pub fn derive_release_name(package_name: &str) -> Result<String> {
    let stem = strip_archive_suffix(package_name).ok_or_else(|| {
        Error::malformed_package_name(
            package_name,
            format!("must end with one of: {}", ARCHIVE_SUFFIXES.join(", ")),
        )
    })?;

    let segments: Vec<&str> = stem.split('_').collect();
    if segments.len() <= METADATA_SEGMENTS {
        return Err(Error::malformed_package_name(
            package_name,
            format!(
                "expected at least {} underscore-delimited segments, found {}",
                METADATA_SEGMENTS + 1,
                segments.len()
            ),
        ));
    }

    let name = segments[METADATA_SEGMENTS..].join("_");
    if name.is_empty() {
        return Err(Error::malformed_package_name(
            package_name,
            "release segment is empty",
        ));
    }

    // The name becomes a remote path component.
    if name.chars().all(|c| c == '.') || name.contains('/') {
        return Err(Error::malformed_package_name(
            package_name,
            format!("'{}' is not a usable release directory name", name),
        ));
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_two_metadata_segments() {
        assert_eq!(derive_release_name("build_42_myapp.tar.gz").unwrap(), "myapp");
        assert_eq!(
            derive_release_name("web-api_dz_4f651c2_20250104171652.tar.gz").unwrap(),
            "4f651c2_20250104171652"
        );
        assert_eq!(derive_release_name("a_b_c_d.tgz").unwrap(), "c_d");
    }

    #[test]
    fn is_deterministic() {
        let first = derive_release_name("build_7_api_v2.tar.gz").unwrap();
        let second = derive_release_name("build_7_api_v2.tar.gz").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fewer_than_three_segments_is_malformed() {
        for name in ["myapp.tar.gz", "build_myapp.tar.gz", ".tar.gz"] {
            let err = derive_release_name(name).unwrap_err();
            assert_eq!(err.code.as_str(), "release.malformed_package_name", "{}", name);
        }
    }

    #[test]
    fn trailing_empty_segment_is_malformed() {
        let err = derive_release_name("build_42_.tar.gz").unwrap_err();
        assert_eq!(err.code.as_str(), "release.malformed_package_name");
    }

    #[test]
    fn dot_only_release_is_malformed() {
        for name in ["build_42_..tar.gz", "build_42_...tar.gz", "build_42_....tgz"] {
            let err = derive_release_name(name).unwrap_err();
            assert_eq!(err.code.as_str(), "release.malformed_package_name", "{}", name);
        }
        assert_eq!(derive_release_name("build_42_v1.2.tar.gz").unwrap(), "v1.2");
    }

    #[test]
    fn unknown_suffix_is_malformed() {
        let err = derive_release_name("build_42_myapp.zip").unwrap_err();
        assert_eq!(err.code.as_str(), "release.malformed_package_name");
    }
}
