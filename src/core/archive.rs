//! Gzip-compressed tar extraction.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Counts of what an extraction produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub directories: usize,
    pub files: usize,
    pub skipped: usize,
}

/// Stream `archive` (tar.gz) into `dest`, recreating directories and regular
/// files with their recorded permission bits. Other entry types are skipped.
///
/// Any failure aborts; `dest` may then hold a partial tree and must not be used.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<ExtractStats> {
    let archive_label = archive.display().to_string();
    let file = File::open(archive)
        .map_err(|e| Error::extract_failed(&archive_label, e.to_string(), None))?;

    let mut reader = tar::Archive::new(GzDecoder::new(file));
    let entries = reader
        .entries()
        .map_err(|e| Error::extract_failed(&archive_label, e.to_string(), None))?;

    let mut stats = ExtractStats::default();

    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::extract_failed(&archive_label, e.to_string(), None))?;

        let entry_path = entry
            .path()
            .map_err(|e| Error::extract_failed(&archive_label, e.to_string(), None))?
            .into_owned();
        let entry_label = entry_path.display().to_string();
        let fail = |e: io::Error| {
            Error::extract_failed(&archive_label, e.to_string(), Some(entry_label.clone()))
        };

        let target = safe_join(dest, &entry_path).ok_or_else(|| {
            Error::extract_failed(
                &archive_label,
                "entry path escapes the destination directory",
                Some(entry_label.clone()),
            )
        })?;
        let mode = entry.header().mode().map_err(&fail)?;
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() {
            fs::create_dir_all(&target).map_err(&fail)?;
            set_mode(&target, mode).map_err(&fail)?;
            stats.directories += 1;
        } else if entry_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(&fail)?;
            }
            let mut out = File::create(&target).map_err(&fail)?;
            io::copy(&mut entry, &mut out).map_err(&fail)?;
            drop(out);
            set_mode(&target, mode).map_err(&fail)?;
            stats.files += 1;
        } else {
            log_status!(
                "extract",
                "Skipping unsupported entry type {:?}: {}",
                entry_type,
                entry_label
            );
            stats.skipped += 1;
        }
    }

    log_status!(
        "extract",
        "Extracted {} ({} dirs, {} files, {} skipped)",
        archive_label,
        stats.directories,
        stats.files,
        stats.skipped
    );

    Ok(stats)
}

/// Join an archive entry path onto `dest`, refusing absolute paths and `..`.
fn safe_join(dest: &Path, entry: &Path) -> Option<PathBuf> {
    let mut target = dest.to_path_buf();
    for component in entry.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(target)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
