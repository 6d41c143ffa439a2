//! File I/O with consistent error handling.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Read a small text file and trim surrounding whitespace.
pub fn read_trimmed(path: &Path, operation: &str) -> Result<String> {
    fs::read_to_string(path)
        .map(|content| content.trim().to_string())
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Write content to file with standardized error handling.
pub fn write_file(path: &Path, content: &str, operation: &str) -> Result<()> {
    fs::write(path, content)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}
