//! Criteria file loader.
//!
//! Resolves a path, reads the file, and decodes it into a [`Criteria`]
//! document. Every failure condition maps to a distinct error kind so the
//! orchestrator can log exactly what went wrong with which file.

use crate::schema::Criteria;
use std::path::{Path, PathBuf};

/// Error type for criteria loading operations.
#[derive(Debug)]
pub enum LoadError {
    /// The path was empty or whitespace-only.
    InvalidPath,
    /// The path could not be resolved to an absolute location.
    PathResolution(std::io::Error),
    /// The path does not exist.
    PathNotFound(PathBuf),
    /// The path is a directory, not a file.
    PathIsDirectory(PathBuf),
    /// The file exists but could not be read.
    ContentUnreadable(std::io::Error),
    /// The contents did not decode into the criteria schema.
    Decode(serde_yaml::Error),
    /// The document decoded but violates a schema invariant.
    InvalidCriteria(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::InvalidPath => {
                write!(f, "criteria path cannot be empty or whitespace")
            }
            LoadError::PathResolution(e) => {
                write!(f, "could not resolve absolute path: {e}")
            }
            LoadError::PathNotFound(p) => {
                write!(
                    f,
                    "path not found: {} (check it exists and you have read access)",
                    p.display()
                )
            }
            LoadError::PathIsDirectory(p) => {
                write!(f, "path is a directory, not a file: {}", p.display())
            }
            LoadError::ContentUnreadable(e) => write!(f, "failed to read file: {e}"),
            LoadError::Decode(e) => write!(f, "invalid YAML: {e}"),
            LoadError::InvalidCriteria(msg) => write!(f, "invalid criteria: {msg}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Load a criteria document from a file path.
pub fn load_criteria(path: &str) -> Result<Criteria, LoadError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(LoadError::InvalidPath);
    }

    let absolute = std::fs::canonicalize(trimmed).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LoadError::PathNotFound(PathBuf::from(trimmed))
        } else {
            LoadError::PathResolution(e)
        }
    })?;

    if absolute.is_dir() {
        return Err(LoadError::PathIsDirectory(absolute));
    }

    let contents = std::fs::read_to_string(&absolute).map_err(LoadError::ContentUnreadable)?;
    let criteria: Criteria = serde_yaml::from_str(&contents).map_err(LoadError::Decode)?;
    criteria.validate().map_err(LoadError::InvalidCriteria)?;

    Ok(criteria)
}

/// Find all criteria files under a path, or return the single file.
///
/// Directories are scanned recursively for `.yaml`/`.yml` files; results are
/// sorted for deterministic processing order.
pub fn find_criteria_files(path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    collect_criteria_recursive(path, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_criteria_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_criteria_recursive(&path, files)?;
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str())
            && (ext == "yaml" || ext == "yml")
        {
            files.push(path);
        }
    }
    Ok(())
}
