//! Report file discovery.
//!
//! Finds the files of a batch run in a directory using a glob pattern
//! (default `*.csv`), optionally descending into subdirectories.

use crate::error::{EtlError, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct FileDiscovery {
    directory: PathBuf,
    pattern: String,
    recursive: bool,
}

impl FileDiscovery {
    pub fn new(directory: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            pattern: pattern.into(),
            recursive: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Matching files sorted by path
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.directory.is_dir() {
            return Err(EtlError::FileNotFound {
                path: self.directory.clone(),
            });
        }

        let pattern = Pattern::new(&self.pattern).map_err(|e| EtlError::Configuration {
            message: format!("Invalid file pattern '{}': {}", self.pattern, e),
        })?;

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.directory).min_depth(1).max_depth(max_depth) {
            let entry = entry.map_err(|e| EtlError::Io(e.into()))?;
            if entry.file_type().is_file() && matches_name(&pattern, entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();

        debug!(
            "Found {} files matching '{}' in {}",
            files.len(),
            self.pattern,
            self.directory.display()
        );
        Ok(files)
    }
}

fn matches_name(pattern: &Pattern, path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| pattern.matches(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_report_tree(temp_dir: &TempDir) -> PathBuf {
        let root = temp_dir.path().join("reports");
        let nested = root.join("2024").join("01");
        fs::create_dir_all(&nested).unwrap();

        fs::write(root.join("b_plant.csv"), "data").unwrap();
        fs::write(root.join("a_plant.csv"), "data").unwrap();
        fs::write(root.join("notes.txt"), "data").unwrap();
        fs::write(nested.join("c_plant.csv"), "data").unwrap();
        root
    }

    #[test]
    fn test_discover_sorted_top_level() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_report_tree(&temp_dir);

        let files = FileDiscovery::new(&root, "*.csv").discover().unwrap();
        assert_eq!(files, vec![root.join("a_plant.csv"), root.join("b_plant.csv")]);
    }

    #[test]
    fn test_discover_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_report_tree(&temp_dir);

        let files = FileDiscovery::new(&root, "*.csv")
            .recursive(true)
            .discover()
            .unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.contains(&root.join("2024").join("01").join("c_plant.csv")));
    }

    #[test]
    fn test_custom_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_report_tree(&temp_dir);

        let files = FileDiscovery::new(&root, "*.txt").discover().unwrap();
        assert_eq!(files, vec![root.join("notes.txt")]);
    }

    #[test]
    fn test_missing_directory() {
        let result = FileDiscovery::new("/nonexistent/reports", "*.csv").discover();
        assert!(matches!(result, Err(EtlError::FileNotFound { .. })));
    }

    #[test]
    fn test_invalid_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileDiscovery::new(temp_dir.path(), "[").discover();
        assert!(matches!(result, Err(EtlError::Configuration { .. })));
    }
}
