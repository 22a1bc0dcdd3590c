//! Temporary state directories for persistence and restart tests.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A throwaway state directory, removed on drop.
pub struct StateDir {
    dir: TempDir,
}

impl StateDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp state dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the directory (not created).
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a reference file with one reference per line.
    pub fn seed_references(&self, name: &str, references: &[&str]) -> PathBuf {
        let path = self.file(name);
        std::fs::write(&path, references.join("\n")).expect("failed to seed reference file");
        path
    }

    /// Read a file back as lines, ignoring blanks.
    pub fn read_lines(&self, name: &str) -> Vec<String> {
        std::fs::read_to_string(self.file(name))
            .unwrap_or_default()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for StateDir {
    fn default() -> Self {
        Self::new()
    }
}
