// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! All-or-nothing publication of a group of artifacts.
//!
//! Each artifact is written to `<name>.partial` in the target directory.
//! [`ArtifactTransaction::commit`] renames every staged file to its final
//! name; dropping an uncommitted transaction removes the staged files.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Result, SerializationError};

const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug)]
pub struct ArtifactTransaction {
    dir: PathBuf,
    /// (staged path, final path)
    staged: Vec<(PathBuf, PathBuf)>,
    committed: bool,
}

impl ArtifactTransaction {
    /// Start a transaction in `dir`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| SerializationError::io(&dir, e))?;
        Ok(Self {
            dir,
            staged: Vec::new(),
            committed: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve `file_name` and return the path to write it to
    pub fn stage(&mut self, file_name: &str) -> PathBuf {
        let final_path = self.dir.join(file_name);
        let staged_path = self.dir.join(format!("{}{}", file_name, PARTIAL_SUFFIX));
        self.staged.push((staged_path.clone(), final_path));
        staged_path
    }

    /// Stage `file_name` and write it with `write`
    pub fn write_with<F>(&mut self, file_name: &str, write: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let path = self.stage(file_name);
        write(&path)
    }

    /// Final paths of the staged artifacts, in staging order
    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        self.staged.iter().map(|(_, final_path)| final_path.as_path())
    }

    /// Publish every staged artifact
    pub fn commit(mut self) -> Result<Vec<PathBuf>> {
        for (staged, final_path) in &self.staged {
            std::fs::rename(staged, final_path).map_err(|e| SerializationError::io(staged, e))?;
        }
        self.committed = true;
        let published: Vec<PathBuf> = self.staged.drain(..).map(|(_, p)| p).collect();
        debug!(
            target: "tractograph-serialization",
            "Published {} artifacts in {}",
            published.len(),
            self.dir.display()
        );
        Ok(published)
    }
}

impl Drop for ArtifactTransaction {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for (staged, _) in &self.staged {
            match std::fs::remove_file(staged) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    target: "tractograph-serialization",
                    "Failed to remove staged artifact {}: {}",
                    staged.display(),
                    e
                ),
            }
        }
    }
}
