//! Versioned model snapshots
//!
//! Each iteration lives in `<root>/hmm<N>` and is never modified once it
//! exists. Engine output is written into a hidden staging directory inside
//! the root and renamed into place by [`ModelStore::commit`]; an uncommitted
//! staging directory is removed when it is dropped.

use crate::error::{Result, TrainingError};
use crate::models::snapshot::{ModelSnapshot, UnitBundle, HMMDEFS_FILE, MACROS_FILE};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Paths of a snapshot's two definition files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFiles {
    pub macros: PathBuf,
    pub hmmdefs: PathBuf,
}

impl SnapshotFiles {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            macros: dir.join(MACROS_FILE),
            hmmdefs: dir.join(HMMDEFS_FILE),
        }
    }

    fn both_exist(&self) -> bool {
        self.macros.is_file() && self.hmmdefs.is_file()
    }
}

/// Output directory for a snapshot that has not been committed yet
#[derive(Debug)]
pub struct StagedSnapshot {
    iteration: u32,
    dir: TempDir,
}

impl StagedSnapshot {
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn files(&self) -> SnapshotFiles {
        SnapshotFiles::in_dir(self.dir.path())
    }
}

/// Directory of numbered model snapshots
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    /// Open (creating if needed) the snapshot root
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self, iteration: u32) -> PathBuf {
        self.root.join(format!("hmm{}", iteration))
    }

    pub fn exists(&self, iteration: u32) -> bool {
        self.snapshot_path(iteration).exists()
    }

    /// Locate the definition files of a committed snapshot
    pub fn read_snapshot(&self, iteration: u32) -> Result<SnapshotFiles> {
        let dir = self.snapshot_path(iteration);
        let files = SnapshotFiles::in_dir(&dir);
        for path in [&files.macros, &files.hmmdefs] {
            if !path.is_file() {
                return Err(TrainingError::SnapshotMissing {
                    iteration,
                    path: path.clone(),
                });
            }
        }
        Ok(files)
    }

    /// Parse a committed snapshot back into memory
    pub fn load_snapshot(&self, iteration: u32) -> Result<ModelSnapshot> {
        let files = self.read_snapshot(iteration)?;
        let macros = std::fs::read_to_string(&files.macros)?;
        let hmmdefs = std::fs::read_to_string(&files.hmmdefs)?;
        Ok(ModelSnapshot {
            macros,
            bundle: UnitBundle::parse(&hmmdefs)?,
        })
    }

    /// Write a snapshot produced in memory as iteration `iteration`
    pub fn write_snapshot(&self, iteration: u32, snapshot: &ModelSnapshot) -> Result<PathBuf> {
        let staged = self.stage(iteration)?;
        let files = staged.files();
        std::fs::write(&files.macros, &snapshot.macros)?;
        std::fs::write(&files.hmmdefs, snapshot.bundle.serialize())?;
        self.commit(staged)
    }

    /// Reserve a staging directory for iteration `iteration`
    pub fn stage(&self, iteration: u32) -> Result<StagedSnapshot> {
        let target = self.snapshot_path(iteration);
        if target.exists() {
            return Err(TrainingError::SnapshotCollision(target));
        }

        let dir = tempfile::Builder::new()
            .prefix(&format!(".staging-hmm{}-", iteration))
            .tempdir_in(&self.root)?;
        debug!(iteration, staging = %dir.path().display(), "Snapshot staged");
        Ok(StagedSnapshot { iteration, dir })
    }

    /// Move a staged snapshot to its final `hmm<N>` directory
    pub fn commit(&self, staged: StagedSnapshot) -> Result<PathBuf> {
        let iteration = staged.iteration;
        let target = self.snapshot_path(iteration);

        if target.exists() {
            return Err(TrainingError::SnapshotCollision(target));
        }
        if !staged.files().both_exist() {
            return Err(TrainingError::MalformedModel(format!(
                "iteration {} produced no {} and {}",
                iteration, MACROS_FILE, HMMDEFS_FILE
            )));
        }

        std::fs::rename(staged.path(), &target)?;
        // The emptied TempDir handle drops without effect
        drop(staged);

        info!(iteration, path = %target.display(), "Snapshot committed");
        Ok(target)
    }
}
