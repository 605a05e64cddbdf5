//! Working directory layout
//!
//! ```text
//! <root>/etc        dictionaries, label files, unit lists, statistics
//! <root>/feats      corpus features
//! <root>/bootfeats  bootstrap features
//! <root>/models     hmm<N> snapshots and session.json
//! <root>/labels     alignment output
//! ```

use crate::error::{Result, TrainingError};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    root: PathBuf,
}

impl SessionLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory tree. Fails when `root` already holds a
    /// session record or model snapshots.
    pub fn create(&self) -> Result<()> {
        if self.holds_session()? {
            return Err(TrainingError::Precondition(format!(
                "working directory {} already holds a training session",
                self.root.display()
            )));
        }
        if self.root.exists() {
            tracing::warn!(dir = %self.root.display(), "Working directory already exists");
        }
        for dir in [
            self.etc_dir(),
            self.feats_dir(),
            self.bootfeats_dir(),
            self.models_dir(),
            self.labels_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// True when `models` has a `session.json` or any `hmm*` entry
    pub fn holds_session(&self) -> Result<bool> {
        if self.session_file().exists() {
            return Ok(true);
        }
        let models = self.models_dir();
        if !models.is_dir() {
            return Ok(false);
        }
        for entry in std::fs::read_dir(models)? {
            if entry?.file_name().to_string_lossy().starts_with("hmm") {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Remove `feats`, `bootfeats` and `models`
    pub fn cleanup(&self) -> Result<()> {
        info!(dir = %self.root.display(), "Removing features and models");
        for dir in [self.feats_dir(), self.bootfeats_dir(), self.models_dir()] {
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn etc_dir(&self) -> PathBuf {
        self.root.join("etc")
    }

    pub fn feats_dir(&self) -> PathBuf {
        self.root.join("feats")
    }

    pub fn bootfeats_dir(&self) -> PathBuf {
        self.root.join("bootfeats")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn labels_dir(&self) -> PathBuf {
        self.root.join("labels")
    }

    pub fn monophones_file(&self) -> PathBuf {
        self.etc_dir().join("monophones")
    }

    pub fn triphones_file(&self) -> PathBuf {
        self.etc_dir().join("triphones")
    }

    pub fn stats_file(&self) -> PathBuf {
        self.etc_dir().join("hereststats")
    }

    pub fn dictionary(&self) -> PathBuf {
        self.etc_dir().join("main.dict")
    }

    pub fn triphone_dictionary(&self) -> PathBuf {
        self.etc_dir().join("triphones.dict")
    }

    pub fn word_labels(&self) -> PathBuf {
        self.etc_dir().join("words.mlf")
    }

    pub fn phone_labels(&self) -> PathBuf {
        self.etc_dir().join("phones.mlf")
    }

    pub fn triphone_labels(&self) -> PathBuf {
        self.etc_dir().join("triphones.mlf")
    }

    pub fn boot_labels(&self) -> PathBuf {
        self.etc_dir().join("boot.mlf")
    }

    pub fn session_file(&self) -> PathBuf {
        self.models_dir().join("session.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_cleanup() {
        let temp = TempDir::new().unwrap();
        let layout = SessionLayout::new(temp.path().join("work"));

        layout.create().unwrap();
        assert!(layout.etc_dir().is_dir());
        assert!(layout.labels_dir().is_dir());

        std::fs::write(layout.models_dir().join("x"), "").unwrap();
        layout.cleanup().unwrap();

        assert!(!layout.models_dir().exists());
        assert!(!layout.feats_dir().exists());
        assert!(layout.etc_dir().is_dir());
        assert!(layout.labels_dir().is_dir());
    }

    #[test]
    fn test_create_refuses_existing_session() {
        let temp = TempDir::new().unwrap();
        let layout = SessionLayout::new(temp.path().join("work"));
        layout.create().unwrap();

        // Empty tree from an earlier create is reusable
        layout.create().unwrap();

        std::fs::create_dir(layout.models_dir().join("hmm0")).unwrap();
        assert!(layout.holds_session().unwrap());
        let err = layout.create().unwrap_err();
        assert!(matches!(err, TrainingError::Precondition(_)));

        std::fs::remove_dir(layout.models_dir().join("hmm0")).unwrap();
        std::fs::write(layout.session_file(), "{}").unwrap();
        assert!(matches!(
            layout.create().unwrap_err(),
            TrainingError::Precondition(_)
        ));
    }
}
