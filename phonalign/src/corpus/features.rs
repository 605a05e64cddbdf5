//! Audio feature provider
//!
//! Feature extraction itself is delegated to the engine's HCopy tool. This
//! module only routes files: it lists audio, writes the `audio feature` pair
//! list and the extraction config, and collects the produced feature files.

use crate::engine::{run_checked, Engine, Invocation, Tool};
use crate::error::{Result, TrainingError};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{info, warn};
use walkdir::WalkDir;

pub const AUDIO_EXT: &str = "wav";
pub const FEATURE_EXT: &str = "mfc";

/// Turns a directory of audio into one feature file per audio file
#[async_trait]
pub trait FeatureProvider: Send + Sync {
    /// Returns the produced feature files, sorted by path
    async fn extract(&self, audio_dir: &Path, target_dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Feature extraction through HCopy
pub struct HCopyFeatures {
    engine: Arc<dyn Engine>,
    params: Vec<(String, String)>,
}

impl HCopyFeatures {
    pub fn new(engine: Arc<dyn Engine>, params: Vec<(String, String)>) -> Self {
        Self { engine, params }
    }
}

#[async_trait]
impl FeatureProvider for HCopyFeatures {
    async fn extract(&self, audio_dir: &Path, target_dir: &Path) -> Result<Vec<PathBuf>> {
        if !target_dir.is_dir() {
            return Err(TrainingError::Precondition(format!(
                "feature directory does not exist: {}",
                target_dir.display()
            )));
        }
        if std::fs::read_dir(target_dir)?.next().is_some() {
            warn!(dir = %target_dir.display(), "Feature directory is not empty");
        }

        let audio = collect_files(audio_dir, AUDIO_EXT)?;
        let pairs: Vec<(PathBuf, PathBuf)> = audio
            .iter()
            .map(|wav| (wav.clone(), feature_path_for(wav, target_dir)))
            .collect();

        let conf = write_config(&self.params)?;
        let scp = write_scratch(&render_pairs(&pairs))?;

        let invocation = Invocation::new(Tool::HCopy)
            .arg("-C")
            .arg(conf.path())
            .arg("-S")
            .arg(scp.path());
        run_checked(self.engine.as_ref(), &invocation).await?;

        info!(files = pairs.len(), dir = %target_dir.display(), "Features extracted");
        Ok(pairs.into_iter().map(|(_, feat)| feat).collect())
    }
}

fn feature_path_for(audio: &Path, target_dir: &Path) -> PathBuf {
    let mut name = audio.file_stem().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(FEATURE_EXT);
    target_dir.join(name)
}

fn render_pairs(pairs: &[(PathBuf, PathBuf)]) -> String {
    let mut out = String::new();
    for (audio, feature) in pairs {
        let _ = writeln!(out, "{} {}", audio.display(), feature.display());
    }
    out
}

/// Files directly inside `dir` with extension `ext`, sorted
pub fn collect_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(TrainingError::Precondition(format!(
            "not an existing directory: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path
                .extension()
                .map_or(false, |e| e.eq_ignore_ascii_case(ext))
        {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Basenames (file stems) of `paths`
pub fn basenames(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .collect()
}

/// Engine config file with one `KEY = value` line per parameter
pub fn write_config(params: &[(String, String)]) -> Result<NamedTempFile> {
    let mut text = String::new();
    for (key, value) in params {
        let _ = writeln!(text, "{} = {}", key, value);
    }
    write_scratch(&text)
}

/// Feature list (one path per line)
pub fn write_feature_list(features: &[PathBuf]) -> Result<NamedTempFile> {
    let mut text = String::new();
    for path in features {
        let _ = writeln!(text, "{}", path.display());
    }
    write_scratch(&text)
}

/// Stage-scoped scratch file; removed when the handle drops
pub fn write_scratch(contents: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().prefix("phonalign-").tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}
