//! Configuration loading and path resolution
//!
//! A training run is described by one TOML file. Relative paths inside the
//! file are resolved against the directory holding the file.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "PHONALIGN_CONFIG";

/// Environment variable overriding the working directory
pub const WORKING_DIR_ENV_VAR: &str = "PHONALIGN_WORKING_DIR";

/// Complete training configuration (one TOML document)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrainingConfig {
    /// Directory receiving `etc`, `feats`, `models` and `labels`
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub parms: ParmsConfig,

    #[serde(default)]
    pub switches: SwitchesConfig,

    #[serde(default)]
    pub training: StageCounts,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Corpus and model resources
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    /// Directory of audio files (feature extraction input)
    pub audio: Option<PathBuf>,
    /// Directory of already extracted feature files (skips extraction)
    pub features_dir: Option<PathBuf>,
    /// Word-level master label file
    pub orthographic_labels: Option<PathBuf>,
    /// Pronunciation dictionary for the orthographic labels
    pub pronunciation_dictionary: Option<PathBuf>,
    /// Phone-level master label file
    pub phonetic_labels: Option<PathBuf>,
    /// `phone category` map for the corpus phone set (mapped bootstrapping)
    pub phonetic_map: Option<PathBuf>,
    /// `phone category` map for the bootstrap phone set (mapped bootstrapping)
    pub boot_map: Option<PathBuf>,
    /// Directory of bootstrap audio
    pub boot_audio: Option<PathBuf>,
    /// Time-marked phone labels for the bootstrap audio
    pub boot_labels: Option<PathBuf>,
    /// HMM prototype definition
    pub hmm_prototype: Option<PathBuf>,
    /// Hand-written state-tying script used instead of generated questions
    pub questions: Option<PathBuf>,
}

/// Unit naming parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ParmsConfig {
    #[serde(default = "default_silence_phone")]
    pub silence_phone: String,
    pub silence_word: Option<String>,
    pub short_pause_phone: Option<String>,
}

impl Default for ParmsConfig {
    fn default() -> Self {
        Self {
            silence_phone: default_silence_phone(),
            silence_word: None,
            short_pause_phone: None,
        }
    }
}

fn default_silence_phone() -> String {
    "sil".to_string()
}

/// Behaviour switches
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchesConfig {
    /// Train context-dependent (triphone) models
    #[serde(default)]
    pub context_dependent: bool,
    /// Target number of Gaussian mixtures per state
    #[serde(default = "default_mixtures")]
    pub mixtures_per_state: u32,
    /// Bootstrap from labels written in a coarser phone set
    #[serde(default)]
    pub mapped_bootstrap: bool,
    /// Remove `feats`, `bootfeats` and `models` after a successful run
    #[serde(default)]
    pub post_cleanup: bool,
}

impl Default for SwitchesConfig {
    fn default() -> Self {
        Self {
            context_dependent: false,
            mixtures_per_state: default_mixtures(),
            mapped_bootstrap: false,
            post_cleanup: false,
        }
    }
}

fn default_mixtures() -> u32 {
    1
}

/// Number of re-estimation passes run by each pipeline section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StageCounts {
    /// Passes directly after a flat start
    pub init_reestimations: u32,
    /// Passes after the silence fix (alignment pipeline)
    pub align_reestimations: u32,
    /// Passes before realignment
    pub realign_pre: u32,
    /// Passes after realignment
    pub realign_post: u32,
    /// Passes after state tying
    pub tied_reestimations: u32,
}

impl Default for StageCounts {
    fn default() -> Self {
        Self {
            init_reestimations: 3,
            align_reestimations: 5,
            realign_pre: 2,
            realign_post: 2,
            tied_reestimations: 2,
        }
    }
}

/// External engine settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the engine binaries (PATH lookup when absent)
    pub bin_dir: Option<PathBuf>,
    /// Units initialised concurrently during bootstrapping
    pub bootstrap_parallelism: usize,
    /// Re-estimation pruning beam: initial, increment, limit
    pub pruning: [f64; 3],
    /// Variance floor scale used by the flat start
    pub variance_floor: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bin_dir: None,
            bootstrap_parallelism: 1,
            pruning: [250.0, 150.0, 1000.0],
            variance_floor: 0.01,
        }
    }
}

/// Feature interpretation parameters, rendered as `KEY = value` engine configs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub hcopy: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub hcompv_hvite: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub global: BTreeMap<String, toml::Value>,
}

impl FeatureConfig {
    /// Parameters for feature extraction (extraction section + global)
    pub fn extraction_params(&self) -> Vec<(String, String)> {
        render_params(&self.hcopy, &self.global)
    }

    /// Parameters for training and decoding (interpretation section + global)
    pub fn interpretation_params(&self) -> Vec<(String, String)> {
        render_params(&self.hcompv_hvite, &self.global)
    }
}

fn render_params(
    section: &BTreeMap<String, toml::Value>,
    global: &BTreeMap<String, toml::Value>,
) -> Vec<(String, String)> {
    section
        .iter()
        .chain(global.iter())
        .map(|(key, value)| (key.to_uppercase(), render_value(value)))
        .collect()
}

/// Render a TOML value the way the engine's config reader expects it
///
/// Strings are written bare; everything else uses its TOML form.
pub fn render_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TrainingConfig {
    /// Parse a configuration document without resolving paths
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load, resolve relative paths and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::NotFound(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_relative_to(base);
        config.validate()?;

        info!(config = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Make every relative path absolute with respect to `base`
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut Option<PathBuf>| {
            if let Some(path) = p.as_mut() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        };

        resolve(&mut self.working_dir);
        let s = &mut self.source;
        for field in [
            &mut s.audio,
            &mut s.features_dir,
            &mut s.orthographic_labels,
            &mut s.pronunciation_dictionary,
            &mut s.phonetic_labels,
            &mut s.phonetic_map,
            &mut s.boot_map,
            &mut s.boot_audio,
            &mut s.boot_labels,
            &mut s.hmm_prototype,
            &mut s.questions,
        ] {
            resolve(field);
        }
        resolve(&mut self.engine.bin_dir);
    }

    /// Check that the configuration describes a runnable session
    pub fn validate(&self) -> Result<()> {
        if self.source.hmm_prototype.is_none() {
            return Err(Error::Config("source.hmm_prototype is required".to_string()));
        }

        if !self.has_orthographic() && self.source.phonetic_labels.is_none() {
            return Err(Error::Config(
                "Transcriptions not sufficiently defined: need orthographic_labels with \
                 pronunciation_dictionary, or phonetic_labels"
                    .to_string(),
            ));
        }

        if self.source.audio.is_none() && self.source.features_dir.is_none() {
            return Err(Error::Config(
                "Either source.audio or source.features_dir must be given".to_string(),
            ));
        }

        if self.source.boot_labels.is_some() != self.source.boot_audio.is_some() {
            return Err(Error::Config(
                "source.boot_labels and source.boot_audio must be given together".to_string(),
            ));
        }

        if self.switches.mapped_bootstrap
            && (self.source.boot_map.is_none()
                || self.source.phonetic_map.is_none()
                || !self.has_bootstrap_data())
        {
            return Err(Error::Config(
                "switches.mapped_bootstrap requires bootstrap data, source.phonetic_map and \
                 source.boot_map"
                    .to_string(),
            ));
        }

        if self.switches.mixtures_per_state == 0 {
            return Err(Error::InvalidInput(
                "switches.mixtures_per_state must be at least 1".to_string(),
            ));
        }

        if self.engine.bootstrap_parallelism == 0 {
            return Err(Error::InvalidInput(
                "engine.bootstrap_parallelism must be at least 1".to_string(),
            ));
        }

        if self.parms.silence_phone.trim().is_empty() {
            return Err(Error::InvalidInput("parms.silence_phone is empty".to_string()));
        }

        Ok(())
    }

    /// Word transcriptions and a dictionary are both available
    pub fn has_orthographic(&self) -> bool {
        self.source.orthographic_labels.is_some() && self.source.pronunciation_dictionary.is_some()
    }

    /// Bootstrap audio and labels are both available
    pub fn has_bootstrap_data(&self) -> bool {
        self.source.boot_labels.is_some() && self.source.boot_audio.is_some()
    }
}

/// Configuration file resolution, in priority order:
/// 1. Command-line argument
/// 2. `PHONALIGN_CONFIG` environment variable
/// 3. `<config dir>/phonalign/config.toml` if it exists
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            debug!(env = CONFIG_ENV_VAR, "Configuration path taken from environment");
            return Ok(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("phonalign").join("config.toml"));
    match user_config {
        Some(path) if path.exists() => Ok(path),
        _ => Err(Error::Config(
            "No configuration file given (use --config or PHONALIGN_CONFIG)".to_string(),
        )),
    }
}

/// Working directory resolution, in priority order:
/// 1. Command-line argument
/// 2. `PHONALIGN_WORKING_DIR` environment variable
/// 3. `working_dir` from the TOML file
pub fn resolve_working_dir(cli_arg: Option<&Path>, config: &TrainingConfig) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(WORKING_DIR_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    config
        .working_dir
        .clone()
        .ok_or_else(|| Error::Config("working_dir not configured".to_string()))
}
