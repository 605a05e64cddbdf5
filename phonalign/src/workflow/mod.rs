//! Training workflow
//!
//! # Stage progression
//! INIT → [REESTIMATE]* → SIL_FIX → [REESTIMATE]* → TRIPHONE_CLONE →
//! REESTIMATE ×2 → STATE_TIE → [REESTIMATE]* → [MIXUP]* → ALIGN
//!
//! # Architecture
//! [`Trainer`] owns the engine, the model store and the session layout.
//! Each stage is an `impl Trainer` block in its own `stage_*` module that
//! consumes the current [`PipelineState`] and returns the next one. A stage
//! that fails returns the error without touching the store or the counter;
//! a stage that succeeds commits its snapshot, advances the state and
//! persists the session record.

pub mod layout;
pub mod pipeline;
pub mod prepare;

mod stage_align;
mod stage_init;
mod stage_mixup;
mod stage_reestimate;
mod stage_silence;
mod stage_triphone;

pub use layout::SessionLayout;
pub use pipeline::{run_training, PipelineVariant, TrainingPlan};
pub use prepare::{BootCorpus, FeatureSets, PreparedCorpus, TriphoneResources};
pub use stage_init::BootstrapData;
pub use stage_reestimate::average_log_prob;

use crate::corpus::features::{write_config, write_feature_list, write_scratch};
use crate::corpus::LabelEditor;
use crate::engine::{run_checked, Engine, Invocation, Tool};
use crate::error::{Result, TrainingError};
use crate::hed::{CommandScript, StateLayout};
use crate::models::snapshot::num_states_from_prototype;
use crate::models::{PhoneInventory, PipelineState, ShortPause, StageKind};
use crate::services::ModelStore;
use phonalign_common::config::TrainingConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Model topology of a training flavor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Topology {
    /// Short-pause unit name; `None` when the flavor has no short pause
    pub short_pause: Option<String>,
    /// Build the short pause as a tee unit tied to the silence middle state
    pub tee_model: bool,
}

impl Topology {
    pub fn standard() -> Self {
        Self::default()
    }

    pub fn with_tee(short_pause: impl Into<String>) -> Self {
        Self {
            short_pause: Some(short_pause.into()),
            tee_model: true,
        }
    }
}

/// Parameters shared by every stage
#[derive(Debug, Clone)]
pub struct TrainerSettings {
    pub prototype: PathBuf,
    pub silence: String,
    /// Word standing for silence in word-level labels and the dictionary
    pub silence_word: Option<String>,
    pub topology: Topology,
    /// Re-estimation pruning beam: initial, increment, limit
    pub pruning: [f64; 3],
    pub variance_floor: f64,
    /// `KEY = value` pairs of the feature interpretation config
    pub feature_params: Vec<(String, String)>,
    pub bootstrap_parallelism: usize,
}

impl TrainerSettings {
    pub fn from_config(config: &TrainingConfig, topology: Topology) -> Result<Self> {
        let prototype = config.source.hmm_prototype.clone().ok_or_else(|| {
            TrainingError::Precondition("no HMM prototype configured".to_string())
        })?;

        Ok(Self {
            prototype,
            silence: config.parms.silence_phone.clone(),
            silence_word: config.parms.silence_word.clone(),
            topology,
            pruning: config.engine.pruning,
            variance_floor: config.engine.variance_floor,
            feature_params: config.features.interpretation_params(),
            bootstrap_parallelism: config.engine.bootstrap_parallelism.max(1),
        })
    }
}

/// Drives the engine through the training stages of one session
pub struct Trainer {
    engine: Arc<dyn Engine>,
    store: ModelStore,
    layout: SessionLayout,
    settings: TrainerSettings,
    states: StateLayout,
    features: Vec<PathBuf>,
}

impl Trainer {
    /// `features` is the corpus feature list used by every corpus-wide stage
    pub fn new(
        engine: Arc<dyn Engine>,
        layout: SessionLayout,
        settings: TrainerSettings,
        features: Vec<PathBuf>,
    ) -> Result<Self> {
        if !settings.prototype.is_file() {
            return Err(TrainingError::Precondition(format!(
                "HMM prototype not found: {}",
                settings.prototype.display()
            )));
        }
        if features.is_empty() {
            return Err(TrainingError::Precondition(
                "no feature files to train on".to_string(),
            ));
        }

        let text = std::fs::read_to_string(&settings.prototype)?;
        let states = StateLayout::new(num_states_from_prototype(&text)?)?;
        let store = ModelStore::open(layout.models_dir())?;

        info!(
            states = states.num_states(),
            features = features.len(),
            prototype = %settings.prototype.display(),
            "Trainer ready"
        );

        Ok(Self {
            engine,
            store,
            layout,
            settings,
            states,
            features,
        })
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    pub fn settings(&self) -> &TrainerSettings {
        &self.settings
    }

    pub fn state_layout(&self) -> StateLayout {
        self.states
    }

    /// Fresh session over `phones`; writes the monophone list and the
    /// session record
    pub fn start_session<I, S>(&self, phones: I) -> Result<PipelineState>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inventory = PhoneInventory::new(
            phones,
            &self.settings.silence,
            self.settings.topology.short_pause.as_deref(),
        );
        let state = PipelineState::new(inventory);

        std::fs::write(
            self.layout.monophones_file(),
            state.inventory.view(ShortPause::Exclude).to_list(),
        )?;
        self.checkpoint(&state)?;

        info!(
            session_id = %state.session_id,
            units = state.inventory.len(),
            "Training session started"
        );
        Ok(state)
    }

    pub(crate) fn label_editor(&self) -> LabelEditor {
        LabelEditor::new(self.engine.clone())
    }

    /// Phone list handed to the engine; carries the short pause once it
    /// exists in the model set
    pub(crate) fn phone_list_file(&self, state: &PipelineState) -> Result<NamedTempFile> {
        let short_pause = if state.short_pause_ready {
            ShortPause::Include
        } else {
            ShortPause::Exclude
        };
        write_scratch(&state.inventory.view(short_pause).to_list())
    }

    pub(crate) fn feature_config_file(&self) -> Result<NamedTempFile> {
        write_config(&self.settings.feature_params)
    }

    pub(crate) fn feature_list_file(&self) -> Result<NamedTempFile> {
        write_feature_list(&self.features)
    }

    pub(crate) fn checkpoint(&self, state: &PipelineState) -> Result<()> {
        state.save(&self.layout.session_file())
    }

    pub(crate) fn require_fresh(&self, state: &PipelineState) -> Result<()> {
        if state.iteration != 0 {
            return Err(TrainingError::Precondition(format!(
                "model initialisation must be the first stage (iteration is {})",
                state.iteration
            )));
        }
        Ok(())
    }

    /// Iteration of the latest snapshot
    pub(crate) fn require_models(&self, state: &PipelineState) -> Result<u32> {
        state.latest_snapshot().ok_or_else(|| {
            TrainingError::Precondition("no model snapshot has been written yet".to_string())
        })
    }

    /// Run an edit script over the latest snapshot and commit the result as
    /// the next iteration
    pub(crate) async fn apply_edits(
        &self,
        state: PipelineState,
        stage: StageKind,
        script: &CommandScript,
    ) -> Result<PipelineState> {
        let previous = self.require_models(&state)?;
        let inputs = self.store.read_snapshot(previous)?;
        let staged = self.store.stage(state.iteration)?;

        let script_file = write_scratch(&script.to_string())?;
        let phones = self.phone_list_file(&state)?;
        debug!(stage = ?stage, commands = script.len(), "Applying edit script");

        let invocation = Invocation::new(Tool::HHEd)
            .arg("-H")
            .arg(&inputs.macros)
            .arg("-H")
            .arg(&inputs.hmmdefs)
            .arg("-M")
            .arg(staged.path())
            .arg(script_file.path())
            .arg(phones.path());
        run_checked(self.engine.as_ref(), &invocation).await?;

        self.store.commit(staged)?;
        let state = state.advance(stage, 1, None);
        self.checkpoint(&state)?;
        Ok(state)
    }
}
