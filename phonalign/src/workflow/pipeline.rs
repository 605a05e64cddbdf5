//! Pipeline flavors and the end-to-end training run

use super::prepare::{prepare_features, prepare_transcriptions, prepare_triphones};
use super::{BootstrapData, PreparedCorpus, SessionLayout, Topology, Trainer, TrainerSettings};
use crate::corpus::{HCopyFeatures, LabelEditor};
use crate::engine::Engine;
use crate::error::{Result, TrainingError};
use crate::models::PipelineState;
use phonalign_common::config::{StageCounts, TrainingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Training flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PipelineVariant {
    /// Train on the corpus and force-align it
    Align,
    /// As `Align`, with a realignment pass choosing pronunciation variants
    AlignRealign,
    /// Train models with a short-pause tee unit; no alignment
    TrainAsr,
}

impl PipelineVariant {
    pub fn topology(&self, config: &TrainingConfig) -> Result<Topology> {
        match self {
            PipelineVariant::Align | PipelineVariant::AlignRealign => Ok(Topology::standard()),
            PipelineVariant::TrainAsr => config
                .parms
                .short_pause_phone
                .as_deref()
                .filter(|sp| !sp.trim().is_empty())
                .map(Topology::with_tee)
                .ok_or_else(|| {
                    TrainingError::Precondition(
                        "ASR training requires parms.short_pause_phone".to_string(),
                    )
                }),
        }
    }

    fn realigns(&self) -> bool {
        !matches!(self, PipelineVariant::Align)
    }

    fn aligns(&self) -> bool {
        !matches!(self, PipelineVariant::TrainAsr)
    }
}

/// Stage sequence parameters of one run
#[derive(Debug, Clone)]
pub struct TrainingPlan {
    pub variant: PipelineVariant,
    pub counts: StageCounts,
    pub context_dependent: bool,
    /// Target Gaussians per state
    pub mixtures: u32,
    /// Hand-written state-tying script
    pub questions: Option<PathBuf>,
}

impl TrainingPlan {
    pub fn from_config(config: &TrainingConfig, variant: PipelineVariant) -> Self {
        Self {
            variant,
            counts: config.training,
            context_dependent: config.switches.context_dependent,
            mixtures: config.switches.mixtures_per_state,
            questions: config.source.questions.clone(),
        }
    }
}

impl Trainer {
    async fn reestimate_times(
        &self,
        mut state: PipelineState,
        labels: &Path,
        passes: u32,
    ) -> Result<PipelineState> {
        for _ in 0..passes {
            state = self.reestimate(state, labels, false).await?;
        }
        Ok(state)
    }

    /// Run every stage of `plan` on a fresh session
    pub async fn run_plan(
        &self,
        state: PipelineState,
        plan: &TrainingPlan,
        corpus: &PreparedCorpus,
        boot: Option<BootstrapData<'_>>,
    ) -> Result<PipelineState> {
        let counts = &plan.counts;
        let phone_labels = corpus.phone_labels.as_path();

        let state = match boot {
            Some(data) => self.bootstrap(state, &data).await?,
            None => {
                let state = self.flat_start(state).await?;
                self.reestimate_times(state, phone_labels, counts.init_reestimations)
                    .await?
            }
        };
        let mut state = self.fix_silence(state).await?;

        if plan.variant.realigns() {
            state = self
                .reestimate_times(state, phone_labels, counts.realign_pre)
                .await?;
            match &corpus.word_labels {
                Some(words) => {
                    state = self
                        .realign(state, words, &corpus.dictionary, phone_labels)
                        .await?;
                }
                None => warn!("Realignment needs word transcriptions, skipped"),
            }
            state = self
                .reestimate_times(state, phone_labels, counts.realign_post)
                .await?;
        } else {
            state = self
                .reestimate_times(state, phone_labels, counts.align_reestimations)
                .await?;
        }

        let mut triphones = None;
        if plan.context_dependent {
            let resources = prepare_triphones(
                corpus,
                &self.layout,
                &self.label_editor(),
                &self.settings.silence,
                self.settings.topology.short_pause.as_deref(),
            )
            .await?;

            state = self.clone_triphones(state, &resources.units).await?;
            state = self.reestimate(state, &resources.labels, false).await?;
            state = self.reestimate(state, &resources.labels, true).await?;
            state = self.tie_states(state, plan.questions.as_deref()).await?;
            state = self
                .reestimate_times(state, &resources.labels, counts.tied_reestimations)
                .await?;
            triphones = Some(resources);
        }

        let training_labels = triphones
            .as_ref()
            .map_or(phone_labels, |t| t.labels.as_path());
        for mixtures in 2..=plan.mixtures {
            info!(mixtures, "Incrementing mixtures");
            state = self.increment_mixtures(state, training_labels).await?;
        }

        if plan.variant.aligns() {
            let (labels, dictionary) = match (&corpus.word_labels, &triphones) {
                (Some(words), _) => (words.as_path(), corpus.dictionary.as_path()),
                (None, Some(t)) => (t.labels.as_path(), t.dictionary.as_path()),
                (None, None) => (phone_labels, corpus.dictionary.as_path()),
            };
            let output = self.layout.labels_dir();
            state = self
                .forced_alignment(state, labels, dictionary, &output)
                .await?;
        }

        Ok(state)
    }
}

/// Prepare the corpus, train and (for the alignment flavors) align
pub async fn run_training(
    config: &TrainingConfig,
    working_dir: &Path,
    variant: PipelineVariant,
    engine: Arc<dyn Engine>,
) -> Result<PipelineState> {
    let topology = variant.topology(config)?;
    let layout = SessionLayout::new(working_dir);
    layout.create()?;
    info!(variant = ?variant, dir = %working_dir.display(), "Starting training run");

    let editor = LabelEditor::new(engine.clone());
    let corpus = prepare_transcriptions(config, &layout, &editor, &topology).await?;

    let provider = HCopyFeatures::new(engine.clone(), config.features.extraction_params());
    let features = prepare_features(config, &layout, &provider, &corpus).await?;

    let settings = TrainerSettings::from_config(config, topology)?;
    let trainer = Trainer::new(engine, layout.clone(), settings, features.corpus)?;
    let state = trainer.start_session(corpus.phones.iter().cloned())?;

    let boot = match (&corpus.boot, &features.boot) {
        (Some(boot), Some(boot_features)) => Some(BootstrapData {
            labels: &boot.labels,
            features: boot_features,
            map: corpus
                .phone_map
                .as_ref()
                .filter(|_| config.switches.mapped_bootstrap),
        }),
        _ => None,
    };

    let plan = TrainingPlan::from_config(config, variant);
    let state = trainer.run_plan(state, &plan, &corpus, boot).await?;

    info!(
        session_id = %state.session_id,
        iteration = state.iteration,
        units = state.inventory.len(),
        log_prob = ?state.last_log_prob(),
        "Training run complete"
    );

    if config.switches.post_cleanup {
        layout.cleanup()?;
    }
    Ok(state)
}
