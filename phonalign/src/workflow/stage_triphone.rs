//! TRIPHONE_CLONE and STATE_TIE

use super::Trainer;
use crate::error::{Result, TrainingError};
use crate::hed::{clone_triphones, questions_from_file, tie_states};
use crate::models::{InventoryPhase, PipelineState, ShortPause, StageKind};
use std::path::Path;
use tracing::info;

impl Trainer {
    /// Clone every monophone into its context-dependent variants and tie
    /// their transition matrices. The inventory becomes `triphones`.
    pub async fn clone_triphones(
        &self,
        state: PipelineState,
        triphones: &[String],
    ) -> Result<PipelineState> {
        if state.phase() != InventoryPhase::Monophone {
            return Err(TrainingError::Precondition(format!(
                "triphone cloning requires monophone units (phase is {:?})",
                state.phase()
            )));
        }

        // Validate the expansion before the engine runs
        let mut expanded = state.inventory.clone();
        expanded.replace(triphones.iter().cloned())?;

        let list_path = self.layout.triphones_file();
        let short_pause = if state.short_pause_ready {
            ShortPause::Include
        } else {
            ShortPause::Exclude
        };
        std::fs::write(&list_path, expanded.view(short_pause).to_list())?;

        info!(
            iteration = state.iteration,
            before = state.inventory.len(),
            after = expanded.len(),
            "Stage: TRIPHONE_CLONE"
        );

        let script = clone_triphones(&state.inventory, &list_path);
        let mut state = self
            .apply_edits(state, StageKind::TriphoneClone, &script)
            .await?;

        state.inventory = expanded;
        self.checkpoint(&state)?;
        Ok(state)
    }

    /// Decision-tree clustering of triphone states, using `questions`
    /// verbatim when given
    pub async fn tie_states(
        &self,
        mut state: PipelineState,
        questions: Option<&Path>,
    ) -> Result<PipelineState> {
        if state.phase() != InventoryPhase::Triphone {
            return Err(TrainingError::Precondition(format!(
                "state tying requires untied triphone units (phase is {:?})",
                state.phase()
            )));
        }
        let stats = state.stats_file.clone().ok_or_else(|| {
            TrainingError::Precondition(
                "state tying requires statistics from a previous re-estimation".to_string(),
            )
        })?;

        let script = match questions {
            Some(path) => questions_from_file(&std::fs::read_to_string(path)?),
            None => tie_states(
                self.states,
                &state.inventory.base_phones(),
                &stats,
                &self.layout.triphones_file(),
            ),
        };
        info!(
            iteration = state.iteration,
            commands = script.len(),
            supplied = questions.is_some(),
            "Stage: STATE_TIE"
        );

        state.inventory.mark_tied()?;
        self.apply_edits(state, StageKind::StateTie, &script).await
    }
}
