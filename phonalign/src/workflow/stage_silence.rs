//! SIL_FIX: silence transitions and, for the tee topology, the short pause

use super::Trainer;
use crate::error::{Result, TrainingError};
use crate::hed::{silence_augmentation, tee_fixup};
use crate::models::snapshot::derive_tee_unit;
use crate::models::{PipelineState, StageKind};
use tracing::info;

impl Trainer {
    /// Add the silence skip and loop transitions; with a tee topology the
    /// short-pause unit is first derived from the silence middle state
    /// (one snapshot) and then tied to it (a second snapshot)
    pub async fn fix_silence(&self, state: PipelineState) -> Result<PipelineState> {
        self.require_models(&state)?;
        let silence = self.settings.silence.as_str();

        match (
            self.settings.topology.tee_model,
            self.settings.topology.short_pause.as_deref(),
        ) {
            (true, Some(short_pause)) => {
                info!(iteration = state.iteration, short_pause, "Stage: SIL_FIX (tee)");
                let state = self.add_short_pause(state, short_pause)?;
                let script = tee_fixup(self.states, silence, short_pause);
                self.apply_edits(state, StageKind::SilenceFix, &script).await
            }
            (true, None) => Err(TrainingError::Precondition(
                "tee topology requires a short-pause unit name".to_string(),
            )),
            (false, _) => {
                let script = silence_augmentation(self.states, silence);
                if script.is_empty() {
                    info!(
                        iteration = state.iteration,
                        "Single-state silence unit, no transitions to add"
                    );
                    return Ok(state);
                }
                info!(iteration = state.iteration, "Stage: SIL_FIX");
                self.apply_edits(state, StageKind::SilenceFix, &script).await
            }
        }
    }

    fn add_short_pause(&self, state: PipelineState, short_pause: &str) -> Result<PipelineState> {
        if state.short_pause_ready {
            return Err(TrainingError::Precondition(format!(
                "short-pause unit '{}' already exists",
                short_pause
            )));
        }

        let previous = self.require_models(&state)?;
        let mut snapshot = self.store.load_snapshot(previous)?;
        if snapshot.bundle.get(short_pause).is_some() {
            return Err(TrainingError::Consistency(format!(
                "model set already defines '{}'",
                short_pause
            )));
        }

        let tee = derive_tee_unit(
            &snapshot.bundle,
            &self.settings.silence,
            short_pause,
            self.states.middle(),
        )?;
        snapshot.bundle.units.push(tee);
        self.store.write_snapshot(state.iteration, &snapshot)?;

        let mut state = state.advance(StageKind::SilenceFix, 1, None);
        state.short_pause_ready = true;
        self.checkpoint(&state)?;
        Ok(state)
    }
}
