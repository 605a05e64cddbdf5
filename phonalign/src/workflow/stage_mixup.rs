//! MIXUP: one more Gaussian per state, then re-estimation

use super::Trainer;
use crate::error::Result;
use crate::hed::increment_mixtures;
use crate::models::{PipelineState, StageKind};
use std::path::Path;
use tracing::info;

impl Trainer {
    pub async fn increment_mixtures(
        &self,
        state: PipelineState,
        labels: &Path,
    ) -> Result<PipelineState> {
        info!(iteration = state.iteration, "Stage: MIXUP");
        let script = increment_mixtures(self.states);
        let state = self.apply_edits(state, StageKind::Mixup, &script).await?;
        self.reestimate(state, labels, false).await
    }
}
