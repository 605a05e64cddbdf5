//! REESTIMATE: embedded re-estimation over the whole corpus

use super::Trainer;
use crate::engine::{run_checked, Invocation, Tool};
use crate::error::Result;
use crate::models::{PipelineState, StageKind};
use std::path::Path;
use tracing::info;

impl Trainer {
    /// One HERest pass from the latest snapshot using `labels`; with
    /// `collect_stats` the state occupation statistics are written for
    /// state tying
    pub async fn reestimate(
        &self,
        mut state: PipelineState,
        labels: &Path,
        collect_stats: bool,
    ) -> Result<PipelineState> {
        let previous = self.require_models(&state)?;
        let inputs = self.store.read_snapshot(previous)?;
        let staged = self.store.stage(state.iteration)?;

        let conf = self.feature_config_file()?;
        let scp = self.feature_list_file()?;
        let phones = self.phone_list_file(&state)?;
        let stats = collect_stats.then(|| self.layout.stats_file());
        let [initial, increment, limit] = self.settings.pruning;

        let invocation = Invocation::new(Tool::HERest)
            .arg("-C")
            .arg(conf.path())
            .arg("-I")
            .arg(labels)
            .arg("-t")
            .arg(format!("{:.1}", initial))
            .arg(format!("{:.1}", increment))
            .arg(format!("{:.1}", limit))
            .opt("-s", stats.as_ref())
            .arg("-S")
            .arg(scp.path())
            .arg("-H")
            .arg(&inputs.macros)
            .arg("-H")
            .arg(&inputs.hmmdefs)
            .arg("-M")
            .arg(staged.path())
            .arg(phones.path());
        let output = run_checked(self.engine.as_ref(), &invocation).await?;

        self.store.commit(staged)?;
        let log_prob = average_log_prob(&output.stdout);
        info!(
            iteration = state.iteration,
            log_prob = ?log_prob,
            stats = collect_stats,
            "Re-estimation complete"
        );

        if stats.is_some() {
            state.stats_file = stats;
        }
        let state = state.advance(StageKind::Reestimate, 1, log_prob);
        self.checkpoint(&state)?;
        Ok(state)
    }
}

/// Average log probability per frame from the re-estimation summary line
pub fn average_log_prob(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .rev()
        .find(|line| line.contains("Reestimation complete"))
        .and_then(|line| line.split_whitespace().last())
        .and_then(|token| token.parse().ok())
}
