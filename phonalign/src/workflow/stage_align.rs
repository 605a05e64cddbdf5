//! ALIGN and REALIGN
//!
//! Neither writes a snapshot; both decode with the latest one.

use super::Trainer;
use crate::engine::{run_checked, Invocation, Tool};
use crate::error::Result;
use crate::models::{PipelineState, StageKind};
use std::path::Path;
use tracing::info;

impl Trainer {
    /// Forced alignment of the corpus against `labels`; one label file per
    /// utterance is written into `output_dir`
    pub async fn forced_alignment(
        &self,
        state: PipelineState,
        labels: &Path,
        dictionary: &Path,
        output_dir: &Path,
    ) -> Result<PipelineState> {
        let latest = self.require_models(&state)?;
        let models = self.store.read_snapshot(latest)?;
        std::fs::create_dir_all(output_dir)?;

        let conf = self.feature_config_file()?;
        let scp = self.feature_list_file()?;
        let phones = self.phone_list_file(&state)?;
        info!(iteration = latest, output = %output_dir.display(), "Stage: ALIGN");

        let invocation = Invocation::new(Tool::HVite)
            .arg("-C")
            .arg(conf.path())
            .arg("-a")
            .arg("-o")
            .arg("N")
            .arg("-f")
            .arg("-m")
            .arg("-l")
            .arg(output_dir)
            .arg("-I")
            .arg(labels)
            .arg("-S")
            .arg(scp.path())
            .arg("-H")
            .arg(&models.macros)
            .arg("-H")
            .arg(&models.hmmdefs)
            .arg(dictionary)
            .arg(phones.path());
        run_checked(self.engine.as_ref(), &invocation).await?;

        let state = state.advance(StageKind::Align, 0, None);
        self.checkpoint(&state)?;
        Ok(state)
    }

    /// Choose among pronunciation variants and optional silences;
    /// `output_mlf` receives the phone-level result and is only replaced
    /// when decoding succeeds
    pub async fn realign(
        &self,
        state: PipelineState,
        word_labels: &Path,
        dictionary: &Path,
        output_mlf: &Path,
    ) -> Result<PipelineState> {
        let latest = self.require_models(&state)?;
        let models = self.store.read_snapshot(latest)?;

        let conf = self.feature_config_file()?;
        let scp = self.feature_list_file()?;
        let phones = self.phone_list_file(&state)?;
        let output_dir = output_mlf
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let pending = tempfile::Builder::new()
            .prefix(".realign-")
            .tempfile_in(output_dir)?;
        let boundary_word = self
            .settings
            .silence_word
            .as_deref()
            .filter(|_| self.settings.topology.tee_model);
        info!(iteration = latest, output = %output_mlf.display(), "Stage: REALIGN");

        let invocation = Invocation::new(Tool::HVite)
            .arg("-C")
            .arg(conf.path())
            .arg("-a")
            .arg("-y")
            .arg("lab")
            .arg("-o")
            .arg("SWT")
            .opt("-b", boundary_word)
            .arg("-m")
            .arg("-l")
            .arg("*")
            .arg("-I")
            .arg(word_labels)
            .arg("-i")
            .arg(pending.path())
            .arg("-S")
            .arg(scp.path())
            .arg("-H")
            .arg(&models.macros)
            .arg("-H")
            .arg(&models.hmmdefs)
            .arg(dictionary)
            .arg(phones.path());
        run_checked(self.engine.as_ref(), &invocation).await?;

        pending.persist(output_mlf).map_err(|e| e.error)?;

        let state = state.advance(StageKind::Realign, 0, None);
        self.checkpoint(&state)?;
        Ok(state)
    }
}
