//! INIT: flat start or bootstrap
//!
//! Exactly one of the two runs, as the first stage of a session.

use super::Trainer;
use crate::corpus::features::write_feature_list;
use crate::corpus::PhoneMap;
use crate::engine::{run_checked, Invocation, Tool};
use crate::error::{Result, TrainingError};
use crate::models::snapshot::{split_prototype, VFLOORS_FILE};
use crate::models::{ModelSnapshot, PipelineState, StageKind, UnitBundle, UnitDefinition};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Isolated-unit data for bootstrapping
#[derive(Debug, Clone, Copy)]
pub struct BootstrapData<'a> {
    /// Time-marked phone labels of the bootstrap audio
    pub labels: &'a Path,
    pub features: &'a [PathBuf],
    /// Corpus phone to category map; labels are written in categories and
    /// reverse-mapped per unit when present
    pub map: Option<&'a PhoneMap>,
}

/// Initialised unit file as written by HRest
struct InitialisedUnit {
    name: String,
    text: String,
}

impl Trainer {
    /// Every unit starts from the global mean and variance of the corpus
    pub async fn flat_start(&self, state: PipelineState) -> Result<PipelineState> {
        self.require_fresh(&state)?;
        info!(session_id = %state.session_id, units = state.inventory.len(), "Stage: FLAT_START");

        let conf = self.feature_config_file()?;
        let scp = self.feature_list_file()?;
        let scratch = tempfile::tempdir()?;

        let invocation = Invocation::new(Tool::HCompV)
            .arg("-C")
            .arg(conf.path())
            .arg("-f")
            .arg(self.settings.variance_floor.to_string())
            .arg("-m")
            .arg("-S")
            .arg(scp.path())
            .arg("-M")
            .arg(scratch.path())
            .arg(&self.settings.prototype);
        run_checked(self.engine.as_ref(), &invocation).await?;

        let proto_name = self.settings.prototype.file_name().ok_or_else(|| {
            TrainingError::Precondition(format!(
                "prototype path has no file name: {}",
                self.settings.prototype.display()
            ))
        })?;
        let proto = read_output(&scratch.path().join(proto_name))?;
        let vfloors = read_output(&scratch.path().join(VFLOORS_FILE))?;

        let (preamble, body) = split_prototype(&proto)?;
        let snapshot = ModelSnapshot {
            macros: format!("{}{}", preamble, vfloors),
            bundle: UnitBundle {
                header: String::new(),
                units: state
                    .inventory
                    .current()
                    .iter()
                    .map(|unit| UnitDefinition::new(unit.as_str(), body.as_str()))
                    .collect(),
            },
        };

        self.store.write_snapshot(state.iteration, &snapshot)?;
        let state = state.advance(StageKind::FlatStart, 1, None);
        self.checkpoint(&state)?;
        Ok(state)
    }

    /// Every unit is initialised (HInit) and refined (HRest) on its own
    /// segments of the bootstrap data; the results are merged into one
    /// snapshot in inventory order
    pub async fn bootstrap(
        &self,
        state: PipelineState,
        data: &BootstrapData<'_>,
    ) -> Result<PipelineState> {
        self.require_fresh(&state)?;
        if data.features.is_empty() {
            return Err(TrainingError::Precondition(
                "no bootstrap feature files".to_string(),
            ));
        }
        if let Some(map) = data.map {
            map.check_covers(state.inventory.current())?;
        }

        info!(
            session_id = %state.session_id,
            units = state.inventory.len(),
            mapped = data.map.is_some(),
            parallelism = self.settings.bootstrap_parallelism,
            "Stage: BOOTSTRAP"
        );

        let scp = write_feature_list(data.features)?;
        let units: Vec<InitialisedUnit> = stream::iter(state.inventory.current().iter())
            .map(|unit| self.bootstrap_unit(unit, data, scp.path()))
            .buffered(self.settings.bootstrap_parallelism)
            .try_collect()
            .await?;

        let snapshot = merge_units(state.inventory.current(), &units)?;
        self.store.write_snapshot(state.iteration, &snapshot)?;

        let state = state.advance(StageKind::Bootstrap, 1, None);
        self.checkpoint(&state)?;
        Ok(state)
    }

    async fn bootstrap_unit(
        &self,
        unit: &str,
        data: &BootstrapData<'_>,
        scp: &Path,
    ) -> Result<InitialisedUnit> {
        let work = tempfile::tempdir()?;
        let hinit_dir = work.path().join("hinit");
        let hrest_dir = work.path().join("hrest");
        std::fs::create_dir(&hinit_dir)?;
        std::fs::create_dir(&hrest_dir)?;

        let labels = match data.map {
            Some(map) => {
                let category = map.category(unit).ok_or_else(|| {
                    TrainingError::Consistency(format!("phone /{}/ not in mapping", unit))
                })?;
                let unmapped = work.path().join("labels.mlf");
                self.label_editor()
                    .unmap(data.labels, &unmapped, unit, category)
                    .await?;
                unmapped
            }
            None => data.labels.to_path_buf(),
        };

        debug!(unit, "Initialising unit");
        let hinit = Invocation::new(Tool::HInit)
            .arg("-l")
            .arg(unit)
            .arg("-o")
            .arg(unit)
            .arg("-I")
            .arg(&labels)
            .arg("-M")
            .arg(&hinit_dir)
            .arg("-S")
            .arg(scp)
            .arg(&self.settings.prototype);
        run_checked(self.engine.as_ref(), &hinit).await?;

        let hrest = Invocation::new(Tool::HRest)
            .arg("-l")
            .arg(unit)
            .arg("-I")
            .arg(&labels)
            .arg("-M")
            .arg(&hrest_dir)
            .arg("-S")
            .arg(scp)
            .arg(hinit_dir.join(unit));
        run_checked(self.engine.as_ref(), &hrest).await?;

        Ok(InitialisedUnit {
            name: unit.to_string(),
            text: read_output(&hrest_dir.join(unit))?,
        })
    }
}

/// One snapshot from per-unit files; the preamble of the first file becomes
/// both the macro file and the bundle header
fn merge_units(inventory: &[String], units: &[InitialisedUnit]) -> Result<ModelSnapshot> {
    let first = units.first().ok_or_else(|| {
        TrainingError::Precondition("no units to bootstrap".to_string())
    })?;
    if units.len() != inventory.len() {
        return Err(TrainingError::Consistency(format!(
            "bootstrapped {} units for an inventory of {}",
            units.len(),
            inventory.len()
        )));
    }
    let header = UnitBundle::parse(&first.text)?.header;

    let mut merged = Vec::with_capacity(units.len());
    for (expected, unit) in inventory.iter().zip(units) {
        let mut bundle = UnitBundle::parse(&unit.text)?;
        let names = bundle.names();
        if names != [expected.as_str()] || unit.name != *expected {
            return Err(TrainingError::Consistency(format!(
                "initialised file for '{}' holds {:?}",
                expected, names
            )));
        }
        merged.append(&mut bundle.units);
    }

    Ok(ModelSnapshot {
        macros: header.clone(),
        bundle: UnitBundle {
            header,
            units: merged,
        },
    })
}

fn read_output(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        TrainingError::MalformedModel(format!("engine output {}: {}", path.display(), e))
    })
}
