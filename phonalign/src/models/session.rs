//! Training session state
//!
//! `PipelineState` is threaded through every stage: each stage consumes the
//! current value and returns the next one. Only stage completion moves the
//! iteration counter.

use crate::models::inventory::{InventoryPhase, PhoneInventory};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageKind {
    FlatStart,
    Bootstrap,
    Reestimate,
    SilenceFix,
    TriphoneClone,
    StateTie,
    Mixup,
    Realign,
    Align,
}

/// One completed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    /// Iteration counter after the stage completed
    pub iteration: u32,
    /// Average log probability per frame reported by re-estimation
    pub log_prob: Option<f64>,
    pub completed_at: DateTime<Utc>,
}

/// Training session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub session_id: Uuid,

    /// Number of committed snapshots; the latest is `hmm<iteration - 1>`
    pub iteration: u32,

    pub inventory: PhoneInventory,

    /// The short-pause unit exists in the model set
    pub short_pause_ready: bool,

    /// Statistics file written by the last statistics-collecting pass
    pub stats_file: Option<PathBuf>,

    pub history: Vec<StageRecord>,

    pub started_at: DateTime<Utc>,
}

impl PipelineState {
    pub fn new(inventory: PhoneInventory) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            iteration: 0,
            inventory,
            short_pause_ready: false,
            stats_file: None,
            history: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> InventoryPhase {
        self.inventory.phase()
    }

    /// Iteration number of the latest committed snapshot
    pub fn latest_snapshot(&self) -> Option<u32> {
        self.iteration.checked_sub(1)
    }

    /// Record a completed stage that committed `snapshots` new iterations
    pub fn advance(mut self, stage: StageKind, snapshots: u32, log_prob: Option<f64>) -> Self {
        self.iteration += snapshots;
        self.history.push(StageRecord {
            stage,
            iteration: self.iteration,
            log_prob,
            completed_at: Utc::now(),
        });
        self
    }

    /// Log probability of the most recent re-estimation that reported one
    pub fn last_log_prob(&self) -> Option<f64> {
        self.history.iter().rev().find_map(|r| r.log_prob)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
