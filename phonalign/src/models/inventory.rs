//! Phone inventory
//!
//! The canonical unit list always holds the silence unit and never holds the
//! short-pause unit; the latter is added only by [`PhoneInventoryView`] when a
//! phone list is dumped for the engine.

use crate::error::{Result, TrainingError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Lifecycle phase of the unit set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryPhase {
    Monophone,
    /// Context-expanded names after cloning
    Triphone,
    /// Same names as `Triphone`, states shared after tying
    TiedTriphone,
}

/// Whether a dumped phone list carries the short-pause unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortPause {
    Include,
    Exclude,
}

/// Ordered, duplicate-free set of unit names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneInventory {
    units: Vec<String>,
    silence: String,
    short_pause: Option<String>,
    phase: InventoryPhase,
}

impl PhoneInventory {
    /// Build a monophone inventory
    pub fn new<I, S>(phones: I, silence: &str, short_pause: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let units = canonical(phones, silence, short_pause);
        Self {
            units,
            silence: silence.to_string(),
            short_pause: short_pause.map(str::to_string),
            phase: InventoryPhase::Monophone,
        }
    }

    pub fn current(&self) -> &[String] {
        &self.units
    }

    pub fn silence(&self) -> &str {
        &self.silence
    }

    pub fn short_pause(&self) -> Option<&str> {
        self.short_pause.as_deref()
    }

    pub fn phase(&self) -> InventoryPhase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.units.binary_search_by(|u| u.as_str().cmp(unit)).is_ok()
    }

    /// Replace the unit set with the context-expanded names produced by cloning
    pub fn replace<I, S>(&mut self, new_units: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.phase != InventoryPhase::Monophone {
            return Err(TrainingError::Precondition(format!(
                "unit set can only be expanded once (phase is {:?})",
                self.phase
            )));
        }

        let units = canonical(new_units, &self.silence, self.short_pause.as_deref());
        if units.len() < self.units.len() {
            return Err(TrainingError::Consistency(format!(
                "context-dependent unit set ({}) is smaller than the monophone set ({})",
                units.len(),
                self.units.len()
            )));
        }

        tracing::debug!(before = self.units.len(), after = units.len(), "Unit set replaced");
        self.units = units;
        self.phase = InventoryPhase::Triphone;
        Ok(())
    }

    /// Record that states have been tied; names are unchanged
    pub fn mark_tied(&mut self) -> Result<()> {
        if self.phase != InventoryPhase::Triphone {
            return Err(TrainingError::Precondition(format!(
                "state tying requires triphone units (phase is {:?})",
                self.phase
            )));
        }
        self.phase = InventoryPhase::TiedTriphone;
        Ok(())
    }

    /// Sorted centre symbols of all units (silence included)
    pub fn base_phones(&self) -> Vec<String> {
        self.units
            .iter()
            .map(|u| monophone_of(u).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn view(&self, short_pause: ShortPause) -> PhoneInventoryView<'_> {
        PhoneInventoryView {
            inventory: self,
            short_pause,
        }
    }
}

/// Read-only rendering of the inventory used to dump phone lists
#[derive(Debug, Clone, Copy)]
pub struct PhoneInventoryView<'a> {
    inventory: &'a PhoneInventory,
    short_pause: ShortPause,
}

impl<'a> PhoneInventoryView<'a> {
    /// Unit names in list order
    pub fn units(&self) -> Vec<&'a str> {
        let mut units: Vec<&str> = self.inventory.units.iter().map(String::as_str).collect();
        if let (ShortPause::Include, Some(sp)) = (self.short_pause, self.inventory.short_pause()) {
            let pos = units.binary_search(&sp).unwrap_or_else(|p| p);
            units.insert(pos, sp);
        }
        units
    }

    /// One unit per line
    pub fn to_list(&self) -> String {
        let mut out = String::new();
        for unit in self.units() {
            let _ = writeln!(out, "{}", unit);
        }
        out
    }
}

fn canonical<I, S>(phones: I, silence: &str, short_pause: Option<&str>) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut set: BTreeSet<String> = phones
        .into_iter()
        .map(Into::into)
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if let Some(sp) = short_pause {
        set.remove(sp);
    }
    set.insert(silence.to_string());
    set.into_iter().collect()
}

/// Centre symbol of a context-dependent name (`a-b+c` -> `b`)
pub fn monophone_of(name: &str) -> &str {
    let left = name.split('+').next().unwrap_or(name);
    left.rsplit('-').next().unwrap_or(left)
}
