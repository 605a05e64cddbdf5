//! Master label files
//!
//! An MLF holds one label sequence per utterance, keyed by the basename of
//! the quoted pattern line (`"*/utt01.lab"` -> `utt01`).

use crate::corpus::phone_map::PhoneMap;
use crate::error::{Result, TrainingError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;

pub const MLF_HEADER: &str = "#!MLF!#";
pub const LABEL_EXT: &str = "lab";

/// One label, optionally time-marked (engine time units)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelItem {
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub label: String,
}

impl LabelItem {
    pub fn untimed(label: impl Into<String>) -> Self {
        Self {
            start: None,
            end: None,
            label: label.into(),
        }
    }
}

/// Parsed master label file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterLabelFile {
    entries: BTreeMap<String, Vec<LabelItem>>,
}

/// Options for writing a phone-level MLF
#[derive(Debug, Clone, Copy, Default)]
pub struct PhoneLevelOptions<'a> {
    /// Keep start/end times
    pub boundaries: bool,
    /// Write each label's category instead of the label
    pub map: Option<&'a PhoneMap>,
    /// Make sure every utterance starts and ends with this unit
    pub pad_with: Option<&'a str>,
}

impl MasterLabelFile {
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();
        let mut current: Option<(String, Vec<LabelItem>)> = None;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line == MLF_HEADER {
                continue;
            }

            if line.starts_with('"') {
                if current.is_some() {
                    return Err(TrainingError::Consistency(format!(
                        "line {}: new label pattern before '.' terminator",
                        lineno + 1
                    )));
                }
                let key = key_of(line.trim_matches('"'));
                if entries.contains_key(&key) {
                    return Err(TrainingError::Consistency(format!(
                        "duplicate utterance '{}' in label file",
                        key
                    )));
                }
                current = Some((key, Vec::new()));
            } else if line == "." {
                let (key, items) = current.take().ok_or_else(|| {
                    TrainingError::Consistency(format!(
                        "line {}: '.' terminator without a label pattern",
                        lineno + 1
                    ))
                })?;
                entries.insert(key, items);
            } else if let Some((_, items)) = current.as_mut() {
                items.push(parse_item(line));
            } else {
                return Err(TrainingError::Consistency(format!(
                    "line {}: label outside of an utterance block",
                    lineno + 1
                )));
            }
        }

        if let Some((key, _)) = current {
            return Err(TrainingError::Consistency(format!(
                "utterance '{}' is not terminated",
                key
            )));
        }

        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn from_entries(entries: BTreeMap<String, Vec<LabelItem>>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&[LabelItem]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Sorted distinct labels
    pub fn label_set(&self) -> Vec<String> {
        self.entries
            .values()
            .flatten()
            .map(|item| item.label.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Same utterances with the same label sequences
    pub fn same_sequences(&self, other: &MasterLabelFile) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(key, items)| {
                other.entries.get(key).map_or(false, |o| {
                    o.len() == items.len() && o.iter().zip(items).all(|(a, b)| a.label == b.label)
                })
            })
    }

    /// Label keys and `basenames` must match one to one
    pub fn check_covers<'a>(&self, basenames: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let available: BTreeSet<&str> = basenames.into_iter().collect();
        let labelled: BTreeSet<&str> = self.keys().collect();

        let unlabelled: Vec<&str> = available.difference(&labelled).copied().collect();
        let orphaned: Vec<&str> = labelled.difference(&available).copied().collect();

        if !unlabelled.is_empty() {
            return Err(TrainingError::Consistency(format!(
                "missing transcriptions for: {}",
                unlabelled.join(", ")
            )));
        }
        if !orphaned.is_empty() {
            return Err(TrainingError::Consistency(format!(
                "transcriptions without audio: {}",
                orphaned.join(", ")
            )));
        }
        Ok(())
    }

    /// Word-level MLF, optionally framing each utterance with `silence_word`
    pub fn render_word_level(&self, silence_word: Option<&str>) -> String {
        let mut out = format!("{}\n", MLF_HEADER);
        for (key, items) in &self.entries {
            let _ = writeln!(out, "\"*/{}.{}\"", key, LABEL_EXT);
            let words: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
            for word in pad(&words, silence_word) {
                let _ = writeln!(out, "{}", word);
            }
            out.push_str(".\n");
        }
        out
    }

    /// Phone-level MLF
    pub fn render_phone_level(&self, options: PhoneLevelOptions<'_>) -> Result<String> {
        if options.boundaries && options.pad_with.is_some() {
            return Err(TrainingError::Precondition(
                "cannot pad time-marked labels".to_string(),
            ));
        }

        let mut out = format!("{}\n", MLF_HEADER);
        for (key, items) in &self.entries {
            let _ = writeln!(out, "\"*/{}.{}\"", key, LABEL_EXT);

            if options.boundaries {
                let mut time_pos = 0;
                for item in items {
                    let end = item.end.ok_or_else(|| {
                        TrainingError::Consistency(format!(
                            "utterance '{}' has a label without an end time",
                            key
                        ))
                    })?;
                    let start = item.start.unwrap_or(time_pos);
                    let label = mapped(&item.label, options.map)?;
                    let _ = writeln!(out, "{} {} {}", start, end, label);
                    time_pos = end;
                }
            } else {
                let phones: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
                for phone in pad(&phones, options.pad_with) {
                    let _ = writeln!(out, "{}", mapped(phone, options.map)?);
                }
            }
            out.push_str(".\n");
        }
        Ok(out)
    }

    /// `p p` dictionary over the label set
    pub fn render_pseudo_dictionary(&self) -> String {
        let mut out = String::new();
        for phone in self.label_set() {
            let _ = writeln!(out, "{} {}", phone, phone);
        }
        out
    }
}

fn pad<'a>(labels: &[&'a str], with: Option<&'a str>) -> Vec<&'a str> {
    let mut out = labels.to_vec();
    if let Some(unit) = with {
        if out.first() != Some(&unit) {
            out.insert(0, unit);
        }
        if out.last() != Some(&unit) {
            out.push(unit);
        }
    }
    out
}

fn mapped<'a>(label: &'a str, map: Option<&'a PhoneMap>) -> Result<&'a str> {
    match map {
        None => Ok(label),
        Some(map) => map.category(label).ok_or_else(|| {
            TrainingError::Consistency(format!("phone /{}/ not in mapping", label))
        }),
    }
}

fn key_of(pattern: &str) -> String {
    let file = pattern.rsplit(['/', '\\']).next().unwrap_or(pattern);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file.to_string(),
    }
}

fn parse_item(line: &str) -> LabelItem {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() >= 3 {
        if let (Ok(start), Ok(end)) = (tokens[0].parse::<u64>(), tokens[1].parse::<u64>()) {
            return LabelItem {
                start: Some(start),
                end: Some(end),
                label: tokens[2].to_string(),
            };
        }
    }
    LabelItem::untimed(tokens[0])
}
