//! Test helpers for phonalign integration tests
//!
//! `MockEngine` stands in for the acoustic-modeling tools: it records every
//! invocation and writes the files each tool would produce, so the stages
//! above the engine port run against a real working directory.

#![allow(dead_code)]

use async_trait::async_trait;
use phonalign::corpus::{LabelItem, MasterLabelFile, PronunciationDictionary};
use phonalign::engine::{Engine, EngineError, Invocation, Tool, ToolOutput};
use phonalign::models::{monophone_of, UnitBundle, UnitDefinition};
use phonalign_common::config::TrainingConfig;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Five-state prototype with a two-dimensional feature vector
pub const PROTOTYPE: &str = "~o <VECSIZE> 2 <MFCC>\n~h \"proto\"\n<BEGINHMM>\n<NUMSTATES> 5\n\
<STATE> 2\n<MEAN> 2\n 0.0 0.0\n<VARIANCE> 2\n 1.0 1.0\n\
<STATE> 3\n<MEAN> 2\n 0.0 0.0\n<VARIANCE> 2\n 1.0 1.0\n\
<STATE> 4\n<MEAN> 2\n 0.0 0.0\n<VARIANCE> 2\n 1.0 1.0\n\
<TRANSP> 5\n0 1 0 0 0\n0 0.6 0.4 0 0\n0 0 0.6 0.4 0\n0 0 0 0.7 0.3\n0 0 0 0 0\n<ENDHMM>\n";

pub const VFLOORS: &str = "~v varFloor1\n<VARIANCE> 2\n 0.1 0.1\n";

pub const REESTIMATION_SUMMARY: &str =
    "Reestimation complete - average log prob per frame = -72.5\n";

/// Engine double emulating tool outputs, with failure injection
#[derive(Default)]
pub struct MockEngine {
    calls: Mutex<Vec<Invocation>>,
    failures: Mutex<Vec<(Tool, usize)>>,
    scripts: Mutex<Vec<(Tool, String)>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `nth` (1-based) call of `tool` exit with status 1
    pub fn fail_on(self, tool: Tool, nth: usize) -> Self {
        self.failures.lock().unwrap().push((tool, nth));
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, tool: Tool) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.tool() == tool)
            .count()
    }

    /// Edit scripts passed to `tool` (HLEd or HHEd), in call order
    pub fn scripts(&self, tool: Tool) -> Vec<String> {
        self.scripts
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == tool)
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn record(&self, invocation: &Invocation) -> usize {
        if matches!(invocation.tool(), Tool::HLEd | Tool::HHEd) {
            if let Some(script) = invocation.trailing(2).first() {
                if let Ok(text) = std::fs::read_to_string(script) {
                    self.scripts.lock().unwrap().push((invocation.tool(), text));
                }
            }
        }
        let mut calls = self.calls.lock().unwrap();
        calls.push(invocation.clone());
        calls.iter().filter(|c| c.tool() == invocation.tool()).count()
    }

    fn should_fail(&self, tool: Tool, nth: usize) -> bool {
        self.failures
            .lock()
            .unwrap()
            .iter()
            .any(|&(t, n)| t == tool && n == nth)
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn invoke(&self, invocation: &Invocation) -> Result<ToolOutput, EngineError> {
        let nth = self.record(invocation);
        let tool = invocation.tool();

        if self.should_fail(tool, nth) {
            return Ok(ToolOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: format!("ERROR [+9999] injected failure of {} call {}", tool, nth),
            });
        }

        let stdout = emulate(invocation).map_err(|e| EngineError::Spawn {
            tool,
            message: e.to_string(),
        })?;
        Ok(ToolOutput {
            code: Some(0),
            stdout,
            stderr: String::new(),
        })
    }
}

fn path(value: Option<&OsStr>) -> std::io::Result<PathBuf> {
    value.map(PathBuf::from).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing flag value")
    })
}

fn invalid(message: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.into())
}

fn copy_into(file: &Path, dir: &Path) -> std::io::Result<()> {
    let name = file.file_name().ok_or_else(|| invalid("no file name"))?;
    std::fs::copy(file, dir.join(name))?;
    Ok(())
}

fn emulate(invocation: &Invocation) -> std::io::Result<String> {
    match invocation.tool() {
        Tool::HCompV => {
            let out = path(invocation.flag_value("-M"))?;
            let proto = path(invocation.trailing(1).first().map(|p| p.as_os_str()))?;
            copy_into(&proto, &out)?;
            std::fs::write(out.join("vFloors"), VFLOORS)?;
            Ok(String::new())
        }
        Tool::HERest => {
            let out = path(invocation.flag_value("-M"))?;
            for input in invocation.flag_values("-H") {
                copy_into(Path::new(input), &out)?;
            }
            if let Some(stats) = invocation.flag_value("-s") {
                std::fs::write(stats, "1 \"a\" 10 100.0 50.0 50.0 50.0\n")?;
            }
            Ok(REESTIMATION_SUMMARY.to_string())
        }
        Tool::HHEd => {
            let out = path(invocation.flag_value("-M"))?;
            let inputs = invocation.flag_values("-H");
            for input in &inputs {
                copy_into(Path::new(input), &out)?;
            }
            let script = std::fs::read_to_string(&invocation.trailing(2)[0])?;
            if let Some(list) = script
                .lines()
                .find_map(|line| line.strip_prefix("CL "))
            {
                let hmmdefs = inputs.get(1).ok_or_else(|| invalid("no hmmdefs"))?;
                clone_units(Path::new(hmmdefs), Path::new(list.trim()), &out)?;
            }
            Ok(String::new())
        }
        Tool::HInit => {
            let out = path(invocation.flag_value("-M"))?;
            let unit = invocation
                .flag_value("-l")
                .and_then(OsStr::to_str)
                .ok_or_else(|| invalid("no unit"))?;
            let proto = std::fs::read_to_string(&invocation.trailing(1)[0])?;
            let bundle = UnitBundle::parse(&proto).map_err(|e| invalid(e.to_string()))?;
            let body = bundle
                .units
                .first()
                .map(|u| u.body.clone())
                .ok_or_else(|| invalid("empty prototype"))?;
            let initialised = UnitBundle {
                header: bundle.header,
                units: vec![UnitDefinition::new(unit, body)],
            };
            std::fs::write(out.join(unit), initialised.serialize())?;
            Ok(String::new())
        }
        Tool::HRest => {
            let out = path(invocation.flag_value("-M"))?;
            copy_into(Path::new(&invocation.trailing(1)[0]), &out)?;
            Ok(String::new())
        }
        Tool::HVite => {
            let labels = MasterLabelFile::load(&path(invocation.flag_value("-I"))?)
                .map_err(|e| invalid(e.to_string()))?;
            match invocation.flag_value("-i") {
                Some(output) => {
                    let dictionary = PronunciationDictionary::load(Path::new(
                        &invocation.trailing(2)[0],
                    ))
                    .map_err(|e| invalid(e.to_string()))?;
                    let phones = expand_words(&labels, &dictionary)?;
                    std::fs::write(output, render(&phones))?;
                }
                None => {
                    let out = path(invocation.flag_value("-l"))?;
                    for key in labels.keys() {
                        let items = labels.get(key).unwrap_or_default();
                        let text: String = items
                            .iter()
                            .enumerate()
                            .map(|(i, item)| {
                                format!("{} {} {}\n", i * 100000, (i + 1) * 100000, item.label)
                            })
                            .collect();
                        std::fs::write(out.join(format!("{}.rec", key)), text)?;
                    }
                }
            }
            Ok(String::new())
        }
        Tool::HLEd => {
            let output = path(invocation.flag_value("-i"))?;
            let [script, input] = invocation.trailing(2) else {
                return Err(invalid("HLEd needs a script and an input"));
            };
            let script = std::fs::read_to_string(script)?;
            let labels =
                MasterLabelFile::load(Path::new(input)).map_err(|e| invalid(e.to_string()))?;
            let dictionary = match invocation.flag_value("-d") {
                Some(d) => Some(
                    PronunciationDictionary::load(Path::new(d))
                        .map_err(|e| invalid(e.to_string()))?,
                ),
                None => None,
            };
            let edited = edit_labels(&labels, &script, dictionary.as_ref())?;
            std::fs::write(output, render(&edited))?;
            Ok(String::new())
        }
        Tool::HDMan => {
            let [output, input] = invocation.trailing(2) else {
                return Err(invalid("HDMan needs an output and an input"));
            };
            let script = std::fs::read_to_string(path(invocation.flag_value("-g"))?)?;
            if !script.lines().any(|line| line.trim() == "TC") {
                std::fs::copy(input, output)?;
                return Ok(String::new());
            }
            let boundaries: Vec<String> = invocation
                .flag_values("-b")
                .iter()
                .map(|b| b.to_string_lossy().into_owned())
                .collect();
            let mut converted = String::new();
            for line in std::fs::read_to_string(input)?.lines() {
                let mut fields = line.split_whitespace().map(str::to_string);
                let Some(word) = fields.next() else {
                    continue;
                };
                let phones: Vec<String> = fields.collect();
                converted.push_str(&format!(
                    "{} {}\n",
                    word,
                    triphones(&phones, &boundaries).join(" ")
                ));
            }
            std::fs::write(output, converted)?;
            Ok(String::new())
        }
        Tool::HCopy => {
            let scp = std::fs::read_to_string(path(invocation.flag_value("-S"))?)?;
            for line in scp.lines() {
                if let Some(target) = line.split_whitespace().nth(1) {
                    std::fs::write(target, b"\0\0\0\0")?;
                }
            }
            Ok(String::new())
        }
    }
}

/// Rewrite `hmmdefs` so that every unit named in `list` exists, cloned from
/// its centre phone
fn clone_units(hmmdefs: &Path, list: &Path, out: &Path) -> std::io::Result<()> {
    let bundle = UnitBundle::parse(&std::fs::read_to_string(hmmdefs)?)
        .map_err(|e| invalid(e.to_string()))?;
    let names = std::fs::read_to_string(list)?;

    let mut units = Vec::new();
    for name in names.lines().map(str::trim).filter(|n| !n.is_empty()) {
        let source = bundle
            .get(monophone_of(name))
            .ok_or_else(|| invalid(format!("no model for {}", name)))?;
        units.push(UnitDefinition::new(name, source.body.clone()));
    }
    let cloned = UnitBundle {
        header: bundle.header.clone(),
        units,
    };
    let name = hmmdefs.file_name().ok_or_else(|| invalid("no file name"))?;
    std::fs::write(out.join(name), cloned.serialize())
}

type Labels = BTreeMap<String, Vec<String>>;

fn sequences(labels: &MasterLabelFile) -> Labels {
    labels
        .keys()
        .map(|key| {
            let items = labels.get(key).unwrap_or_default();
            (key.to_string(), items.iter().map(|i| i.label.clone()).collect())
        })
        .collect()
}

fn expand_words(labels: &MasterLabelFile, dictionary: &PronunciationDictionary) -> std::io::Result<Labels> {
    let mut expanded = Labels::new();
    for (key, words) in sequences(labels) {
        let mut phones = Vec::new();
        for word in words {
            let pronunciation = dictionary
                .pronunciations(&word)
                .and_then(|p| p.first())
                .ok_or_else(|| invalid(format!("no pronunciation for {}", word)))?;
            phones.extend(pronunciation.iter().cloned());
        }
        expanded.insert(key, phones);
    }
    Ok(expanded)
}

fn edit_labels(
    labels: &MasterLabelFile,
    script: &str,
    dictionary: Option<&PronunciationDictionary>,
) -> std::io::Result<Labels> {
    let mut current = sequences(labels);
    let mut boundaries = Vec::new();

    for line in script.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["EX"] => {
                let dictionary = dictionary.ok_or_else(|| invalid("EX without dictionary"))?;
                let mlf = MasterLabelFile::from_entries(
                    current
                        .iter()
                        .map(|(k, v)| (k.clone(), v.iter().map(LabelItem::untimed).collect()))
                        .collect(),
                );
                current = expand_words(&mlf, dictionary)?;
            }
            ["DE", label] => {
                for seq in current.values_mut() {
                    seq.retain(|l| l != label);
                }
            }
            ["RE", target, category] => {
                for seq in current.values_mut() {
                    for l in seq.iter_mut() {
                        if l.as_str() == *category {
                            *l = target.to_string();
                        }
                    }
                }
            }
            ["WB", label] => boundaries.push(label.to_string()),
            ["NB", _] => {}
            ["TC"] => {
                for seq in current.values_mut() {
                    *seq = triphones(seq, &boundaries);
                }
            }
            _ => {}
        }
    }
    Ok(current)
}

fn triphones(seq: &[String], boundaries: &[String]) -> Vec<String> {
    let context = |i: Option<usize>| {
        i.and_then(|i| seq.get(i))
            .filter(|l| !boundaries.contains(l))
    };
    seq.iter()
        .enumerate()
        .map(|(i, phone)| {
            if boundaries.contains(phone) {
                return phone.clone();
            }
            let mut name = String::new();
            if let Some(left) = context(i.checked_sub(1)) {
                name.push_str(left);
                name.push('-');
            }
            name.push_str(phone);
            if let Some(right) = context(Some(i + 1)) {
                name.push('+');
                name.push_str(right);
            }
            name
        })
        .collect()
}

fn render(labels: &Labels) -> String {
    let mut out = String::from("#!MLF!#\n");
    for (key, seq) in labels {
        out.push_str(&format!("\"*/{}.lab\"\n", key));
        for label in seq {
            out.push_str(label);
            out.push('\n');
        }
        out.push_str(".\n");
    }
    out
}

/// A scratch corpus with its configuration
pub struct Fixture {
    pub temp: TempDir,
    pub config: TrainingConfig,
}

impl Fixture {
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn working_dir(&self) -> PathBuf {
        self.temp.path().join("work")
    }
}

/// Write `files` under a fresh temporary directory and load `config_toml`
/// relative to it
pub fn fixture(files: &[(&str, &str)], config_toml: &str) -> Fixture {
    let temp = TempDir::new().unwrap();
    for (name, contents) in files {
        let path = temp.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    let mut config = TrainingConfig::from_toml_str(config_toml).unwrap();
    config.resolve_relative_to(temp.path());
    Fixture { temp, config }
}

/// Two utterances over the phones `a`, `b` and `sil`
pub const PHONE_LABELS: &str =
    "#!MLF!#\n\"*/u1.lab\"\nsil\na\nb\nsil\n.\n\"*/u2.lab\"\nsil\nb\na\nsil\n.\n";

pub const WORD_LABELS: &str = "#!MLF!#\n\"*/u1.lab\"\nab\n.\n\"*/u2.lab\"\nba\n.\n";

pub const LEXICON: &str = "ab a b\nba b a\n";

/// Phonetic corpus with precomputed features
pub fn phonetic_fixture(extra_toml: &str) -> Fixture {
    fixture(
        &[
            ("proto", PROTOTYPE),
            ("phones.mlf", PHONE_LABELS),
            ("feats/u1.mfc", ""),
            ("feats/u2.mfc", ""),
        ],
        &format!(
            "working_dir = \"work\"\n{}\n[source]\nhmm_prototype = \"proto\"\n\
             phonetic_labels = \"phones.mlf\"\nfeatures_dir = \"feats\"\n",
            extra_toml
        ),
    )
}

/// Orthographic corpus with audio that needs feature extraction
pub fn orthographic_fixture(extra_toml: &str) -> Fixture {
    fixture(
        &[
            ("proto", PROTOTYPE),
            ("words.mlf", WORD_LABELS),
            ("lexicon", LEXICON),
            ("wav/u1.wav", ""),
            ("wav/u2.wav", ""),
        ],
        &format!(
            "working_dir = \"work\"\n{}\n[source]\nhmm_prototype = \"proto\"\n\
             orthographic_labels = \"words.mlf\"\npronunciation_dictionary = \"lexicon\"\n\
             audio = \"wav\"\n",
            extra_toml
        ),
    )
}

/// Feature file paths for the phonetic fixture
pub fn feature_files(fixture: &Fixture) -> Vec<PathBuf> {
    vec![
        fixture.root().join("feats/u1.mfc"),
        fixture.root().join("feats/u2.mfc"),
    ]
}

/// Number of `hmm<N>` directories under `models`
pub fn snapshot_dirs(models: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(models)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("hmm"))
        .collect();
    names.sort();
    names
}

/// Call counts keyed by tool, for compact assertions
pub fn tool_counts(engine: &MockEngine) -> HashMap<Tool, usize> {
    let mut counts = HashMap::new();
    for call in engine.calls() {
        *counts.entry(call.tool()).or_insert(0) += 1;
    }
    counts
}
