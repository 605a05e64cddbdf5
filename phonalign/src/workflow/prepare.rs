//! Corpus preparation
//!
//! Turns the configured sources into the session's `etc` resources: word
//! and phone label files, the working dictionary, bootstrap labels and the
//! feature lists. Every consistency check runs here, before any model is
//! trained.

use super::{SessionLayout, Topology};
use crate::corpus::features::{basenames, collect_files, AUDIO_EXT, FEATURE_EXT};
use crate::corpus::{
    FeatureProvider, LabelEditor, MasterLabelFile, PhoneLevelOptions, PhoneMap,
    PronunciationDictionary,
};
use crate::error::{Result, TrainingError};
use phonalign_common::config::TrainingConfig;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Session resources derived from the configured transcriptions
#[derive(Debug, Clone)]
pub struct PreparedCorpus {
    /// Word-level labels; present only for orthographic input
    pub word_labels: Option<PathBuf>,
    pub phone_labels: PathBuf,
    /// Pronunciation dictionary, or the `p p` dictionary for phonetic input
    pub dictionary: PathBuf,
    /// Monophone set
    pub phones: Vec<String>,
    /// Corpus transcriptions, used for coverage checks
    pub transcripts: MasterLabelFile,
    /// Corpus phone to category map (mapped bootstrapping)
    pub phone_map: Option<PhoneMap>,
    pub boot: Option<BootCorpus>,
}

/// Bootstrap data
#[derive(Debug, Clone)]
pub struct BootCorpus {
    /// Time-marked labels, already written in categories when mapped
    pub labels: PathBuf,
    pub audio: PathBuf,
    pub transcripts: MasterLabelFile,
}

/// Feature files for the corpus and the bootstrap data
#[derive(Debug, Clone, Default)]
pub struct FeatureSets {
    pub corpus: Vec<PathBuf>,
    pub boot: Option<Vec<PathBuf>>,
}

/// Context-dependent label resources
#[derive(Debug, Clone)]
pub struct TriphoneResources {
    pub labels: PathBuf,
    pub dictionary: PathBuf,
    /// Sorted union of the units in the dictionary and the labels
    pub units: Vec<String>,
}

/// Write the word/phone label files and the working dictionary
pub async fn prepare_transcriptions(
    config: &TrainingConfig,
    layout: &SessionLayout,
    editor: &LabelEditor,
    topology: &Topology,
) -> Result<PreparedCorpus> {
    let source = &config.source;

    let mut corpus = match (
        &source.orthographic_labels,
        &source.pronunciation_dictionary,
    ) {
        (Some(words), Some(dictionary)) => {
            from_orthographic(config, layout, editor, topology, words, dictionary).await?
        }
        _ => {
            let phonetic = source.phonetic_labels.as_deref().ok_or_else(|| {
                TrainingError::Precondition(
                    "transcriptions not sufficiently defined: need orthographic labels with a \
                     dictionary, or phonetic labels"
                        .to_string(),
                )
            })?;
            from_phonetic(layout, phonetic)?
        }
    };

    if let Some(path) = &source.phonetic_map {
        corpus.phone_map = Some(PhoneMap::load(path)?);
    }
    if config.has_bootstrap_data() {
        corpus.boot = Some(prepare_boot_labels(config, layout, &corpus)?);
    }

    info!(
        utterances = corpus.transcripts.len(),
        phones = corpus.phones.len(),
        orthographic = corpus.word_labels.is_some(),
        bootstrap = corpus.boot.is_some(),
        "Transcriptions prepared"
    );
    Ok(corpus)
}

async fn from_orthographic(
    config: &TrainingConfig,
    layout: &SessionLayout,
    editor: &LabelEditor,
    topology: &Topology,
    words_path: &Path,
    dictionary_path: &Path,
) -> Result<PreparedCorpus> {
    let silence = config.parms.silence_phone.as_str();
    let silence_word = config.parms.silence_word.as_deref();

    let words = MasterLabelFile::load(words_path)?;
    let mut dictionary = PronunciationDictionary::load(dictionary_path)?;

    if let Some(short_pause) = topology.short_pause.as_deref() {
        dictionary.append_short_pause(short_pause, silence);
    }
    if let Some(word) = silence_word {
        dictionary.set(word, vec![silence.to_string()]);
    }
    dictionary.check_covers(words.label_set().iter())?;
    dictionary.write(&layout.dictionary())?;

    // The tee topology models inter-word silence itself
    let padding = if topology.tee_model { None } else { silence_word };
    std::fs::write(layout.word_labels(), words.render_word_level(padding))?;

    editor
        .words_to_phones(
            &layout.word_labels(),
            &layout.dictionary(),
            &layout.phone_labels(),
            topology.short_pause.as_deref(),
        )
        .await?;

    if let Some(phonetic) = &config.source.phonetic_labels {
        let expected = MasterLabelFile::load(phonetic)?;
        let derived = MasterLabelFile::load(&layout.phone_labels())?;
        if !expected.same_sequences(&derived) {
            return Err(TrainingError::Consistency(format!(
                "phone labels derived from the orthography do not match {}",
                phonetic.display()
            )));
        }
    }

    Ok(PreparedCorpus {
        word_labels: Some(layout.word_labels()),
        phone_labels: layout.phone_labels(),
        dictionary: layout.dictionary(),
        phones: dictionary.phone_set(),
        transcripts: words,
        phone_map: None,
        boot: None,
    })
}

fn from_phonetic(layout: &SessionLayout, phonetic: &Path) -> Result<PreparedCorpus> {
    let labels = MasterLabelFile::load(phonetic)?;

    std::fs::write(
        layout.phone_labels(),
        labels.render_phone_level(PhoneLevelOptions::default())?,
    )?;
    std::fs::write(layout.dictionary(), labels.render_pseudo_dictionary())?;

    Ok(PreparedCorpus {
        word_labels: None,
        phone_labels: layout.phone_labels(),
        dictionary: layout.dictionary(),
        phones: labels.label_set(),
        transcripts: labels,
        phone_map: None,
        boot: None,
    })
}

fn prepare_boot_labels(
    config: &TrainingConfig,
    layout: &SessionLayout,
    corpus: &PreparedCorpus,
) -> Result<BootCorpus> {
    let (Some(labels_path), Some(audio)) = (&config.source.boot_labels, &config.source.boot_audio)
    else {
        return Err(TrainingError::Precondition(
            "bootstrap labels and audio must be given together".to_string(),
        ));
    };
    let transcripts = MasterLabelFile::load(labels_path)?;

    let boot_map = match (&config.source.boot_map, config.switches.mapped_bootstrap) {
        (Some(path), true) => Some(PhoneMap::load(path)?),
        _ => None,
    };
    let available: BTreeSet<String> = match &boot_map {
        Some(map) => transcripts
            .label_set()
            .iter()
            .filter_map(|p| map.category(p))
            .map(str::to_string)
            .collect(),
        None => transcripts.label_set().into_iter().collect(),
    };

    let mut required: BTreeSet<String> = corpus.phones.iter().cloned().collect();
    required.insert(config.parms.silence_phone.clone());
    if let Some(sp) = config.parms.short_pause_phone.as_deref() {
        required.remove(sp);
    }
    for phone in &required {
        let wanted = match (&boot_map, &corpus.phone_map) {
            (Some(_), Some(map)) => map.category(phone).ok_or_else(|| {
                TrainingError::Consistency(format!("phone /{}/ not in mapping", phone))
            })?,
            (Some(_), None) => {
                return Err(TrainingError::Precondition(
                    "mapped bootstrapping needs a corpus phone map".to_string(),
                ))
            }
            (None, _) => phone.as_str(),
        };
        if !available.contains(wanted) {
            return Err(TrainingError::Consistency(format!(
                "bootstrap labels have no segments for /{}/",
                wanted
            )));
        }
    }

    let rendered = transcripts.render_phone_level(PhoneLevelOptions {
        boundaries: true,
        map: boot_map.as_ref(),
        pad_with: None,
    })?;
    std::fs::write(layout.boot_labels(), rendered)?;

    Ok(BootCorpus {
        labels: layout.boot_labels(),
        audio: audio.clone(),
        transcripts,
    })
}

/// Locate or extract the corpus and bootstrap features; labels and
/// features must cover each other one to one
pub async fn prepare_features(
    config: &TrainingConfig,
    layout: &SessionLayout,
    provider: &dyn FeatureProvider,
    corpus: &PreparedCorpus,
) -> Result<FeatureSets> {
    let features = match (&config.source.features_dir, &config.source.audio) {
        (Some(dir), _) => {
            let features = collect_files(dir, FEATURE_EXT)?;
            check_coverage(&corpus.transcripts, &features)?;
            info!(files = features.len(), dir = %dir.display(), "Using existing features");
            features
        }
        (None, Some(audio)) => {
            check_coverage(&corpus.transcripts, &collect_files(audio, AUDIO_EXT)?)?;
            provider.extract(audio, &layout.feats_dir()).await?
        }
        (None, None) => {
            return Err(TrainingError::Precondition(
                "no audio or feature directory configured".to_string(),
            ))
        }
    };

    let boot = match &corpus.boot {
        Some(boot) => {
            check_coverage(&boot.transcripts, &collect_files(&boot.audio, AUDIO_EXT)?)?;
            Some(provider.extract(&boot.audio, &layout.bootfeats_dir()).await?)
        }
        None => None,
    };

    Ok(FeatureSets {
        corpus: features,
        boot,
    })
}

fn check_coverage(transcripts: &MasterLabelFile, files: &[PathBuf]) -> Result<()> {
    if files.is_empty() {
        warn!("No audio or feature files found");
    }
    let names = basenames(files);
    transcripts.check_covers(names.iter().map(String::as_str))
}

/// Triphone labels, the triphone dictionary and the triphone unit list
pub async fn prepare_triphones(
    corpus: &PreparedCorpus,
    layout: &SessionLayout,
    editor: &LabelEditor,
    silence: &str,
    short_pause: Option<&str>,
) -> Result<TriphoneResources> {
    let labels = layout.triphone_labels();
    let dictionary = layout.triphone_dictionary();

    editor
        .monophones_to_triphones(&corpus.phone_labels, &labels, silence, short_pause)
        .await?;
    let triphone_labels = MasterLabelFile::load(&labels)?;

    if corpus.word_labels.is_some() {
        editor
            .triphone_dictionary(&corpus.dictionary, &dictionary, short_pause)
            .await?;
    } else {
        std::fs::write(&dictionary, triphone_labels.render_pseudo_dictionary())?;
    }
    let triphone_dictionary = PronunciationDictionary::load(&dictionary)?;

    let units: Vec<String> = triphone_dictionary
        .phone_set()
        .into_iter()
        .chain(triphone_labels.label_set())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    info!(units = units.len(), "Triphone resources prepared");

    Ok(TriphoneResources {
        labels,
        dictionary,
        units,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineError, Invocation, ToolOutput};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Copies the HLEd input to its `-i` output
    struct CopyingEngine;

    #[async_trait]
    impl Engine for CopyingEngine {
        async fn invoke(&self, invocation: &Invocation) -> std::result::Result<ToolOutput, EngineError> {
            if let (Some(out), Some(input)) =
                (invocation.flag_value("-i"), invocation.trailing(1).first())
            {
                std::fs::copy(input, out).map_err(|e| EngineError::Spawn {
                    tool: invocation.tool(),
                    message: e.to_string(),
                })?;
            }
            Ok(ToolOutput {
                code: Some(0),
                ..Default::default()
            })
        }
    }

    fn setup(extra: &str) -> (TempDir, TrainingConfig, SessionLayout) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::write(
            root.join("words.mlf"),
            "#!MLF!#\n\"*/u1.lab\"\nhello\nworld\n.\n\"*/u2.lab\"\nworld\n.\n",
        )
        .unwrap();
        std::fs::write(root.join("lexicon"), "hello h @ l ou\nworld w @@ l d\n").unwrap();
        std::fs::write(
            root.join("phones.mlf"),
            "#!MLF!#\n\"*/u1.lab\"\nh\n@\n.\n\"*/u2.lab\"\nw\n.\n",
        )
        .unwrap();
        std::fs::write(root.join("proto"), "").unwrap();

        let mut config = TrainingConfig::from_toml_str(&format!(
            "[source]\nhmm_prototype = \"proto\"\naudio = \"wav\"\n{}",
            extra
        ))
        .unwrap();
        config.resolve_relative_to(root);

        let layout = SessionLayout::new(root.join("work"));
        layout.create().unwrap();
        (temp, config, layout)
    }

    fn editor() -> LabelEditor {
        LabelEditor::new(Arc::new(CopyingEngine))
    }

    #[tokio::test]
    async fn test_orthographic_preparation() {
        let (_temp, mut config, layout) = setup(
            "orthographic_labels = \"words.mlf\"\npronunciation_dictionary = \"lexicon\"\n",
        );
        config.parms.silence_word = Some("!SIL".to_string());

        let corpus = prepare_transcriptions(&config, &layout, &editor(), &Topology::standard())
            .await
            .unwrap();

        assert_eq!(corpus.word_labels, Some(layout.word_labels()));
        assert_eq!(corpus.phones, vec!["@", "@@", "d", "h", "l", "ou", "sil", "w"]);

        let words = std::fs::read_to_string(layout.word_labels()).unwrap();
        assert!(words.contains("\"*/u2.lab\"\n!SIL\nworld\n!SIL\n.\n"));
        let dict = std::fs::read_to_string(layout.dictionary()).unwrap();
        assert!(dict.contains("!SIL sil\n"));
    }

    #[tokio::test]
    async fn test_tee_topology_leaves_words_unpadded() {
        let (_temp, mut config, layout) = setup(
            "orthographic_labels = \"words.mlf\"\npronunciation_dictionary = \"lexicon\"\n",
        );
        config.parms.silence_word = Some("!SIL".to_string());

        prepare_transcriptions(&config, &layout, &editor(), &Topology::with_tee("sp"))
            .await
            .unwrap();

        let words = std::fs::read_to_string(layout.word_labels()).unwrap();
        assert!(words.contains("\"*/u2.lab\"\nworld\n.\n"));
        let dict = std::fs::read_to_string(layout.dictionary()).unwrap();
        assert!(dict.contains("world w @@ l d sp\n"));
        assert!(dict.contains("!SIL sil\n"));
    }

    #[tokio::test]
    async fn test_missing_word_is_inconsistent() {
        let (temp, config, layout) = setup(
            "orthographic_labels = \"words.mlf\"\npronunciation_dictionary = \"lexicon\"\n",
        );
        std::fs::write(temp.path().join("lexicon"), "hello h @ l ou\n").unwrap();

        let err = prepare_transcriptions(&config, &layout, &editor(), &Topology::standard())
            .await
            .unwrap_err();
        assert!(matches!(err, TrainingError::Consistency(_)));
    }

    #[tokio::test]
    async fn test_phonetic_preparation() {
        let (_temp, config, layout) = setup("phonetic_labels = \"phones.mlf\"\n");

        let corpus = prepare_transcriptions(&config, &layout, &editor(), &Topology::standard())
            .await
            .unwrap();

        assert!(corpus.word_labels.is_none());
        assert_eq!(corpus.phones, vec!["@", "h", "w"]);
        let dict = std::fs::read_to_string(layout.dictionary()).unwrap();
        assert_eq!(dict, "@ @\nh h\nw w\n");
    }

    #[tokio::test]
    async fn test_cross_check_against_phonetic_labels() {
        let (_temp, config, layout) = setup(
            "orthographic_labels = \"words.mlf\"\npronunciation_dictionary = \"lexicon\"\n\
             phonetic_labels = \"phones.mlf\"\n",
        );

        // The copying engine leaves word labels in the phone file
        let err = prepare_transcriptions(&config, &layout, &editor(), &Topology::standard())
            .await
            .unwrap_err();
        assert!(matches!(err, TrainingError::Consistency(_)));
    }

    #[test]
    fn test_coverage_is_one_to_one() {
        let labels = MasterLabelFile::parse("#!MLF!#\n\"*/a.lab\"\nx\n.\n").unwrap();
        assert!(check_coverage(&labels, &[PathBuf::from("/w/a.wav")]).is_ok());
        assert!(check_coverage(&labels, &[]).is_err());
        assert!(check_coverage(
            &labels,
            &[PathBuf::from("/w/a.wav"), PathBuf::from("/w/b.wav")]
        )
        .is_err());
    }
}
