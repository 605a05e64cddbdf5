//! Configuration loading and path resolution tests
//!
//! Tests touching PHONALIGN_CONFIG or PHONALIGN_WORKING_DIR are marked
//! #[serial] so environment changes do not race.

use phonalign_common::config::{
    resolve_config_path, resolve_working_dir, TrainingConfig, CONFIG_ENV_VAR, WORKING_DIR_ENV_VAR,
};
use phonalign_common::Error;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const MINIMAL: &str = r#"
working_dir = "work"

[source]
audio = "wav"
phonetic_labels = "labels/phones.mlf"
hmm_prototype = "proto"
"#;

#[test]
fn test_load_resolves_relative_paths_against_config_dir() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("train.toml");
    fs::write(&config_path, MINIMAL).unwrap();

    let config = TrainingConfig::load(&config_path).unwrap();

    assert_eq!(config.working_dir, Some(temp.path().join("work")));
    assert_eq!(config.source.audio, Some(temp.path().join("wav")));
    assert_eq!(
        config.source.phonetic_labels,
        Some(temp.path().join("labels/phones.mlf"))
    );
    assert_eq!(config.source.hmm_prototype, Some(temp.path().join("proto")));
}

#[test]
fn test_absolute_paths_are_kept() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("train.toml");
    fs::write(
        &config_path,
        r#"
        [source]
        features_dir = "/data/feats"
        phonetic_labels = "/data/phones.mlf"
        hmm_prototype = "/data/proto"
        "#,
    )
    .unwrap();

    let config = TrainingConfig::load(&config_path).unwrap();
    assert_eq!(config.source.features_dir, Some(PathBuf::from("/data/feats")));
    assert_eq!(config.source.hmm_prototype, Some(PathBuf::from("/data/proto")));
}

#[test]
fn test_missing_config_file_is_not_found() {
    let temp = TempDir::new().unwrap();
    let result = TrainingConfig::load(&temp.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn test_malformed_toml_is_reported() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("bad.toml");
    fs::write(&config_path, "[source\naudio = ").unwrap();

    let result = TrainingConfig::load(&config_path);
    assert!(matches!(result, Err(Error::Toml(_))));
}

#[test]
fn test_orthographic_requires_dictionary() {
    let config = TrainingConfig::from_toml_str(
        r#"
        [source]
        audio = "wav"
        orthographic_labels = "words.mlf"
        hmm_prototype = "proto"
        "#,
    )
    .unwrap();

    assert!(!config.has_orthographic());
    assert!(config.validate().is_err());
}

#[test]
fn test_boot_labels_without_audio_rejected() {
    let config = TrainingConfig::from_toml_str(
        r#"
        [source]
        audio = "wav"
        phonetic_labels = "phones.mlf"
        hmm_prototype = "proto"
        boot_labels = "boot.mlf"
        "#,
    )
    .unwrap();

    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn test_zero_mixtures_rejected() {
    let config = TrainingConfig::from_toml_str(&format!(
        "{}\n[switches]\nmixtures_per_state = 0\n",
        MINIMAL
    ))
    .unwrap();

    assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));
}

#[test]
fn test_stage_counts_partial_override() {
    let config = TrainingConfig::from_toml_str(&format!(
        "{}\n[training]\ninit_reestimations = 1\n",
        MINIMAL
    ))
    .unwrap();

    assert_eq!(config.training.init_reestimations, 1);
    assert_eq!(config.training.align_reestimations, 5);
    assert_eq!(config.training.tied_reestimations, 2);
}

#[test]
#[serial]
fn test_config_path_cli_beats_env() {
    env::set_var(CONFIG_ENV_VAR, "/env/config.toml");

    let resolved = resolve_config_path(Some(Path::new("/cli/config.toml"))).unwrap();
    assert_eq!(resolved, PathBuf::from("/cli/config.toml"));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_config_path_from_env() {
    env::set_var(CONFIG_ENV_VAR, "/env/config.toml");

    let resolved = resolve_config_path(None).unwrap();
    assert_eq!(resolved, PathBuf::from("/env/config.toml"));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_working_dir_priority() {
    let mut config = TrainingConfig::from_toml_str(MINIMAL).unwrap();
    config.working_dir = Some(PathBuf::from("/toml/work"));

    env::remove_var(WORKING_DIR_ENV_VAR);
    assert_eq!(
        resolve_working_dir(None, &config).unwrap(),
        PathBuf::from("/toml/work")
    );

    env::set_var(WORKING_DIR_ENV_VAR, "/env/work");
    assert_eq!(
        resolve_working_dir(None, &config).unwrap(),
        PathBuf::from("/env/work")
    );
    assert_eq!(
        resolve_working_dir(Some(Path::new("/cli/work")), &config).unwrap(),
        PathBuf::from("/cli/work")
    );

    env::remove_var(WORKING_DIR_ENV_VAR);
}

#[test]
#[serial]
fn test_working_dir_missing_everywhere() {
    env::remove_var(WORKING_DIR_ENV_VAR);
    let config = TrainingConfig::default();
    assert!(matches!(
        resolve_working_dir(None, &config),
        Err(Error::Config(_))
    ));
}
