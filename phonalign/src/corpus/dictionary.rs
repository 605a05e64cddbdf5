//! Pronunciation dictionary (`WORD p1 p2 ...`, one pronunciation per line)

use crate::error::{Result, TrainingError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PronunciationDictionary {
    entries: BTreeMap<String, Vec<Vec<String>>>,
}

impl PronunciationDictionary {
    pub fn parse(text: &str) -> Result<Self> {
        let mut dict = Self::default();
        for (lineno, line) in text.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            let Some(word) = tokens.next() else {
                continue;
            };
            let phones: Vec<String> = tokens.map(str::to_string).collect();
            if phones.is_empty() {
                return Err(TrainingError::Consistency(format!(
                    "dictionary line {}: '{}' has no pronunciation",
                    lineno + 1,
                    word
                )));
            }
            dict.add(word, phones);
        }
        Ok(dict)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Add a pronunciation variant
    pub fn add(&mut self, word: &str, phones: Vec<String>) {
        let variants = self.entries.entry(word.to_string()).or_default();
        if !variants.contains(&phones) {
            variants.push(phones);
        }
    }

    /// Replace all pronunciations of `word`
    pub fn set(&mut self, word: &str, phones: Vec<String>) {
        self.entries.insert(word.to_string(), vec![phones]);
    }

    pub fn contains(&self, word: &str) -> bool {
        self.entries.contains_key(word)
    }

    pub fn pronunciations(&self, word: &str) -> Option<&[Vec<String>]> {
        self.entries.get(word).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append `short_pause` to every pronunciation not ending in `silence`
    pub fn append_short_pause(&mut self, short_pause: &str, silence: &str) {
        for variants in self.entries.values_mut() {
            for pron in variants.iter_mut() {
                if pron.last().map(String::as_str) != Some(silence) {
                    pron.push(short_pause.to_string());
                }
            }
        }
    }

    /// Sorted distinct phones over all pronunciations
    pub fn phone_set(&self) -> Vec<String> {
        self.entries
            .values()
            .flatten()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every word must have an entry
    pub fn check_covers<'a>(&self, words: impl IntoIterator<Item = &'a String>) -> Result<()> {
        let missing: Vec<&str> = words
            .into_iter()
            .filter(|w| !self.contains(w))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TrainingError::Consistency(format!(
                "pronunciation dictionary does not contain: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (word, variants) in &self.entries {
            for pron in variants {
                let _ = writeln!(out, "{} {}", word, pron.join(" "));
            }
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DICT: &str = "hello h @ l ou\nhello h e l ou\nworld w @@ l d\n\n";

    #[test]
    fn test_parse_variants() {
        let dict = PronunciationDictionary::parse(DICT).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.pronunciations("hello").unwrap().len(), 2);
        assert_eq!(dict.phone_set(), vec!["@", "@@", "d", "e", "h", "l", "ou", "w"]);
    }

    #[test]
    fn test_entry_without_pronunciation() {
        assert!(PronunciationDictionary::parse("lonely\n").is_err());
    }

    #[test]
    fn test_short_pause_appended_except_after_silence() {
        let mut dict = PronunciationDictionary::parse("a a\n").unwrap();
        dict.set("!SIL", vec!["sil".to_string()]);
        dict.append_short_pause("sp", "sil");

        assert_eq!(dict.render(), "!SIL sil\na a sp\n");
    }

    #[test]
    fn test_coverage() {
        let dict = PronunciationDictionary::parse(DICT).unwrap();
        let words = vec!["hello".to_string(), "there".to_string()];
        let err = dict.check_covers(&words).unwrap_err();
        assert!(err.to_string().contains("there"));
    }
}
