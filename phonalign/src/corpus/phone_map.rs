//! Phone-to-category map used by mapped bootstrapping

use crate::error::{Result, TrainingError};
use std::collections::BTreeMap;
use std::path::Path;

/// `phone category` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhoneMap {
    map: BTreeMap<String, String>,
}

impl PhoneMap {
    /// Lines with fewer than two fields are ignored
    pub fn parse(text: &str) -> Result<Self> {
        let map = text
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                match (fields.next(), fields.next()) {
                    (Some(phone), Some(category)) => Some((phone.to_string(), category.to_string())),
                    _ => None,
                }
            })
            .collect();
        Ok(Self { map })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn category(&self, phone: &str) -> Option<&str> {
        self.map.get(phone).map(String::as_str)
    }

    /// Every phone must be mapped
    pub fn check_covers(&self, phones: &[String]) -> Result<()> {
        match phones.iter().find(|p| !self.map.contains_key(p.as_str())) {
            Some(phone) => Err(TrainingError::Consistency(format!(
                "phone /{}/ not in mapping",
                phone
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_lookup() {
        let map = PhoneMap::parse("aa V\nb C extra\n\nlonely\n").unwrap();
        assert_eq!(map.category("aa"), Some("V"));
        assert_eq!(map.category("b"), Some("C"));
        assert_eq!(map.category("lonely"), None);
    }

    #[test]
    fn test_coverage() {
        let map = PhoneMap::parse("aa V\n").unwrap();
        assert!(map.check_covers(&["aa".to_string()]).is_ok());
        assert!(map.check_covers(&["aa".to_string(), "k".to_string()]).is_err());
    }
}
