//! Corpus resources: label files, dictionaries, phone maps, features and
//! engine-driven label editing

pub mod dictionary;
pub mod features;
pub mod label_edit;
pub mod mlf;
pub mod phone_map;

pub use dictionary::PronunciationDictionary;
pub use features::{FeatureProvider, HCopyFeatures};
pub use label_edit::{LabelEdit, LabelEditor};
pub use mlf::{LabelItem, MasterLabelFile, PhoneLevelOptions};
pub use phone_map::PhoneMap;
