//! phonalign library interface
//!
//! Drives an external acoustic-modeling engine through model training and
//! phonetic alignment:
//! - `engine`: port to the engine tools and the process-backed implementation
//! - `services`: versioned model snapshot store
//! - `models`: phone inventory, model definitions, session state
//! - `hed`: model-editing command scripts
//! - `corpus`: label files, dictionaries, features, label editing
//! - `workflow`: trainer stages and pipeline flavors

pub mod corpus;
pub mod engine;
pub mod error;
pub mod hed;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::error::{Result, TrainingError};
pub use crate::workflow::{run_training, PipelineVariant, Trainer, TrainerSettings};
