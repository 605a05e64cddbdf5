//! Model-editing command scripts
//!
//! Commands are held as [`EditCommand`] values and rendered to the editor's
//! text syntax only when a script is written for the engine. Generation is
//! a pure function of its inputs.

pub mod generate;

use crate::error::{Result, TrainingError};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;

pub use generate::{
    clone_triphones, increment_mixtures, questions_from_file, silence_augmentation, tee_fixup,
    tie_states,
};

/// Outlier threshold for state clustering statistics
pub const RO_THRESHOLD: f64 = 100.0;
/// Likelihood threshold for tree-based state tying
pub const TB_THRESHOLD: f64 = 350.0;
/// Probability of the added silence transitions
pub const SILENCE_LOOP_PROB: f64 = 0.2;
/// Probability of the short-pause skip transition
pub const TEE_SKIP_PROB: f64 = 0.3;

/// State numbering of the prototype topology
///
/// States `1` and `N` are non-emitting; real states run from 2 to `N - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLayout {
    num_states: usize,
}

impl StateLayout {
    pub fn new(num_states: usize) -> Result<Self> {
        if num_states < 3 {
            return Err(TrainingError::MalformedModel(format!(
                "topology needs at least one emitting state, got {} states",
                num_states
            )));
        }
        Ok(Self { num_states })
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn first_real(&self) -> usize {
        2
    }

    pub fn last_real(&self) -> usize {
        self.num_states - 1
    }

    pub fn middle(&self) -> usize {
        (self.first_real() + self.last_real()) / 2
    }

    pub fn real_states(&self) -> RangeInclusive<usize> {
        self.first_real()..=self.last_real()
    }

    pub fn single_real_state(&self) -> bool {
        self.first_real() == self.last_real()
    }
}

/// One editor directive
#[derive(Debug, Clone, PartialEq)]
pub enum EditCommand {
    /// `AT i j prob {unit.transP}`
    AddTransition {
        from: usize,
        to: usize,
        prob: f64,
        unit: String,
    },
    /// `TI macro {items}`
    TieTransitions { macro_name: String, items: String },
    /// `CL list`
    CloneByContext { list: PathBuf },
    /// `RO threshold stats`
    LoadStats { threshold: f64, stats: PathBuf },
    /// `TR level`
    Trace(u32),
    /// `QS "name" { pattern }`
    Question { name: String, pattern: String },
    /// `TB threshold "macro" {items}`
    TieStatesByThreshold {
        threshold: f64,
        macro_name: String,
        items: String,
    },
    /// `AU "list"`
    Apply { list: PathBuf },
    /// `MU +1 {*.state[..].mix}`
    IncrementMixtures { states: String },
    /// A line taken verbatim from a supplied script
    Raw(String),
}

impl fmt::Display for EditCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditCommand::AddTransition {
                from,
                to,
                prob,
                unit,
            } => write!(f, "AT {} {} {:.1} {{{}.transP}}", from, to, prob, unit),
            EditCommand::TieTransitions { macro_name, items } => {
                write!(f, "TI {} {{{}}}", macro_name, items)
            }
            EditCommand::CloneByContext { list } => write!(f, "CL {}", list.display()),
            EditCommand::LoadStats { threshold, stats } => {
                write!(f, "RO {:.1} {}", threshold, stats.display())
            }
            EditCommand::Trace(level) => write!(f, "TR {}", level),
            EditCommand::Question { name, pattern } => {
                write!(f, "QS {:<10}{{ {} }}", format!("\"{}\"", name), pattern)
            }
            EditCommand::TieStatesByThreshold {
                threshold,
                macro_name,
                items,
            } => write!(f, "TB {:.1} \"{}\" {{{}}}", threshold, macro_name, items),
            EditCommand::Apply { list } => write!(f, "AU \"{}\"", list.display()),
            EditCommand::IncrementMixtures { states } => {
                write!(f, "MU +1 {{*.state[{}].mix}}", states)
            }
            EditCommand::Raw(line) => f.write_str(line),
        }
    }
}

/// Ordered sequence of editor directives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandScript {
    commands: Vec<EditCommand>,
}

impl CommandScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: EditCommand) {
        self.commands.push(command);
    }

    pub fn extend(&mut self, other: CommandScript) {
        self.commands.extend(other.commands);
    }

    pub fn commands(&self) -> &[EditCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Display for CommandScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for command in &self.commands {
            writeln!(f, "{}", command)?;
        }
        Ok(())
    }
}
