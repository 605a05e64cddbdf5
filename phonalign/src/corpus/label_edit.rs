//! Label and dictionary editing through HLEd and HDMan

use crate::corpus::features::write_scratch;
use crate::engine::{run_checked, Engine, Invocation, Tool};
use crate::error::Result;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One label-editor directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelEdit {
    /// `EX`: expand words into phones via the dictionary
    Expand,
    /// `DE label`
    Delete(String),
    /// `WB label`: word-boundary unit excluded from context
    WordBoundary(String),
    /// `NB label`: unit ignored when forming contexts
    NoBoundary(String),
    /// `TC`: convert to triphones
    TriphoneContext,
    /// `RE target category`
    Replace { target: String, category: String },
}

impl fmt::Display for LabelEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelEdit::Expand => f.write_str("EX"),
            LabelEdit::Delete(label) => write!(f, "DE {}", label),
            LabelEdit::WordBoundary(label) => write!(f, "WB {}", label),
            LabelEdit::NoBoundary(label) => write!(f, "NB {}", label),
            LabelEdit::TriphoneContext => f.write_str("TC"),
            LabelEdit::Replace { target, category } => write!(f, "RE {} {}", target, category),
        }
    }
}

pub fn render_edits(edits: &[LabelEdit]) -> String {
    edits.iter().map(|e| format!("{}\n", e)).collect()
}

/// Runs label and dictionary edits through the engine
#[derive(Clone)]
pub struct LabelEditor {
    engine: Arc<dyn Engine>,
}

impl LabelEditor {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// Apply `edits` to `input`, writing `output`
    pub async fn edit_mlf(
        &self,
        edits: &[LabelEdit],
        input: &Path,
        output: &Path,
        dictionary: Option<&Path>,
    ) -> Result<()> {
        let script = write_scratch(&render_edits(edits))?;
        debug!(edits = edits.len(), output = %output.display(), "Editing labels");

        let invocation = Invocation::new(Tool::HLEd)
            .arg("-l")
            .arg("*")
            .opt("-d", dictionary)
            .arg("-i")
            .arg(output)
            .arg(script.path())
            .arg(input);
        run_checked(self.engine.as_ref(), &invocation).await?;
        Ok(())
    }

    /// Word-level MLF to phone-level MLF; the short pause is dropped from
    /// the expansion when given
    pub async fn words_to_phones(
        &self,
        word_mlf: &Path,
        dictionary: &Path,
        phone_mlf: &Path,
        short_pause: Option<&str>,
    ) -> Result<()> {
        let mut edits = vec![LabelEdit::Expand];
        if let Some(sp) = short_pause {
            edits.push(LabelEdit::Delete(sp.to_string()));
        }
        self.edit_mlf(&edits, word_mlf, phone_mlf, Some(dictionary))
            .await
    }

    /// Monophone labels to triphone labels
    pub async fn monophones_to_triphones(
        &self,
        phone_mlf: &Path,
        triphone_mlf: &Path,
        silence: &str,
        short_pause: Option<&str>,
    ) -> Result<()> {
        self.edit_mlf(
            &triphone_edits(silence, short_pause),
            phone_mlf,
            triphone_mlf,
            None,
        )
        .await
    }

    /// Labels reverse-mapped so that `category` reads as `target`
    pub async fn unmap(
        &self,
        mlf: &Path,
        output: &Path,
        target: &str,
        category: &str,
    ) -> Result<()> {
        let edits = [LabelEdit::Replace {
            target: target.to_string(),
            category: category.to_string(),
        }];
        self.edit_mlf(&edits, mlf, output, None).await
    }

    /// Triphone dictionary from a monophone dictionary
    pub async fn triphone_dictionary(
        &self,
        dictionary: &Path,
        output: &Path,
        short_pause: Option<&str>,
    ) -> Result<()> {
        let script = write_scratch(&render_edits(&[LabelEdit::TriphoneContext]))?;

        let invocation = Invocation::new(Tool::HDMan)
            .opt("-b", short_pause)
            .arg("-g")
            .arg(script.path())
            .arg(output)
            .arg(dictionary);
        run_checked(self.engine.as_ref(), &invocation).await?;
        Ok(())
    }
}

/// Edits converting monophone labels to triphones
pub fn triphone_edits(silence: &str, short_pause: Option<&str>) -> Vec<LabelEdit> {
    let mut edits = vec![LabelEdit::WordBoundary(silence.to_string())];
    if let Some(sp) = short_pause {
        edits.push(LabelEdit::WordBoundary(sp.to_string()));
        edits.push(LabelEdit::NoBoundary(sp.to_string()));
    }
    edits.push(LabelEdit::TriphoneContext);
    edits
}
