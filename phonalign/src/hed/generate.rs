//! Script generators

use super::{
    CommandScript, EditCommand, StateLayout, RO_THRESHOLD, SILENCE_LOOP_PROB, TB_THRESHOLD,
    TEE_SKIP_PROB,
};
use crate::models::PhoneInventory;
use std::path::Path;

/// Extra silence transitions: every real state but the last two jumps to
/// the last real state, and the last real state loops back to the first.
///
/// A single-real-state topology yields an empty script.
pub fn silence_augmentation(layout: StateLayout, silence: &str) -> CommandScript {
    let mut script = CommandScript::new();
    let last = layout.last_real();

    for i in layout.first_real()..last.saturating_sub(1) {
        script.push(EditCommand::AddTransition {
            from: i,
            to: last,
            prob: SILENCE_LOOP_PROB,
            unit: silence.to_string(),
        });
    }
    if !layout.single_real_state() {
        script.push(EditCommand::AddTransition {
            from: last,
            to: layout.first_real(),
            prob: SILENCE_LOOP_PROB,
            unit: silence.to_string(),
        });
    }
    script
}

/// Silence augmentation plus the short-pause skip transition and the tie of
/// the short-pause state to the silence middle state
pub fn tee_fixup(layout: StateLayout, silence: &str, short_pause: &str) -> CommandScript {
    let mut script = silence_augmentation(layout, silence);
    script.push(EditCommand::AddTransition {
        from: 1,
        to: 3,
        prob: TEE_SKIP_PROB,
        unit: short_pause.to_string(),
    });
    script.push(EditCommand::TieTransitions {
        macro_name: format!("{}st", silence),
        items: format!(
            "{}.state[{}],{}.state[2]",
            silence,
            layout.middle(),
            short_pause
        ),
    });
    script
}

/// Clone monophones into the listed context-dependent units and tie the
/// transition matrices of every unit sharing a centre phone
pub fn clone_triphones(inventory: &PhoneInventory, triphone_list: &Path) -> CommandScript {
    let mut script = CommandScript::new();
    script.push(EditCommand::CloneByContext {
        list: triphone_list.to_path_buf(),
    });

    for phone in inventory.current() {
        if phone == inventory.silence() {
            continue;
        }
        script.push(EditCommand::TieTransitions {
            macro_name: format!("T_{}", phone),
            items: format!("(*-{p}+*,{p}+*,*-{p}).transP", p = phone),
        });
    }
    script
}

/// Decision-tree state tying with left/right context questions generated
/// from the base phones
pub fn tie_states(
    layout: StateLayout,
    base_phones: &[String],
    stats: &Path,
    triphone_list: &Path,
) -> CommandScript {
    let mut script = CommandScript::new();
    script.push(EditCommand::LoadStats {
        threshold: RO_THRESHOLD,
        stats: stats.to_path_buf(),
    });
    script.push(EditCommand::Trace(0));

    for phone in base_phones {
        script.push(EditCommand::Question {
            name: format!("R_{}", phone),
            pattern: format!("*+{}", phone),
        });
        script.push(EditCommand::Question {
            name: format!("L_{}", phone),
            pattern: format!("{}-*", phone),
        });
    }
    script.push(EditCommand::Trace(2));

    for state in layout.real_states() {
        for phone in base_phones {
            script.push(EditCommand::TieStatesByThreshold {
                threshold: TB_THRESHOLD,
                macro_name: format!("ST_{}_{}_", phone, state),
                items: format!("({p},*-{p}+*,{p}+*,*-{p}).state[{s}]", p = phone, s = state),
            });
        }
    }

    script.push(EditCommand::Trace(1));
    script.push(EditCommand::Apply {
        list: triphone_list.to_path_buf(),
    });
    script
}

/// A hand-written tying script, one directive per non-blank line
pub fn questions_from_file(text: &str) -> CommandScript {
    let mut script = CommandScript::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        script.push(EditCommand::Raw(line.to_string()));
    }
    script
}

/// Add one Gaussian component to every real state
pub fn increment_mixtures(layout: StateLayout) -> CommandScript {
    let states = if layout.single_real_state() {
        layout.first_real().to_string()
    } else {
        format!("{}-{}", layout.first_real(), layout.last_real())
    };

    let mut script = CommandScript::new();
    script.push(EditCommand::IncrementMixtures { states });
    script
}
