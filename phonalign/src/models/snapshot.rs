//! Model definition bundles
//!
//! A snapshot is the pair of engine files `macros` and `hmmdefs`. The unit
//! bundle is split on lines whose trimmed text starts with `~h` (any case);
//! whatever precedes the first such line is the bundle header.

use crate::error::{Result, TrainingError};

pub const MACROS_FILE: &str = "macros";
pub const HMMDEFS_FILE: &str = "hmmdefs";
pub const VFLOORS_FILE: &str = "vFloors";

/// One unit: its name and the definition text following the `~h` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDefinition {
    pub name: String,
    pub body: String,
}

impl UnitDefinition {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }

    fn write_to(&self, out: &mut String) {
        out.push_str("~h \"");
        out.push_str(&self.name);
        out.push_str("\"\n");
        out.push_str(&self.body);
    }
}

/// Header text plus ordered unit definitions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitBundle {
    pub header: String,
    pub units: Vec<UnitDefinition>,
}

impl UnitBundle {
    pub fn parse(text: &str) -> Result<Self> {
        let mut header = String::new();
        let mut units: Vec<UnitDefinition> = Vec::new();

        for line in text.split_inclusive('\n') {
            if is_unit_marker(line) {
                units.push(UnitDefinition::new(unit_name(line)?, String::new()));
            } else if let Some(unit) = units.last_mut() {
                unit.body.push_str(line);
            } else {
                header.push_str(line);
            }
        }

        Ok(Self { header, units })
    }

    pub fn serialize(&self) -> String {
        let mut out = self.header.clone();
        for unit in &self.units {
            unit.write_to(&mut out);
        }
        out
    }

    pub fn get(&self, name: &str) -> Option<&UnitDefinition> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }
}

/// Contents of one committed iteration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSnapshot {
    pub macros: String,
    pub bundle: UnitBundle,
}

fn is_unit_marker(line: &str) -> bool {
    line.trim_start()
        .get(..2)
        .map_or(false, |p| p.eq_ignore_ascii_case("~h"))
}

fn unit_name(line: &str) -> Result<String> {
    let rest = line.trim().get(2..).unwrap_or("").trim();
    let name = rest.trim_matches('"');
    if name.is_empty() {
        return Err(TrainingError::MalformedModel(format!(
            "unit marker without a name: {}",
            line.trim()
        )));
    }
    Ok(name.to_string())
}

/// Split prototype text into its preamble and the definition after `~h`
pub fn split_prototype(text: &str) -> Result<(String, String)> {
    let mut preamble = String::new();
    let mut body = String::new();
    let mut seen_marker = false;

    for line in text.split_inclusive('\n') {
        if seen_marker {
            body.push_str(line);
        } else if is_unit_marker(line) {
            seen_marker = true;
        } else {
            preamble.push_str(line);
        }
    }

    if !seen_marker {
        return Err(TrainingError::MalformedModel(
            "prototype has no ~h unit definition".to_string(),
        ));
    }
    Ok((preamble, body))
}

/// Number of states declared by the prototype's `<NUMSTATES>` line
pub fn num_states_from_prototype(text: &str) -> Result<usize> {
    for line in text.lines() {
        let mut tokens = line.split_whitespace();
        if let Some(first) = tokens.next() {
            if first.eq_ignore_ascii_case("<numstates>") {
                return tokens
                    .next()
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| {
                        TrainingError::MalformedModel(format!("invalid NUMSTATES line: {}", line))
                    });
            }
        }
    }
    Err(TrainingError::MalformedModel(
        "prototype has no <NUMSTATES> line".to_string(),
    ))
}

const TEE_TRANSITIONS: &str = "<TRANSP> 3\n\
0.000000e+00 1.000000e+00 0.000000e+00\n\
0.000000e+00 6.000000e-01 4.000000e-01\n\
0.000000e+00 0.000000e+00 0.000000e+00\n\
<ENDHMM>\n";

/// Build the one-state short-pause unit from the silence unit's state `state`
pub fn derive_tee_unit(
    bundle: &UnitBundle,
    silence: &str,
    short_pause: &str,
    state: usize,
) -> Result<UnitDefinition> {
    let sil = bundle.get(silence).ok_or_else(|| {
        TrainingError::MalformedModel(format!("silence unit '{}' not in model set", silence))
    })?;

    let section = excerpt_state(&sil.body, state).ok_or_else(|| {
        TrainingError::MalformedModel(format!(
            "silence unit '{}' has no <STATE> {}",
            silence, state
        ))
    })?;

    let body = format!(
        "<BEGINHMM>\n<NUMSTATES> 3\n<STATE> 2{}{}",
        section, TEE_TRANSITIONS
    );
    Ok(UnitDefinition::new(short_pause, body))
}

/// Text following `<STATE> n` up to the next `<STATE>` or `<TRANSP>`
fn excerpt_state(body: &str, state: usize) -> Option<&str> {
    // ASCII upper-casing keeps byte offsets aligned with `body`
    let upper = body.to_ascii_uppercase();
    let needle = format!("<STATE> {}", state);

    let mut search_from = 0;
    let start = loop {
        let pos = upper[search_from..].find(&needle)? + search_from;
        let end = pos + needle.len();
        match upper[end..].chars().next() {
            Some(c) if c.is_ascii_digit() => search_from = end,
            _ => break end,
        }
    };

    let rest = &upper[start..];
    let stop = [rest.find("<STATE>"), rest.find("<TRANSP>")]
        .into_iter()
        .flatten()
        .min()?;
    Some(&body[start..start + stop])
}
