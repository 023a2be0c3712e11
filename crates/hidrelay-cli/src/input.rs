//! Line input for the `run` and `send` commands
//!
//! Each line is an input event in the core line syntax (`down 0x41`, `move 10 20`), or
//! `raw <text>` to write pre-formatted relay text unchanged. Blank lines and lines
//! starting with `#` are ignored.

use anyhow::Context;
use hidrelay_core::InputEvent;

/// One parsed line of input
#[derive(Debug, Clone, PartialEq)]
pub enum InputLine {
    Event(InputEvent),
    Raw(String),
    Skip,
}

pub fn parse_line(line: &str) -> anyhow::Result<InputLine> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(InputLine::Skip);
    }
    if let Some(text) = line.strip_prefix("raw ") {
        return Ok(InputLine::Raw(text.trim_start().to_string()));
    }

    let event = line
        .parse::<InputEvent>()
        .with_context(|| format!("could not parse {:?}", line))?;
    Ok(InputLine::Event(event))
}
