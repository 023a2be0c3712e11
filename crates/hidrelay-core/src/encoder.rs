//! Text wire encoding of input events
//!
//! Each event becomes one short tagged message:
//!
//! | Event | Tag |
//! |---|---|
//! | key pressed | `P:` (or `KP:`) followed by the hex key code |
//! | key released | `R:` (or `KR:`) followed by the hex key code |
//! | left button down, pointer move | `ML:x,y` |
//! | right button down | `MR:x,y` |
//! | left button up | `MS:x,y` |
//! | right button up | `ME:x,y` |
//!
//! Coordinates are normalized to `0..=32767`. Tags never contain `:` or `,` and values
//! are hex or decimal digits, so no escaping is needed.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::event::{InputEvent, PointerButton};

// ----------------------------------------------------------------------------
// Tag Dialects
// ----------------------------------------------------------------------------

/// Which key tags to emit; relay firmware accepts both
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyTagStyle {
    /// `P:` / `R:`
    #[default]
    Short,
    /// `KP:` / `KR:`
    Long,
}

impl KeyTagStyle {
    fn press(self) -> &'static str {
        match self {
            KeyTagStyle::Short => "P",
            KeyTagStyle::Long => "KP",
        }
    }

    fn release(self) -> &'static str {
        match self {
            KeyTagStyle::Short => "R",
            KeyTagStyle::Long => "KR",
        }
    }
}

// ----------------------------------------------------------------------------
// Relay Message
// ----------------------------------------------------------------------------

/// One encoded event, ready to be chunked and written
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelayMessage(String);

impl RelayMessage {
    /// Wrap pre-formatted relay text; it is sent as-is
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RelayMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RelayMessage> for String {
    fn from(message: RelayMessage) -> Self {
        message.0
    }
}

// ----------------------------------------------------------------------------
// Encoder
// ----------------------------------------------------------------------------

/// Stateless event encoder parameterized by the key tag dialect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Encoder {
    key_tags: KeyTagStyle,
}

impl Encoder {
    pub fn new(key_tags: KeyTagStyle) -> Self {
        Self { key_tags }
    }

    pub fn key_tags(&self) -> KeyTagStyle {
        self.key_tags
    }

    /// Encode one event
    pub fn encode(&self, event: &InputEvent) -> RelayMessage {
        let text = match event {
            InputEvent::KeyDown(code) => format!("{}:{}", self.key_tags.press(), code),
            InputEvent::KeyUp(code) => format!("{}:{}", self.key_tags.release(), code),
            InputEvent::PointerDown { button, position } => {
                let tag = match button {
                    PointerButton::Left => "ML",
                    PointerButton::Right => "MR",
                };
                format!("{}:{}", tag, position.normalized())
            }
            InputEvent::PointerUp { button, position } => {
                let tag = match button {
                    PointerButton::Left => "MS",
                    PointerButton::Right => "ME",
                };
                format!("{}:{}", tag, position.normalized())
            }
            InputEvent::PointerMove { position } => format!("ML:{}", position.normalized()),
        };
        RelayMessage(text)
    }
}

/// Encode with the default (`P:`/`R:`) key tags
pub fn encode(event: &InputEvent) -> RelayMessage {
    Encoder::default().encode(event)
}
