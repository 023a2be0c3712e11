//! Typed input events produced by the host
//!
//! Events come from the host's window/event loop. Pointer events carry either an
//! already-normalized position or a raw viewport position together with the visible
//! video rectangle it should be normalized against.
//!
//! `InputEvent` also parses from a small line syntax used by the command-line host:
//!
//! ```text
//! down 0x41            key pressed
//! up 65                key released
//! press left 100 200   pointer button pressed at normalized (100, 200)
//! release right 5 5    pointer button released
//! move 16383 16383     pointer moved
//! ```

use core::fmt;
use core::str::FromStr;

use crate::geometry::{DisplayRect, NormalizedPoint};
use crate::{RelayError, Result};

// ----------------------------------------------------------------------------
// Key Codes
// ----------------------------------------------------------------------------

/// Platform key code as delivered by the host's windowing toolkit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyCode(u32);

impl KeyCode {
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for KeyCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for KeyCode {
    type Err = RelayError;

    /// Accepts decimal (`65`) or `0x`-prefixed hexadecimal (`0x41`)
    fn from_str(s: &str) -> Result<Self> {
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => s.parse::<u32>(),
        };
        parsed
            .map(KeyCode)
            .map_err(|_| RelayError::InvalidKeyCode(s.to_string()))
    }
}

// ----------------------------------------------------------------------------
// Pointer
// ----------------------------------------------------------------------------

/// Pointer buttons the relay forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Left,
    Right,
}

impl FromStr for PointerButton {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(PointerButton::Left),
            "right" | "r" => Ok(PointerButton::Right),
            _ => Err(RelayError::UnknownButton(s.to_string())),
        }
    }
}

/// Where a pointer event happened
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerPosition {
    /// Already in the `0..=NORMALIZED_MAX` space
    Normalized(NormalizedPoint),
    /// Raw viewport pixels plus the visible video rectangle to normalize against
    Raw { x: f64, y: f64, display: DisplayRect },
}

impl PointerPosition {
    /// Resolve to normalized coordinates
    pub fn normalized(&self) -> NormalizedPoint {
        match *self {
            PointerPosition::Normalized(point) => point,
            PointerPosition::Raw { x, y, display } => display.normalize(x, y),
        }
    }
}

impl From<NormalizedPoint> for PointerPosition {
    fn from(point: NormalizedPoint) -> Self {
        PointerPosition::Normalized(point)
    }
}

// ----------------------------------------------------------------------------
// Input Event
// ----------------------------------------------------------------------------

/// A discrete input action to relay to the peripheral
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    PointerDown {
        button: PointerButton,
        position: PointerPosition,
    },
    PointerUp {
        button: PointerButton,
        position: PointerPosition,
    },
    PointerMove {
        position: PointerPosition,
    },
}

impl InputEvent {
    pub fn key_down(code: impl Into<KeyCode>) -> Self {
        InputEvent::KeyDown(code.into())
    }

    pub fn key_up(code: impl Into<KeyCode>) -> Self {
        InputEvent::KeyUp(code.into())
    }

    pub fn pointer_down(button: PointerButton, position: impl Into<PointerPosition>) -> Self {
        InputEvent::PointerDown {
            button,
            position: position.into(),
        }
    }

    pub fn pointer_up(button: PointerButton, position: impl Into<PointerPosition>) -> Self {
        InputEvent::PointerUp {
            button,
            position: position.into(),
        }
    }

    pub fn pointer_move(position: impl Into<PointerPosition>) -> Self {
        InputEvent::PointerMove {
            position: position.into(),
        }
    }

    /// Short human-readable kind, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            InputEvent::KeyDown(_) => "key-down",
            InputEvent::KeyUp(_) => "key-up",
            InputEvent::PointerDown { .. } => "pointer-down",
            InputEvent::PointerUp { .. } => "pointer-up",
            InputEvent::PointerMove { .. } => "pointer-move",
        }
    }
}

impl FromStr for InputEvent {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            ["down", code] => Ok(InputEvent::KeyDown(code.parse()?)),
            ["up", code] => Ok(InputEvent::KeyUp(code.parse()?)),
            ["press", button, x, y] => Ok(InputEvent::pointer_down(
                button.parse()?,
                parse_point(x, y)?,
            )),
            ["release", button, x, y] => Ok(InputEvent::pointer_up(
                button.parse()?,
                parse_point(x, y)?,
            )),
            ["move", x, y] => Ok(InputEvent::pointer_move(parse_point(x, y)?)),
            _ => Err(RelayError::InvalidEvent(s.trim().to_string())),
        }
    }
}

fn parse_point(x: &str, y: &str) -> Result<NormalizedPoint> {
    let x = parse_coordinate(x)?;
    let y = parse_coordinate(y)?;
    NormalizedPoint::new(x, y)
}

fn parse_coordinate(s: &str) -> Result<u16> {
    let value: i64 = s
        .parse()
        .map_err(|_| RelayError::InvalidEvent(format!("not a coordinate: {}", s)))?;
    u16::try_from(value).map_err(|_| RelayError::CoordinateOutOfRange {
        value,
        max: crate::NORMALIZED_MAX,
    })
}
