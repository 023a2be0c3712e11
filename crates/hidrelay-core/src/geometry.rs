//! Display geometry and pointer normalization
//!
//! Pointer positions are reported to the relay as integers in `0..=NORMALIZED_MAX`
//! relative to the rectangle the video actually occupies on screen. When the video is
//! scaled to fit a viewport with a different aspect ratio, the letterbox or pillarbox
//! margins are excluded from that rectangle.

use core::fmt;
use core::str::FromStr;

use crate::{RelayError, Result};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Upper bound of the normalized coordinate space (inclusive)
pub const NORMALIZED_MAX: u16 = 32767;

// ----------------------------------------------------------------------------
// Sizes and Rectangles
// ----------------------------------------------------------------------------

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parses `WIDTHxHEIGHT`, e.g. `1920x1080`
impl FromStr for Size {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RelayError::InvalidConfiguration {
            reason: format!("expected WIDTHxHEIGHT, got {:?}", s),
        };
        let (width, height) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        Ok(Size::new(
            width.parse().map_err(|_| invalid())?,
            height.parse().map_err(|_| invalid())?,
        ))
    }
}

/// The rectangle of a viewport that shows video, in viewport pixel coordinates
///
/// Width and height are always non-zero, so normalizing against a `DisplayRect`
/// never divides by zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayRect {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl DisplayRect {
    /// Create a rectangle from its offset and size
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RelayError::InvalidEvent(format!(
                "display rectangle must not be empty ({}x{})",
                width, height
            )));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Compute the visible video rectangle when `video` is scaled to fit `viewport`
    /// while keeping its aspect ratio.
    ///
    /// A video wider than the viewport spans the full width and is centred vertically;
    /// otherwise it spans the full height and is centred horizontally.
    pub fn fit(video: Size, viewport: Size) -> Result<Self> {
        if video.is_empty() || viewport.is_empty() {
            return Err(RelayError::InvalidEvent(format!(
                "cannot fit {}x{} video into {}x{} viewport",
                video.width, video.height, viewport.width, viewport.height
            )));
        }

        // Aspect ratios compared by cross-multiplication to stay in integers
        let (vw, vh) = (u64::from(video.width), u64::from(video.height));
        let (pw, ph) = (u64::from(viewport.width), u64::from(viewport.height));
        let (width, height) = if vw * ph > pw * vh {
            (viewport.width, ((pw * vh / vw) as u32).max(1))
        } else {
            (((ph * vw / vh) as u32).max(1), viewport.height)
        };

        let x = ((viewport.width - width) / 2) as i32;
        let y = ((viewport.height - height) / 2) as i32;
        Self::new(x, y, width, height)
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Normalize a raw viewport point against this rectangle.
    ///
    /// Points outside the rectangle are clamped to its edges.
    pub fn normalize(&self, px: f64, py: f64) -> NormalizedPoint {
        NormalizedPoint {
            x: scale_axis(px - f64::from(self.x), self.width),
            y: scale_axis(py - f64::from(self.y), self.height),
        }
    }
}

fn scale_axis(offset: f64, extent: u32) -> u16 {
    let max = f64::from(NORMALIZED_MAX);
    let scaled = (offset / f64::from(extent) * max).round();
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(0.0, max) as u16
}

// ----------------------------------------------------------------------------
// Normalized Point
// ----------------------------------------------------------------------------

/// A pointer position in the `0..=NORMALIZED_MAX` coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NormalizedPoint {
    x: u16,
    y: u16,
}

impl NormalizedPoint {
    /// Create a normalized point, rejecting values above `NORMALIZED_MAX`
    pub fn new(x: u16, y: u16) -> Result<Self> {
        for value in [x, y] {
            if value > NORMALIZED_MAX {
                return Err(RelayError::CoordinateOutOfRange {
                    value: i64::from(value),
                    max: NORMALIZED_MAX,
                });
            }
        }
        Ok(Self { x, y })
    }

    pub fn x(&self) -> u16 {
        self.x
    }

    pub fn y(&self) -> u16 {
        self.y
    }
}

impl fmt::Display for NormalizedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}
