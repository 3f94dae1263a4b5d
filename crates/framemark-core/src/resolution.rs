//! Coordinate spaces and the conversions between them.
//!
//! Three spaces are in play:
//! - *display*: pixels of the host surface the user draws on,
//! - *native*: true pixel size of the media frame,
//! - *target*: the fixed processing resolution all element geometry is stored in.
//!
//! Conversions are scale-only affines derived from the current sizes and are
//! recomputed on every call, never cached on elements.

use crate::error::{EngineError, EngineResult};
use kurbo::{Affine, Point, Size};
use serde::{Deserialize, Serialize};

/// Default processing resolution.
pub const DEFAULT_TARGET_SIZE: Size = Size::new(1280.0, 720.0);

/// The resolution triple every coordinate conversion is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Host surface size.
    pub display: Size,
    /// Media frame size.
    pub native: Size,
    /// Processing size.
    pub target: Size,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            display: DEFAULT_TARGET_SIZE,
            native: DEFAULT_TARGET_SIZE,
            target: DEFAULT_TARGET_SIZE,
        }
    }
}

/// Scale factor from `from` units to `to` units; identity if either is zero.
fn ratio(to: f64, from: f64) -> f64 {
    if to <= 0.0 || from <= 0.0 {
        1.0
    } else {
        to / from
    }
}

fn check_size(size: Size) -> EngineResult<Size> {
    if !size.width.is_finite() || !size.height.is_finite() || size.width < 0.0 || size.height < 0.0 {
        return Err(EngineError::InvalidResolution {
            width: size.width,
            height: size.height,
        });
    }
    Ok(size)
}

impl Resolution {
    /// Create a resolution triple, rejecting negative or non-finite sizes.
    pub fn new(display: Size, native: Size, target: Size) -> EngineResult<Self> {
        Ok(Self {
            display: check_size(display)?,
            native: check_size(native)?,
            target: check_size(target)?,
        })
    }

    /// Update the host surface size.
    pub fn set_display(&mut self, display: Size) -> EngineResult<()> {
        self.display = check_size(display)?;
        Ok(())
    }

    /// Update the media frame size.
    pub fn set_native(&mut self, native: Size) -> EngineResult<()> {
        self.native = check_size(native)?;
        Ok(())
    }

    /// Transform from display space into target space.
    pub fn display_to_target(&self) -> Affine {
        Affine::scale_non_uniform(
            ratio(self.target.width, self.display.width),
            ratio(self.target.height, self.display.height),
        )
    }

    /// Transform from target space into display space.
    pub fn target_to_display(&self) -> Affine {
        Affine::scale_non_uniform(
            ratio(self.display.width, self.target.width),
            ratio(self.display.height, self.target.height),
        )
    }

    /// Transform from target space into native space.
    pub fn target_to_native(&self) -> Affine {
        Affine::scale_non_uniform(
            ratio(self.native.width, self.target.width),
            ratio(self.native.height, self.target.height),
        )
    }

    /// Transform from native space into target space.
    pub fn native_to_target(&self) -> Affine {
        Affine::scale_non_uniform(
            ratio(self.target.width, self.native.width),
            ratio(self.target.height, self.native.height),
        )
    }

    /// Convert a display point to target space.
    pub fn to_target_space(&self, display_point: Point) -> Point {
        self.display_to_target() * display_point
    }

    /// Convert a target point to display space.
    pub fn to_display_space(&self, target_point: Point) -> Point {
        self.target_to_display() * target_point
    }

    /// Convert a target point to native space.
    pub fn to_native_space(&self, target_point: Point) -> Point {
        self.target_to_native() * target_point
    }

    /// Convert a native point to target space.
    pub fn from_native_space(&self, native_point: Point) -> Point {
        self.native_to_target() * native_point
    }

    /// Convert a length measured in display pixels into target units.
    ///
    /// Uses the larger axis ratio so tolerances never shrink below what the user sees.
    pub fn display_length_to_target(&self, length: f64) -> f64 {
        let sx = ratio(self.target.width, self.display.width);
        let sy = ratio(self.target.height, self.display.height);
        length * sx.max(sy)
    }
}
