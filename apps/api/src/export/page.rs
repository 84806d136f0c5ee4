//! Page geometry shared by every render backend.
//!
//! All backends emit A4 portrait with 10mm margins. The viewport used for
//! browser layout is A4 at 96 CSS px per inch.

use serde::{Deserialize, Serialize};

const MM_PER_INCH: f64 = 25.4;
const CSS_PX_PER_INCH: f64 = 96.0;

/// Physical page layout in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    pub width_mm: f64,
    pub height_mm: f64,
    pub margin_mm: f64,
}

/// A4 portrait, 10mm margins on all sides.
pub const A4: PageConfig = PageConfig {
    width_mm: 210.0,
    height_mm: 297.0,
    margin_mm: 10.0,
};

impl PageConfig {
    pub fn content_width_mm(&self) -> f64 {
        self.width_mm - 2.0 * self.margin_mm
    }

    pub fn content_height_mm(&self) -> f64 {
        self.height_mm - 2.0 * self.margin_mm
    }

    pub fn width_in(&self) -> f64 {
        self.width_mm / MM_PER_INCH
    }

    pub fn height_in(&self) -> f64 {
        self.height_mm / MM_PER_INCH
    }

    pub fn margin_in(&self) -> f64 {
        self.margin_mm / MM_PER_INCH
    }

    /// Browser viewport matching the paper at 96 CSS px per inch.
    pub fn viewport_px(&self) -> (u32, u32) {
        (
            (self.width_in() * CSS_PX_PER_INCH).round() as u32,
            (self.height_in() * CSS_PX_PER_INCH).round() as u32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a4_content_box() {
        assert!((A4.content_width_mm() - 190.0).abs() < f64::EPSILON);
        assert!((A4.content_height_mm() - 277.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_a4_viewport_is_794_by_1123() {
        assert_eq!(A4.viewport_px(), (794, 1123));
    }
}
