use serde::{Deserialize, Serialize};

use crate::types::Pt;

pub const PX_TO_PT: f32 = 0.75;
pub const MM_TO_PT: f32 = 72.0 / 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordUnit {
    #[default]
    #[serde(alias = "MM", alias = "Mm")]
    Mm,
    #[serde(alias = "PX", alias = "Px")]
    Px,
}

impl CoordUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordUnit::Mm => "mm",
            CoordUnit::Px => "px",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YOrigin {
    #[default]
    #[serde(alias = "BOTTOM", alias = "Bottom")]
    Bottom,
    #[serde(alias = "TOP", alias = "Top")]
    Top,
}

pub fn px_to_pt(px: f32) -> f32 {
    px * PX_TO_PT
}

pub fn mm_to_pt(mm: f32) -> f32 {
    mm * MM_TO_PT
}

pub fn to_points(value: f32, unit: CoordUnit) -> f32 {
    match unit {
        CoordUnit::Px => px_to_pt(value),
        CoordUnit::Mm => mm_to_pt(value),
    }
}

pub fn flip_y(y_pt: f32, page_height_pt: f32) -> f32 {
    page_height_pt - y_pt
}

pub fn flip_y_top_to_bottom(y_top_px: f32, page_height_pt: f32) -> f32 {
    flip_y(px_to_pt(y_top_px), page_height_pt)
}

/// Template-global coordinate interpretation for one page.
///
/// Only `px + top` is flipped. An `mm + top` template is read as
/// bottom-origin millimetres; existing templates are calibrated against that.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordSpace {
    pub unit: CoordUnit,
    pub origin: YOrigin,
    pub page_height: Pt,
}

impl CoordSpace {
    pub fn new(unit: CoordUnit, origin: YOrigin, page_height: Pt) -> Self {
        Self {
            unit,
            origin,
            page_height,
        }
    }

    pub fn flips(&self) -> bool {
        self.unit == CoordUnit::Px && self.origin == YOrigin::Top
    }

    pub fn length(&self, value: f32) -> f32 {
        to_points(value, self.unit)
    }

    pub fn x(&self, value: f32) -> f32 {
        to_points(value, self.unit)
    }

    pub fn y(&self, value: f32) -> f32 {
        if self.flips() {
            flip_y_top_to_bottom(value, self.page_height.to_f32())
        } else {
            to_points(value, self.unit)
        }
    }

    // Offsets grow upward in PDF space regardless of the template origin.
    pub fn y_offset(&self, value: f32) -> f32 {
        to_points(value, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn converts_px_and_mm() {
        assert!(close(to_points(100.0, CoordUnit::Px), 75.0));
        assert!(close(to_points(25.4, CoordUnit::Mm), 72.0));
        assert!(close(to_points(0.0, CoordUnit::Mm), 0.0));
    }

    #[test]
    fn flip_is_an_involution() {
        let h = 841.89;
        for y in [0.0f32, 1.5, 100.0, 420.945, 841.89, 900.0, -12.0] {
            assert!(close(flip_y(flip_y(y, h), h), y));
        }
    }

    #[test]
    fn top_origin_px_maps_to_bottom_points() {
        // 1000 px tall background page.
        assert!(close(flip_y_top_to_bottom(200.0, 750.0), 600.0));
        assert!(close(flip_y_top_to_bottom(0.0, 750.0), 750.0));
    }

    #[test]
    fn only_px_top_flips() {
        let h = Pt::from_f32(750.0);
        let px_top = CoordSpace::new(CoordUnit::Px, YOrigin::Top, h);
        assert!(px_top.flips());
        assert!(close(px_top.y(200.0), 600.0));

        let px_bottom = CoordSpace::new(CoordUnit::Px, YOrigin::Bottom, h);
        assert!(close(px_bottom.y(200.0), 150.0));

        // mm + top stays bottom-origin.
        let mm_top = CoordSpace::new(CoordUnit::Mm, YOrigin::Top, h);
        assert!(!mm_top.flips());
        assert!(close(mm_top.y(25.4), 72.0));
    }

    #[test]
    fn enums_deserialize_case_insensitively() {
        let unit: CoordUnit = serde_json::from_str("\"PX\"").expect("unit");
        assert_eq!(unit, CoordUnit::Px);
        let origin: YOrigin = serde_json::from_str("\"Top\"").expect("origin");
        assert_eq!(origin, YOrigin::Top);
        assert!(serde_json::from_str::<CoordUnit>("\"inch\"").is_err());
    }
}
