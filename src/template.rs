use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::LaurelError;
use crate::record::FieldSource;
use crate::text::{Align, Direction};
use crate::types::Color;
use crate::units::{CoordUnit, YOrigin};

pub const DEFAULT_MAX_FONT_SIZE_PX: f32 = 16.0;
pub const DEFAULT_MIN_FONT_SIZE_PX: f32 = 12.0;
pub const DEFAULT_DEBUG_BOX_HEIGHT: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XAnchor {
    #[default]
    #[serde(alias = "LEFT", alias = "Left")]
    Left,
    #[serde(alias = "CENTER", alias = "Center", alias = "centre")]
    Center,
    #[serde(alias = "RIGHT", alias = "Right")]
    Right,
}

impl XAnchor {
    /// Left edge of a box of `width` anchored at `x`.
    pub fn left_edge(&self, x: f32, width: f32) -> f32 {
        match self {
            XAnchor::Left => x,
            XAnchor::Center => x - width / 2.0,
            XAnchor::Right => x - width,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StampYAnchor {
    #[default]
    #[serde(alias = "BOTTOM", alias = "Bottom")]
    Bottom,
    #[serde(alias = "CENTER", alias = "Center", alias = "centre")]
    Center,
}

/// Pixel calibration grid drawn over the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugGrid {
    #[serde(deserialize_with = "lenient::number")]
    pub step_px: f32,
    #[serde(deserialize_with = "lenient::number")]
    pub alpha: f32,
    #[serde(deserialize_with = "lenient::number")]
    pub line_width: f32,
    pub label: bool,
    #[serde(deserialize_with = "lenient::number")]
    pub label_font_size: f32,
}

impl Default for DebugGrid {
    fn default() -> Self {
        Self {
            step_px: 100.0,
            alpha: 0.25,
            line_width: 0.5,
            label: true,
            label_font_size: 7.0,
        }
    }
}

/// Millimetre grid drawn over the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugCanvasGrid {
    #[serde(deserialize_with = "lenient::number")]
    pub step: f32,
    #[serde(deserialize_with = "lenient::number")]
    pub alpha: f32,
    #[serde(deserialize_with = "lenient::number")]
    pub line_width: f32,
}

impl Default for DebugCanvasGrid {
    fn default() -> Self {
        Self {
            step: 50.0,
            alpha: 0.15,
            line_width: 0.3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextField {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub x: f32,
    #[serde(default, deserialize_with = "lenient::number")]
    pub y: f32,
    #[serde(default, deserialize_with = "lenient::number")]
    pub width: f32,
    #[serde(default, alias = "anchor", deserialize_with = "lenient::or_default")]
    pub x_anchor: XAnchor,
    #[serde(default, deserialize_with = "lenient::number")]
    pub y_offset: f32,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub font_size: Option<f32>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub max_font_size: Option<f32>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub min_font_size: Option<f32>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub align: Align,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub wrap: bool,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub line_height: Option<f32>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    pub max_lines: Option<usize>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub direction: Direction,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub auto_size: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub debug_point: bool,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub debug_box_height: Option<f32>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub debug_box_y_shift: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSource {
    Field(FieldSource),
    Literal(String),
}

impl TextField {
    pub fn literal(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn bound(field: &str) -> Self {
        Self {
            field: Some(field.to_string()),
            ..Self::default()
        }
    }

    /// Human-readable name used in logs.
    pub fn label(&self) -> String {
        match (&self.field, &self.text) {
            (Some(field), _) => format!("field:{field}"),
            (None, Some(text)) => format!("text:{}", text.chars().take(16).collect::<String>()),
            (None, None) => "<empty>".to_string(),
        }
    }

    pub fn source(&self) -> Result<TextSource, LaurelError> {
        let field = self.field.as_deref().map(str::trim).filter(|f| !f.is_empty());
        match (field, &self.text) {
            (Some(field), None) => Ok(TextSource::Field(FieldSource::parse(field))),
            (None, Some(text)) => Ok(TextSource::Literal(text.clone())),
            (Some(_), Some(_)) => Err(LaurelError::FieldRender {
                field: self.label(),
                message: "both `field` and `text` are set".to_string(),
            }),
            (None, None) => Err(LaurelError::FieldRender {
                field: self.label(),
                message: "neither `field` nor `text` is set".to_string(),
            }),
        }
    }

    pub fn max_font_size_px(&self) -> f32 {
        self.max_font_size.unwrap_or(DEFAULT_MAX_FONT_SIZE_PX)
    }

    pub fn min_font_size_px(&self) -> f32 {
        self.min_font_size.unwrap_or(DEFAULT_MIN_FONT_SIZE_PX)
    }

    // A fixed size falls back to the auto-size ceiling.
    pub fn font_size_px(&self) -> f32 {
        self.font_size.unwrap_or_else(|| self.max_font_size_px())
    }
}

/// Pre-`texts` layout block. Always millimetres, bottom origin, centered and
/// auto-sized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyBlock {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub x: f32,
    #[serde(default, deserialize_with = "lenient::number")]
    pub y: f32,
    #[serde(default, deserialize_with = "lenient::number")]
    pub width: f32,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub max_font_size: Option<f32>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub min_font_size: Option<f32>,
    #[serde(default)]
    pub font: Option<String>,
}

impl LegacyBlock {
    fn at(y: f32, max_font_size: f32, min_font_size: f32, font: &str) -> Self {
        Self {
            text: None,
            x: 50.0,
            y,
            width: 100.0,
            max_font_size: Some(max_font_size),
            min_font_size: Some(min_font_size),
            font: Some(font.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacySlot {
    Title,
    Name,
    School,
    Project,
    Award,
}

impl LegacySlot {
    pub const ALL: [LegacySlot; 5] = [
        LegacySlot::Title,
        LegacySlot::Name,
        LegacySlot::School,
        LegacySlot::Project,
        LegacySlot::Award,
    ];

    // Default (max, min) font sizes in px.
    pub fn default_sizes(&self) -> (f32, f32) {
        match self {
            LegacySlot::Title => (32.0, 16.0),
            LegacySlot::Name => (24.0, 12.0),
            LegacySlot::School => (20.0, 10.0),
            LegacySlot::Project => (18.0, 10.0),
            LegacySlot::Award => (22.0, 12.0),
        }
    }

    pub fn source(&self) -> Option<FieldSource> {
        match self {
            LegacySlot::Title => None,
            LegacySlot::Name => Some(FieldSource::ParticipantNames),
            LegacySlot::School => Some(FieldSource::Attribute("school_name".to_string())),
            LegacySlot::Project => Some(FieldSource::CategoryTask),
            LegacySlot::Award => Some(FieldSource::AwardLevel),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LegacySlot::Title => "title",
            LegacySlot::Name => "name",
            LegacySlot::School => "school",
            LegacySlot::Project => "project",
            LegacySlot::Award => "award",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default)]
    pub background_image: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub use_background_size: bool,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub coord_unit: CoordUnit,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub y_origin: YOrigin,
    #[serde(default, deserialize_with = "lenient::number")]
    pub global_y_offset: f32,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub debug_points: bool,
    #[serde(default, deserialize_with = "lenient::toggle_or_settings")]
    pub debug_grid: Option<DebugGrid>,
    #[serde(default, deserialize_with = "lenient::toggle_or_settings")]
    pub debug_canvas_grid: Option<DebugCanvasGrid>,
    #[serde(default)]
    pub stamp_image: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub stamp_x: f32,
    #[serde(default, deserialize_with = "lenient::number")]
    pub stamp_y: f32,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub stamp_width: Option<f32>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub stamp_height: Option<f32>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub stamp_center_x: bool,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub stamp_y_anchor: StampYAnchor,
    #[serde(default)]
    pub texts: Option<Vec<TextField>>,
    #[serde(default)]
    pub background_color: Option<Color>,
    #[serde(default)]
    pub text_color: Option<Color>,
    #[serde(default)]
    pub title: Option<LegacyBlock>,
    #[serde(default)]
    pub name: Option<LegacyBlock>,
    #[serde(default)]
    pub school: Option<LegacyBlock>,
    #[serde(default)]
    pub project: Option<LegacyBlock>,
    #[serde(default)]
    pub award: Option<LegacyBlock>,
}

impl TemplateConfig {
    pub fn from_json(raw: &str) -> Result<Self, LaurelError> {
        serde_json::from_str(raw).map_err(|err| LaurelError::MalformedTemplate(err.to_string()))
    }

    pub fn from_value(value: Value) -> Result<Self, LaurelError> {
        serde_json::from_value(value).map_err(|err| LaurelError::MalformedTemplate(err.to_string()))
    }

    /// The built-in five-block layout used when no stored template exists.
    pub fn legacy_default() -> Self {
        Self {
            text_color: Some(Color::BLACK),
            title: Some(LegacyBlock {
                text: Some("获奖证书".to_string()),
                ..LegacyBlock::at(200.0, 32.0, 16.0, "黑体")
            }),
            name: Some(LegacyBlock::at(160.0, 24.0, 12.0, "宋体")),
            school: Some(LegacyBlock::at(130.0, 20.0, 10.0, "宋体")),
            project: Some(LegacyBlock::at(100.0, 18.0, 10.0, "宋体")),
            award: Some(LegacyBlock::at(70.0, 22.0, 12.0, "华文楷体")),
            ..Self::default()
        }
    }

    /// Text fields drive the layout; an absent or empty list selects the
    /// legacy blocks.
    pub fn text_fields(&self) -> Option<&[TextField]> {
        self.texts.as_deref().filter(|texts| !texts.is_empty())
    }

    pub fn legacy_block(&self, slot: LegacySlot) -> Option<&LegacyBlock> {
        match slot {
            LegacySlot::Title => self.title.as_ref(),
            LegacySlot::Name => self.name.as_ref(),
            LegacySlot::School => self.school.as_ref(),
            LegacySlot::Project => self.project.as_ref(),
            LegacySlot::Award => self.award.as_ref(),
        }
    }

    pub fn text_color(&self) -> Color {
        self.text_color.unwrap_or(Color::BLACK)
    }
}

/// Deserializers that accept the loosely typed values hand-edited templates
/// contain: `null` for "unset" and numbers written as strings.
mod lenient {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberRepr {
        Number(f64),
        Text(String),
    }

    fn parse_number<E: serde::de::Error>(repr: NumberRepr) -> Result<Option<f32>, E> {
        match repr {
            NumberRepr::Number(n) => Ok(Some(n as f32)),
            NumberRepr::Text(s) if s.trim().is_empty() => Ok(None),
            NumberRepr::Text(s) => s
                .trim()
                .parse::<f32>()
                .map(Some)
                .map_err(|_| E::custom(format!("expected a number, found {s:?}"))),
        }
    }

    pub(super) fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        Ok(opt_number(deserializer)?.unwrap_or(0.0))
    }

    pub(super) fn opt_number<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f32>, D::Error> {
        match Option::<NumberRepr>::deserialize(deserializer)? {
            Some(repr) => parse_number(repr),
            None => Ok(None),
        }
    }

    pub(super) fn opt_count<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<usize>, D::Error> {
        match opt_number(deserializer)? {
            Some(n) if n.is_finite() && n >= 0.0 => Ok(Some(n as usize)),
            Some(n) => Err(serde::de::Error::custom(format!(
                "expected a non-negative count, found {n}"
            ))),
            None => Ok(None),
        }
    }

    pub(super) fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
            Some(other) => {
                return Err(serde::de::Error::custom(format!(
                    "expected a boolean, found {other}"
                )));
            }
        })
    }

    pub(super) fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }

    // `true` enables default settings, `false`/`null` disables, an object
    // carries explicit settings.
    pub(super) fn toggle_or_settings<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
            Some(Value::Bool(true)) => Ok(Some(T::default())),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
