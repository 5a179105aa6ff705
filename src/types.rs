use fixed::types::I32F32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// PDF user-space length (1/72 inch), stored as fixed point and rounded to
/// thousandths so repeated renders of the same input are byte-identical.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));

    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        let milli = (value as f64 * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Pt::from_milli_i64(milli)
    }

    pub fn from_i32(value: i32) -> Pt {
        Pt::from_milli_i64((value as i64) * 1000)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn max(self, other: Pt) -> Pt {
        if self >= other { self } else { other }
    }

    pub fn min(self, other: Pt) -> Pt {
        if self <= other { self } else { other }
    }

    pub fn mul_ratio(self, num: i32, denom: i32) -> Pt {
        if denom == 0 {
            return Pt::ZERO;
        }
        let milli = self.to_milli_i64() as i128;
        let value = div_round_i128(milli.saturating_mul(num as i128), denom as i128);
        Pt::from_milli_i128(value)
    }

    pub fn from_milli_i64(milli: i64) -> Pt {
        Pt::from_milli_i128(milli as i128)
    }

    fn from_milli_i128(milli: i128) -> Pt {
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Pt(I32F32::from_bits(bits))
    }
}

impl std::ops::Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 + rhs.to_milli_i64() as i128)
    }
}

impl std::ops::AddAssign for Pt {
    fn add_assign(&mut self, rhs: Pt) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 - rhs.to_milli_i64() as i128)
    }
}

impl std::ops::SubAssign for Pt {
    fn sub_assign(&mut self, rhs: Pt) {
        *self = *self - rhs;
    }
}

impl std::ops::Mul<i32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: i32) -> Pt {
        let milli = self.to_milli_i64() as i128;
        Pt::from_milli_i128(milli.saturating_mul(rhs as i128))
    }
}

impl std::ops::Mul<f32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: f32) -> Pt {
        if !rhs.is_finite() {
            return Pt::ZERO;
        }
        Pt::from_f32(self.to_f32() * rhs)
    }
}

impl std::ops::Div<i32> for Pt {
    type Output = Pt;
    fn div(self, rhs: i32) -> Pt {
        if rhs == 0 {
            return Pt::ZERO;
        }
        let milli = self.to_milli_i64() as i128;
        Pt::from_milli_i128(div_round_i128(milli, rhs as i128))
    }
}

impl std::ops::Neg for Pt {
    type Output = Pt;
    fn neg(self) -> Pt {
        Pt::from_milli_i128(-(self.to_milli_i64() as i128))
    }
}

fn div_round_i128(num: i128, den: i128) -> i128 {
    if den == 0 {
        return 0;
    }
    let den_abs = den.abs();
    if num >= 0 {
        (num + (den_abs / 2)) / den
    } else {
        -(((-num) + (den_abs / 2)) / den)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn a4() -> Self {
        Self {
            width: Pt::from_f32(595.28),
            height: Pt::from_f32(841.89),
        }
    }

    pub fn from_mm(width_mm: f32, height_mm: f32) -> Self {
        Self {
            width: Pt::from_f32(width_mm * 72.0 / 25.4),
            height: Pt::from_f32(height_mm * 72.0 / 25.4),
        }
    }

    // Raster images map to the page at 96 dpi.
    pub fn from_pixels(width_px: u32, height_px: u32) -> Self {
        Self {
            width: Pt::from_f32(width_px as f32 * 0.75),
            height: Pt::from_f32(height_px as f32 * 0.75),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };
    pub const RED: Color = Color {
        r: 1.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Accepts `#rgb`, `#rrggbb` (leading `#` optional) and a small set of
    /// named colors.
    pub fn parse(raw: &str) -> Option<Color> {
        let value = raw.trim().to_ascii_lowercase();
        let named = match value.as_str() {
            "black" => Some((0, 0, 0)),
            "white" => Some((255, 255, 255)),
            "red" => Some((255, 0, 0)),
            "green" => Some((0, 128, 0)),
            "blue" => Some((0, 0, 255)),
            "gray" | "grey" => Some((128, 128, 128)),
            "gold" => Some((255, 215, 0)),
            "darkred" => Some((139, 0, 0)),
            "navy" => Some((0, 0, 128)),
            _ => None,
        };
        if let Some((r, g, b)) = named {
            return Some(Color::from_u8(r, g, b));
        }
        let hex = value.strip_prefix('#').unwrap_or(&value);
        let digits: Vec<u8> = hex
            .chars()
            .map(|ch| ch.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<_>>>()?;
        match digits.as_slice() {
            [r, g, b] => Some(Color::from_u8(r * 17, g * 17, b * 17)),
            [r1, r2, g1, g2, b1, b2] => {
                Some(Color::from_u8(r1 * 16 + r2, g1 * 16 + g2, b1 * 16 + b2))
            }
            _ => None,
        }
    }

    pub fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    // Components above 1 are read as 0..=255.
    fn from_components(parts: [f32; 3]) -> Self {
        let scale = if parts.iter().any(|v| *v > 1.0) {
            255.0
        } else {
            1.0
        };
        let norm = |v: f32| (v / scale).clamp(0.0, 1.0);
        Self {
            r: norm(parts[0]),
            g: norm(parts[1]),
            b: norm(parts[2]),
        }
    }

    pub fn to_hex(self) -> String {
        let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", byte(self.r), byte(self.g), byte(self.b))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColorRepr {
    Text(String),
    Components([f32; 3]),
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match ColorRepr::deserialize(deserializer)? {
            ColorRepr::Text(raw) => Color::parse(&raw)
                .ok_or_else(|| serde::de::Error::custom(format!("unrecognized color {raw:?}"))),
            ColorRepr::Components(parts) => Ok(Color::from_components(parts)),
        }
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pt_rounds_to_milli() {
        assert_eq!(Pt::from_f32(1.23456).to_milli_i64(), 1235);
        assert_eq!((Pt::from_f32(10.0) - Pt::from_f32(2.5)).to_milli_i64(), 7500);
        assert_eq!(Pt::from_f32(f32::NAN), Pt::ZERO);
        assert_eq!(Pt::from_f32(12.0).mul_ratio(500, 1000).to_milli_i64(), 6000);
    }

    #[test]
    fn pixel_sizes_use_three_quarter_points() {
        let size = Size::from_pixels(800, 600);
        assert_eq!(size.width.to_milli_i64(), 600_000);
        assert_eq!(size.height.to_milli_i64(), 450_000);
    }

    #[test]
    fn colors_parse_from_hex_names_and_components() {
        assert_eq!(Color::parse("#fff"), Some(Color::WHITE));
        assert_eq!(Color::parse("FF0000"), Some(Color::RED));
        assert_eq!(Color::parse("Black"), Some(Color::BLACK));
        assert_eq!(Color::parse("#12345"), None);
        assert_eq!(Color::parse("#zzzzzz"), None);

        let c: Color = serde_json::from_str("[255, 0, 0]").expect("components");
        assert_eq!(c, Color::RED);
        let c: Color = serde_json::from_str("[0, 0, 1]").expect("unit components");
        assert_eq!(c, Color::rgb(0.0, 0.0, 1.0));
        let c: Color = serde_json::from_str("\"#00ff00\"").expect("hex");
        assert_eq!(c.to_hex(), "#00ff00");
        assert!(serde_json::from_str::<Color>("\"mauve-ish\"").is_err());
    }
}
