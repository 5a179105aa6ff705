//! Pixel calibration grid drawn over a template background, used to read
//! off field coordinates for `px` + `top` templates.

use tiny_skia::{FillRule, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect, Transform};
use ttf_parser::{GlyphId, OutlineBuilder};

use crate::error::LaurelError;

const MINOR_COLOR: [u8; 4] = [255, 0, 0, 60];
const MAJOR_COLOR: [u8; 4] = [255, 0, 0, 140];
const LABEL_BACKGROUND: [u8; 4] = [255, 255, 255, 180];
const LABEL_COLOR: [u8; 4] = [255, 0, 0, 220];
const LABEL_PADDING: f32 = 3.0;
// Labels are pulled back from the right and bottom edges by this much.
const LABEL_EDGE_X: u32 = 60;
const LABEL_EDGE_Y: u32 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct GridOptions {
    pub minor_step: u32,
    pub major_step: u32,
    pub minor_width: u32,
    pub major_width: u32,
    pub label_size: f32,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            minor_step: 20,
            major_step: 100,
            minor_width: 1,
            major_width: 3,
            label_size: 16.0,
        }
    }
}

/// Draws minor and major grid lines over `input` (any format `image` can
/// decode) and returns PNG bytes. Major lines other than 0 are labeled with
/// their pixel coordinate when `label_font` holds a parseable font.
pub fn overlay_grid(
    input: &[u8],
    options: &GridOptions,
    label_font: Option<&[u8]>,
) -> Result<Vec<u8>, LaurelError> {
    if options.minor_step == 0 || options.major_step == 0 {
        return Err(LaurelError::InvalidConfiguration(
            "grid steps must be > 0".to_string(),
        ));
    }
    let mut base = decode_pixmap(input)?;
    let (width, height) = (base.width(), base.height());
    let mut overlay = Pixmap::new(width, height).ok_or_else(|| {
        LaurelError::InvalidConfiguration(format!("invalid grid size {width}x{height}"))
    })?;

    let minor = solid_paint(MINOR_COLOR);
    for x in (0..width).step_by(options.minor_step as usize) {
        fill_column(&mut overlay, x, options.minor_width, &minor);
    }
    for y in (0..height).step_by(options.minor_step as usize) {
        fill_row(&mut overlay, y, options.minor_width, &minor);
    }

    let face = label_font.and_then(|data| match ttf_parser::Face::parse(data, 0) {
        Ok(face) => Some(face),
        Err(err) => {
            tracing::warn!(error = %err, "grid label font unreadable; labels skipped");
            None
        }
    });
    let major = solid_paint(MAJOR_COLOR);
    for x in (0..width).step_by(options.major_step as usize) {
        fill_column(&mut overlay, x, options.major_width, &major);
        if let (Some(face), true) = (&face, x != 0) {
            let left = (x + 2).min(width.saturating_sub(LABEL_EDGE_X));
            draw_label(&mut overlay, face, options.label_size, left as f32, 2.0, &x.to_string());
        }
    }
    for y in (0..height).step_by(options.major_step as usize) {
        fill_row(&mut overlay, y, options.major_width, &major);
        if let (Some(face), true) = (&face, y != 0) {
            let top = (y + 2).min(height.saturating_sub(LABEL_EDGE_Y));
            draw_label(&mut overlay, face, options.label_size, 2.0, top as f32, &y.to_string());
        }
    }

    base.draw_pixmap(
        0,
        0,
        overlay.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
    base.encode_png()
        .map_err(|err| LaurelError::Asset(format!("png encode failed: {err}")))
}

fn decode_pixmap(data: &[u8]) -> Result<Pixmap, LaurelError> {
    let rgba = image::load_from_memory(data)
        .map_err(|err| LaurelError::Asset(format!("cannot decode grid input: {err}")))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        LaurelError::Asset(format!("invalid grid input size {width}x{height}"))
    })?;
    for (src, dst) in rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let alpha = src[3];
        dst[0] = premul_u8(src[0], alpha);
        dst[1] = premul_u8(src[1], alpha);
        dst[2] = premul_u8(src[2], alpha);
        dst[3] = alpha;
    }
    Ok(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

fn solid_paint(rgba: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]);
    paint.anti_alias = false;
    paint
}

// A `width`-pixel line centered on pixel column/row `at`.
fn band(at: u32, width: u32) -> (f32, f32) {
    let width = width.max(1) as f32;
    (at as f32 - ((width - 1.0) / 2.0).floor(), width)
}

fn fill_column(pixmap: &mut Pixmap, x: u32, width: u32, paint: &Paint<'_>) {
    let (left, width) = band(x, width);
    if let Some(rect) = Rect::from_xywh(left, 0.0, width, pixmap.height() as f32) {
        pixmap.fill_rect(rect, paint, Transform::identity(), None);
    }
}

fn fill_row(pixmap: &mut Pixmap, y: u32, width: u32, paint: &Paint<'_>) {
    let (top, height) = band(y, width);
    if let Some(rect) = Rect::from_xywh(0.0, top, pixmap.width() as f32, height) {
        pixmap.fill_rect(rect, paint, Transform::identity(), None);
    }
}

fn draw_label(
    pixmap: &mut Pixmap,
    face: &ttf_parser::Face<'_>,
    size: f32,
    left: f32,
    top: f32,
    text: &str,
) {
    let scale = size / face.units_per_em().max(1) as f32;
    let glyphs: Vec<(GlyphId, f32)> = text
        .chars()
        .map(|ch| {
            let gid = face.glyph_index(ch).unwrap_or(GlyphId(0));
            let advance = face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale;
            (gid, advance)
        })
        .collect();
    let text_width: f32 = glyphs.iter().map(|(_, advance)| advance).sum();
    let ascent = face.ascender() as f32 * scale;
    let text_height = (face.ascender() as f32 - face.descender() as f32) * scale;

    if let Some(rect) = Rect::from_xywh(
        left,
        top,
        text_width + LABEL_PADDING * 2.0,
        text_height + LABEL_PADDING * 2.0,
    ) {
        pixmap.fill_rect(rect, &solid_paint(LABEL_BACKGROUND), Transform::identity(), None);
    }

    let mut paint = solid_paint(LABEL_COLOR);
    paint.anti_alias = true;
    let mut pen_x = left + LABEL_PADDING;
    let baseline = top + LABEL_PADDING + ascent;
    for (gid, advance) in glyphs {
        let mut builder = GlyphPathBuilder::new(pen_x, baseline, scale);
        if face.outline_glyph(gid, &mut builder).is_some() {
            if let Some(path) = builder.finish() {
                pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
            }
        }
        pen_x += advance;
    }
}

/// Glyph outlines in raster space: font units scaled to pixels with y
/// pointing down from the baseline.
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x, y) = self.point(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x2, y2) = self.point(x2, y2);
        let (x, y) = self.point(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}
