use serde_json::json;

use crate::assets::{AssetKind, AssetResolver, ImageAsset};
use crate::canvas::{Canvas, Command, Document};
use crate::debug::DebugLogger;
use crate::error::LaurelError;
use crate::font::{FontResolver, HELVETICA, ResolvedFont};
use crate::metrics::RenderMetrics;
use crate::record::RenderRecord;
use crate::template::{
    DEFAULT_DEBUG_BOX_HEIGHT, DebugCanvasGrid, DebugGrid, LegacySlot, StampYAnchor, TextField,
    TextSource, TemplateConfig,
};
use crate::text::{
    Align, DEFAULT_LINE_HEIGHT_FACTOR, FontMeasure, TextMeasure, aligned_x, is_blank, line_offset,
    shrink_to_fit, truncate_lines, wrap_lines,
};
use crate::types::{Color, Pt, Size};
use crate::units::{CoordSpace, MM_TO_PT, PX_TO_PT, mm_to_pt, px_to_pt};

// Overlay grids needing more lines than this are skipped.
const MAX_GRID_LINES: usize = 2000;
const DEBUG_GRID_FILL_ALPHA: f32 = 0.65;
const DEBUG_BOX_STROKE_ALPHA: f32 = 0.6;
const DEBUG_BOX_LINE_WIDTH: f32 = 0.8;

const BACKGROUND_RESOURCE: &str = "background";
const STAMP_RESOURCE: &str = "stamp";

/// A laid-out page plus what happened while laying it out.
#[derive(Debug, Clone)]
pub struct Composition {
    pub document: Document,
    pub metrics: RenderMetrics,
}

/// Lays out one certificate page. Holds only borrowed, read-only state, so
/// one compositor per call is cheap and nothing leaks between calls.
pub struct Compositor<'a> {
    fonts: &'a FontResolver,
    assets: &'a AssetResolver,
    default_page_size: Size,
    debug: Option<&'a DebugLogger>,
}

/// Commands for one field, built before anything touches the canvas.
#[derive(Debug, Default)]
struct FieldPlan {
    commands: Vec<Command>,
    text: String,
    font: Option<ResolvedFont>,
    font_size: f32,
    x: f32,
    y: f32,
    lines_drawn: usize,
    lines_truncated: usize,
}

impl FieldPlan {
    fn is_blank(&self) -> bool {
        self.lines_drawn == 0
    }
}

impl<'a> Compositor<'a> {
    pub fn new(fonts: &'a FontResolver, assets: &'a AssetResolver) -> Self {
        Self {
            fonts,
            assets,
            default_page_size: Size::a4(),
            debug: None,
        }
    }

    pub fn with_default_page_size(mut self, size: Size) -> Self {
        self.default_page_size = size;
        self
    }

    pub fn with_debug(mut self, debug: Option<&'a DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    pub fn compose(&self, record: &dyn RenderRecord, template: &TemplateConfig) -> Composition {
        let mut metrics = RenderMetrics::default();

        let background = template
            .background_image
            .as_deref()
            .and_then(|reference| self.load_asset(AssetKind::Background, reference, &mut metrics));
        let page_size = match (&background, template.use_background_size) {
            (Some(image), true) => image.size_pt(),
            _ => self.default_page_size,
        };
        metrics.page_width_pt = page_size.width.to_f32();
        metrics.page_height_pt = page_size.height.to_f32();

        let mut canvas = Canvas::new(page_size);
        if let Some(image) = &background {
            canvas.draw_image(
                Pt::ZERO,
                Pt::ZERO,
                page_size.width,
                page_size.height,
                BACKGROUND_RESOURCE,
                image,
            );
        }

        let space = CoordSpace::new(template.coord_unit, template.y_origin, page_size.height);
        if let Some(reference) = template.stamp_image.as_deref() {
            if let Some(stamp) = self.load_asset(AssetKind::Stamp, reference, &mut metrics) {
                draw_stamp(&mut canvas, template, &space, &stamp);
            }
        }

        if let Some(grid) = &template.debug_grid {
            draw_debug_grid(&mut canvas, grid);
        }
        if let Some(grid) = &template.debug_canvas_grid {
            draw_canvas_grid(&mut canvas, grid);
        }

        if let Some(color) = template.background_color {
            canvas.set_fill_color(color);
            canvas.fill_rect(Pt::ZERO, Pt::ZERO, page_size.width, page_size.height);
        }
        canvas.set_fill_color(template.text_color());

        match template.text_fields() {
            Some(fields) => {
                let global_offset = space.y_offset(template.global_y_offset);
                for field in fields {
                    metrics.fields_total += 1;
                    let planned =
                        self.plan_field(field, record, &space, global_offset, template.debug_points);
                    self.record_field(&mut canvas, &field.label(), planned, &mut metrics);
                }
            }
            None => {
                for slot in LegacySlot::ALL {
                    let Some(block) = template.legacy_block(slot) else {
                        continue;
                    };
                    metrics.fields_total += 1;
                    let text = match slot.source() {
                        Some(source) => source.resolve(record),
                        None => block.text.clone().unwrap_or_default(),
                    };
                    let (default_max, default_min) = slot.default_sizes();
                    let planned = self.plan_fitted(
                        &text,
                        block.font.as_deref(),
                        mm_to_pt(block.x),
                        mm_to_pt(block.y),
                        mm_to_pt(block.width),
                        px_to_pt(block.max_font_size.unwrap_or(default_max)),
                        px_to_pt(block.min_font_size.unwrap_or(default_min)),
                        Vec::new(),
                    );
                    self.record_field(&mut canvas, slot.as_str(), planned, &mut metrics);
                }
            }
        }

        metrics.command_count = canvas.command_count();
        if let Some(debug) = self.debug {
            debug.increment("fields.total", metrics.fields_total as u64);
            debug.increment("fields.blank", metrics.fields_blank as u64);
            debug.increment("fields.failed", metrics.fields_failed as u64);
        }
        Composition {
            document: canvas.finish(),
            metrics,
        }
    }

    fn load_asset(
        &self,
        kind: AssetKind,
        reference: &str,
        metrics: &mut RenderMetrics,
    ) -> Option<ImageAsset> {
        if reference.trim().is_empty() {
            return None;
        }
        match self.assets.load_image(reference) {
            Ok(image) => Some(image),
            Err(err) => {
                metrics.assets_missing += 1;
                tracing::debug!(kind = %kind, reference, error = %err, "asset unavailable; skipped");
                if let Some(debug) = self.debug {
                    debug.log_event(
                        "render.asset_missing",
                        json!({"kind": kind.as_str(), "reference": reference, "error": err.to_string()}),
                    );
                }
                None
            }
        }
    }

    fn record_field(
        &self,
        canvas: &mut Canvas,
        label: &str,
        planned: Result<FieldPlan, LaurelError>,
        metrics: &mut RenderMetrics,
    ) {
        match planned {
            Ok(plan) => {
                if plan.is_blank() {
                    metrics.fields_blank += 1;
                } else {
                    metrics.fields_rendered += 1;
                }
                metrics.lines_drawn += plan.lines_drawn;
                metrics.lines_truncated += plan.lines_truncated;
                if plan.lines_truncated > 0 {
                    tracing::debug!(field = label, dropped = plan.lines_truncated, "lines truncated");
                }
                if let Some(debug) = self.debug {
                    debug.log_event(
                        "render.field",
                        json!({
                            "field": label,
                            "text": plan.text,
                            "font": plan.font.as_ref().map(|f| f.name.clone()),
                            "font_size": plan.font_size,
                            "x": plan.x,
                            "y": plan.y,
                            "lines": plan.lines_drawn,
                            "truncated": plan.lines_truncated,
                        }),
                    );
                }
                canvas.extend(plan.commands);
            }
            Err(err) => {
                metrics.fields_failed += 1;
                tracing::warn!(field = label, error = %err, "field skipped");
                if let Some(debug) = self.debug {
                    debug.log_event(
                        "render.field",
                        json!({"field": label, "error": err.to_string()}),
                    );
                }
            }
        }
    }

    fn plan_field(
        &self,
        field: &TextField,
        record: &dyn RenderRecord,
        space: &CoordSpace,
        global_offset: f32,
        debug_points: bool,
    ) -> Result<FieldPlan, LaurelError> {
        let source = field.source()?;
        let width = space.length(field.width);
        let x = field.x_anchor.left_edge(space.x(field.x), width);
        let y = space.y(field.y) + space.y_offset(field.y_offset) + global_offset;
        if !(x.is_finite() && y.is_finite() && width.is_finite()) {
            return Err(LaurelError::FieldRender {
                field: field.label(),
                message: "position is not a finite number".to_string(),
            });
        }

        let mut prelude = Vec::new();
        if debug_points || field.debug_point {
            let height = field.debug_box_height.unwrap_or(DEFAULT_DEBUG_BOX_HEIGHT);
            let shift = field.debug_box_y_shift.unwrap_or(0.0) * MM_TO_PT;
            prelude.extend(debug_box_commands(x, y + shift, width, height));
        }

        let text = match source {
            TextSource::Field(source) => source.resolve(record),
            TextSource::Literal(text) => text,
        };

        if field.auto_size {
            return self.plan_fitted(
                &text,
                field.font.as_deref(),
                x,
                y,
                width,
                px_to_pt(field.max_font_size_px()),
                px_to_pt(field.min_font_size_px()),
                prelude,
            );
        }

        let size = px_to_pt(field.font_size_px());
        if !(size.is_finite() && size > 0.0) {
            return Err(LaurelError::FieldRender {
                field: field.label(),
                message: format!("font size {size} is not positive"),
            });
        }
        let mut plan = FieldPlan {
            commands: prelude,
            x,
            y,
            font_size: size,
            ..FieldPlan::default()
        };
        if is_blank(&text) {
            return Ok(plan);
        }

        let font = self.fonts.resolve(field.font.as_deref());
        let measure = FontMeasure {
            fonts: self.fonts,
            font: &font,
        };
        let lines = if field.wrap {
            let mut lines = wrap_lines(&text, width, size, &measure);
            plan.lines_truncated = truncate_lines(&mut lines, field.max_lines);
            lines
        } else {
            vec![text.clone()]
        };
        let line_height = field
            .line_height
            .map(px_to_pt)
            .unwrap_or(size * DEFAULT_LINE_HEIGHT_FACTOR);

        push_font(&mut plan.commands, &font, size);
        for (index, line) in lines.iter().enumerate() {
            let line_y = y + line_offset(index, line_height, field.direction);
            let line_x = aligned_x(x, width, measure.text_width(line, size), field.align);
            plan.commands.push(Command::DrawString {
                x: Pt::from_f32(line_x),
                y: Pt::from_f32(line_y),
                text: line.clone(),
            });
        }
        plan.lines_drawn = lines.len();
        plan.text = text;
        plan.font = Some(font);
        Ok(plan)
    }

    /// One line shrunk to fit `width` and centered in the box.
    #[allow(clippy::too_many_arguments)]
    fn plan_fitted(
        &self,
        text: &str,
        font_name: Option<&str>,
        x: f32,
        y: f32,
        width: f32,
        max_size: f32,
        min_size: f32,
        prelude: Vec<Command>,
    ) -> Result<FieldPlan, LaurelError> {
        let mut plan = FieldPlan {
            commands: prelude,
            x,
            y,
            ..FieldPlan::default()
        };
        if is_blank(text) {
            return Ok(plan);
        }
        let font = self.fonts.resolve(font_name);
        let measure = FontMeasure {
            fonts: self.fonts,
            font: &font,
        };
        let size = shrink_to_fit(text, width, max_size, min_size, &measure);
        if size <= 0.0 {
            return Err(LaurelError::FieldRender {
                field: format!("text:{}", text.chars().take(16).collect::<String>()),
                message: format!("font size range {min_size}..={max_size} has no usable size"),
            });
        }
        let line_x = aligned_x(x, width, measure.text_width(text, size), Align::Center);
        push_font(&mut plan.commands, &font, size);
        plan.commands.push(Command::DrawString {
            x: Pt::from_f32(line_x),
            y: Pt::from_f32(y),
            text: text.to_string(),
        });
        plan.lines_drawn = 1;
        plan.font_size = size;
        plan.text = text.to_string();
        plan.font = Some(font);
        Ok(plan)
    }
}

fn push_font(commands: &mut Vec<Command>, font: &ResolvedFont, size: f32) {
    commands.push(Command::SetFontName(font.name.clone()));
    commands.push(Command::SetFontSize(Pt::from_f32(size)));
}

fn draw_stamp(canvas: &mut Canvas, template: &TemplateConfig, space: &CoordSpace, stamp: &ImageAsset) {
    let page = canvas.page_size();
    let native = stamp.size_pt();
    let width = template
        .stamp_width
        .map(|w| space.length(w))
        .unwrap_or_else(|| native.width.to_f32());
    let height = template
        .stamp_height
        .map(|h| space.length(h))
        .unwrap_or_else(|| native.height.to_f32());
    let x = if template.stamp_center_x {
        (page.width.to_f32() - width) / 2.0
    } else {
        space.x(template.stamp_x)
    };
    let mut y = space.y(template.stamp_y);
    if template.stamp_y_anchor == StampYAnchor::Center {
        y -= height / 2.0;
    }
    canvas.draw_image(
        Pt::from_f32(x),
        Pt::from_f32(y),
        Pt::from_f32(width),
        Pt::from_f32(height),
        STAMP_RESOURCE,
        stamp,
    );
}

fn debug_box_commands(x: f32, y: f32, width: f32, height: f32) -> Vec<Command> {
    vec![
        Command::SaveState,
        Command::SetStrokeColor(Color::RED),
        Command::SetOpacity {
            fill: 1.0,
            stroke: DEBUG_BOX_STROKE_ALPHA,
        },
        Command::SetLineWidth(Pt::from_f32(DEBUG_BOX_LINE_WIDTH)),
        Command::StrokeRect {
            x: Pt::from_f32(x),
            y: Pt::from_f32(y),
            width: Pt::from_f32(width),
            height: Pt::from_f32(height),
        },
        Command::RestoreState,
    ]
}

// Number of positions 0, step, 2*step, ... up to `stop` plus slack.
fn grid_count(stop: f32, step: f32, slack: f32) -> usize {
    if !(step.is_finite() && step > 0.0) {
        return 0;
    }
    let last = ((stop + slack) / step).floor();
    if !last.is_finite() || last < 0.0 {
        return 0;
    }
    if last >= MAX_GRID_LINES as f32 {
        return MAX_GRID_LINES + 1;
    }
    last as usize + 1
}

fn grid_positions(kind: &str, page: Size, step: f32, slack: f32) -> Option<(Vec<f32>, Vec<f32>)> {
    let nx = grid_count(page.width.to_f32(), step, slack);
    let ny = grid_count(page.height.to_f32(), step, slack);
    if nx == 0 || ny == 0 {
        return None;
    }
    if nx + ny > MAX_GRID_LINES {
        tracing::warn!(grid = kind, step, max = MAX_GRID_LINES, "grid step too small; skipped");
        return None;
    }
    let at = |n: usize| (0..n).map(|i| i as f32 * step).collect::<Vec<_>>();
    Some((at(nx), at(ny)))
}

fn draw_debug_grid(canvas: &mut Canvas, grid: &DebugGrid) {
    let page = canvas.page_size();
    let height = page.height.to_f32();
    let Some((xs, ys)) = grid_positions("debug_grid", page, px_to_pt(grid.step_px), 0.01) else {
        return;
    };

    canvas.save_state();
    canvas.set_stroke_color(Color::RED);
    canvas.set_fill_color(Color::RED);
    canvas.set_opacity(DEBUG_GRID_FILL_ALPHA, grid.alpha);
    canvas.set_line_width(Pt::from_f32(grid.line_width));
    for &x in &xs {
        canvas.line(Pt::from_f32(x), Pt::ZERO, Pt::from_f32(x), page.height);
        if grid.label {
            grid_label(canvas, grid, x + 2.0, height - 10.0, format!("x={}px", pt_to_px_label(x)));
        }
    }
    for &y in &ys {
        canvas.line(Pt::ZERO, Pt::from_f32(y), page.width, Pt::from_f32(y));
        if grid.label {
            grid_label(canvas, grid, 2.0, y + 2.0, format!("y={}px", pt_to_px_label(y)));
        }
    }
    canvas.restore_state();
}

fn pt_to_px_label(value: f32) -> i64 {
    (value / PX_TO_PT).round() as i64
}

fn grid_label(canvas: &mut Canvas, grid: &DebugGrid, x: f32, y: f32, text: String) {
    canvas.set_font_name(HELVETICA);
    canvas.set_font_size(Pt::from_f32(grid.label_font_size));
    canvas.draw_string(Pt::from_f32(x), Pt::from_f32(y), text);
}

fn draw_canvas_grid(canvas: &mut Canvas, grid: &DebugCanvasGrid) {
    let page = canvas.page_size();
    let Some((xs, ys)) = grid_positions("debug_canvas_grid", page, grid.step * MM_TO_PT, 1e-9)
    else {
        return;
    };
    let (Some(&x0), Some(&x1), Some(&y0), Some(&y1)) = (xs.first(), xs.last(), ys.first(), ys.last())
    else {
        return;
    };

    canvas.save_state();
    canvas.set_stroke_color(Color::RED);
    canvas.set_opacity(1.0, grid.alpha);
    canvas.set_line_width(Pt::from_f32(grid.line_width));
    for &x in &xs {
        canvas.line(Pt::from_f32(x), Pt::from_f32(y0), Pt::from_f32(x), Pt::from_f32(y1));
    }
    for &y in &ys {
        canvas.line(Pt::from_f32(x0), Pt::from_f32(y), Pt::from_f32(x1), Pt::from_f32(y));
    }
    canvas.restore_state();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::png_bytes;
    use crate::pdf::tests::page_content;
    use crate::pdf::{PdfOptions, document_to_pdf};
    use crate::record::ApplicationRecord;
    use crate::units::{CoordUnit, YOrigin};
    use serde_json::Value;

    struct Fixture {
        dir: tempfile::TempDir,
        fonts: FontResolver,
        assets: AssetResolver,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let assets = AssetResolver::new(dir.path());
            Self {
                dir,
                fonts: FontResolver::builtin_only(),
                assets,
            }
        }

        fn write_png(&self, name: &str, width: u32, height: u32) {
            std::fs::write(self.dir.path().join(name), png_bytes(width, height, [250, 250, 240, 255]))
                .expect("write png");
        }

        fn compose(&self, record: &ApplicationRecord, template: Value) -> Composition {
            let template = TemplateConfig::from_value(template).expect("template");
            Compositor::new(&self.fonts, &self.assets).compose(record, &template)
        }
    }

    fn strings(doc: &Document) -> Vec<(Pt, Pt, String)> {
        doc.commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawString { x, y, text } => Some((*x, *y, text.clone())),
                _ => None,
            })
            .collect()
    }

    fn close(a: Pt, b: f32) -> bool {
        (a.to_f32() - b).abs() < 0.01
    }

    #[test]
    fn px_top_template_uses_background_page_and_flips() {
        let fx = Fixture::new();
        fx.write_png("bg.png", 1262, 892);
        let record = ApplicationRecord::default().with_attribute("award_level", "一等奖");
        let composition = fx.compose(
            &record,
            json!({
                "background_image": "bg.png",
                "use_background_size": true,
                "coord_unit": "px",
                "y_origin": "top",
                "texts": [{
                    "field": "award_level", "font": "黑体",
                    "x": 631, "y": 590, "x_anchor": "center", "width": 1262
                }]
            }),
        );
        let doc = &composition.document;
        assert!(close(doc.page_size.width, 946.5));
        assert!(close(doc.page_size.height, 669.0));
        let drawn = strings(doc);
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].2, "一等奖");
        assert!(close(drawn[0].1, 669.0 - 590.0 * 0.75));
        // STSong at 12pt: three ideographs are 36pt wide, centered on the page.
        assert!(close(drawn[0].0, (946.5 - 36.0) / 2.0));

        let bytes = document_to_pdf(doc, &fx.fonts, &PdfOptions::default()).expect("pdf");
        let (_, ops) = page_content(&bytes);
        let td = ops.iter().find(|op| op.operator == "Td").expect("Td");
        assert!((td.operands[1].as_float().expect("y") - 226.5).abs() < 0.01);
        assert!(ops.iter().any(|op| op.operator == "Do"));
    }

    #[test]
    fn participant_names_follow_seq_no() {
        let fx = Fixture::new();
        let record = ApplicationRecord::default()
            .with_participant(2, "李四")
            .with_participant(1, "张三");
        let composition = fx.compose(
            &record,
            json!({"texts": [{"field": "participants_names", "x": 20, "y": 100, "width": 170}]}),
        );
        let drawn = strings(&composition.document);
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].2, "张三、李四");
    }

    #[test]
    fn max_lines_drops_overflow_silently() {
        let fx = Fixture::new();
        let record = ApplicationRecord::default();
        let composition = fx.compose(
            &record,
            json!({
                "coord_unit": "px",
                "texts": [{
                    "text": "张三、李四、王五",
                    "font": "宋体",
                    "x": 100, "y": 400, "width": 40,
                    "wrap": true, "max_lines": 1
                }]
            }),
        );
        let drawn = strings(&composition.document);
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].2, "张三");
        assert_eq!(composition.metrics.lines_drawn, 1);
        assert_eq!(composition.metrics.lines_truncated, 2);
    }

    #[test]
    fn missing_background_is_not_fatal() {
        let fx = Fixture::new();
        let record = ApplicationRecord::default().with_attribute("school_name", "实验中学");
        let composition = fx.compose(
            &record,
            json!({
                "background_image": "assets/cert/missing.png",
                "use_background_size": true,
                "texts": [{"field": "school_name", "x": 20, "y": 100, "width": 170}]
            }),
        );
        let doc = &composition.document;
        assert_eq!(doc.page_size, Size::a4());
        assert!(doc.images.is_empty());
        assert!(!doc.commands.iter().any(|c| matches!(c, Command::DrawImage { .. })));
        assert_eq!(composition.metrics.assets_missing, 1);
        assert_eq!(strings(doc).len(), 1);

        let bytes = document_to_pdf(doc, &fx.fonts, &PdfOptions::default()).expect("pdf");
        let (pdf, _) = page_content(&bytes);
        assert_eq!(pdf.get_pages().len(), 1);
    }

    #[test]
    fn mm_top_is_read_bottom_up() {
        // Known inconsistency kept for existing templates: only px+top flips.
        let page_height = Size::a4().height;
        assert!(!CoordSpace::new(CoordUnit::Mm, YOrigin::Top, page_height).flips());
        assert!(CoordSpace::new(CoordUnit::Px, YOrigin::Top, page_height).flips());

        let fx = Fixture::new();
        let record = ApplicationRecord::default();
        let composition = fx.compose(
            &record,
            json!({
                "coord_unit": "mm",
                "y_origin": "top",
                "global_y_offset": 10,
                "texts": [{"text": "AWARD", "x": 0, "y": 100, "y_offset": -5, "width": 0, "align": "left"}]
            }),
        );
        let drawn = strings(&composition.document);
        assert!(close(drawn[0].1, 105.0 * MM_TO_PT));
    }

    #[test]
    fn blank_values_render_nothing() {
        let fx = Fixture::new();
        let record = ApplicationRecord::default()
            .with_attribute("school_name", "nan")
            .with_attribute("teacher_name", Value::Null);
        let composition = fx.compose(
            &record,
            json!({"texts": [
                {"field": "school_name", "x": 0, "y": 0, "width": 100},
                {"field": "teacher_name", "x": 0, "y": 0, "width": 100, "auto_size": true},
                {"text": "  ", "x": 0, "y": 0, "width": 100, "wrap": true}
            ]}),
        );
        assert!(strings(&composition.document).is_empty());
        assert_eq!(composition.metrics.fields_total, 3);
        assert_eq!(composition.metrics.fields_blank, 3);
    }

    #[test]
    fn auto_size_shrinks_and_aligns() {
        let fx = Fixture::new();
        let record = ApplicationRecord::default();
        let composition = fx.compose(
            &record,
            json!({
                "coord_unit": "px",
                "texts": [{
                    "text": "一二三四五六七八九十十",
                    "font": "宋体",
                    "x": 0, "y": 100, "width": 160,
                    "auto_size": true, "max_font_size": 16, "min_font_size": 12
                }]
            }),
        );
        let doc = &composition.document;
        assert!(doc.commands.contains(&Command::SetFontSize(Pt::from_f32(10.0))));
        let drawn = strings(doc);
        // 11 ideographs at 10pt are 110pt wide inside a 120pt box.
        assert!(close(drawn[0].0, 5.0));
    }

    #[test]
    fn auto_size_always_centers_in_box() {
        let fx = Fixture::new();
        let record = ApplicationRecord::default();
        for align in ["left", "right"] {
            let composition = fx.compose(
                &record,
                json!({
                    "coord_unit": "px",
                    "texts": [{
                        "text": "一二三", "font": "宋体",
                        "x": 0, "y": 100, "width": 400,
                        "auto_size": true, "align": align
                    }]
                }),
            );
            let drawn = strings(&composition.document);
            // Three ideographs at 12pt are 36pt wide inside a 300pt box.
            assert!(close(drawn[0].0, 132.0), "{align}: {:?}", drawn[0].0);
        }
    }

    #[test]
    fn wrapped_lines_stack_by_direction() {
        let fx = Fixture::new();
        let record = ApplicationRecord::default();
        let composition = fx.compose(
            &record,
            json!({
                "coord_unit": "px",
                "texts": [{
                    "text": "张三、李四", "font": "宋体",
                    "x": 0, "y": 400, "width": 40, "font_size": 16,
                    "wrap": true, "line_height": 20, "direction": "down", "align": "left"
                }]
            }),
        );
        let drawn = strings(&composition.document);
        assert_eq!(drawn.len(), 2);
        assert!(close(drawn[0].1, 300.0));
        assert!(close(drawn[1].1, 285.0));
        assert!(close(drawn[1].0, 0.0));
    }

    #[test]
    fn bad_field_is_skipped_without_partial_output() {
        let fx = Fixture::new();
        let record = ApplicationRecord::default().with_attribute("award_level", "二等奖");
        let composition = fx.compose(
            &record,
            json!({
                "debug_points": true,
                "texts": [
                    {"field": "award_level", "text": "conflict", "x": 0, "y": 0, "width": 50},
                    {"field": "award_level", "x": 0, "y": 0, "width": 50}
                ]
            }),
        );
        let doc = &composition.document;
        assert_eq!(composition.metrics.fields_failed, 1);
        assert_eq!(composition.metrics.fields_rendered, 1);
        let boxes = doc
            .commands
            .iter()
            .filter(|c| matches!(c, Command::StrokeRect { .. }))
            .count();
        assert_eq!(boxes, 1);
        assert_eq!(strings(doc).len(), 1);
    }

    #[test]
    fn debug_box_is_drawn_for_blank_fields() {
        let fx = Fixture::new();
        let record = ApplicationRecord::default();
        let composition = fx.compose(
            &record,
            json!({"texts": [{
                "field": "school_name", "x": 10, "y": 20, "width": 30,
                "debug_point": true, "debug_box_height": 12, "debug_box_y_shift": 1
            }]}),
        );
        let rect = composition
            .document
            .commands
            .iter()
            .find_map(|c| match c {
                Command::StrokeRect { x, y, width, height } => Some((*x, *y, *width, *height)),
                _ => None,
            })
            .expect("debug box");
        assert!(close(rect.0, 10.0 * MM_TO_PT));
        assert!(close(rect.1, 21.0 * MM_TO_PT));
        assert!(close(rect.2, 30.0 * MM_TO_PT));
        assert!(close(rect.3, 12.0));
        assert!(strings(&composition.document).is_empty());
    }

    #[test]
    fn stamp_is_centered_and_anchored() {
        let fx = Fixture::new();
        fx.write_png("stamp.png", 200, 100);
        let record = ApplicationRecord::default();
        let composition = fx.compose(
            &record,
            json!({
                "coord_unit": "px",
                "y_origin": "top",
                "stamp_image": "stamp.png",
                "stamp_center_x": true,
                "stamp_y": 200,
                "stamp_y_anchor": "center"
            }),
        );
        let doc = &composition.document;
        let image = doc
            .commands
            .iter()
            .find_map(|c| match c {
                Command::DrawImage { x, y, width, height, .. } => Some((*x, *y, *width, *height)),
                _ => None,
            })
            .expect("stamp");
        assert!(close(image.2, 150.0));
        assert!(close(image.3, 75.0));
        assert!(close(image.0, (595.28 - 150.0) / 2.0));
        assert!(close(image.1, 841.89 - 150.0 - 37.5));
    }

    #[test]
    fn debug_grid_labels_in_pixels() {
        let fx = Fixture::new();
        fx.write_png("bg.png", 400, 200);
        let record = ApplicationRecord::default();
        let composition = fx.compose(
            &record,
            json!({
                "background_image": "bg.png",
                "use_background_size": true,
                "debug_grid": {"step_px": 100},
                "debug_canvas_grid": true
            }),
        );
        let labels: Vec<String> = strings(&composition.document)
            .into_iter()
            .map(|(_, _, text)| text)
            .collect();
        assert_eq!(
            labels,
            vec!["x=0px", "x=100px", "x=200px", "x=300px", "x=400px", "y=0px", "y=100px", "y=200px"]
        );
        let runs = composition.document.text_runs();
        assert!(runs.iter().all(|(font, _, _)| font == HELVETICA));
    }

    #[test]
    fn tiny_grid_step_is_skipped() {
        let fx = Fixture::new();
        let record = ApplicationRecord::default();
        let composition = fx.compose(
            &record,
            json!({"debug_grid": {"step_px": 0.01}, "debug_canvas_grid": {"step": 0}}),
        );
        assert!(!composition
            .document
            .commands
            .iter()
            .any(|c| matches!(c, Command::Stroke)));
    }

    #[test]
    fn background_color_fills_before_text_color() {
        let fx = Fixture::new();
        let record = ApplicationRecord::default();
        let composition = fx.compose(
            &record,
            json!({"background_color": "#ffeecc", "text_color": "navy", "texts": [{"text": "X", "x": 0, "y": 0, "width": 10}]}),
        );
        let commands = &composition.document.commands;
        let fill = commands
            .iter()
            .position(|c| matches!(c, Command::FillRect { .. }))
            .expect("fill");
        let navy = commands
            .iter()
            .position(|c| *c == Command::SetFillColor(Color::from_u8(0, 0, 128)))
            .expect("text color");
        assert!(fill < navy);
    }

    #[test]
    fn legacy_blocks_render_without_texts() {
        let fx = Fixture::new();
        let record = ApplicationRecord::default()
            .with_attribute("school_name", "实验中学")
            .with_attribute("category", "机器人")
            .with_attribute("task", "越野")
            .with_attribute("award_level", "一等奖")
            .with_participant(1, "张三");
        let composition = fx.compose(&record, json!({}));
        assert!(strings(&composition.document).is_empty());

        let template = TemplateConfig::legacy_default();
        let composition = Compositor::new(&fx.fonts, &fx.assets).compose(&record, &template);
        let drawn = strings(&composition.document);
        let texts: Vec<&str> = drawn.iter().map(|(_, _, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["获奖证书", "张三", "实验中学", "机器人 - 越野", "一等奖"]);
        assert!(close(drawn[0].1, 200.0 * MM_TO_PT));
        // Title: 4 ideographs at 24pt inside a 100mm box, centered.
        let box_x = 50.0 * MM_TO_PT;
        let box_w = 100.0 * MM_TO_PT;
        assert!(close(drawn[0].0, box_x + (box_w - 96.0) / 2.0));
        assert_eq!(composition.metrics.fields_rendered, 5);
    }
}
