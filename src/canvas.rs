use std::collections::BTreeMap;

use crate::assets::ImageAsset;
use crate::font::HELVETICA;
use crate::types::{Color, Pt, Size};

/// Drawing operations for one page, in PDF user space (origin bottom-left,
/// y grows upward).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    // Applies both fill and stroke alpha (ca/CA). Values outside 0..1 are clamped.
    SetOpacity {
        fill: f32,
        stroke: f32,
    },
    SetFontName(String),
    SetFontSize(Pt),
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    Stroke,
    FillRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    StrokeRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    // (x, y) is the baseline origin of the first glyph.
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
}

/// A finished single-page drawing plus the images it references.
#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub commands: Vec<Command>,
    pub images: BTreeMap<String, ImageAsset>,
}

impl Document {
    /// Text runs in draw order, paired with the font active for each.
    pub fn text_runs(&self) -> Vec<(String, Pt, String)> {
        let mut state = TextState::default();
        let mut runs = Vec::new();
        for cmd in &self.commands {
            state.apply(cmd);
            if let Command::DrawString { text, .. } = cmd {
                runs.push((state.font_name.clone(), state.font_size, text.clone()));
            }
        }
        runs
    }
}

/// Font selection as seen by a consumer replaying commands in order,
/// honoring save/restore nesting.
#[derive(Debug, Clone)]
pub(crate) struct TextState {
    pub(crate) font_name: String,
    pub(crate) font_size: Pt,
    stack: Vec<(String, Pt)>,
}

impl Default for TextState {
    fn default() -> Self {
        let defaults = GraphicsState::default();
        Self {
            font_name: defaults.font_name,
            font_size: defaults.font_size,
            stack: Vec::new(),
        }
    }
}

impl TextState {
    pub(crate) fn apply(&mut self, cmd: &Command) {
        match cmd {
            Command::SaveState => self
                .stack
                .push((self.font_name.clone(), self.font_size)),
            Command::RestoreState => {
                if let Some((name, size)) = self.stack.pop() {
                    self.font_name = name;
                    self.font_size = size;
                }
            }
            Command::SetFontName(name) => self.font_name = name.clone(),
            Command::SetFontSize(size) => self.font_size = *size,
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    font_size: Pt,
    font_name: String,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            font_size: Pt::from_f32(12.0),
            font_name: HELVETICA.to_string(),
        }
    }
}

/// Records drawing commands, dropping state changes that would not change
/// anything.
pub struct Canvas {
    page_size: Size,
    commands: Vec<Command>,
    images: BTreeMap<String, ImageAsset>,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            commands: Vec::new(),
            images: BTreeMap::new(),
            state_stack: Vec::new(),
            current_state: GraphicsState::default(),
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.commands.push(Command::RestoreState);
        }
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = if width < Pt::ZERO { Pt::ZERO } else { width };
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_opacity(&mut self, fill: f32, stroke: f32) {
        self.commands.push(Command::SetOpacity {
            fill: fill.clamp(0.0, 1.0),
            stroke: stroke.clamp(0.0, 1.0),
        });
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.current_state.font_name == name {
            return;
        }
        self.current_state.font_name = name.to_string();
        self.commands
            .push(Command::SetFontName(self.current_state.font_name.clone()));
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.current_state.font_size == size {
            return;
        }
        self.current_state.font_size = size;
        self.commands.push(Command::SetFontSize(size));
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Pt, y: Pt) {
        self.commands.push(Command::LineTo { x, y });
    }

    pub fn stroke(&mut self) {
        self.commands.push(Command::Stroke);
    }

    pub fn line(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt) {
        self.move_to(x1, y1);
        self.line_to(x2, y2);
        self.stroke();
    }

    pub fn fill_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.commands.push(Command::FillRect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn stroke_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.commands.push(Command::StrokeRect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    /// Registers `image` under `resource_id` (first registration wins) and
    /// draws it into the given box.
    pub fn draw_image(
        &mut self,
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: impl Into<String>,
        image: &ImageAsset,
    ) {
        let resource_id = resource_id.into();
        self.images
            .entry(resource_id.clone())
            .or_insert_with(|| image.clone());
        self.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id,
        });
    }

    /// Appends commands recorded elsewhere, keeping this canvas's state
    /// tracking consistent with them.
    pub fn extend(&mut self, commands: Vec<Command>) {
        for cmd in commands {
            match cmd {
                Command::SetFillColor(color) => self.set_fill_color(color),
                Command::SetStrokeColor(color) => self.set_stroke_color(color),
                Command::SetLineWidth(width) => self.set_line_width(width),
                Command::SetFontName(name) => self.set_font_name(&name),
                Command::SetFontSize(size) => self.set_font_size(size),
                Command::SaveState => self.save_state(),
                Command::RestoreState => self.restore_state(),
                other => self.commands.push(other),
            }
        }
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn finish(self) -> Document {
        Document {
            page_size: self.page_size,
            commands: self.commands,
            images: self.images,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundant_state_changes_are_dropped() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.set_fill_color(Color::BLACK);
        canvas.set_font_name(HELVETICA);
        canvas.set_font_size(Pt::from_f32(12.0));
        assert_eq!(canvas.command_count(), 0);

        canvas.set_fill_color(Color::RED);
        canvas.set_fill_color(Color::RED);
        canvas.set_font_name("SimHei");
        canvas.set_font_name("SimHei");
        assert_eq!(canvas.command_count(), 2);
    }

    #[test]
    fn restore_rewinds_tracked_state() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.save_state();
        canvas.set_stroke_color(Color::RED);
        canvas.restore_state();
        // Back to black: setting red again must be recorded.
        canvas.set_stroke_color(Color::RED);
        let doc = canvas.finish();
        assert_eq!(
            doc.commands,
            vec![
                Command::SaveState,
                Command::SetStrokeColor(Color::RED),
                Command::RestoreState,
                Command::SetStrokeColor(Color::RED),
            ]
        );
    }

    #[test]
    fn text_runs_follow_save_restore() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.set_font_name("SimHei");
        canvas.save_state();
        canvas.set_font_name(HELVETICA);
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "x=0px");
        canvas.restore_state();
        // Deduplicated: the canvas already tracks SimHei again.
        canvas.set_font_name("SimHei");
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "张三");
        let fonts: Vec<String> = canvas
            .finish()
            .text_runs()
            .into_iter()
            .map(|(font, _, _)| font)
            .collect();
        assert_eq!(fonts, vec![HELVETICA.to_string(), "SimHei".to_string()]);
    }

    #[test]
    fn unbalanced_restore_is_ignored() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.restore_state();
        assert_eq!(canvas.command_count(), 0);
    }

    #[test]
    fn extend_applies_deduplication() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.set_font_name("SimHei");
        canvas.extend(vec![
            Command::SetFontName("SimHei".to_string()),
            Command::DrawString {
                x: Pt::ZERO,
                y: Pt::ZERO,
                text: "张三".to_string(),
            },
        ]);
        let doc = canvas.finish();
        assert_eq!(doc.commands.len(), 2);
        assert_eq!(
            doc.text_runs(),
            vec![("SimHei".to_string(), Pt::from_f32(12.0), "张三".to_string())]
        );
    }
}
