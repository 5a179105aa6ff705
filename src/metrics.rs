use serde::Serialize;

use crate::pdf::PdfStats;

/// Counters for one certificate render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderMetrics {
    pub page_width_pt: f32,
    pub page_height_pt: f32,
    pub fields_total: usize,
    pub fields_rendered: usize,
    pub fields_blank: usize,
    pub fields_failed: usize,
    pub lines_drawn: usize,
    pub lines_truncated: usize,
    pub assets_missing: usize,
    pub command_count: usize,
    pub content_bytes: usize,
    pub total_bytes: usize,
    pub font_count: usize,
    pub image_count: usize,
    pub replaced_chars: usize,
    pub render_ms: f64,
}

impl RenderMetrics {
    pub(crate) fn record_pdf(&mut self, stats: &PdfStats) {
        self.content_bytes = stats.content_bytes;
        self.total_bytes = stats.total_bytes;
        self.font_count = stats.font_count;
        self.image_count = stats.image_count;
        self.replaced_chars = stats.replaced_chars;
    }
}
