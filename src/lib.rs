mod assets;
mod batch;
mod canvas;
mod compositor;
mod debug;
mod error;
mod font;
mod grid;
mod metrics;
mod pdf;
mod pdfinspect;
mod record;
mod resolver;
mod template;
mod text;
mod types;
mod units;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub use assets::{AssetKind, AssetResolver, ImageAsset};
pub use batch::{
    BatchError, BatchFile, BatchManifest, BatchOutput, MANIFEST_FILENAME, ManifestEntry,
    certificate_filename, safe_filename_part,
};
pub use canvas::{Canvas, Command, Document};
pub use compositor::{Composition, Compositor};
pub use debug::DebugLogger;
pub use error::LaurelError;
pub use font::{
    BuiltinFont, CJK_FALLBACK_FONT, FontKind, FontResolver, HELVETICA, PREFERRED_DEFAULT_FONT,
    ResolvedFont,
};
pub use grid::{GridOptions, overlay_grid};
pub use metrics::RenderMetrics;
pub use pdf::{PdfOptions, PdfStats, document_to_pdf, document_to_pdf_with_stats};
pub use pdfinspect::{
    PdfInspectError, PdfInspectErrorCode, PdfInspectReport, PdfInspectWarning,
    certificate_issues, inspect_pdf_bytes, inspect_pdf_path, require_certificate,
};
pub use record::{ApplicationRecord, FieldSource, Participant, RenderRecord};
pub use resolver::{
    COACH_AWARD_SUFFIX, CertificateKind, PLAYER_FALLBACK_AWARD, StoredTemplate, TemplateCatalog,
    TemplateStore, resolve_template,
};
pub use template::{
    DebugCanvasGrid, DebugGrid, LegacyBlock, LegacySlot, StampYAnchor, TemplateConfig, TextField,
    TextSource, XAnchor,
};
pub use text::{Align, Direction, TextMeasure, is_blank};
pub use types::{Color, Pt, Size};
pub use units::{CoordSpace, CoordUnit, YOrigin};

use font::FontRegistry;

/// Default location of the certificate font families under the asset root.
pub const DEFAULT_FONT_SUBDIR: &str = "assets/fonts";

/// Renders certificates from templates and records.
///
/// Fonts are registered once at build time and shared read-only, so one
/// renderer can serve concurrent renders.
pub struct CertificateRenderer {
    fonts: Arc<FontResolver>,
    assets: AssetResolver,
    default_page_size: Size,
    pdf_options: PdfOptions,
    debug: Option<DebugLogger>,
}

#[derive(Debug, Clone)]
pub struct CertificateRendererBuilder {
    asset_root: PathBuf,
    font_dir: Option<PathBuf>,
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    font_aliases: Vec<(String, String)>,
    default_page_size: Size,
    builtin_cjk_fallback: bool,
    pdf_options: PdfOptions,
    debug_path: Option<PathBuf>,
}

impl CertificateRenderer {
    pub fn builder() -> CertificateRendererBuilder {
        CertificateRendererBuilder::new()
    }

    pub fn fonts(&self) -> &FontResolver {
        &self.fonts
    }

    pub fn asset_root(&self) -> &Path {
        self.assets.root()
    }

    fn compositor(&self) -> Compositor<'_> {
        Compositor::new(&self.fonts, &self.assets)
            .with_default_page_size(self.default_page_size)
            .with_debug(self.debug.as_ref())
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = &self.debug {
            logger.emit_summary(context);
            logger.flush();
        }
    }

    /// Lays out the page without serializing it.
    pub fn compose(&self, record: &dyn RenderRecord, template: &TemplateConfig) -> Composition {
        self.compositor().compose(record, template)
    }

    pub fn render(
        &self,
        record: &dyn RenderRecord,
        template: &TemplateConfig,
    ) -> Result<Vec<u8>, LaurelError> {
        self.render_with_metrics(record, template)
            .map(|(bytes, _)| bytes)
    }

    pub fn render_with_metrics(
        &self,
        record: &dyn RenderRecord,
        template: &TemplateConfig,
    ) -> Result<(Vec<u8>, RenderMetrics), LaurelError> {
        let rendered = self.render_document(record, template);
        self.emit_debug_summary("render");
        rendered
    }

    pub(crate) fn render_document(
        &self,
        record: &dyn RenderRecord,
        template: &TemplateConfig,
    ) -> Result<(Vec<u8>, RenderMetrics), LaurelError> {
        let started = Instant::now();
        let Composition {
            document,
            mut metrics,
        } = self.compose(record, template);
        let (bytes, stats) = document_to_pdf_with_stats(&document, &self.fonts, &self.pdf_options)?;
        metrics.record_pdf(&stats);
        metrics.render_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(
            fields = metrics.fields_total,
            failed = metrics.fields_failed,
            bytes = metrics.total_bytes,
            "certificate rendered"
        );
        Ok((bytes, metrics))
    }

    /// Resolves the template for `kind` from the record's category and award
    /// level, then renders.
    pub fn render_for(
        &self,
        kind: CertificateKind,
        store: &dyn TemplateStore,
        record: &dyn RenderRecord,
    ) -> Result<Vec<u8>, LaurelError> {
        let template = kind.resolve(store, record)?;
        self.render(record, &template)
    }

    /// Renders player and coach certificates for every awarded record in
    /// parallel. Failures are collected per record and never abort the batch.
    pub fn render_batch<R>(&self, store: &(dyn TemplateStore + Sync), records: &[R]) -> BatchOutput
    where
        R: RenderRecord + Sync,
    {
        let output = batch::render_batch(self, store, records);
        self.emit_debug_summary("render_batch");
        output
    }

    /// Grid overlay labeled with the default font when it is an embedded one.
    pub fn overlay_grid(&self, input: &[u8], options: &GridOptions) -> Result<Vec<u8>, LaurelError> {
        let default = self.fonts.default_font();
        let label_font = match default.kind {
            FontKind::Embedded => self
                .fonts
                .registered(&default.name)
                .map(|font| font.data.as_slice()),
            FontKind::Builtin(_) => None,
        };
        overlay_grid(input, options, label_font)
    }
}

impl Default for CertificateRendererBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateRendererBuilder {
    pub fn new() -> Self {
        Self {
            asset_root: PathBuf::from("."),
            font_dir: None,
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            font_aliases: Vec::new(),
            default_page_size: Size::a4(),
            builtin_cjk_fallback: true,
            pdf_options: PdfOptions::default(),
            debug_path: None,
        }
    }

    /// Root for relative background, stamp and font paths.
    pub fn asset_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.asset_root = path.into();
        self
    }

    /// Directory scanned for the known certificate font files. Defaults to
    /// `<asset_root>/assets/fonts`.
    pub fn font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dir = Some(path.into());
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    pub fn font_alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.font_aliases.push((alias.into(), target.into()));
        self
    }

    pub fn default_page_size(mut self, size: Size) -> Self {
        self.default_page_size = size;
        self
    }

    // Unregistered font names draw with STSong-Light instead of the default font.
    pub fn builtin_cjk_fallback(mut self, enabled: bool) -> Self {
        self.builtin_cjk_fallback = enabled;
        self
    }

    pub fn compress_streams(mut self, enabled: bool) -> Self {
        self.pdf_options.compress_streams = enabled;
        self
    }

    pub fn document_title(mut self, title: impl Into<String>) -> Self {
        self.pdf_options.title = Some(title.into());
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<CertificateRenderer, LaurelError> {
        let page = self.default_page_size;
        if page.width <= Pt::ZERO || page.height <= Pt::ZERO {
            return Err(LaurelError::InvalidConfiguration(format!(
                "default page size must be positive, got {}x{}",
                page.width.to_f32(),
                page.height.to_f32()
            )));
        }

        let mut registry = FontRegistry::new();
        let font_dir = self
            .font_dir
            .unwrap_or_else(|| self.asset_root.join(DEFAULT_FONT_SUBDIR));
        let families = registry.register_candidates(&font_dir);
        tracing::debug!(dir = %font_dir.display(), ?families, "certificate fonts scanned");
        for dir in &self.font_dirs {
            registry.register_dir(dir);
        }
        for file in &self.font_files {
            if registry.register_file(file).is_none() {
                return Err(LaurelError::InvalidConfiguration(format!(
                    "cannot register font file {}",
                    file.display()
                )));
            }
        }

        let mut fonts = FontResolver::new(registry, self.builtin_cjk_fallback);
        for (alias, target) in &self.font_aliases {
            fonts.add_alias(alias, target);
        }
        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };

        Ok(CertificateRenderer {
            fonts: Arc::new(fonts),
            assets: AssetResolver::new(self.asset_root),
            default_page_size: page,
            pdf_options: self.pdf_options,
            debug,
        })
    }
}
