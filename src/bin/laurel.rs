//! Command-line front end for the certificate renderer.
//!
//! Usage:
//!   laurel render --template t.json --record r.json -o out.pdf
//!   laurel resolve --catalog c.json --category 机器人 --award-level 一等奖 --record r.json -o out.pdf
//!   laurel batch --catalog c.json --records rs.json -o out/
//!   laurel grid --input bg.png -o grid.png
//!   laurel inspect out.pdf

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use laurel::{
    ApplicationRecord, CertificateRenderer, GridOptions, TemplateCatalog, TemplateConfig,
    inspect_pdf_path, resolve_template,
};

#[derive(Parser, Debug)]
#[command(name = "laurel")]
#[command(about = "Render award certificates from JSON templates and records")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one record with one template
    Render {
        #[arg(long)]
        template: PathBuf,
        #[arg(long)]
        record: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        renderer: RendererArgs,
    },
    /// Pick a template from a catalog by category and award level, then render
    Resolve {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        category: String,
        #[arg(long)]
        award_level: String,
        #[arg(long)]
        fallback: Option<String>,
        #[arg(long)]
        record: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        renderer: RendererArgs,
    },
    /// Render player and coach certificates for a list of records
    Batch {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        records: PathBuf,
        /// Directory receiving the PDFs and manifest.json
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        renderer: RendererArgs,
    },
    /// Draw a pixel calibration grid over a background image
    Grid {
        #[arg(long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value_t = 20)]
        minor: u32,
        #[arg(long, default_value_t = 100)]
        major: u32,
        /// Font used for coordinate labels; labels are skipped without one
        #[arg(long)]
        label_font: Option<PathBuf>,
    },
    /// Print a JSON report about a PDF
    Inspect { path: PathBuf },
}

#[derive(Args, Debug)]
struct RendererArgs {
    /// Root for relative background and stamp paths
    #[arg(long, default_value = ".")]
    assets: PathBuf,
    /// Certificate font directory (default: <assets>/assets/fonts)
    #[arg(long)]
    font_dir: Option<PathBuf>,
    /// Extra font files to register
    #[arg(long = "font")]
    fonts: Vec<PathBuf>,
    /// Write a JSONL render trace
    #[arg(long)]
    debug_log: Option<PathBuf>,
}

impl RendererArgs {
    fn build(&self) -> Result<CertificateRenderer> {
        let mut builder = CertificateRenderer::builder().asset_root(&self.assets);
        if let Some(dir) = &self.font_dir {
            builder = builder.font_dir(dir);
        }
        for font in &self.fonts {
            builder = builder.register_font_file(font);
        }
        if let Some(path) = &self.debug_log {
            builder = builder.debug_log(path);
        }
        Ok(builder.build()?)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn read_catalog(path: &Path) -> Result<TemplateCatalog> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(TemplateCatalog::from_json(&raw)?)
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Render {
            template,
            record,
            output,
            renderer,
        } => {
            let template: TemplateConfig = read_json(&template)?;
            let record: ApplicationRecord = read_json(&record)?;
            let (pdf, metrics) = renderer.build()?.render_with_metrics(&record, &template)?;
            write_file(&output, &pdf)?;
            tracing::info!(
                path = %output.display(),
                bytes = pdf.len(),
                fields = metrics.fields_rendered,
                failed = metrics.fields_failed,
                "certificate written"
            );
        }
        Command::Resolve {
            catalog,
            category,
            award_level,
            fallback,
            record,
            output,
            renderer,
        } => {
            let catalog = read_catalog(&catalog)?;
            let record: ApplicationRecord = read_json(&record)?;
            let template =
                resolve_template(&catalog, &category, &award_level, fallback.as_deref())?;
            let pdf = renderer.build()?.render(&record, &template)?;
            write_file(&output, &pdf)?;
            tracing::info!(path = %output.display(), bytes = pdf.len(), "certificate written");
        }
        Command::Batch {
            catalog,
            records,
            output,
            renderer,
        } => {
            let catalog = read_catalog(&catalog)?;
            let records: Vec<ApplicationRecord> = read_json(&records)?;
            let result = renderer.build()?.render_batch(&catalog, &records);
            result.write_to_dir(&output)?;
            if result.files.is_empty() && !result.manifest.errors.is_empty() {
                bail!(
                    "every certificate failed ({} errors), see {}",
                    result.manifest.error_count,
                    output.join(laurel::MANIFEST_FILENAME).display()
                );
            }
        }
        Command::Grid {
            input,
            output,
            minor,
            major,
            label_font,
        } => {
            let data =
                std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
            let font = match &label_font {
                Some(path) => Some(
                    std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
                ),
                None => None,
            };
            let options = GridOptions {
                minor_step: minor,
                major_step: major,
                ..GridOptions::default()
            };
            let png = laurel::overlay_grid(&data, &options, font.as_deref())?;
            write_file(&output, &png)?;
        }
        Command::Inspect { path } => {
            let report = inspect_pdf_path(&path)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
