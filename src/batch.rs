use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::CertificateRenderer;
use crate::error::LaurelError;
use crate::pdfinspect::{inspect_pdf_bytes, require_certificate};
use crate::record::{PARTICIPANT_NAME_SEPARATOR, RenderRecord};
use crate::resolver::{CertificateKind, TemplateStore};
use crate::text::{is_blank, normalize_value};
use crate::types::{Pt, Size};

pub const MANIFEST_FILENAME: &str = "manifest.json";

const UNSAFE_FILENAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|', '\n', '\r', '\t'];

/// Filename-safe form of one name component; blank values become `NA`.
pub fn safe_filename_part(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return "NA".to_string();
    }
    value.replace(UNSAFE_FILENAME_CHARS, "_")
}

pub fn certificate_filename(kind: CertificateKind, record: &dyn RenderRecord) -> String {
    let attr = |name: &str| safe_filename_part(&normalize_value(record.attribute(name).as_deref()));
    let award_level = record.award_level();
    match kind {
        CertificateKind::Player => {
            let names = record.participant_names().join(PARTICIPANT_NAME_SEPARATOR);
            format!(
                "{}_{}_{}_{}_{}.pdf",
                attr("match_no"),
                safe_filename_part(&names),
                attr("category"),
                attr("education_level"),
                safe_filename_part(&award_level)
            )
        }
        CertificateKind::Coach => format!(
            "{}_{}_{}_{}.pdf",
            attr("match_no"),
            attr("teacher_name"),
            attr("category"),
            safe_filename_part(&kind.award_level(&award_level))
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchError {
    pub record_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub record_id: String,
    pub kind: CertificateKind,
    pub filename: String,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchManifest {
    pub total_requested: usize,
    pub matched_with_award: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<BatchError>,
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone)]
pub struct BatchFile {
    pub record_id: String,
    pub kind: CertificateKind,
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    pub manifest: BatchManifest,
    pub files: Vec<BatchFile>,
}

impl BatchOutput {
    /// Writes every certificate plus `manifest.json` into `dir`.
    pub fn write_to_dir(&self, dir: &Path) -> Result<(), LaurelError> {
        std::fs::create_dir_all(dir)?;
        for file in &self.files {
            std::fs::write(dir.join(&file.filename), &file.data)?;
        }
        let manifest = serde_json::to_vec_pretty(&self.manifest)?;
        std::fs::write(dir.join(MANIFEST_FILENAME), manifest)?;
        Ok(())
    }
}

struct RecordOutcome {
    record_id: String,
    files: Vec<(CertificateKind, String, Vec<u8>)>,
    error: Option<String>,
}

pub(crate) fn render_batch<R>(
    renderer: &CertificateRenderer,
    store: &(dyn TemplateStore + Sync),
    records: &[R],
) -> BatchOutput
where
    R: RenderRecord + Sync,
{
    let outcomes: Vec<RecordOutcome> = records
        .par_iter()
        .enumerate()
        .filter(|(_, record)| !is_blank(&record.award_level()))
        .map(|(index, record)| render_record(renderer, store, index, record))
        .collect();

    let mut output = BatchOutput {
        manifest: BatchManifest {
            total_requested: records.len(),
            matched_with_award: outcomes.len(),
            ..BatchManifest::default()
        },
        files: Vec::new(),
    };
    let mut used = HashSet::new();
    for outcome in outcomes {
        for (kind, filename, data) in outcome.files {
            let filename = unique_filename(&mut used, filename);
            output.manifest.files.push(ManifestEntry {
                record_id: outcome.record_id.clone(),
                kind,
                filename: filename.clone(),
                bytes: data.len(),
                sha256: sha256_hex(&data),
            });
            output.files.push(BatchFile {
                record_id: outcome.record_id.clone(),
                kind,
                filename,
                data,
            });
        }
        if let Some(error) = outcome.error {
            output.manifest.errors.push(BatchError {
                record_id: outcome.record_id,
                error,
            });
        }
    }
    output.manifest.success_count = output.files.len();
    output.manifest.error_count = output.manifest.errors.len();
    tracing::info!(
        requested = output.manifest.total_requested,
        matched = output.manifest.matched_with_award,
        files = output.manifest.success_count,
        errors = output.manifest.error_count,
        "certificate batch finished"
    );
    output
}

// Player then coach; a coach failure keeps the player certificate.
fn render_record(
    renderer: &CertificateRenderer,
    store: &dyn TemplateStore,
    index: usize,
    record: &dyn RenderRecord,
) -> RecordOutcome {
    let record_id = record
        .attribute("id")
        .map(|id| normalize_value(Some(&id)))
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| index.to_string());
    let mut files = Vec::new();
    for kind in CertificateKind::ALL {
        match render_checked(renderer, kind, store, record) {
            Ok(data) => files.push((kind, certificate_filename(kind, record), data)),
            Err(err) => {
                tracing::warn!(record = %record_id, kind = kind.as_str(), error = %err, "certificate failed");
                return RecordOutcome {
                    record_id,
                    files,
                    error: Some(err.to_string()),
                };
            }
        }
    }
    RecordOutcome {
        record_id,
        files,
        error: None,
    }
}

fn render_checked(
    renderer: &CertificateRenderer,
    kind: CertificateKind,
    store: &dyn TemplateStore,
    record: &dyn RenderRecord,
) -> Result<Vec<u8>, LaurelError> {
    let template = kind.resolve(store, record)?;
    let (data, metrics) = renderer.render_document(record, &template)?;
    let expected = Size {
        width: Pt::from_f32(metrics.page_width_pt),
        height: Pt::from_f32(metrics.page_height_pt),
    };
    inspect_pdf_bytes(&data)
        .and_then(|report| require_certificate(&report, Some(expected)))
        .map_err(|err| LaurelError::Pdf(err.to_string()))?;
    Ok(data)
}

fn unique_filename(used: &mut HashSet<String>, filename: String) -> String {
    if used.insert(filename.clone()) {
        return filename;
    }
    let stem = filename.strip_suffix(".pdf").unwrap_or(&filename);
    let mut counter = 2;
    loop {
        let candidate = format!("{stem}_{counter}.pdf");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
