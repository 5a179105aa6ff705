use lopdf::{Dictionary, Document as LoDocument, Object};
use serde::Serialize;
use std::path::Path;

use crate::types::Size;

// MediaBox comparisons tolerate writer rounding.
const MEDIA_BOX_TOLERANCE: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PdfInspectErrorCode {
    PdfParseFailed,
    PdfEncryptedUnsupported,
    PdfEmptyOrNoPages,
    PdfNotSinglePage,
    PdfPageSizeMismatch,
    PdfIoError,
}

impl PdfInspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfInspectErrorCode::PdfParseFailed => "PDF_PARSE_FAILED",
            PdfInspectErrorCode::PdfEncryptedUnsupported => "PDF_ENCRYPTED_UNSUPPORTED",
            PdfInspectErrorCode::PdfEmptyOrNoPages => "PDF_EMPTY_OR_NO_PAGES",
            PdfInspectErrorCode::PdfNotSinglePage => "PDF_NOT_SINGLE_PAGE",
            PdfInspectErrorCode::PdfPageSizeMismatch => "PDF_PAGE_SIZE_MISMATCH",
            PdfInspectErrorCode::PdfIoError => "PDF_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectError {
    pub code: PdfInspectErrorCode,
    pub message: String,
}

impl std::fmt::Display for PdfInspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for PdfInspectError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfInspectWarning {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdfInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    // [llx, lly, urx, ury] of the first page, inherited boxes included.
    pub media_box: Option<[f32; 4]>,
    pub warnings: Vec<PdfInspectWarning>,
}

impl PdfInspectReport {
    pub fn page_size(&self) -> Option<(f32, f32)> {
        self.media_box
            .map(|[llx, lly, urx, ury]| (urx - llx, ury - lly))
    }
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfInspectReport, PdfInspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfParseFailed,
        message: err.to_string(),
    })?;

    let pages = pdf.get_pages();
    let media_box = pages
        .values()
        .next()
        .and_then(|page_id| pdf.get_dictionary(*page_id).ok())
        .and_then(|page| find_media_box(&pdf, page));
    let mut warnings = Vec::new();
    if !pages.is_empty() && media_box.is_none() {
        warnings.push(PdfInspectWarning {
            code: "MEDIA_BOX_MISSING".to_string(),
            message: "first page has no readable MediaBox".to_string(),
        });
    }

    Ok(PdfInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pages.len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        media_box,
        warnings,
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<PdfInspectReport, PdfInspectError> {
    let data = std::fs::read(path).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfIoError,
        message: err.to_string(),
    })?;
    inspect_pdf_bytes(&data)
}

fn find_media_box(pdf: &LoDocument, page: &Dictionary) -> Option<[f32; 4]> {
    let mut current = page;
    // Page tree depth is small; the bound guards against Parent cycles.
    for _ in 0..32 {
        if let Ok(object) = current.get(b"MediaBox") {
            return read_rect(pdf, object);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = pdf.get_dictionary(parent).ok()?;
    }
    None
}

fn read_rect(pdf: &LoDocument, object: &Object) -> Option<[f32; 4]> {
    let object = match object {
        Object::Reference(id) => pdf.get_object(*id).ok()?,
        other => other,
    };
    let values = object.as_array().ok()?;
    if values.len() != 4 {
        return None;
    }
    let mut rect = [0.0f32; 4];
    for (slot, value) in rect.iter_mut().zip(values) {
        *slot = value.as_float().ok()?;
    }
    Some(rect)
}

/// Problems that make `report` unusable as a rendered certificate.
pub fn certificate_issues(
    report: &PdfInspectReport,
    expected_page: Option<Size>,
) -> Vec<PdfInspectErrorCode> {
    let mut issues = Vec::new();
    if report.encrypted {
        issues.push(PdfInspectErrorCode::PdfEncryptedUnsupported);
    }
    match report.page_count {
        0 => issues.push(PdfInspectErrorCode::PdfEmptyOrNoPages),
        1 => {}
        _ => issues.push(PdfInspectErrorCode::PdfNotSinglePage),
    }
    if let Some(expected) = expected_page {
        let matches = report.page_size().is_some_and(|(width, height)| {
            (width - expected.width.to_f32()).abs() <= MEDIA_BOX_TOLERANCE
                && (height - expected.height.to_f32()).abs() <= MEDIA_BOX_TOLERANCE
        });
        if !matches {
            issues.push(PdfInspectErrorCode::PdfPageSizeMismatch);
        }
    }
    issues
}

pub fn require_certificate(
    report: &PdfInspectReport,
    expected_page: Option<Size>,
) -> Result<(), PdfInspectError> {
    let Some(code) = certificate_issues(report, expected_page).into_iter().next() else {
        return Ok(());
    };
    let message = match code {
        PdfInspectErrorCode::PdfEncryptedUnsupported => "encrypted pdf is not supported".to_string(),
        PdfInspectErrorCode::PdfEmptyOrNoPages => "pdf has no pages".to_string(),
        PdfInspectErrorCode::PdfNotSinglePage => {
            format!("expected one page, found {}", report.page_count)
        }
        PdfInspectErrorCode::PdfPageSizeMismatch => format!(
            "page size {:?} does not match {:?}",
            report.page_size(),
            expected_page.map(|size| (size.width.to_f32(), size.height.to_f32()))
        ),
        PdfInspectErrorCode::PdfParseFailed | PdfInspectErrorCode::PdfIoError => String::new(),
    };
    Err(PdfInspectError { code, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::font::FontResolver;
    use crate::pdf::{PdfOptions, document_to_pdf};
    use lopdf::{Object as LoObject, dictionary};

    fn certificate_bytes(size: Size) -> Vec<u8> {
        let canvas = Canvas::new(size);
        document_to_pdf(&canvas.finish(), &FontResolver::builtin_only(), &PdfOptions::default())
            .expect("pdf")
    }

    // Two pages whose MediaBox lives on the Pages node.
    fn two_page_bytes() -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let first = doc.add_object(dictionary! { "Type" => "Page", "Parent" => pages_id });
        let second = doc.add_object(dictionary! { "Type" => "Page", "Parent" => pages_id });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![first.into(), second.into()],
            "Count" => 2,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, LoObject::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save");
        out
    }

    #[test]
    fn reports_version_pages_and_media_box() {
        let bytes = certificate_bytes(Size::from_pixels(1262, 892));
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.page_count, 1);
        assert!(!report.encrypted);
        assert_eq!(report.file_size_bytes, bytes.len());
        assert_eq!(report.pdf_version, "1.7");
        assert_eq!(report.page_size(), Some((946.5, 669.0)));
        assert!(report.warnings.is_empty());
        assert!(require_certificate(&report, Some(Size::from_pixels(1262, 892))).is_ok());
    }

    #[test]
    fn inherited_media_box_and_page_count_issues() {
        let report = inspect_pdf_bytes(&two_page_bytes()).expect("inspect");
        assert_eq!(report.media_box, Some([0.0, 0.0, 612.0, 792.0]));
        assert_eq!(
            certificate_issues(&report, None),
            vec![PdfInspectErrorCode::PdfNotSinglePage]
        );
        let err = require_certificate(&report, None).expect_err("two pages");
        assert_eq!(err.code, PdfInspectErrorCode::PdfNotSinglePage);
        assert!(err.to_string().starts_with("PDF_NOT_SINGLE_PAGE"));
    }

    #[test]
    fn page_size_mismatch_is_flagged() {
        let bytes = certificate_bytes(Size::a4());
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        let err = require_certificate(&report, Some(Size::from_pixels(100, 100)))
            .expect_err("mismatch");
        assert_eq!(err.code, PdfInspectErrorCode::PdfPageSizeMismatch);
    }

    #[test]
    fn rejects_malformed_data() {
        let err = inspect_pdf_bytes(b"not a pdf").expect_err("invalid");
        assert_eq!(err.code, PdfInspectErrorCode::PdfParseFailed);
    }

    #[test]
    fn encrypted_and_empty_reports_are_rejected() {
        let report = PdfInspectReport {
            pdf_version: "1.7".to_string(),
            page_count: 0,
            encrypted: true,
            file_size_bytes: 0,
            media_box: None,
            warnings: Vec::new(),
        };
        assert_eq!(
            certificate_issues(&report, None),
            vec![
                PdfInspectErrorCode::PdfEncryptedUnsupported,
                PdfInspectErrorCode::PdfEmptyOrNoPages
            ]
        );
        let err = require_certificate(&report, None).expect_err("must fail");
        assert_eq!(err.code, PdfInspectErrorCode::PdfEncryptedUnsupported);
    }

    #[test]
    fn path_report_matches_bytes_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("one.pdf");
        let bytes = certificate_bytes(Size::a4());
        std::fs::write(&path, &bytes).expect("write");
        assert_eq!(
            inspect_pdf_path(&path).expect("path"),
            inspect_pdf_bytes(&bytes).expect("bytes")
        );
        let err = inspect_pdf_path(&dir.path().join("missing.pdf")).expect_err("missing");
        assert_eq!(err.code, PdfInspectErrorCode::PdfIoError);
    }
}
