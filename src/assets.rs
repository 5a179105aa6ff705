use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use image::{DynamicImage, ImageFormat};

use crate::error::LaurelError;
use crate::types::Size;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Background,
    Stamp,
    Font,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Background => "background",
            AssetKind::Stamp => "stamp",
            AssetKind::Font => "font",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded raster image plus the bytes it came from.
///
/// JPEG sources are passed through to the PDF untouched, so the source
/// bytes are kept next to the decoded pixels.
#[derive(Clone)]
pub struct ImageAsset {
    pub width: u32,
    pub height: u32,
    pub format: Option<ImageFormat>,
    pub(crate) bytes: Arc<[u8]>,
    pub(crate) decoded: Arc<DynamicImage>,
}

impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl ImageAsset {
    pub fn from_bytes(bytes: Vec<u8>, mime: Option<&str>) -> Result<Self, LaurelError> {
        let format = match mime {
            Some(mime) if mime.contains("png") => Some(ImageFormat::Png),
            Some(mime) if mime.contains("jpeg") || mime.contains("jpg") => Some(ImageFormat::Jpeg),
            _ => image::guess_format(&bytes).ok(),
        };
        let decoded = image::load_from_memory(&bytes)
            .map_err(|err| LaurelError::Asset(format!("cannot decode image: {err}")))?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(LaurelError::Asset("image has no pixels".to_string()));
        }
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            format,
            bytes: bytes.into(),
            decoded: Arc::new(decoded),
        })
    }

    /// Native size at 0.75 pt per pixel.
    pub fn size_pt(&self) -> Size {
        Size::from_pixels(self.width, self.height)
    }

    pub fn is_jpeg(&self) -> bool {
        self.format == Some(ImageFormat::Jpeg)
    }
}

/// Resolves template asset references against one root directory.
///
/// References are `data:` URIs, absolute paths, or paths relative to the
/// root. A missing asset is never fatal to a render; callers decide whether
/// to skip the feature that needed it.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    root: PathBuf,
}

impl AssetResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve_path(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn load_bytes(&self, reference: &str) -> Result<(Vec<u8>, Option<String>), LaurelError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(LaurelError::Asset("empty asset reference".to_string()));
        }
        if reference.starts_with("data:") {
            let (mime, data) = parse_data_uri(reference)
                .ok_or_else(|| LaurelError::Asset("malformed data URI".to_string()))?;
            return Ok((data, Some(mime)));
        }
        let path = self.resolve_path(reference);
        let data = std::fs::read(&path)
            .map_err(|err| LaurelError::Asset(format!("{}: {err}", path.display())))?;
        Ok((data, None))
    }

    pub fn load_image(&self, reference: &str) -> Result<ImageAsset, LaurelError> {
        let (data, mime) = self.load_bytes(reference)?;
        ImageAsset::from_bytes(data, mime.as_deref())
    }
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data_part) = rest.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.split(';').any(|part| part == "base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data_part.trim())
            .ok()?
    } else {
        data_part.as_bytes().to_vec()
    };
    Some((mime, data))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba, RgbaImage};
    use std::io::Cursor;

    pub(crate) fn png_bytes(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
        let img: RgbaImage = ImageBuffer::from_pixel(width, height, Rgba(pixel));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).expect("encode png");
        out.into_inner()
    }

    #[test]
    fn relative_references_join_the_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = AssetResolver::new(dir.path());
        assert_eq!(
            resolver.resolve_path("assets/cert/player.png"),
            dir.path().join("assets/cert/player.png")
        );
        let absolute = dir.path().join("x.png");
        let absolute_str = absolute.to_str().expect("utf8 path");
        assert_eq!(resolver.resolve_path(absolute_str), absolute);
    }

    #[test]
    fn loads_png_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("bg.png"), png_bytes(40, 20, [255, 255, 255, 255]))
            .expect("write");
        let image = AssetResolver::new(dir.path())
            .load_image("bg.png")
            .expect("image");
        assert_eq!((image.width, image.height), (40, 20));
        assert_eq!(image.format, Some(ImageFormat::Png));
        let size = image.size_pt();
        assert_eq!(size.width.to_f32(), 30.0);
        assert_eq!(size.height.to_f32(), 15.0);
    }

    #[test]
    fn loads_base64_data_uri() {
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(png_bytes(2, 3, [0, 0, 0, 128]));
        let uri = format!("data:image/png;base64,{encoded}");
        let image = AssetResolver::new("/nonexistent").load_image(&uri).expect("image");
        assert_eq!((image.width, image.height), (2, 3));
    }

    #[test]
    fn missing_and_corrupt_assets_are_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = AssetResolver::new(dir.path());
        assert!(matches!(
            resolver.load_image("nope.png"),
            Err(LaurelError::Asset(_))
        ));
        std::fs::write(dir.path().join("bad.png"), b"not an image").expect("write");
        assert!(resolver.load_image("bad.png").is_err());
        assert!(resolver.load_image("  ").is_err());
        assert!(parse_data_uri("data:image/png;base64").is_none());
    }
}
