use crate::error::LaurelError;
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use ttf_parser::GlyphId;

pub const HELVETICA: &str = "Helvetica";
pub const CJK_FALLBACK_FONT: &str = "STSong-Light";
pub const PREFERRED_DEFAULT_FONT: &str = "SimHei";

// Families looked up in the bundled font directory; first loadable file wins.
pub const FONT_CANDIDATES: &[(&str, &[&str])] = &[
    ("SimHei", &["simhei.ttf", "SimHei.ttf", "SimHei.TTF"]),
    (
        "SimSun",
        &[
            "simsun.ttc",
            "SimSun.ttc",
            "simsun.ttf",
            "SimSun.ttf",
            "simsunb.ttf",
            "SimSunB.ttf",
            "SIMSUNB.TTF",
        ],
    ),
    (
        "YouYuan",
        &[
            "youyuan.ttf",
            "YouYuan.ttf",
            "youyuan.ttc",
            "YouYuan.ttc",
            "SIMYOU.TTF",
            "SimYou.ttf",
            "simyou.ttf",
        ],
    ),
    (
        "STKaiti",
        &[
            "stkaiti.ttf",
            "STKaiti.ttf",
            "stkaiti.ttc",
            "STKaiti.ttc",
            "STKAITI.TTF",
        ],
    ),
];

pub const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("黑体", "SimHei"),
    ("宋体", "SimSun"),
    ("幼圆", "YouYuan"),
    ("华文楷体", "STKaiti"),
    ("CJK", "STSong"),
    ("SimHei", "SimHei"),
    ("SimSun", "SimSun"),
    ("YouYuan", "YouYuan"),
    ("STKaiti", "STKaiti"),
    ("STSong", "STSong"),
    ("Helvetica", "Helvetica"),
];

// Helvetica AFM advances for U+0020..=U+007E.
const HELVETICA_ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];
const HELVETICA_DEFAULT_WIDTH: u16 = 556;

/// Fonts every PDF reader provides without embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFont {
    Helvetica,
    StSongLight,
}

impl BuiltinFont {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinFont::Helvetica => HELVETICA,
            BuiltinFont::StSongLight => CJK_FALLBACK_FONT,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let key = normalize_name(name);
        if key == normalize_name(HELVETICA) {
            Some(BuiltinFont::Helvetica)
        } else if key == normalize_name(CJK_FALLBACK_FONT) {
            Some(BuiltinFont::StSongLight)
        } else {
            None
        }
    }

    // Advance in 1/1000 em.
    pub(crate) fn advance(&self, ch: char) -> u16 {
        match self {
            BuiltinFont::Helvetica => {
                let code = ch as u32;
                if (0x20..=0x7E).contains(&code) {
                    HELVETICA_ASCII_WIDTHS[(code - 0x20) as usize]
                } else {
                    HELVETICA_DEFAULT_WIDTH
                }
            }
            BuiltinFont::StSongLight => {
                if (' '..='~').contains(&ch) {
                    500
                } else {
                    1000
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontKind {
    Embedded,
    Builtin(BuiltinFont),
}

/// A concrete font chosen for a logical name. Always drawable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFont {
    pub name: String,
    pub kind: FontKind,
}

impl ResolvedFont {
    pub fn builtin(font: BuiltinFont) -> Self {
        Self {
            name: font.name().to_string(),
            kind: FontKind::Builtin(font),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

#[derive(Debug)]
pub(crate) struct FontMetrics {
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) stem_v: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) missing_width: u16,
    pub(crate) is_fixed_pitch: bool,
}

#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) metrics: FontMetrics,
    pub(crate) program_kind: FontProgramKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShapedGlyph {
    pub(crate) gid: u16,
    // 1/1000 em
    pub(crate) advance: u16,
    pub(crate) text: String,
}

#[derive(Debug, Default)]
pub(crate) struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
}

impl FontRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.fonts.len()
    }

    pub(crate) fn register_dir(&mut self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let Ok(entries) = fs::read_dir(path) else {
            tracing::debug!(dir = %path.display(), "font directory not readable");
            return 0;
        };
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();
        // Directory iteration order is platform dependent; first registration wins.
        files.sort();
        files
            .into_iter()
            .filter(|file| self.register_file(file).is_some())
            .count()
    }

    pub(crate) fn register_file(&mut self, path: impl AsRef<Path>) -> Option<String> {
        let path = path.as_ref();
        if !is_supported_font_path(path) {
            return None;
        }
        match fs::read(path) {
            Ok(data) => match self.register_bytes(data, Some(path), None) {
                Ok(name) => Some(name),
                Err(err) => {
                    tracing::debug!(path = %path.display(), %err, "skipping font");
                    None
                }
            },
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "skipping font");
                None
            }
        }
    }

    // Scans `dir` for the known certificate families. Missing or corrupt
    // files are skipped; returns the families that were registered.
    pub(crate) fn register_candidates(&mut self, dir: &Path) -> Vec<String> {
        let mut registered = Vec::new();
        for (family, filenames) in FONT_CANDIDATES {
            for filename in *filenames {
                let path = dir.join(filename);
                if !path.is_file() {
                    continue;
                }
                let loaded = fs::read(&path)
                    .map_err(LaurelError::from)
                    .and_then(|data| self.register_bytes(data, Some(&path), Some(*family)));
                match loaded {
                    Ok(_) => {
                        tracing::debug!(family = *family, path = %path.display(), "registered font");
                        registered.push(family.to_string());
                        break;
                    }
                    Err(err) => {
                        tracing::debug!(
                            family = *family,
                            path = %path.display(),
                            %err,
                            "font candidate rejected"
                        );
                    }
                }
            }
        }
        registered
    }

    /// Registers a font program. Collections (`ttcf`) contribute their first
    /// face, re-packed as a standalone sfnt so it can be embedded.
    pub(crate) fn register_bytes(
        &mut self,
        data: Vec<u8>,
        source: Option<&Path>,
        family: Option<&str>,
    ) -> Result<String, LaurelError> {
        let label = source
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "embedded font".to_string());
        let data = if data.starts_with(b"ttcf") {
            extract_collection_face(&data, 0)
                .ok_or_else(|| LaurelError::Asset(format!("unreadable font collection {label}")))?
        } else {
            data
        };
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|err| LaurelError::Asset(format!("invalid font data for {label}: {err}")))?;

        let (primary, aliases) = font_names(&face, source.unwrap_or(Path::new("EmbeddedFont")));
        let (metrics, program_kind) = FontMetrics::from_face(&face);
        let name = family.map(str::to_string).unwrap_or(primary.clone());
        drop(face);

        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data,
            metrics,
            program_kind,
        });

        let mut all_names = vec![name.clone(), primary];
        all_names.extend(aliases);
        for alias in all_names {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }
        Ok(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&RegisteredFont> {
        self.lookup
            .get(&normalize_name(name))
            .and_then(|index| self.fonts.get(*index))
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.fonts.iter().map(|font| font.name.clone()).collect()
    }
}

/// Maps logical font names from templates onto drawable fonts.
///
/// Built once per renderer and only read afterwards, so it can be shared
/// across threads without locking.
#[derive(Debug)]
pub struct FontResolver {
    registry: FontRegistry,
    aliases: HashMap<String, String>,
    default_font: ResolvedFont,
    cjk_fallback: Option<ResolvedFont>,
}

impl FontResolver {
    pub(crate) fn new(registry: FontRegistry, cjk_fallback: bool) -> Self {
        let aliases = DEFAULT_ALIASES
            .iter()
            .map(|(alias, target)| (normalize_name(alias), target.to_string()))
            .collect();
        let default_font = match registry.get(PREFERRED_DEFAULT_FONT) {
            Some(font) => ResolvedFont {
                name: font.name.clone(),
                kind: FontKind::Embedded,
            },
            None => ResolvedFont::builtin(BuiltinFont::Helvetica),
        };
        let cjk_fallback = cjk_fallback.then(|| ResolvedFont::builtin(BuiltinFont::StSongLight));
        Self {
            registry,
            aliases,
            default_font,
            cjk_fallback,
        }
    }

    pub fn builtin_only() -> Self {
        Self::new(FontRegistry::new(), true)
    }

    pub(crate) fn add_alias(&mut self, alias: &str, target: &str) {
        self.aliases
            .insert(normalize_name(alias), target.trim().to_string());
    }

    pub fn default_font(&self) -> &ResolvedFont {
        &self.default_font
    }

    pub fn registered_fonts(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Exact lookup among registered and built-in fonts.
    pub fn lookup(&self, name: &str) -> Option<ResolvedFont> {
        if let Some(font) = self.registry.get(name) {
            return Some(ResolvedFont {
                name: font.name.clone(),
                kind: FontKind::Embedded,
            });
        }
        BuiltinFont::from_name(name).map(ResolvedFont::builtin)
    }

    /// Registered name, then alias target, then the CJK fallback, then the
    /// default font. Never fails.
    pub fn resolve(&self, logical: Option<&str>) -> ResolvedFont {
        let Some(logical) = logical.map(str::trim).filter(|v| !v.is_empty()) else {
            return self.default_font.clone();
        };
        if let Some(font) = self.lookup(logical) {
            return font;
        }
        if let Some(target) = self.aliases.get(&normalize_name(logical)) {
            if let Some(font) = self.lookup(target) {
                return font;
            }
        }
        if let Some(fallback) = &self.cjk_fallback {
            tracing::debug!(font = logical, fallback = %fallback.name, "font not registered");
            return fallback.clone();
        }
        self.default_font.clone()
    }

    pub fn measure(&self, font: &ResolvedFont, font_size: f32, text: &str) -> f32 {
        if text.is_empty() || font_size <= 0.0 {
            return 0.0;
        }
        let units: u32 = match font.kind {
            FontKind::Builtin(builtin) => text.chars().map(|ch| builtin.advance(ch) as u32).sum(),
            FontKind::Embedded => match self.registry.get(&font.name) {
                Some(registered) => drawn_advance(&shape_glyphs(registered, text)),
                None => return font_size * 0.6 * text.chars().count() as f32,
            },
        };
        units as f32 * font_size / 1000.0
    }

    pub(crate) fn registered(&self, name: &str) -> Option<&RegisteredFont> {
        self.registry.get(name)
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> (Self, FontProgramKind) {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let missing_width = face
            .glyph_index(' ')
            .and_then(|gid| face.glyph_hor_advance(gid))
            .map(|adv| (adv as f32 * scale).round() as u16)
            .unwrap_or(1000);

        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);
        let program_kind = if face.tables().cff.is_some() {
            FontProgramKind::OpenTypeCff
        } else {
            FontProgramKind::TrueType
        };

        (
            Self {
                ascent,
                descent,
                cap_height,
                italic_angle,
                stem_v: 80,
                bbox,
                missing_width,
                is_fixed_pitch: face.is_monospaced(),
            },
            program_kind,
        )
    }
}

/// Shapes `text` and reports each glyph with the source text it covers.
impl ShapedGlyph {
    // `.notdef` is never written to the content stream.
    pub(crate) fn is_drawn(&self) -> bool {
        self.gid != 0
    }
}

/// Advance, in 1/1000 em, of the glyphs that end up on the page.
pub(crate) fn drawn_advance(glyphs: &[ShapedGlyph]) -> u32 {
    glyphs
        .iter()
        .filter(|g| g.is_drawn())
        .map(|g| g.advance as u32)
        .sum()
}

pub(crate) fn shape_glyphs(font: &RegisteredFont, text: &str) -> Vec<ShapedGlyph> {
    let Some(face) = HbFace::from_slice(&font.data, 0) else {
        return Vec::new();
    };
    let units_per_em = face.units_per_em().max(1) as i64;
    let mut buffer = UnicodeBuffer::new();
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();

    let mut clusters: Vec<usize> = infos.iter().map(|g| g.cluster as usize).collect();
    clusters.push(text.len());
    let mut glyphs = Vec::with_capacity(infos.len());
    for (i, (info, pos)) in infos.iter().zip(positions.iter()).enumerate() {
        let start = clusters[i].min(text.len());
        let end = clusters[i + 1].min(text.len()).max(start);
        let advance = ((pos.x_advance as i64) * 1000 + (units_per_em / 2)) / units_per_em;
        glyphs.push(ShapedGlyph {
            gid: info.glyph_id as u16,
            advance: advance.clamp(0, u16::MAX as i64) as u16,
            text: text.get(start..end).unwrap_or_default().to_string(),
        });
    }
    glyphs
}

pub(crate) fn glyph_advance(font: &RegisteredFont, gid: u16) -> u16 {
    let Ok(face) = ttf_parser::Face::parse(&font.data, 0) else {
        return font.metrics.missing_width;
    };
    let Some(advance) = face.glyph_hor_advance(GlyphId(gid)) else {
        return font.metrics.missing_width;
    };
    let units = face.units_per_em().max(1) as i64;
    let scaled = ((advance as i64) * 1000 + (units / 2)) / units;
    scaled.clamp(0, u16::MAX as i64) as u16
}

/// Re-packs face `index` of a TrueType collection as a standalone sfnt.
pub(crate) fn extract_collection_face(data: &[u8], index: usize) -> Option<Vec<u8>> {
    if data.get(0..4)? != b"ttcf" {
        return None;
    }
    let num_fonts = read_u32(data, 8)? as usize;
    if index >= num_fonts {
        return None;
    }
    let face_offset = read_u32(data, 12 + index * 4)? as usize;
    let header = data.get(face_offset..face_offset.checked_add(12)?)?;
    let num_tables = read_u16(data, face_offset + 4)? as usize;

    let mut tables: Vec<(&[u8], u32, &[u8])> = Vec::with_capacity(num_tables);
    for i in 0..num_tables {
        let record = face_offset + 12 + i * 16;
        let tag = data.get(record..record + 4)?;
        let checksum = read_u32(data, record + 4)?;
        let offset = read_u32(data, record + 8)? as usize;
        let length = read_u32(data, record + 12)? as usize;
        let body = data.get(offset..offset.checked_add(length)?)?;
        tables.push((tag, checksum, body));
    }

    let directory_len = 12 + 16 * num_tables;
    let body_len: usize = tables.iter().map(|(_, _, body)| pad4(body.len())).sum();
    let mut out = Vec::with_capacity(directory_len + body_len);
    out.extend_from_slice(header);
    let mut offset = directory_len;
    for (tag, checksum, body) in &tables {
        out.extend_from_slice(tag);
        out.extend_from_slice(&checksum.to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        offset += pad4(body.len());
    }
    for (_, _, body) in &tables {
        out.extend_from_slice(body);
        out.resize(pad4(out.len()), 0);
    }
    Some(out)
}

fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                family.get_or_insert(name);
            }
            name_id::FULL_NAME => {
                full.get_or_insert(name);
            }
            name_id::POST_SCRIPT_NAME => {
                post.get_or_insert(name);
            }
            _ => {}
        }
    }

    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let primary = post
        .clone()
        .or_else(|| full.clone())
        .or_else(|| family.clone())
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());

    let aliases = [family, full, post, stem]
        .into_iter()
        .flatten()
        .filter(|candidate| *candidate != primary)
        .collect();
    (primary, aliases)
}

pub(crate) fn is_supported_font_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
        return false;
    };
    matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf" | "ttc")
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_lowercase()
}
