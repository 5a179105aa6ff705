use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Write};

use fixed::types::I32F32;

use crate::assets::ImageAsset;
use crate::canvas::{Command, Document, TextState};
use crate::error::LaurelError;
use crate::font::{
    BuiltinFont, FontKind, FontProgramKind, FontResolver, RegisteredFont, ShapedGlyph,
    glyph_advance, shape_glyphs,
};
use crate::types::{Color, Pt, Size};

const PDF_HEADER: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";
const PRODUCER: &str = "laurel";

#[derive(Debug, Clone)]
pub struct PdfOptions {
    // Flate-compress content, image and font streams.
    pub compress_streams: bool,
    pub title: Option<String>,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            compress_streams: true,
            title: None,
        }
    }
}

/// Sizes and counts gathered while serializing one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfStats {
    pub total_bytes: usize,
    pub content_bytes: usize,
    pub font_count: usize,
    pub image_count: usize,
    // Characters Helvetica could not encode and were written as '?'.
    pub replaced_chars: usize,
}

pub fn document_to_pdf(
    document: &Document,
    fonts: &FontResolver,
    options: &PdfOptions,
) -> Result<Vec<u8>, LaurelError> {
    document_to_pdf_with_stats(document, fonts, options).map(|(bytes, _)| bytes)
}

pub fn document_to_pdf_with_stats(
    document: &Document,
    fonts: &FontResolver,
    options: &PdfOptions,
) -> Result<(Vec<u8>, PdfStats), LaurelError> {
    let mut out = Vec::new();
    let mut stats = document_to_pdf_writer(document, fonts, options, &mut out)?;
    stats.total_bytes = out.len();
    Ok((out, stats))
}

pub(crate) fn document_to_pdf_writer<W: Write>(
    document: &Document,
    fonts: &FontResolver,
    options: &PdfOptions,
    writer: &mut W,
) -> Result<PdfStats, LaurelError> {
    let mut objects = ObjectTable::default();
    let catalog_id = objects.reserve();
    let pages_id = objects.reserve();
    let page_id = objects.reserve();
    let content_id = objects.reserve();

    let mut shaper = Shaper::default();
    let font_plan = plan_fonts(document, fonts, &mut shaper);
    let mut font_resources = Vec::new();
    for font in font_plan.values() {
        let font_id = build_font_objects(font, &mut objects, options);
        font_resources.push((font.resource.clone(), font_id));
    }

    let mut image_map = HashMap::new();
    let mut image_resources = Vec::new();
    for (index, (resource_id, image)) in document.images.iter().enumerate() {
        let name = format!("Im{}", index + 1);
        let image_id = build_image_objects(image, &mut objects, options);
        image_resources.push((name.clone(), image_id));
        image_map.insert(resource_id.clone(), name);
    }

    let (gs_objects, gs_map) = build_extgstate_objects(document);
    let mut gs_resources = Vec::new();
    for (name, body) in gs_objects {
        gs_resources.push((name, objects.push(body.into_bytes())));
    }

    let mut replaced_chars = 0;
    let content = render_page(
        document,
        &font_plan,
        &image_map,
        &gs_map,
        &mut shaper,
        &mut replaced_chars,
    );
    let content_bytes = content.len();
    objects.set(content_id, content_stream_object(content.as_bytes(), options));

    objects.set(
        catalog_id,
        format!("<< /Type /Catalog /Pages {pages_id} 0 R >>").into_bytes(),
    );
    objects.set(
        pages_id,
        format!("<< /Type /Pages /Kids [{page_id} 0 R] /Count 1 >>").into_bytes(),
    );
    objects.set(
        page_id,
        page_object(
            pages_id,
            content_id,
            document.page_size,
            &font_resources,
            &image_resources,
            &gs_resources,
        )
        .into_bytes(),
    );
    let info_id = objects.push(info_object(options.title.as_deref()).into_bytes());

    write_pdf(writer, &objects, catalog_id, info_id)?;
    Ok(PdfStats {
        total_bytes: 0,
        content_bytes,
        font_count: font_plan.len(),
        image_count: document.images.len(),
        replaced_chars,
    })
}

/// Object bodies by id; id `n` lives at index `n - 1`.
#[derive(Default)]
struct ObjectTable {
    bodies: Vec<Vec<u8>>,
}

impl ObjectTable {
    fn reserve(&mut self) -> usize {
        self.bodies.push(Vec::new());
        self.bodies.len()
    }

    fn push(&mut self, body: Vec<u8>) -> usize {
        self.bodies.push(body);
        self.bodies.len()
    }

    fn set(&mut self, id: usize, body: Vec<u8>) {
        if let Some(slot) = id.checked_sub(1).and_then(|index| self.bodies.get_mut(index)) {
            *slot = body;
        }
    }
}

#[derive(Debug)]
enum FontEncoding<'a> {
    WinAnsi,
    // UCS-2 code points through the predefined UniGB-UCS2-H CMap.
    UniGb,
    // Glyph ids of an embedded font, with the text each glyph stands for.
    IdentityH {
        font: &'a RegisteredFont,
        glyph_map: BTreeMap<u16, String>,
    },
}

#[derive(Debug)]
struct FontResource<'a> {
    resource: String,
    encoding: FontEncoding<'a>,
}

/// Caches shaping results so a run is shaped once for the glyph inventory
/// and reused when the content stream is written.
#[derive(Default)]
struct Shaper {
    cache: HashMap<(String, String), Vec<ShapedGlyph>>,
}

impl Shaper {
    fn shape(&mut self, font: &RegisteredFont, text: &str) -> &[ShapedGlyph] {
        self.cache
            .entry((font.name.clone(), text.to_string()))
            .or_insert_with(|| shape_glyphs(font, text))
    }
}

fn plan_fonts<'a>(
    document: &Document,
    fonts: &'a FontResolver,
    shaper: &mut Shaper,
) -> BTreeMap<String, FontResource<'a>> {
    let mut plan: BTreeMap<String, FontResource<'a>> = BTreeMap::new();
    let mut state = TextState::default();
    for cmd in &document.commands {
        state.apply(cmd);
        let Command::DrawString { text, .. } = cmd else {
            continue;
        };
        let current = &state.font_name;
        let next_index = plan.len() + 1;
        let entry = plan.entry(current.clone()).or_insert_with(|| FontResource {
            resource: format!("F{next_index}"),
            encoding: encoding_for(fonts, current),
        });
        if let FontEncoding::IdentityH { font, glyph_map } = &mut entry.encoding {
            for glyph in shaper.shape(*font, text) {
                if glyph.is_drawn() {
                    glyph_map
                        .entry(glyph.gid)
                        .or_insert_with(|| glyph.text.clone());
                }
            }
        }
    }
    plan
}

fn encoding_for<'a>(fonts: &'a FontResolver, name: &str) -> FontEncoding<'a> {
    match fonts.lookup(name).map(|font| font.kind) {
        Some(FontKind::Embedded) => match fonts.registered(name) {
            Some(font) => FontEncoding::IdentityH {
                font,
                glyph_map: BTreeMap::new(),
            },
            None => FontEncoding::WinAnsi,
        },
        Some(FontKind::Builtin(BuiltinFont::StSongLight)) => FontEncoding::UniGb,
        Some(FontKind::Builtin(BuiltinFont::Helvetica)) | None => FontEncoding::WinAnsi,
    }
}

fn build_font_objects(
    font: &FontResource<'_>,
    objects: &mut ObjectTable,
    options: &PdfOptions,
) -> usize {
    match &font.encoding {
        FontEncoding::WinAnsi => {
            objects.push(font_object(BuiltinFont::Helvetica.name()).into_bytes())
        }
        FontEncoding::UniGb => {
            let descriptor_id = objects.push(stsong_descriptor_object().into_bytes());
            let cid_font_id = objects.push(
                format!(
                    "<< /Type /Font /Subtype /CIDFontType0 /BaseFont /STSong-Light /CIDSystemInfo << /Registry (Adobe) /Ordering (GB1) /Supplement 2 >> /FontDescriptor {descriptor_id} 0 R /DW 1000 /W [1 95 500] >>"
                )
                .into_bytes(),
            );
            objects.push(
                format!(
                    "<< /Type /Font /Subtype /Type0 /BaseFont /STSong-Light-UniGB-UCS2-H /Encoding /UniGB-UCS2-H /DescendantFonts [{cid_font_id} 0 R] >>"
                )
                .into_bytes(),
            )
        }
        FontEncoding::IdentityH {
            font: program,
            glyph_map,
        } => {
            let base_name = font_resource_base(program, &font.resource);
            build_cidfont_objects(program, glyph_map, &base_name, objects, options)
        }
    }
}

fn font_resource_base(font: &RegisteredFont, resource: &str) -> String {
    sanitize_font_name(&font.name).unwrap_or_else(|| format!("LaurelFont{resource}"))
}

fn build_cidfont_objects(
    font: &RegisteredFont,
    glyph_map: &BTreeMap<u16, String>,
    base_name: &str,
    objects: &mut ObjectTable,
    options: &PdfOptions,
) -> usize {
    let font_file_id = objects.push(font_file_object(&font.data, font.program_kind, options));
    let descriptor_id =
        objects.push(font_descriptor_object(font, base_name, font_file_id).into_bytes());

    let w_entries: Vec<String> = glyph_map
        .keys()
        .map(|gid| {
            let advance = glyph_advance(font, *gid);
            let width = if advance > 0 {
                advance
            } else {
                font.metrics.missing_width
            };
            format!("{gid} [{width}]")
        })
        .collect();
    let w_array = if w_entries.is_empty() {
        String::new()
    } else {
        format!(" /W [{}]", w_entries.join(" "))
    };
    let (subtype, gid_map) = match font.program_kind {
        FontProgramKind::TrueType => ("CIDFontType2", " /CIDToGIDMap /Identity"),
        FontProgramKind::OpenTypeCff => ("CIDFontType0", ""),
    };
    let cid_font_id = objects.push(
        format!(
            "<< /Type /Font /Subtype /{subtype} /BaseFont /{base_name} /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> /FontDescriptor {descriptor_id} 0 R /DW {}{w_array}{gid_map} >>",
            font.metrics.missing_width
        )
        .into_bytes(),
    );
    let to_unicode_id = objects.push(stream_object("", to_unicode_cmap(glyph_map).as_bytes()));
    objects.push(
        format!(
            "<< /Type /Font /Subtype /Type0 /BaseFont /{base_name} /Encoding /Identity-H /DescendantFonts [{cid_font_id} 0 R] /ToUnicode {to_unicode_id} 0 R >>"
        )
        .into_bytes(),
    )
}

fn build_image_objects(
    image: &ImageAsset,
    objects: &mut ObjectTable,
    options: &PdfOptions,
) -> usize {
    let encoded = encode_image(image, options);
    let smask_id = encoded.alpha.as_ref().map(|alpha| {
        objects.push(image_smask_object(
            image.width,
            image.height,
            alpha,
            encoded.filter,
        ))
    });
    objects.push(image_object(&encoded, image.width, image.height, smask_id))
}

fn build_extgstate_objects(
    document: &Document,
) -> (Vec<(String, String)>, HashMap<(u16, u16), String>) {
    // Map (fill_alpha, stroke_alpha) -> /GSn resource.
    let mut pairs: BTreeSet<(u16, u16)> = BTreeSet::new();
    for cmd in &document.commands {
        if let Command::SetOpacity { fill, stroke } = cmd {
            pairs.insert((quantize_alpha(*fill), quantize_alpha(*stroke)));
        }
    }

    let mut objects = Vec::new();
    let mut name_map = HashMap::new();
    for (index, (f, s)) in pairs.into_iter().enumerate() {
        let name = format!("GS{}", index + 1);
        objects.push((
            name.clone(),
            format!(
                "<< /Type /ExtGState /ca {} /CA {} >>",
                fmt(f as f32 / 1000.0),
                fmt(s as f32 / 1000.0)
            ),
        ));
        name_map.insert((f, s), name);
    }
    (objects, name_map)
}

fn quantize_alpha(alpha: f32) -> u16 {
    ((alpha * 1000.0).round() as i32).clamp(0, 1000) as u16
}

struct EncodedImage {
    color_space: &'static str,
    filter: &'static str,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

fn encode_image(image: &ImageAsset, options: &PdfOptions) -> EncodedImage {
    let decoded = &image.decoded;
    if image.is_jpeg() {
        let color_space = match decoded.color() {
            image::ColorType::L8 | image::ColorType::La8 => "/DeviceGray",
            _ => "/DeviceRGB",
        };
        return EncodedImage {
            color_space,
            filter: "/DCTDecode",
            data: image.bytes.to_vec(),
            alpha: None,
        };
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity(rgba.as_raw().len() / 4 * 3);
    let mut alpha = Vec::with_capacity(rgba.as_raw().len() / 4);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }
    let (filter, data, alpha) = if options.compress_streams {
        (
            "/FlateDecode",
            flate_compress(&rgb),
            has_alpha.then(|| flate_compress(&alpha)),
        )
    } else {
        ("", rgb, has_alpha.then_some(alpha))
    };
    EncodedImage {
        color_space: "/DeviceRGB",
        filter,
        data,
        alpha,
    }
}

fn image_object(
    image: &EncodedImage,
    width: u32,
    height: u32,
    smask_id: Option<usize>,
) -> Vec<u8> {
    let smask = smask_id
        .map(|id| format!(" /SMask {id} 0 R"))
        .unwrap_or_default();
    let filter = filter_entry(image.filter);
    stream_object(
        &format!(
            "/Type /XObject /Subtype /Image /Width {width} /Height {height} /ColorSpace {} /BitsPerComponent 8{filter}{smask}",
            image.color_space
        ),
        &image.data,
    )
}

// The mask shares the color data's filter.
fn image_smask_object(width: u32, height: u32, alpha: &[u8], filter: &str) -> Vec<u8> {
    let filter = filter_entry(filter);
    stream_object(
        &format!(
            "/Type /XObject /Subtype /Image /Width {width} /Height {height} /ColorSpace /DeviceGray /BitsPerComponent 8{filter}"
        ),
        alpha,
    )
}

fn filter_entry(filter: &str) -> String {
    if filter.is_empty() {
        String::new()
    } else {
        format!(" /Filter {filter}")
    }
}

fn flate_compress(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

fn stream_object(dict_entries: &str, data: &[u8]) -> Vec<u8> {
    let separator = if dict_entries.is_empty() { "" } else { " " };
    let mut out =
        format!("<< {dict_entries}{separator}/Length {} >>\nstream\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream");
    out
}

fn content_stream_object(content: &[u8], options: &PdfOptions) -> Vec<u8> {
    if options.compress_streams {
        stream_object("/Filter /FlateDecode", &flate_compress(content))
    } else {
        stream_object("", content)
    }
}

fn font_file_object(data: &[u8], kind: FontProgramKind, options: &PdfOptions) -> Vec<u8> {
    let mut dict = match kind {
        FontProgramKind::TrueType => format!("/Length1 {}", data.len()),
        FontProgramKind::OpenTypeCff => "/Subtype /OpenType".to_string(),
    };
    if options.compress_streams {
        dict.push_str(" /Filter /FlateDecode");
        stream_object(&dict, &flate_compress(data))
    } else {
        stream_object(&dict, data)
    }
}

fn font_descriptor_object(font: &RegisteredFont, base_name: &str, font_file_id: usize) -> String {
    let metrics = &font.metrics;
    let mut flags = 4;
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    let font_file_entry = match font.program_kind {
        FontProgramKind::OpenTypeCff => "FontFile3",
        FontProgramKind::TrueType => "FontFile2",
    };
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV {} /MissingWidth {} /{} {} 0 R >>",
        base_name,
        flags,
        metrics.bbox.0,
        metrics.bbox.1,
        metrics.bbox.2,
        metrics.bbox.3,
        metrics.italic_angle,
        metrics.ascent,
        metrics.descent,
        metrics.cap_height,
        metrics.stem_v,
        metrics.missing_width,
        font_file_entry,
        font_file_id
    )
}

fn stsong_descriptor_object() -> String {
    "<< /Type /FontDescriptor /FontName /STSong-Light /Flags 6 /FontBBox [-25 -254 1000 880] /ItalicAngle 0 /Ascent 880 /Descent -120 /CapHeight 880 /StemV 93 >>".to_string()
}

fn font_object(name: &str) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        sanitize_font_name(name).unwrap_or_else(|| BuiltinFont::Helvetica.name().to_string())
    )
}

fn named_resources(entries: &[(String, usize)]) -> String {
    let entries: Vec<String> = entries
        .iter()
        .map(|(name, id)| format!("/{name} {id} 0 R"))
        .collect();
    format!("<< {} >>", entries.join(" "))
}

fn page_object(
    pages_id: usize,
    content_id: usize,
    page_size: Size,
    fonts: &[(String, usize)],
    images: &[(String, usize)],
    states: &[(String, usize)],
) -> String {
    let mut resources = Vec::new();
    if !fonts.is_empty() {
        resources.push(format!("/Font {}", named_resources(fonts)));
    }
    if !images.is_empty() {
        resources.push(format!("/XObject {}", named_resources(images)));
    }
    if !states.is_empty() {
        resources.push(format!("/ExtGState {}", named_resources(states)));
    }
    format!(
        "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources << {} >> /Contents {} 0 R >>",
        pages_id,
        fmt_pt(page_size.width),
        fmt_pt(page_size.height),
        resources.join(" "),
        content_id
    )
}

fn info_object(title: Option<&str>) -> String {
    let mut entries = vec![format!("/Producer ({PRODUCER})")];
    if let Some(title) = title {
        entries.push(format!("/Title {}", utf16_pdf_string(title)));
    }
    format!("<< {} >>", entries.join(" "))
}

fn write_pdf<W: Write>(
    writer: &mut W,
    objects: &ObjectTable,
    catalog_id: usize,
    info_id: usize,
) -> io::Result<()> {
    let mut offset = 0usize;
    let mut offsets = vec![0usize; objects.bodies.len() + 1];
    write_bytes(writer, PDF_HEADER, &mut offset)?;
    for (index, body) in objects.bodies.iter().enumerate() {
        write_pdf_object(writer, &mut offset, &mut offsets, index + 1, body)?;
    }

    let xref_start = offset;
    write_str(
        writer,
        &format!("xref\n0 {}\n0000000000 65535 f \n", objects.bodies.len() + 1),
        &mut offset,
    )?;
    for entry in offsets.iter().skip(1) {
        write_str(writer, &format!("{entry:010} 00000 n \n"), &mut offset)?;
    }
    write_str(
        writer,
        &format!(
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.bodies.len() + 1,
            catalog_id,
            info_id,
            xref_start
        ),
        &mut offset,
    )?;
    writer.flush()
}

fn write_pdf_object<W: Write>(
    writer: &mut W,
    offset: &mut usize,
    offsets: &mut [usize],
    obj_id: usize,
    body: &[u8],
) -> io::Result<()> {
    if let Some(slot) = offsets.get_mut(obj_id) {
        *slot = *offset;
    }
    write_str(writer, &format!("{obj_id} 0 obj\n"), offset)?;
    write_bytes(writer, body, offset)?;
    write_bytes(writer, b"\nendobj\n", offset)
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn write_str<W: Write>(writer: &mut W, data: &str, offset: &mut usize) -> io::Result<()> {
    write_bytes(writer, data.as_bytes(), offset)
}

fn render_page(
    document: &Document,
    font_plan: &BTreeMap<String, FontResource<'_>>,
    image_map: &HashMap<String, String>,
    gs_map: &HashMap<(u16, u16), String>,
    shaper: &mut Shaper,
    replaced_chars: &mut usize,
) -> String {
    let mut out = String::new();
    let mut state = TextState::default();

    for cmd in &document.commands {
        state.apply(cmd);
        match cmd {
            Command::SaveState => out.push_str("q\n"),
            Command::RestoreState => out.push_str("Q\n"),
            Command::SetFillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
            Command::SetStrokeColor(color) => out.push_str(&color_to_pdf_stroke(*color)),
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::SetOpacity { fill, stroke } => {
                if let Some(name) = gs_map.get(&(quantize_alpha(*fill), quantize_alpha(*stroke))) {
                    out.push_str(&format!("/{name} gs\n"));
                }
            }
            Command::SetFontName(_) | Command::SetFontSize(_) => {}
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(*y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(*y)));
            }
            Command::Stroke => out.push_str("S\n"),
            Command::FillRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\nf\n",
                    fmt_pt(*x),
                    fmt_pt(*y),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::StrokeRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\nS\n",
                    fmt_pt(*x),
                    fmt_pt(*y),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::DrawString { x, y, text } => {
                let Some(font) = font_plan.get(&state.font_name) else {
                    continue;
                };
                out.push_str("BT\n");
                out.push_str(&format!(
                    "/{} {} Tf\n",
                    font.resource,
                    fmt_pt(state.font_size)
                ));
                out.push_str(&format!("{} {} Td\n", fmt_pt(*x), fmt_pt(*y)));
                match &font.encoding {
                    FontEncoding::WinAnsi => {
                        let encoded = encode_winansi_pdf_string(text);
                        *replaced_chars += encoded.replaced;
                        out.push_str(&format!("({}) Tj\n", encoded.text));
                    }
                    FontEncoding::UniGb => {
                        out.push_str(&format!("{} Tj\n", encode_ucs2_hex(text)));
                    }
                    FontEncoding::IdentityH { font, .. } => {
                        let glyphs = shaper.shape(font, text);
                        out.push_str(&glyphs_to_tj(font, glyphs));
                    }
                }
                out.push_str("ET\n");
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                if let Some(name) = image_map.get(resource_id) {
                    out.push_str("q\n");
                    out.push_str(&format!(
                        "{} 0 0 {} {} {} cm\n",
                        fmt_pt(*width),
                        fmt_pt(*height),
                        fmt_pt(*x),
                        fmt_pt(*y)
                    ));
                    out.push_str(&format!("/{name} Do\n"));
                    out.push_str("Q\n");
                }
            }
        }
    }

    out
}

// Glyphs are drawn at their nominal /W advance; the TJ adjustments carry
// the difference to the shaped (kerned) advance.
fn glyphs_to_tj(font: &RegisteredFont, glyphs: &[ShapedGlyph]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for glyph in glyphs {
        if !glyph.is_drawn() {
            continue;
        }
        parts.push(format!("<{:04X}>", glyph.gid));
        let adjust = glyph_advance(font, glyph.gid) as i32 - glyph.advance as i32;
        if adjust != 0 {
            parts.push(adjust.to_string());
        }
    }
    format!("[{}] TJ\n", parts.join(" "))
}

fn encode_ucs2_hex(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 4 + 2);
    out.push('<');
    for ch in text.chars() {
        let code = u16::try_from(ch as u32).unwrap_or(b'?' as u16);
        out.push_str(&format!("{code:04X}"));
    }
    out.push('>');
    out
}

fn utf16_pdf_string(text: &str) -> String {
    let mut out = String::from("<FEFF");
    for unit in text.encode_utf16() {
        out.push_str(&format!("{unit:04X}"));
    }
    out.push('>');
    out
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => {
                replaced += 1;
                b'?'
            }
        };

        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{b:03o}")),
            b => out.push(b as char),
        }
    }

    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn to_unicode_cmap(glyph_map: &BTreeMap<u16, String>) -> String {
    let entries: Vec<(&u16, &String)> = glyph_map.iter().collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, text) in chunk {
            let uni: String = text
                .encode_utf16()
                .map(|unit| format!("{unit:04X}"))
                .collect();
            out.push_str(&format!("<{gid:04X}> <{uni}>\n"));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

fn sanitize_font_name(name: &str) -> Option<String> {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    (!out.is_empty()).then_some(out)
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{sign}{int_part}")
    } else {
        let mut s = format!("{sign}{int_part}.{frac_part:03}");
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn color_to_pdf_fill(color: Color) -> String {
    format!("{} {} {} rg\n", fmt(color.r), fmt(color.g), fmt(color.b))
}

fn color_to_pdf_stroke(color: Color) -> String {
    format!("{} {} {} RG\n", fmt(color.r), fmt(color.g), fmt(color.b))
}
