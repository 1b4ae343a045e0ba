use anyhow::{Context, Result};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

use super::noise::{is_noise, strip_bullet};
use super::{BBox, ExtractedLine, LineStyle, PhysicalLine};

const DEFAULT_GLYPH_WIDTH: f32 = 500.0;
const ASCENT: f32 = 0.8;
const DESCENT: f32 = 0.2;

/// A run of text drawn by one show operator
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub page: u32,
    pub bbox: BBox,
    pub baseline: f32,
    pub style: LineStyle,
}

pub struct LineExtractor {
    /// Fraction of the font size within which two baselines count as one line
    baseline_tolerance: f32,
    /// Horizontal gap (in font-size units) that gets a space when merging spans
    space_gap: f32,
}

impl LineExtractor {
    pub fn new() -> Self {
        Self {
            baseline_tolerance: 0.3,
            space_gap: 0.15,
        }
    }

    /// 按阅读顺序提取PDF的全部物理行
    pub fn extract(&self, pdf_path: &Path) -> Result<Vec<ExtractedLine>> {
        info!("解析PDF: {}", pdf_path.display());

        if !pdf_path.exists() {
            return Err(anyhow::anyhow!("PDF文件不存在: {}", pdf_path.display()));
        }

        let doc = Document::load(pdf_path)
            .with_context(|| format!("无法打开PDF: {}", pdf_path.display()))?;
        self.extract_document(&doc)
    }

    pub fn extract_document(&self, doc: &Document) -> Result<Vec<ExtractedLine>> {
        let mut lines = Vec::new();
        let mut next_index = 0usize;

        for (page_num, page_id) in doc.get_pages() {
            let spans = match page_spans(doc, page_id, page_num) {
                Ok(spans) => spans,
                Err(e) => {
                    warn!("第 {} 页解析失败: {}", page_num, e);
                    continue;
                }
            };
            let page_lines = self.assemble_lines(&spans, &mut next_index);
            debug!("第 {} 页: {} 个span, {} 行", page_num, spans.len(), page_lines.len());
            lines.extend(page_lines);
        }

        info!("成功提取 {} 行文本", lines.len());
        Ok(lines)
    }

    /// Merge the spans of one page into physical lines, dropping noise.
    /// `next_index` carries the document-wide line counter across pages.
    pub fn assemble_lines(&self, spans: &[TextSpan], next_index: &mut usize) -> Vec<ExtractedLine> {
        let mut lines = Vec::new();
        let mut current: Option<LineBuilder> = None;

        for span in spans.iter().filter(|s| !s.text.trim().is_empty()) {
            let continues = current.as_ref().is_some_and(|builder| {
                let tolerance = self.baseline_tolerance * builder.style.font_size.max(span.style.font_size);
                builder.page == span.page && (builder.baseline - span.baseline).abs() <= tolerance.max(1.0)
            });

            if continues {
                if let Some(builder) = current.as_mut() {
                    builder.push(span, self.space_gap);
                }
                continue;
            }

            if let Some(builder) = current.take() {
                if let Some(line) = builder.finish(next_index) {
                    lines.push(line);
                }
            }
            current = Some(LineBuilder::start(span));
        }

        if let Some(builder) = current {
            if let Some(line) = builder.finish(next_index) {
                lines.push(line);
            }
        }

        lines
    }
}

impl Default for LineExtractor {
    fn default() -> Self {
        Self::new()
    }
}

struct LineBuilder {
    page: u32,
    baseline: f32,
    style: LineStyle,
    y: f32,
    text: String,
    bbox: BBox,
}

impl LineBuilder {
    fn start(span: &TextSpan) -> Self {
        Self {
            page: span.page,
            baseline: span.baseline,
            style: span.style,
            y: span.bbox.y0,
            text: span.text.clone(),
            bbox: span.bbox,
        }
    }

    fn push(&mut self, span: &TextSpan, space_gap: f32) {
        let gap = span.bbox.x0 - self.bbox.x1;
        let needs_space = gap > space_gap * span.style.font_size
            && !self.text.ends_with(char::is_whitespace)
            && !span.text.starts_with(char::is_whitespace);
        if needs_space {
            self.text.push(' ');
        }
        self.text.push_str(&span.text);
        self.bbox = self.bbox.union(&span.bbox);
    }

    fn finish(self, next_index: &mut usize) -> Option<ExtractedLine> {
        let merged = self.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if is_noise(&merged) {
            return None;
        }
        let cleaned = strip_bullet(&merged);
        if cleaned.is_empty() || is_noise(&cleaned) {
            return None;
        }

        let index = *next_index;
        *next_index += 1;

        Some(ExtractedLine {
            line: PhysicalLine {
                index,
                page: self.page,
                text: cleaned,
                bbox: self.bbox,
            },
            style: self.style,
            y: self.y,
        })
    }
}

/// Affine matrix `[a b c d e f]` in PDF row-vector convention
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other`
    fn mul(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    fn horizontal_scale(&self) -> f32 {
        (self.0[0] * self.0[0] + self.0[1] * self.0[1]).sqrt()
    }

    fn vertical_scale(&self) -> f32 {
        (self.0[2] * self.0[2] + self.0[3] * self.0[3]).sqrt()
    }
}

struct FontMetrics {
    first_char: i64,
    widths: Vec<f32>,
    default_width: f32,
    two_byte: bool,
    bold: bool,
    italic: bool,
}

impl FontMetrics {
    fn fallback() -> Self {
        Self {
            first_char: 0,
            widths: Vec::new(),
            default_width: DEFAULT_GLYPH_WIDTH,
            two_byte: false,
            bold: false,
            italic: false,
        }
    }

    fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let base_font = font
            .get(b"BaseFont")
            .ok()
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).to_string())
            .unwrap_or_default();
        // Subset fonts carry a "ABCDEF+" prefix
        let name = base_font
            .split_once('+')
            .map(|(_, rest)| rest.to_string())
            .unwrap_or(base_font)
            .to_lowercase();

        let two_byte = font
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .is_some_and(|n| n == b"Type0");

        let descriptor = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok());

        let flags = descriptor
            .and_then(|d| d.get(b"Flags").ok())
            .and_then(number)
            .map(|f| f as i64)
            .unwrap_or(0);
        let weight = descriptor
            .and_then(|d| d.get(b"FontWeight").ok())
            .and_then(number)
            .unwrap_or(400.0);

        let bold = ["bold", "black", "heavy", "semibold", "demi"]
            .iter()
            .any(|k| name.contains(k))
            || flags & (1 << 18) != 0
            || weight >= 600.0;
        let italic = name.contains("italic") || name.contains("oblique") || flags & (1 << 6) != 0;

        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(number)
            .map(|f| f as i64)
            .unwrap_or(0);
        let widths = font
            .get(b"Widths")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
            .map(|arr| arr.iter().map(|w| number(w).unwrap_or(0.0)).collect())
            .unwrap_or_default();
        let default_width = descriptor
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(number)
            .filter(|w| *w > 0.0)
            .unwrap_or(DEFAULT_GLYPH_WIDTH);

        Self {
            first_char,
            widths,
            default_width,
            two_byte,
            bold,
            italic,
        }
    }

    /// Advance in text space units (before font size / spacing), per glyph
    fn glyph_widths(&self, bytes: &[u8]) -> Vec<(f32, bool)> {
        if self.two_byte {
            return bytes
                .chunks(2)
                .map(|_| (self.default_width / 1000.0, false))
                .collect();
        }
        bytes
            .iter()
            .map(|&b| {
                let slot = b as i64 - self.first_char;
                let w = if slot >= 0 {
                    self.widths.get(slot as usize).copied().filter(|w| *w > 0.0)
                } else {
                    None
                };
                (w.unwrap_or(self.default_width) / 1000.0, b == b' ')
            })
            .collect()
    }
}

struct TextState {
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    font: Vec<u8>,
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scaling: f32,
    leading: f32,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font: Vec::new(),
            size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).mul(&self.tlm);
        self.tm = self.tlm;
    }

    fn advance(&mut self, tx: f32) {
        self.tm = Matrix::translate(tx, 0.0).mul(&self.tm);
    }
}

struct PageContext<'a> {
    doc: &'a Document,
    page: u32,
    top: f32,
    fonts: BTreeMap<Vec<u8>, &'a Dictionary>,
    metrics: HashMap<Vec<u8>, FontMetrics>,
}

impl<'a> PageContext<'a> {
    fn metrics(&mut self, font: &[u8]) -> &FontMetrics {
        if !self.metrics.contains_key(font) {
            let m = match self.fonts.get(font) {
                Some(dict) => FontMetrics::from_dict(self.doc, dict),
                None => FontMetrics::fallback(),
            };
            self.metrics.insert(font.to_vec(), m);
        }
        &self.metrics[font]
    }

    fn decode(&self, font: &[u8], bytes: &[u8]) -> String {
        let encoding = self
            .fonts
            .get(font)
            .and_then(|f| f.get_font_encoding(self.doc).ok());
        match encoding {
            Some(enc) => Document::decode_text(&enc, bytes).unwrap_or_else(|_| decode_text_simple(bytes)),
            None => decode_text_simple(bytes),
        }
    }

    /// Draw one string at the current text position and advance past it
    fn show(&mut self, state: &mut TextState, bytes: &[u8]) -> (String, f32) {
        let text = self.decode(&state.font, bytes);
        let glyphs = self.metrics(&state.font).glyph_widths(bytes);
        let mut advance = 0.0;
        for (w, is_space) in glyphs {
            let spacing = state.char_spacing + if is_space { state.word_spacing } else { 0.0 };
            advance += (w * state.size + spacing) * state.horizontal_scaling;
        }
        state.advance(advance);
        (text, advance)
    }

    fn span(&self, state: &TextState, origin: Matrix, advance: f32, text: String) -> TextSpan {
        let device = origin.mul(&state.ctm);
        let font_size = state.size * device.vertical_scale();
        let width = advance * device.horizontal_scale();
        let x = device.0[4];
        let baseline = self.top - device.0[5];
        let (x0, x1) = if width >= 0.0 { (x, x + width) } else { (x + width, x) };

        let metrics = self.metrics.get(&state.font);
        TextSpan {
            text,
            page: self.page,
            bbox: BBox::new(x0, baseline - ASCENT * font_size, x1, baseline + DESCENT * font_size),
            baseline,
            style: LineStyle {
                font_size: (font_size * 100.0).round() / 100.0,
                bold: metrics.is_some_and(|m| m.bold),
                italic: metrics.is_some_and(|m| m.italic),
            },
        }
    }
}

/// Walk one page's content stream and collect its text spans
fn page_spans(doc: &Document, page_id: ObjectId, page: u32) -> Result<Vec<TextSpan>> {
    let fonts = doc.get_page_fonts(page_id).unwrap_or_else(|e| {
        warn!("第 {} 页字体读取失败: {}", page, e);
        BTreeMap::new()
    });
    let content_data = doc.get_page_content(page_id)?;
    let content = Content::decode(&content_data)?;

    let mut ctx = PageContext {
        doc,
        page,
        top: page_top(doc, page_id),
        fonts,
        metrics: HashMap::new(),
    };
    let mut state = TextState::new();
    let mut spans = Vec::new();

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => state.ctm_stack.push(state.ctm),
            "Q" => {
                if let Some(ctm) = state.ctm_stack.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = matrix_operand(operands) {
                    state.ctm = m.mul(&state.ctm);
                }
            }
            "BT" => {
                state.tm = Matrix::IDENTITY;
                state.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                    state.font = name.to_vec();
                }
                if let Some(size) = operands.get(1).and_then(number) {
                    state.size = size;
                }
            }
            "Tc" => state.char_spacing = operands.first().and_then(number).unwrap_or(0.0),
            "Tw" => state.word_spacing = operands.first().and_then(number).unwrap_or(0.0),
            "Tz" => state.horizontal_scaling = operands.first().and_then(number).unwrap_or(100.0) / 100.0,
            "TL" => state.leading = operands.first().and_then(number).unwrap_or(0.0),
            "Td" | "TD" => {
                let tx = operands.first().and_then(number).unwrap_or(0.0);
                let ty = operands.get(1).and_then(number).unwrap_or(0.0);
                if op.operator == "TD" {
                    state.leading = -ty;
                }
                state.move_line(tx, ty);
            }
            "Tm" => {
                if let Some(m) = matrix_operand(operands) {
                    state.tm = m;
                    state.tlm = m;
                }
            }
            "T*" => {
                let leading = state.leading;
                state.move_line(0.0, -leading);
            }
            "Tj" | "'" | "\"" => {
                if op.operator != "Tj" {
                    if op.operator == "\"" {
                        state.word_spacing = operands.first().and_then(number).unwrap_or(0.0);
                        state.char_spacing = operands.get(1).and_then(number).unwrap_or(0.0);
                    }
                    let leading = state.leading;
                    state.move_line(0.0, -leading);
                }
                if let Some(Object::String(bytes, _)) = operands.last() {
                    let origin = state.tm;
                    let (text, advance) = ctx.show(&mut state, bytes);
                    spans.push(ctx.span(&state, origin, advance, text));
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let origin = state.tm;
                    let mut combined = String::new();
                    let mut total = 0.0;
                    for item in items {
                        match item {
                            Object::String(bytes, _) => {
                                let (text, advance) = ctx.show(&mut state, bytes);
                                combined.push_str(&text);
                                total += advance;
                            }
                            other => {
                                if let Some(adjust) = number(other) {
                                    let tx = -adjust / 1000.0 * state.size * state.horizontal_scaling;
                                    state.advance(tx);
                                    total += tx;
                                    // Large kerning gaps stand in for word spaces
                                    if adjust < -200.0 && !combined.ends_with(' ') {
                                        combined.push(' ');
                                    }
                                }
                            }
                        }
                    }
                    spans.push(ctx.span(&state, origin, total, combined));
                }
            }
            _ => {}
        }
    }

    Ok(spans)
}

/// Top edge of the page's MediaBox (inherited through /Parent when missing)
pub(crate) fn page_top(doc: &Document, page_id: ObjectId) -> f32 {
    let mut current = doc.get_dictionary(page_id).ok();
    let mut depth = 0;
    while let Some(dict) = current {
        if let Some(media_box) = dict
            .get(b"MediaBox")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
        {
            if let Some(top) = media_box.get(3).and_then(number) {
                return top;
            }
        }
        depth += 1;
        if depth > 32 {
            break;
        }
        current = dict
            .get(b"Parent")
            .ok()
            .and_then(|o| o.as_reference().ok())
            .and_then(|id| doc.get_dictionary(id).ok());
    }
    792.0
}

fn matrix_operand(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = [0.0f32; 6];
    for (slot, operand) in m.iter_mut().zip(operands.iter()) {
        *slot = number(operand)?;
    }
    Some(Matrix(m))
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Decoding fallback when the font has no usable encoding
fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    bytes.iter().map(|&b| b as char).collect()
}
