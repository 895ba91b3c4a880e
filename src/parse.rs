//! Dash-marker location on template pages.
//!
//! Templates mark insertion points with literal '-' glyphs. Finding
//! them means replaying enough of the page's content stream to know
//! where the text cursor is: graphics/text state stacks, the text and
//! line matrices, and per-glyph advances taken from the font's Widths
//! array. The bounding box of every dash glyph is reported in PDF user
//! space.

use std::collections::{BTreeMap, HashMap};

use lopdf::{Dictionary, Document, Encoding, Object, Result as LopdfResult};
use tracing::{debug, warn};

use crate::logging::MARKERS;

/// The literal glyph templates use to mark an insertion point.
pub const MARKER_GLYPH: char = '-';

/// Bounding box of one located marker, in PDF user space
/// (bottom-left origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl MarkerBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        MarkerBox {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    fn from_corners(p0: (f32, f32), p1: (f32, f32)) -> Self {
        MarkerBox {
            x_min: p0.0.min(p1.0),
            y_min: p0.1.min(p1.1),
            x_max: p0.0.max(p1.0),
            y_max: p0.1.max(p1.1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }
}

/// Glyph advances for one simple font, keyed by character code.
#[derive(Debug, Clone, Default)]
struct GlyphWidths {
    widths: HashMap<u8, f32>,
}

impl GlyphWidths {
    /// Fallback advance (in 1/1000 em) when a code has no entry.
    const MISSING: f32 = 500.0;

    fn from_font(doc: &Document, font: &Dictionary) -> Self {
        let mut widths = HashMap::new();
        let first_char = font
            .get(b"FirstChar")
            .ok()
            .map(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_i64().ok())
            .unwrap_or(0);
        if let Ok(obj) = font.get(b"Widths") {
            if let Ok(array) = resolve(doc, obj).as_array() {
                for (i, width) in array.iter().enumerate() {
                    if let Ok(code) = u8::try_from(first_char + i as i64) {
                        widths.insert(code, operand_as_float(resolve(doc, width)));
                    }
                }
            }
        }
        GlyphWidths { widths }
    }

    fn advance(&self, ch: char) -> f32 {
        u8::try_from(ch as u32)
            .ok()
            .and_then(|code| self.widths.get(&code).copied())
            .unwrap_or(Self::MISSING)
    }
}

#[derive(Clone, Debug)]
struct GraphicsState<'a> {
    ctm: [f32; 6],
    text: TextState<'a>,
}

impl Default for GraphicsState<'_> {
    fn default() -> Self {
        GraphicsState {
            ctm: IDENTITY,
            text: TextState::default(),
        }
    }
}

#[derive(Clone, Debug)]
struct TextState<'a> {
    text_matrix: [f32; 6],      // Tm
    text_line_matrix: [f32; 6], // Tlm
    font_size: f32,
    character_spacing: f32,  // Tc
    word_spacing: f32,       // Tw
    horizontal_scaling: f32, // Tz, as a fraction
    leading: f32,            // TL
    rise: f32,               // Ts
    current_pos: (f32, f32),
    encoding: Option<&'a Encoding<'a>>,
    widths: Option<&'a GlyphWidths>,
}

impl Default for TextState<'_> {
    fn default() -> Self {
        TextState {
            text_matrix: IDENTITY,
            text_line_matrix: IDENTITY,
            font_size: 0.0,
            character_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
            current_pos: (0.0, 0.0),
            encoding: None,
            widths: None,
        }
    }
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Scan every page of a document for marker glyphs.
pub fn find_markers(doc: &Document) -> LopdfResult<BTreeMap<u32, Vec<MarkerBox>>> {
    let mut pages_map = BTreeMap::new();
    for (page_number, page_id) in doc.get_pages() {
        let markers = find_page_markers(doc, page_number, page_id)?;
        pages_map.insert(page_number, markers);
    }
    Ok(pages_map)
}

fn find_page_markers(
    doc: &Document,
    page_number: u32,
    page_id: (u32, u16),
) -> LopdfResult<Vec<MarkerBox>> {
    let content = doc.get_and_decode_page_content(page_id)?;
    let fonts = doc.get_page_fonts(page_id)?;

    let encodings: BTreeMap<Vec<u8>, Encoding> = fonts
        .iter()
        .filter_map(|(name, font)| match font.get_font_encoding(doc) {
            Ok(encoding) => Some((name.clone(), encoding)),
            Err(error) => {
                warn!(
                    target: MARKERS,
                    page_number,
                    font = %String::from_utf8_lossy(name),
                    %error,
                    "skipping font with unreadable encoding"
                );
                None
            }
        })
        .collect();
    let widths: BTreeMap<Vec<u8>, GlyphWidths> = fonts
        .iter()
        .map(|(name, font)| (name.clone(), GlyphWidths::from_font(doc, font)))
        .collect();

    let mut markers = Vec::new();
    let mut gs_stack = vec![GraphicsState::default()];
    for op in &content.operations {
        handle_operator(&mut gs_stack, op, &encodings, &widths, &mut markers)?;
    }

    debug!(target: MARKERS, page_number, count = markers.len(), "scanned page for markers");
    Ok(markers)
}

fn handle_operator<'a>(
    gs_stack: &mut Vec<GraphicsState<'a>>,
    op: &lopdf::content::Operation,
    encodings: &'a BTreeMap<Vec<u8>, Encoding<'a>>,
    widths: &'a BTreeMap<Vec<u8>, GlyphWidths>,
    markers: &mut Vec<MarkerBox>,
) -> LopdfResult<()> {
    match op.operator.as_ref() {
        "q" => {
            let top = gs_stack.last().cloned().unwrap_or_default();
            gs_stack.push(top);
        }
        "Q" => {
            if gs_stack.len() > 1 {
                gs_stack.pop();
            }
        }
        "cm" => {
            let matrix = matrix_from_operands(op);
            if let Some(gs) = gs_stack.last_mut() {
                gs.ctm = multiply_matrices(&matrix, &gs.ctm);
            }
        }
        _ => {
            let Some(gs) = gs_stack.last_mut() else {
                return Ok(());
            };
            let ctm = gs.ctm;
            let text = &mut gs.text;
            match op.operator.as_ref() {
                "BT" => {
                    text.text_matrix = IDENTITY;
                    text.text_line_matrix = IDENTITY;
                    text.current_pos = (0.0, 0.0);
                }
                "ET" => *text = TextState::default(),
                "Tf" => {
                    if let (Some(Object::Name(font_name)), Some(size_obj)) =
                        (op.operands.first(), op.operands.get(1))
                    {
                        text.font_size = operand_as_float(size_obj);
                        text.encoding = encodings.get(font_name);
                        text.widths = widths.get(font_name);
                    }
                }
                "Tc" => {
                    if let Some(spacing) = op.operands.first() {
                        text.character_spacing = operand_as_float(spacing);
                    }
                }
                "Tw" => {
                    if let Some(spacing) = op.operands.first() {
                        text.word_spacing = operand_as_float(spacing);
                    }
                }
                "Tz" => {
                    if let Some(scale_percent) = op.operands.first() {
                        text.horizontal_scaling = operand_as_float(scale_percent) / 100.0;
                    }
                }
                "TL" => {
                    if let Some(leading) = op.operands.first() {
                        text.leading = operand_as_float(leading);
                    }
                }
                "Ts" => {
                    if let Some(rise) = op.operands.first() {
                        text.rise = operand_as_float(rise);
                    }
                }
                "Tm" => {
                    let m = matrix_from_operands(op);
                    text.text_matrix = m;
                    text.text_line_matrix = m;
                    text.current_pos = (0.0, 0.0);
                }
                "Td" => {
                    if let (Some(tx_obj), Some(ty_obj)) =
                        (op.operands.first(), op.operands.get(1))
                    {
                        move_text_position(
                            text,
                            operand_as_float(tx_obj),
                            operand_as_float(ty_obj),
                        );
                    }
                }
                "TD" => {
                    // Move text position and set leading.
                    if let (Some(tx_obj), Some(ty_obj)) =
                        (op.operands.first(), op.operands.get(1))
                    {
                        let ty = operand_as_float(ty_obj);
                        text.leading = -ty;
                        move_text_position(text, operand_as_float(tx_obj), ty);
                    }
                }
                "T*" => next_line(text),
                "Tj" | "TJ" => scan_text_operands(text, &op.operands, ctm, markers)?,
                "'" => {
                    next_line(text);
                    scan_text_operands(text, &op.operands, ctm, markers)?;
                }
                "\"" => {
                    if let (Some(aw), Some(ac)) = (op.operands.first(), op.operands.get(1)) {
                        text.word_spacing = operand_as_float(aw);
                        text.character_spacing = operand_as_float(ac);
                    }
                    next_line(text);
                    if let Some(string) = op.operands.get(2) {
                        scan_text_operands(text, std::slice::from_ref(string), ctm, markers)?;
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Walk the glyphs of a Tj/TJ operand list, advancing the text cursor
/// and recording a box for every marker glyph encountered.
fn scan_text_operands(
    text: &mut TextState<'_>,
    operands: &[Object],
    ctm: [f32; 6],
    markers: &mut Vec<MarkerBox>,
) -> LopdfResult<()> {
    let Some(encoding) = text.encoding else {
        // No decodable font selected; nothing here can be a marker.
        return Ok(());
    };
    for operand in operands {
        match operand {
            Object::String(bytes, _) => {
                let decoded = Document::decode_text(encoding, bytes)?;
                for ch in decoded.chars() {
                    let glyph_width = text
                        .widths
                        .map(|w| w.advance(ch))
                        .unwrap_or(GlyphWidths::MISSING);
                    let mut advance =
                        (glyph_width / 1000.0) * text.font_size + text.character_spacing;
                    if ch == ' ' {
                        advance += text.word_spacing;
                    }
                    advance *= text.horizontal_scaling;

                    if ch == MARKER_GLYPH {
                        let p0 = to_user_space(
                            &ctm,
                            &text.text_matrix,
                            text.current_pos.0,
                            text.current_pos.1 + text.rise,
                        );
                        let p1 = to_user_space(
                            &ctm,
                            &text.text_matrix,
                            text.current_pos.0 + advance,
                            text.current_pos.1 + text.rise + text.font_size,
                        );
                        markers.push(MarkerBox::from_corners(p0, p1));
                    }
                    text.current_pos.0 += advance;
                }
            }
            Object::Integer(i) => {
                text.current_pos.0 -= (*i as f32 / 1000.0) * text.font_size;
            }
            Object::Real(f) => {
                text.current_pos.0 -= (*f / 1000.0) * text.font_size;
            }
            Object::Array(items) => scan_text_operands(text, items, ctm, markers)?,
            _ => {}
        }
    }
    Ok(())
}

fn move_text_position(text: &mut TextState<'_>, tx: f32, ty: f32) {
    let translation = translate_matrix(tx, ty);
    text.text_matrix = multiply_matrices(&translation, &text.text_line_matrix);
    text.text_line_matrix = text.text_matrix;
    text.current_pos = (0.0, 0.0);
}

fn next_line(text: &mut TextState<'_>) {
    let leading = text.leading;
    move_text_position(text, 0.0, -leading);
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn matrix_from_operands(op: &lopdf::content::Operation) -> [f32; 6] {
    op.operands
        .iter()
        .map(operand_as_float)
        .collect::<Vec<f32>>()
        .try_into()
        .unwrap_or(IDENTITY)
}

fn operand_as_float(obj: &Object) -> f32 {
    match obj {
        Object::Integer(i) => *i as f32,
        Object::Real(f) => *f,
        _ => 0.0,
    }
}

fn apply_matrix(m: &[f32; 6], x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

/// Text space -> user space: the text matrix applies first, then the
/// current transformation matrix.
fn to_user_space(ctm: &[f32; 6], text_matrix: &[f32; 6], x: f32, y: f32) -> (f32, f32) {
    let (tx, ty) = apply_matrix(text_matrix, x, y);
    apply_matrix(ctm, tx, ty)
}

pub fn multiply_matrices(a: &[f32; 6], b: &[f32; 6]) -> [f32; 6] {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

pub fn translate_matrix(x: f32, y: f32) -> [f32; 6] {
    [1.0, 0.0, 0.0, 1.0, x, y]
}
