//! Font assets and PDF font object construction.
//!
//! Values are drawn with one of two faces: a Latin-oriented default or
//! an RTL-capable face for Arabic-dominant text. When the TrueType
//! asset is present it is embedded as a composite Type0 font
//! (Identity-H, UTF-16BE code units, an explicit BMP CIDToGIDMap); a
//! missing asset degrades to a built-in Type1 base-14 face, never an
//! error.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::{debug, warn};

use crate::error::Error;
use crate::logging::FONTS;
use crate::shaping::is_rtl;

/// Logical asset names the engine asks the store for.
pub const LATIN_FONT_ASSET: &str = "times.ttf";
pub const ARABIC_FONT_ASSET: &str = "NotoNaskhArabic-Regular.ttf";

const BUILTIN_LATIN: &str = "Times-Roman";
const BUILTIN_ARABIC: &str = "Helvetica";

/// Storage collaborator: resolves logical asset names to file paths.
pub trait AssetStore: Send + Sync {
    fn template_path(&self, name: &str) -> Option<PathBuf>;
    fn font_path(&self, name: &str) -> Option<PathBuf>;
}

/// Directory-backed asset store.
pub struct DirAssetStore {
    templates_dir: PathBuf,
    fonts_dir: PathBuf,
}

impl DirAssetStore {
    pub fn new(templates_dir: impl Into<PathBuf>, fonts_dir: impl Into<PathBuf>) -> Self {
        DirAssetStore {
            templates_dir: templates_dir.into(),
            fonts_dir: fonts_dir.into(),
        }
    }
}

impl AssetStore for DirAssetStore {
    fn template_path(&self, name: &str) -> Option<PathBuf> {
        let path = self.templates_dir.join(name);
        path.is_file().then_some(path)
    }

    fn font_path(&self, name: &str) -> Option<PathBuf> {
        let path = self.fonts_dir.join(name);
        path.is_file().then_some(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Latin,
    Arabic,
}

pub fn script_of(text: &str) -> Script {
    if is_rtl(text) {
        Script::Arabic
    } else {
        Script::Latin
    }
}

/// A parsed TrueType asset, ready to embed.
pub struct TrueTypeFont {
    data: Vec<u8>,
    base_name: String,
    ascent: i64,
    descent: i64,
    cap_height: i64,
    bbox: [i64; 4],
    cid_to_gid: Vec<u8>,
}

impl TrueTypeFont {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = fs::read(path)?;
        let face = ttf_parser::Face::parse(&data, 0).map_err(|e| Error::Font {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let scale = 1000.0 / f32::from(face.units_per_em());
        let to_pdf = |units: i16| -> i64 { (f32::from(units) * scale) as i64 };
        let ascent = to_pdf(face.ascender());
        let descent = to_pdf(face.descender());
        let cap_height = face.capital_height().map(to_pdf).unwrap_or(ascent);
        let global_bbox = face.global_bounding_box();
        let bbox = [
            to_pdf(global_bbox.x_min),
            to_pdf(global_bbox.y_min),
            to_pdf(global_bbox.x_max),
            to_pdf(global_bbox.y_max),
        ];

        // CID code equals the UTF-16 BMP code unit in our content
        // streams, so the map is a dense 2-byte-per-CID table.
        let mut cid_to_gid = vec![0u8; 65536 * 2];
        for cid in 0u32..=0xFFFF {
            if let Some(ch) = char::from_u32(cid) {
                if let Some(gid) = face.glyph_index(ch) {
                    let offset = cid as usize * 2;
                    cid_to_gid[offset] = (gid.0 >> 8) as u8;
                    cid_to_gid[offset + 1] = (gid.0 & 0xFF) as u8;
                }
            }
        }

        let base_name = sanitize_font_name(
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Embedded".to_string()),
        );

        debug!(target: FONTS, path = %path.display(), %base_name, "loaded font asset");
        Ok(TrueTypeFont {
            data,
            base_name,
            ascent,
            descent,
            cap_height,
            bbox,
            cid_to_gid,
        })
    }

    /// Add the full Type0 object graph to a document and return the
    /// top-level font object id.
    pub fn add_to_document(&self, doc: &mut Document) -> ObjectId {
        let file_id = doc.add_object(Stream::new(
            dictionary! { "Length1" => self.data.len() as i64 },
            self.data.clone(),
        ));
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(self.base_name.clone().into_bytes()),
            "Flags" => 4,
            "FontBBox" => self.bbox.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
            "ItalicAngle" => 0,
            "Ascent" => self.ascent,
            "Descent" => self.descent,
            "CapHeight" => self.cap_height,
            "StemV" => 80,
            "FontFile2" => Object::Reference(file_id),
        });
        let cid_map_id = doc.add_object(Stream::new(
            dictionary! {},
            self.cid_to_gid.clone(),
        ));
        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => Object::Name(self.base_name.clone().into_bytes()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => Object::Reference(descriptor_id),
            "DW" => 1000,
            "CIDToGIDMap" => Object::Reference(cid_map_id),
        });
        let to_unicode_id = doc.add_object(Stream::new(
            dictionary! {},
            IDENTITY_TO_UNICODE_CMAP.to_vec(),
        ));
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => Object::Name(self.base_name.clone().into_bytes()),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => Object::Reference(to_unicode_id),
        })
    }

    /// Encode text for an Identity-H show operator: UTF-16BE code
    /// units as a hex string.
    pub fn encode_text(&self, text: &str) -> Object {
        let mut bytes = Vec::with_capacity(text.len() * 2);
        let mut buf = [0u16; 2];
        for ch in text.chars() {
            for unit in ch.encode_utf16(&mut buf) {
                bytes.extend_from_slice(&unit.to_be_bytes());
            }
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

const IDENTITY_TO_UNICODE_CMAP: &[u8] = b"/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo
<< /Registry (Adobe)
/Ordering (UCS)
/Supplement 0
>> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
1 beginbfrange
<0000> <FFFF> <0000>
endbfrange
endcmap
CMapName currentdict /CMap defineresource pop
end
end";

fn sanitize_font_name(raw: String) -> String {
    let cleaned: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "Embedded".to_string()
    } else {
        cleaned
    }
}

/// The face a value will be drawn with: an embedded TrueType or a
/// built-in Type1 fallback.
#[derive(Clone)]
pub enum FontChoice {
    Embedded(Arc<TrueTypeFont>),
    Builtin(&'static str),
}

impl FontChoice {
    /// Add the face to a document, returning the font object id.
    pub fn add_to_document(&self, doc: &mut Document) -> ObjectId {
        match self {
            FontChoice::Embedded(font) => font.add_to_document(doc),
            FontChoice::Builtin(base_font) => doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => *base_font,
                "Encoding" => "WinAnsiEncoding",
            }),
        }
    }

    /// Encode a show-operator string for this face.
    pub fn encode_text(&self, text: &str) -> Object {
        match self {
            FontChoice::Embedded(font) => font.encode_text(text),
            FontChoice::Builtin(_) => {
                // Base-14 faces take single-byte strings; anything
                // outside Latin-1 has no glyph there anyway.
                let bytes: Vec<u8> = text
                    .chars()
                    .map(|ch| u8::try_from(ch as u32).unwrap_or(b'?'))
                    .collect();
                Object::String(bytes, StringFormat::Literal)
            }
        }
    }
}

/// The pair of faces an engine renders with, resolved once per engine.
pub struct FontSet {
    latin: Option<Arc<TrueTypeFont>>,
    arabic: Option<Arc<TrueTypeFont>>,
}

impl FontSet {
    pub fn load(assets: &dyn AssetStore) -> Self {
        FontSet {
            latin: load_asset(assets, LATIN_FONT_ASSET),
            arabic: load_asset(assets, ARABIC_FONT_ASSET),
        }
    }

    pub fn for_script(&self, script: Script) -> FontChoice {
        match script {
            Script::Latin => match &self.latin {
                Some(font) => FontChoice::Embedded(Arc::clone(font)),
                None => FontChoice::Builtin(BUILTIN_LATIN),
            },
            Script::Arabic => match &self.arabic {
                Some(font) => FontChoice::Embedded(Arc::clone(font)),
                None => FontChoice::Builtin(BUILTIN_ARABIC),
            },
        }
    }
}

fn load_asset(assets: &dyn AssetStore, logical: &str) -> Option<Arc<TrueTypeFont>> {
    let path = match assets.font_path(logical) {
        Some(path) => path,
        None => {
            debug!(target: FONTS, logical, "font asset not found, using built-in face");
            return None;
        }
    };
    match TrueTypeFont::load(&path) {
        Ok(font) => Some(Arc::new(font)),
        Err(error) => {
            warn!(target: FONTS, path = %path.display(), %error, "unusable font asset, using built-in face");
            None
        }
    }
}
