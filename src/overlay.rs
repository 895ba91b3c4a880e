//! Template overlay engine.
//!
//! Given a template, every located dash marker is painted over with an
//! opaque mask and the corresponding value is drawn at the marker's
//! position; without a template a blank B5 page is synthesized and the
//! card type's fallback coordinates are used. The source template is
//! never mutated; output is always a fresh document on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info};

use crate::error::Error;
use crate::fonts::{script_of, AssetStore, FontChoice, FontSet, Script};
use crate::layout::order_anchors;
use crate::logging::OVERLAY;
use crate::parse::{find_markers, MarkerBox};
use crate::schema::{schema_for, CardType, B5_SIZE};
use crate::shaping::shape;

/// Text size used when writing over template markers.
const TEMPLATE_FONT_SIZE: f32 = 12.0;
/// Baseline sits just above the marker's bottom edge.
const TEXT_BASELINE_NUDGE: f32 = 2.0;

const LATIN_RESOURCE: &str = "CpLatin";
const ARABIC_RESOURCE: &str = "CpArabic";

/// One render job: a row's ordered values into one output document.
pub struct RenderRequest<'a> {
    pub card_type: CardType,
    pub values: &'a [String],
    pub template: Option<&'a Path>,
    pub output: &'a Path,
}

pub struct OverlayEngine {
    assets: Arc<dyn AssetStore>,
    fonts: FontSet,
}

impl OverlayEngine {
    pub fn new(assets: Arc<dyn AssetStore>) -> Self {
        let fonts = FontSet::load(assets.as_ref());
        OverlayEngine { assets, fonts }
    }

    /// The template a batch will run with: an explicit upload wins,
    /// otherwise the card type's default from the asset store.
    pub fn resolve_template(&self, card_type: CardType, explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        self.assets
            .template_path(schema_for(card_type).default_template)
    }

    pub fn render(&self, req: &RenderRequest) -> Result<(), Error> {
        match req.template {
            Some(path) if path.is_file() => self.render_template(path, req),
            Some(path) => {
                debug!(
                    target: OVERLAY,
                    template = %path.display(),
                    "template not on disk, using fallback layout"
                );
                self.render_fallback(req)
            }
            None => self.render_fallback(req),
        }
    }

    fn render_template(&self, template: &Path, req: &RenderRequest) -> Result<(), Error> {
        let mut doc = Document::load(template).map_err(|source| Error::Template {
            path: template.to_path_buf(),
            source,
        })?;

        let markers = find_markers(&doc)?;
        let anchors = order_anchors(&markers);
        let marker_count = anchors.len();
        if req.values.len() > marker_count {
            debug!(
                target: OVERLAY,
                dropped = req.values.len() - marker_count,
                "more values than markers, extra values dropped"
            );
        }

        // Values are consumed in flattened document order; anchors
        // beyond the supplied values stay untouched.
        let mut per_page: BTreeMap<u32, Vec<(MarkerBox, &str)>> = BTreeMap::new();
        for (anchor, value) in anchors.into_iter().zip(req.values.iter()) {
            per_page
                .entry(anchor.page_number)
                .or_default()
                .push((anchor.bbox, value.as_str()));
        }

        let page_ids = doc.get_pages();
        let mut doc_fonts = DocFonts::default();
        for (page_number, entries) in &per_page {
            let Some(page_id) = page_ids.get(page_number).copied() else {
                continue;
            };
            let overlay = self.page_overlay(&mut doc, &mut doc_fonts, page_id, entries)?;
            append_page_content(&mut doc, page_id, overlay)?;
        }

        doc.save(req.output)?;
        info!(
            target: OVERLAY,
            output = %req.output.display(),
            markers = marker_count,
            values = req.values.len(),
            "overlaid template"
        );
        Ok(())
    }

    /// Build one page's overlay stream: all masks first, then all text.
    fn page_overlay(
        &self,
        doc: &mut Document,
        doc_fonts: &mut DocFonts,
        page_id: ObjectId,
        entries: &[(MarkerBox, &str)],
    ) -> Result<Vec<Operation>, Error> {
        let mut ops = Vec::with_capacity(entries.len() * 7 + 5);
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("rg", vec![1.into(), 1.into(), 1.into()]));
        for (bbox, _) in entries {
            ops.push(Operation::new(
                "re",
                vec![
                    bbox.x_min.into(),
                    bbox.y_min.into(),
                    bbox.width().into(),
                    bbox.height().into(),
                ],
            ));
            ops.push(Operation::new("f", vec![]));
        }
        ops.push(Operation::new("rg", vec![0.into(), 0.into(), 0.into()]));
        ops.push(Operation::new("Tr", vec![0.into()]));
        for (bbox, value) in entries {
            let script = script_of(value);
            let (res_name, font_id, choice) = doc_fonts.resolve(doc, &self.fonts, script);
            ensure_font_resource(doc, page_id, res_name, font_id)?;
            let text = display_text(value, script);
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new(
                "Tf",
                vec![res_name.into(), TEMPLATE_FONT_SIZE.into()],
            ));
            ops.push(Operation::new(
                "Td",
                vec![bbox.x_min.into(), (bbox.y_min + TEXT_BASELINE_NUDGE).into()],
            ));
            ops.push(Operation::new("Tj", vec![choice.encode_text(&text)]));
            ops.push(Operation::new("ET", vec![]));
        }
        ops.push(Operation::new("Q", vec![]));
        Ok(ops)
    }

    /// No template: synthesize a single B5 page and place each field
    /// at the card type's fallback coordinate.
    fn render_fallback(&self, req: &RenderRequest) -> Result<(), Error> {
        let schema = schema_for(req.card_type);
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut doc_fonts = DocFonts::default();
        let mut font_resources = Dictionary::new();
        let mut operations: Vec<Operation> = Vec::new();

        for (i, field) in schema.fields.iter().enumerate() {
            let value = req.values.get(i).map(String::as_str).unwrap_or("");
            if value.is_empty() {
                continue;
            }
            let (x, y_top) = schema.coordinates[i];
            let size = schema.font_size(req.card_type, *field);
            let script = script_of(value);
            let (res_name, font_id, choice) = doc_fonts.resolve(&mut doc, &self.fonts, script);
            font_resources.set(res_name, Object::Reference(font_id));
            let text = display_text(value, script);
            // Coordinates are top-origin; PDF text wants a baseline in
            // bottom-origin space.
            let baseline = B5_SIZE.1 - y_top - size;
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec![res_name.into(), size.into()]));
            operations.push(Operation::new("Td", vec![x.into(), baseline.into()]));
            operations.push(Operation::new("Tj", vec![choice.encode_text(&text)]));
            operations.push(Operation::new("ET", vec![]));
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let resources_id = doc.add_object(dictionary! {
            "Font" => Object::Dictionary(font_resources),
        });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), B5_SIZE.0.into(), B5_SIZE.1.into()],
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();
        doc.save(req.output)?;
        info!(
            target: OVERLAY,
            output = %req.output.display(),
            card_type = %req.card_type,
            "rendered fallback page"
        );
        Ok(())
    }
}

fn display_text(value: &str, script: Script) -> String {
    match script {
        Script::Arabic => shape(value),
        Script::Latin => value.to_string(),
    }
}

/// Per-output-document font object cache. A face is added to the
/// document once and referenced from every page that needs it.
#[derive(Default)]
struct DocFonts {
    latin: Option<ObjectId>,
    arabic: Option<ObjectId>,
}

impl DocFonts {
    fn resolve(
        &mut self,
        doc: &mut Document,
        fonts: &FontSet,
        script: Script,
    ) -> (&'static str, ObjectId, FontChoice) {
        let choice = fonts.for_script(script);
        let (slot, res_name) = match script {
            Script::Latin => (&mut self.latin, LATIN_RESOURCE),
            Script::Arabic => (&mut self.arabic, ARABIC_RESOURCE),
        };
        let font_id = match slot {
            Some(id) => *id,
            None => {
                let id = choice.add_to_document(doc);
                *slot = Some(id);
                id
            }
        };
        (res_name, font_id, choice)
    }
}

enum ResourcesLocation {
    Inline,
    Indirect(ObjectId),
    Missing(Option<Dictionary>),
}

/// Register a font under the page's resources, wherever those live:
/// inline on the page, behind an indirect reference, or inherited from
/// the Pages tree (in which case the page gets its own copy).
fn ensure_font_resource(
    doc: &mut Document,
    page_id: ObjectId,
    res_name: &str,
    font_id: ObjectId,
) -> Result<(), Error> {
    let location;
    let mut font_dict = Dictionary::new();
    {
        let page = doc.get_dictionary(page_id)?;
        location = match page.get(b"Resources") {
            Ok(Object::Reference(id)) => ResourcesLocation::Indirect(*id),
            Ok(Object::Dictionary(_)) => ResourcesLocation::Inline,
            _ => ResourcesLocation::Missing(inherited_resources(doc, page)),
        };
        let resources: Option<&Dictionary> = match &location {
            ResourcesLocation::Inline => {
                page.get(b"Resources").ok().and_then(|o| o.as_dict().ok())
            }
            ResourcesLocation::Indirect(id) => {
                doc.get_object(*id).ok().and_then(|o| o.as_dict().ok())
            }
            ResourcesLocation::Missing(inherited) => inherited.as_ref(),
        };
        if let Some(resources) = resources {
            if let Ok(existing) = resources.get(b"Font") {
                let resolved = match existing {
                    Object::Reference(id) => doc.get_object(*id).ok(),
                    other => Some(other),
                };
                if let Some(Ok(fonts)) = resolved.map(Object::as_dict) {
                    font_dict = fonts.clone();
                }
            }
        }
    }
    font_dict.set(res_name, Object::Reference(font_id));

    match location {
        ResourcesLocation::Inline => {
            if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
                if let Ok(Object::Dictionary(resources)) = page.get_mut(b"Resources") {
                    resources.set("Font", Object::Dictionary(font_dict));
                }
            }
        }
        ResourcesLocation::Indirect(id) => {
            if let Ok(Object::Dictionary(resources)) = doc.get_object_mut(id) {
                resources.set("Font", Object::Dictionary(font_dict));
            }
        }
        ResourcesLocation::Missing(inherited) => {
            let mut resources = inherited.unwrap_or_default();
            resources.set("Font", Object::Dictionary(font_dict));
            if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
                page.set("Resources", Object::Dictionary(resources));
            }
        }
    }
    Ok(())
}

fn inherited_resources(doc: &Document, page: &Dictionary) -> Option<Dictionary> {
    let mut current = page.clone();
    for _ in 0..10 {
        let parent_id = current.get(b"Parent").ok().and_then(|o| o.as_reference().ok())?;
        let parent = doc.get_object(parent_id).ok()?.as_dict().ok()?;
        if let Ok(resources) = parent.get(b"Resources") {
            let resolved = match resources {
                Object::Reference(id) => doc.get_object(*id).ok()?,
                other => other,
            };
            return resolved.as_dict().ok().cloned();
        }
        current = parent.clone();
    }
    None
}

/// Append an overlay stream after the page's existing content.
fn append_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
) -> Result<(), Error> {
    let content = Content { operations };
    let stream_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page = doc.get_object_mut(page_id)?;
    if let Object::Dictionary(dict) = page {
        let existing = dict.get(b"Contents").ok().cloned();
        match existing {
            Some(Object::Reference(existing_id)) => {
                dict.set(
                    "Contents",
                    vec![Object::Reference(existing_id), Object::Reference(stream_id)],
                );
            }
            Some(Object::Array(mut array)) => {
                array.push(Object::Reference(stream_id));
                dict.set("Contents", array);
            }
            _ => dict.set("Contents", Object::Reference(stream_id)),
        }
    }
    Ok(())
}
