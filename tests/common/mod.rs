//! Shared helpers: synthesized template PDFs and content inspection.
#![allow(dead_code)]

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

pub const PAGE_WIDTH: f32 = 498.9;
pub const PAGE_HEIGHT: f32 = 708.7;

/// Build a template PDF with a '-' marker drawn at each baseline
/// position, one inner Vec per page. Resources live on each page.
pub fn build_marker_template(path: &Path, pages: &[Vec<(f32, f32)>]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    for markers in pages {
        let content = Content {
            operations: marker_operations(markers),
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Single-page variant with Resources and MediaBox inherited from the
/// Pages node instead of sitting on the page itself.
pub fn build_inherited_resources_template(path: &Path, markers: &[(f32, f32)]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let content = Content {
        operations: marker_operations(markers),
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

fn marker_operations(markers: &[(f32, f32)]) -> Vec<Operation> {
    let mut operations = Vec::new();
    for (x, y) in markers {
        operations.extend(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![(*x).into(), (*y).into()]),
            Operation::new("Tj", vec![Object::string_literal("-")]),
            Operation::new("ET", vec![]),
        ]);
    }
    operations
}

/// All decoded operations of one page (1-based page number).
pub fn page_operations(doc: &Document, page_number: u32) -> Vec<Operation> {
    let pages = doc.get_pages();
    let page_id = pages[&page_number];
    doc.get_and_decode_page_content(page_id).unwrap().operations
}

pub fn count_ops(ops: &[Operation], operator: &str) -> usize {
    ops.iter().filter(|op| op.operator == operator).count()
}

/// Literal Tj strings in content order.
pub fn literal_texts(ops: &[Operation]) -> Vec<String> {
    ops.iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(Object::String(bytes, _)) => {
                Some(String::from_utf8_lossy(bytes).to_string())
            }
            _ => None,
        })
        .collect()
}

/// (x, y, text) of every Tj, taken from the preceding Td.
pub fn positioned_texts(ops: &[Operation]) -> Vec<(f32, f32, String)> {
    let mut out = Vec::new();
    let mut last_td = (0.0f32, 0.0f32);
    for op in ops {
        match op.operator.as_str() {
            "Td" => {
                last_td = (
                    operand_as_float(&op.operands[0]),
                    operand_as_float(&op.operands[1]),
                );
            }
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    out.push((
                        last_td.0,
                        last_td.1,
                        String::from_utf8_lossy(bytes).to_string(),
                    ));
                }
            }
            _ => {}
        }
    }
    out
}

pub fn operand_as_float(obj: &Object) -> f32 {
    match obj {
        Object::Integer(i) => *i as f32,
        Object::Real(f) => *f,
        _ => 0.0,
    }
}
