//! In-memory fixtures shared by the integration tests
//!
//! Mirrors `src/test_support.rs`, which is `#[cfg(test)]` and so not
//! reachable from here.

#![allow(dead_code)]

use fillsign_core::FontData;
use lopdf::content::Content;
use lopdf::{dictionary, Document, Object, Stream};

/// Letter pages with a Helvetica `F1` resource and one line of content each
pub fn create_test_pdf(num_pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for i in 0..num_pages {
        let content = format!("BT /F1 24 Tf 100 700 Td (Page {}) Tj ET", i + 1);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    // MediaBox on the page tree so pages have to inherit it
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => num_pages as i64,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        let data: Vec<u8> = (0..width * height).flat_map(|_| rgba).collect();
        writer.write_image_data(&data).unwrap();
    }
    out
}

pub fn system_font() -> Option<FontData> {
    [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/Library/Fonts/Arial.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
    ]
    .iter()
    .find_map(|path| FontData::from_file(path).ok())
}

pub fn page_content(bytes: &[u8], page_index: u32) -> Content {
    let doc = Document::load_mem(bytes).unwrap();
    let page_id = doc.get_pages()[&(page_index + 1)];
    Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap()
}

pub fn number(obj: &Object) -> f64 {
    match obj {
        Object::Integer(i) => *i as f64,
        Object::Real(f) => f64::from(*f),
        other => panic!("Expected a number, got {:?}", other),
    }
}

/// Operands of every `op` operation on a page, as numbers
pub fn numeric_operands(bytes: &[u8], page_index: u32, op: &str) -> Vec<Vec<f64>> {
    page_content(bytes, page_index)
        .operations
        .iter()
        .filter(|o| o.operator == op)
        .map(|o| o.operands.iter().filter_map(|v| match v {
            Object::Integer(_) | Object::Real(_) => Some(number(v)),
            _ => None,
        }).collect())
        .collect()
}
