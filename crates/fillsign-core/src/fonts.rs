//! Fonts for baked-in text
//!
//! Text that fits WinAnsiEncoding is drawn with the standard Helvetica font,
//! which every viewer provides. Anything else needs a real font program:
//! a configured TrueType face is subset to the used glyphs and embedded as a
//! Type0 / CIDFontType2 font with Identity-H encoding.

use crate::error::FillSignError;
use crate::image::deflate;
use crate::metrics::FontData;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};

/// Map a character to its WinAnsiEncoding byte.
pub fn char_to_winansi(c: char) -> Option<u8> {
    let byte = match c as u32 {
        0x20..=0x7E => c as u8,
        0xA0..=0xFF => c as u8,
        0x20AC => 0x80,
        0x201A => 0x82,
        0x0192 => 0x83,
        0x201E => 0x84,
        0x2026 => 0x85,
        0x2020 => 0x86,
        0x2021 => 0x87,
        0x02C6 => 0x88,
        0x2030 => 0x89,
        0x0160 => 0x8A,
        0x2039 => 0x8B,
        0x0152 => 0x8C,
        0x017D => 0x8E,
        0x2018 => 0x91,
        0x2019 => 0x92,
        0x201C => 0x93,
        0x201D => 0x94,
        0x2022 => 0x95,
        0x2013 => 0x96,
        0x2014 => 0x97,
        0x02DC => 0x98,
        0x2122 => 0x99,
        0x0161 => 0x9A,
        0x203A => 0x9B,
        0x0153 => 0x9C,
        0x017E => 0x9E,
        0x0178 => 0x9F,
        _ => return None,
    };
    Some(byte)
}

/// Encode text as WinAnsi bytes, or `None` if any character is not encodable.
pub fn to_winansi(text: &str) -> Option<Vec<u8>> {
    text.chars().map(char_to_winansi).collect()
}

pub fn is_winansi(text: &str) -> bool {
    text.chars().all(|c| char_to_winansi(c).is_some())
}

/// A PDF literal string with delimiters and non-ASCII bytes escaped
fn literal_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7E => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:03o}", b);
            }
        }
    }
    out.push(')');
    out
}

#[derive(Debug, Clone)]
enum Encoder {
    WinAnsi,
    /// Character to subset glyph id
    Identity(BTreeMap<char, u16>),
}

/// A font object added to the output document
#[derive(Debug, Clone)]
pub struct PdfFont {
    pub id: ObjectId,
    pub base_font: String,
    encoder: Encoder,
}

impl PdfFont {
    /// Operand for `Tj`, or `None` if the font cannot show `text`.
    pub fn show_string(&self, text: &str) -> Option<String> {
        match &self.encoder {
            Encoder::WinAnsi => to_winansi(text).map(|bytes| literal_string(&bytes)),
            Encoder::Identity(map) => {
                let mut out = String::with_capacity(text.len() * 4 + 2);
                out.push('<');
                for c in text.chars() {
                    let gid = map.get(&c).copied()?;
                    let _ = write!(out, "{:04X}", gid);
                }
                out.push('>');
                Some(out)
            }
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.encoder, Encoder::Identity(_))
    }
}

/// Standard Helvetica with WinAnsiEncoding
pub fn add_helvetica(doc: &mut Document) -> PdfFont {
    let id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    PdfFont {
        id,
        base_font: "Helvetica".to_string(),
        encoder: Encoder::WinAnsi,
    }
}

/// Six-letter subset tag derived from the font and the glyphs it covers
fn subset_tag(name: &str, chars: &BTreeSet<char>) -> String {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    chars.hash(&mut hasher);
    let mut h = hasher.finish();
    (0..6)
        .map(|_| {
            let c = (b'A' + (h % 26) as u8) as char;
            h /= 26;
            c
        })
        .collect()
}

fn to_unicode_cmap(map: &BTreeMap<char, u16>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );

    let pairs: Vec<(u16, char)> = map.iter().map(|(&c, &gid)| (gid, c)).collect();
    // bfchar blocks are limited to 100 entries
    for chunk in pairs.chunks(100) {
        let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
        for (gid, c) in chunk {
            let mut units = [0u16; 2];
            let utf16: String = c.encode_utf16(&mut units).iter().map(|u| format!("{:04X}", u)).collect();
            let _ = writeln!(cmap, "<{:04X}> <{}>", gid, utf16);
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    cmap
}

/// Embed a subset of `font` covering `chars` as a Type0 font.
///
/// Characters the face has no glyph for are left out of the map, so
/// [`PdfFont::show_string`] returns `None` for text that uses them.
pub fn embed_unicode_font(doc: &mut Document, font: &FontData, chars: &BTreeSet<char>) -> Result<PdfFont, FillSignError> {
    let face = font.face()?;
    let units = f64::from(face.units_per_em());
    let to_1000 = |v: f64| (v / units * 1000.0).round() as i64;

    let mut remapper = subsetter::GlyphRemapper::new();
    remapper.remap(0);
    let mut char_to_gid = BTreeMap::new();
    let mut widths = BTreeMap::new();
    for &c in chars {
        let Some(gid) = face.glyph_index(c) else {
            tracing::warn!(character = %c, "Font has no glyph for character");
            continue;
        };
        let new_gid = remapper.remap(gid.0);
        char_to_gid.insert(c, new_gid);
        let advance = face.glyph_hor_advance(gid).map(f64::from).unwrap_or(0.0);
        widths.insert(new_gid, to_1000(advance));
    }

    let program = match subsetter::subset(font.bytes(), font.face_index(), &remapper) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(error = %e, "Font subsetting failed, embedding the full font");
            // Full font: glyph ids are the original ones
            char_to_gid.clear();
            widths.clear();
            for &c in chars {
                if let Some(gid) = face.glyph_index(c) {
                    char_to_gid.insert(c, gid.0);
                    let advance = face.glyph_hor_advance(gid).map(f64::from).unwrap_or(0.0);
                    widths.insert(gid.0, to_1000(advance));
                }
            }
            font.bytes().to_vec()
        }
    };

    let ps_name = font.postscript_name();
    let base_font = format!("{}+{}", subset_tag(&ps_name, chars), ps_name);

    let program_len = program.len() as i64;
    let file_id = doc.add_object(Stream::new(
        dictionary! {
            "Length1" => program_len,
            "Filter" => "FlateDecode",
        },
        deflate(&program)?,
    ));

    let bb = face.global_bounding_box();
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(base_font.clone().into_bytes()),
        "Flags" => 32,
        "FontBBox" => vec![
            to_1000(f64::from(bb.x_min)).into(),
            to_1000(f64::from(bb.y_min)).into(),
            to_1000(f64::from(bb.x_max)).into(),
            to_1000(f64::from(bb.y_max)).into(),
        ],
        "ItalicAngle" => 0,
        "Ascent" => to_1000(f64::from(face.ascender())),
        "Descent" => to_1000(f64::from(face.descender())),
        "CapHeight" => to_1000(f64::from(face.capital_height().unwrap_or(face.ascender()))),
        "StemV" => 80,
        "FontFile2" => file_id,
    });

    let mut w_array: Vec<Object> = Vec::with_capacity(widths.len() * 2);
    for (gid, width) in &widths {
        w_array.push(Object::Integer(i64::from(*gid)));
        w_array.push(Object::Array(vec![Object::Integer(*width)]));
    }

    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => Object::Name(base_font.clone().into_bytes()),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 0,
        "W" => w_array,
        "CIDToGIDMap" => "Identity",
    });

    let cmap_id = doc.add_object(Stream::new(dictionary! {}, to_unicode_cmap(&char_to_gid).into_bytes()));

    let id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => Object::Name(base_font.clone().into_bytes()),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
        "ToUnicode" => cmap_id,
    });

    tracing::debug!(font = %base_font, glyphs = char_to_gid.len(), "Embedded font subset");
    Ok(PdfFont {
        id,
        base_font,
        encoder: Encoder::Identity(char_to_gid),
    })
}
