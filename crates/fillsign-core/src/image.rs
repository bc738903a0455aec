//! PNG decoding and image XObject embedding

use crate::error::FillSignError;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, ObjectId, Stream};
use std::io::Write;

/// 8-bit RGB samples with an optional separate alpha plane
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    /// `None` when the image is fully opaque
    pub alpha: Option<Vec<u8>>,
}

impl DecodedImage {
    pub fn decode_png(bytes: &[u8]) -> Result<Self, FillSignError> {
        let mut decoder = png::Decoder::new(bytes);
        decoder.set_transformations(png::Transformations::normalize_to_color8());
        let mut reader = decoder
            .read_info()
            .map_err(|e| FillSignError::ImageDecode(e.to_string()))?;
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut buf)
            .map_err(|e| FillSignError::ImageDecode(e.to_string()))?;
        buf.truncate(info.buffer_size());

        let (width, height) = (info.width, info.height);
        if width == 0 || height == 0 {
            return Err(FillSignError::ImageDecode("Image has no pixels".into()));
        }
        let pixels = (width as usize) * (height as usize);

        let (rgb, alpha) = match info.color_type {
            png::ColorType::Rgb => (buf, None),
            png::ColorType::Rgba => split_alpha(&buf, 4, pixels, |px| [px[0], px[1], px[2]]),
            png::ColorType::Grayscale => (buf.iter().flat_map(|&g| [g, g, g]).collect(), None),
            png::ColorType::GrayscaleAlpha => split_alpha(&buf, 2, pixels, |px| [px[0], px[0], px[0]]),
            other => {
                return Err(FillSignError::ImageDecode(format!(
                    "Unsupported color type after expansion: {:?}",
                    other
                )))
            }
        };

        Ok(Self {
            width,
            height,
            rgb,
            alpha,
        })
    }

    /// Height over width
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.height) / f64::from(self.width)
    }
}

fn split_alpha(
    buf: &[u8],
    channels: usize,
    pixels: usize,
    color: impl Fn(&[u8]) -> [u8; 3],
) -> (Vec<u8>, Option<Vec<u8>>) {
    let mut rgb = Vec::with_capacity(pixels * 3);
    let mut alpha = Vec::with_capacity(pixels);
    for px in buf.chunks_exact(channels) {
        rgb.extend_from_slice(&color(px));
        alpha.push(px[channels - 1]);
    }
    let opaque = alpha.iter().all(|&a| a == 255);
    (rgb, (!opaque).then_some(alpha))
}

/// Width and height of a PNG without decoding pixel data
pub fn png_dimensions(bytes: &[u8]) -> Result<(u32, u32), FillSignError> {
    let reader = png::Decoder::new(bytes)
        .read_info()
        .map_err(|e| FillSignError::ImageDecode(e.to_string()))?;
    let info = reader.info();
    Ok((info.width, info.height))
}

pub(crate) fn deflate(data: &[u8]) -> Result<Vec<u8>, FillSignError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| FillSignError::ImageDecode(format!("Failed to compress samples: {}", e)))
}

/// Add the image (and its soft mask) to `doc`, returning the XObject id.
///
/// Samples are stored losslessly with FlateDecode.
pub fn embed_image(doc: &mut Document, image: &DecodedImage) -> Result<ObjectId, FillSignError> {
    let smask_id = match &image.alpha {
        Some(alpha) => Some(doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(alpha)?,
        ))),
        None => None,
    };

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    if let Some(smask_id) = smask_id {
        dict.set("SMask", smask_id);
    }
    Ok(doc.add_object(Stream::new(dict, deflate(&image.rgb)?)))
}
