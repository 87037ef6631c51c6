//! Base64 PNG encoding and decoding for images sent to and received from the API.
//!
//! The webui wants images as base64 PNG. Most endpoints accept (and some
//! require) a `data:image/png;base64,` prefix; the ControlNet endpoints only
//! accept the bare base64 payload. Text metadata on the source image is
//! carried over into PNG text chunks so generation parameters survive a
//! round trip through the service.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use image::DynamicImage;

use crate::error::ClientError;

/// Prefix the webui expects on most uploaded images.
pub const DATA_URI_PREFIX: &str = "data:image/png;base64,";

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// An image plus the string key/value metadata stored alongside it.
#[derive(Debug, Clone)]
pub struct PngImage {
    pixels: DynamicImage,
    text: BTreeMap<String, String>,
}

impl PngImage {
    /// Wrap pixel data with no metadata.
    #[must_use]
    pub fn new(pixels: DynamicImage) -> Self {
        Self { pixels, text: BTreeMap::new() }
    }

    /// Attach a text metadata entry.
    #[must_use]
    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.text.insert(key.into(), value.into());
        self
    }

    /// Pixel data.
    #[must_use]
    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    /// Consume the image, returning its pixel data.
    #[must_use]
    pub fn into_pixels(self) -> DynamicImage {
        self.pixels
    }

    /// Text metadata entries.
    #[must_use]
    pub fn text(&self) -> &BTreeMap<String, String> {
        &self.text
    }

    /// Mutable access to the text metadata entries.
    pub fn text_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.text
    }

    /// Image width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Image height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Decode an image from raw file bytes.
    ///
    /// PNG input keeps its text chunks; any other format `image` can read
    /// is accepted with empty metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encoding`] if the bytes are not a readable image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ClientError> {
        if bytes.starts_with(&PNG_SIGNATURE) {
            return Self::from_png_bytes(bytes);
        }
        let pixels = image::load_from_memory(bytes)
            .map_err(|e| ClientError::Encoding(format!("Failed to decode image: {e}")))?;
        Ok(Self::new(pixels))
    }

    /// Decode a PNG, including its `tEXt`, `zTXt` and `iTXt` chunks.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encoding`] if the bytes are not a valid PNG.
    pub fn from_png_bytes(bytes: &[u8]) -> Result<Self, ClientError> {
        let pixels = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .map_err(|e| ClientError::Encoding(format!("Failed to decode PNG: {e}")))?;
        let text = read_text_chunks(bytes)?;
        Ok(Self { pixels, text })
    }

    /// Read an image file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Serialize as PNG, writing every metadata entry as a text chunk.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encoding`] if the PNG encoder rejects the image
    /// or a metadata keyword.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, ClientError> {
        let (color, depth, data) = png_layout(&self.pixels);
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.pixels.width(), self.pixels.height());
            encoder.set_color(color);
            encoder.set_depth(depth);
            for (key, value) in &self.text {
                // tEXt is Latin-1 only; anything wider goes into an iTXt chunk.
                let added = if value.chars().all(|c| u32::from(c) < 256) {
                    encoder.add_text_chunk(key.clone(), value.clone())
                } else {
                    encoder.add_itxt_chunk(key.clone(), value.clone())
                };
                added.map_err(|e| {
                    ClientError::Encoding(format!("Invalid PNG text chunk '{key}': {e}"))
                })?;
            }
            let mut writer = encoder.write_header().map_err(encoding_error)?;
            writer.write_image_data(&data).map_err(encoding_error)?;
            writer.finish().map_err(encoding_error)?;
        }
        Ok(out)
    }

    /// Write the image to disk as PNG.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        let bytes = self.to_png_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

impl From<DynamicImage> for PngImage {
    fn from(pixels: DynamicImage) -> Self {
        Self::new(pixels)
    }
}

/// Encode an image as a `data:image/png;base64,...` string.
///
/// # Errors
///
/// Returns [`ClientError::Encoding`] if the image cannot be serialized.
pub fn encode_data_uri(image: &PngImage) -> Result<String, ClientError> {
    Ok(format!("{DATA_URI_PREFIX}{}", encode_raw(image)?))
}

/// Encode an image as bare base64 PNG with no URI prefix.
///
/// # Errors
///
/// Returns [`ClientError::Encoding`] if the image cannot be serialized.
pub fn encode_raw(image: &PngImage) -> Result<String, ClientError> {
    let bytes = image.to_png_bytes()?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Decode a base64 PNG as returned by the API. A data URI prefix is tolerated.
///
/// # Errors
///
/// Returns [`ClientError::Encoding`] on invalid base64 or image data.
pub fn decode_base64_png(encoded: &str) -> Result<PngImage, ClientError> {
    let payload = match encoded.split_once(";base64,") {
        Some((head, rest)) if head.starts_with("data:") => rest,
        _ => encoded,
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ClientError::Encoding(format!("Failed to decode base64: {e}")))?;
    PngImage::from_bytes(&bytes)
}

fn encoding_error(e: png::EncodingError) -> ClientError {
    ClientError::Encoding(format!("Failed to encode PNG: {e}"))
}

fn read_text_chunks(bytes: &[u8]) -> Result<BTreeMap<String, String>, ClientError> {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let reader = decoder
        .read_info()
        .map_err(|e| ClientError::Encoding(format!("Failed to read PNG header: {e}")))?;
    let info = reader.info();

    let mut text = BTreeMap::new();
    for chunk in &info.uncompressed_latin1_text {
        text.insert(chunk.keyword.clone(), chunk.text.clone());
    }
    for chunk in &info.compressed_latin1_text {
        if let Ok(value) = chunk.get_text() {
            text.insert(chunk.keyword.clone(), value);
        }
    }
    for chunk in &info.utf8_text {
        if let Ok(value) = chunk.get_text() {
            text.insert(chunk.keyword.clone(), value);
        }
    }
    Ok(text)
}

/// Map an in-memory image onto PNG color type, bit depth and big-endian samples.
fn png_layout(image: &DynamicImage) -> (png::ColorType, png::BitDepth, Vec<u8>) {
    use png::{BitDepth, ColorType};

    fn be(samples: &[u16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_be_bytes()).collect()
    }

    match image {
        DynamicImage::ImageLuma8(buf) => (ColorType::Grayscale, BitDepth::Eight, buf.as_raw().clone()),
        DynamicImage::ImageLumaA8(buf) => {
            (ColorType::GrayscaleAlpha, BitDepth::Eight, buf.as_raw().clone())
        }
        DynamicImage::ImageRgb8(buf) => (ColorType::Rgb, BitDepth::Eight, buf.as_raw().clone()),
        DynamicImage::ImageRgba8(buf) => (ColorType::Rgba, BitDepth::Eight, buf.as_raw().clone()),
        DynamicImage::ImageLuma16(buf) => (ColorType::Grayscale, BitDepth::Sixteen, be(buf.as_raw())),
        DynamicImage::ImageLumaA16(buf) => {
            (ColorType::GrayscaleAlpha, BitDepth::Sixteen, be(buf.as_raw()))
        }
        DynamicImage::ImageRgb16(buf) => (ColorType::Rgb, BitDepth::Sixteen, be(buf.as_raw())),
        DynamicImage::ImageRgba16(buf) => (ColorType::Rgba, BitDepth::Sixteen, be(buf.as_raw())),
        other => (ColorType::Rgba, BitDepth::Eight, other.to_rgba8().into_raw()),
    }
}
