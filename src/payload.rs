use crate::error::{DocsnapError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::io::Cursor;

/// Decoded image carried by a gallery item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime: String,
    pub bytes: Vec<u8>,
    /// Pixel size, when the format is one we can probe.
    pub dimensions: Option<(u32, u32)>,
}

impl ImagePayload {
    /// Parse a `data:image/<type>;base64,<body>` URL.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| DocsnapError::InvalidPayload("not a data URL".into()))?;
        let (header, body) = rest
            .split_once(',')
            .ok_or_else(|| DocsnapError::InvalidPayload("data URL has no body".into()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| DocsnapError::InvalidPayload("data URL is not base64".into()))?;
        if !mime.starts_with("image/") {
            return Err(DocsnapError::InvalidPayload(format!(
                "unexpected mime type '{}'",
                mime
            )));
        }

        let bytes = STANDARD
            .decode(body.trim())
            .map_err(|e| DocsnapError::InvalidPayload(format!("bad base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(DocsnapError::InvalidPayload("empty image body".into()));
        }

        let dimensions = probe_dimensions(&bytes);
        Ok(Self {
            mime: mime.to_string(),
            bytes,
            dimensions,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
pub(crate) fn tiny_png_data_url(width: u32, height: u32) -> String {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 200, 30]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(out.into_inner()))
}
