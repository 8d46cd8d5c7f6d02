use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// A captured photo, re-encoded as PNG.
#[derive(Debug, Clone)]
pub struct ImageBlob {
    pub mime: &'static str,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageBlob {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Anything that can hand over a photo on request (a device camera in the
/// phone workflow).
pub trait CaptureSource {
    fn capture(&mut self) -> Result<ImageBlob>;
}

/// Captures by reading an image file from disk.
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureSource for FileCapture {
    fn capture(&mut self) -> Result<ImageBlob> {
        let img = image::open(&self.path)?;
        let (width, height) = (img.width(), img.height());
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)?;
        tracing::debug!(
            path = %self.path.display(),
            width,
            height,
            "FileCapture: captured"
        );
        Ok(ImageBlob {
            mime: "image/png",
            bytes: out.into_inner(),
            width,
            height,
        })
    }
}
