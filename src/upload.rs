use std::path::Path;

use crate::error::UploadError;

/// Advisory size ceiling for uploads.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Png,
    Jpeg,
    Bmp,
    Tiff,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "png" => Some(DocumentFormat::Png),
            "jpg" | "jpeg" => Some(DocumentFormat::Jpeg),
            "bmp" => Some(DocumentFormat::Bmp),
            "tif" | "tiff" => Some(DocumentFormat::Tiff),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Png => "PNG",
            DocumentFormat::Jpeg => "JPEG",
            DocumentFormat::Bmp => "BMP",
            DocumentFormat::Tiff => "TIFF",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Png => "image/png",
            DocumentFormat::Jpeg => "image/jpeg",
            DocumentFormat::Bmp => "image/bmp",
            DocumentFormat::Tiff => "image/tiff",
        }
    }

    fn matches_header(self, bytes: &[u8]) -> bool {
        match self {
            DocumentFormat::Pdf => bytes.starts_with(b"%PDF-"),
            DocumentFormat::Png => bytes.starts_with(&[0x89, b'P', b'N', b'G']),
            DocumentFormat::Jpeg => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
            DocumentFormat::Bmp => bytes.starts_with(b"BM"),
            DocumentFormat::Tiff => bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*"),
        }
    }
}

/// An uploaded document held in memory.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Upload {
            name: name.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Check extension, size and file header before anything is sent.
pub fn validate_upload(name: &str, bytes: &[u8]) -> Result<DocumentFormat, UploadError> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    let format = DocumentFormat::from_extension(ext)
        .ok_or_else(|| UploadError::UnsupportedExtension(ext.to_string()))?;
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge { size: bytes.len() });
    }
    if !format.matches_header(bytes) {
        return Err(UploadError::ContentMismatch(format.name()));
    }
    Ok(format)
}
