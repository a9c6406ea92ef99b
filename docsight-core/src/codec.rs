//! Image loading and base64 encoding for the backend.

use crate::error::CodecError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use std::path::{Path, PathBuf};

/// MIME types the reasoning backend accepts for image blocks.
pub const SUPPORTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// An image ready to be placed in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub path: PathBuf,
    pub mime_type: String,
    /// Standard base64 of the file bytes
    pub data: String,
}

impl EncodedImage {
    /// Encode bytes already in memory; `path` is kept for provenance only
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Result<Self, CodecError> {
        let path = path.into();
        let mime_type = detect_mime_type(&path, bytes)?;
        Ok(Self {
            path,
            mime_type: mime_type.to_string(),
            data: STANDARD.encode(bytes),
        })
    }

    /// Recover the original bytes
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

/// Read an image file and encode it.
pub async fn encode(path: &Path) -> Result<EncodedImage, CodecError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    EncodedImage::from_bytes(path, &bytes)
}

/// Sniff the format from magic bytes, falling back to the extension.
fn detect_mime_type(path: &Path, bytes: &[u8]) -> Result<&'static str, CodecError> {
    let format = image::guess_format(bytes)
        .ok()
        .or_else(|| ImageFormat::from_path(path).ok())
        .ok_or_else(|| CodecError::UnsupportedFormat {
            path: path.to_path_buf(),
            detail: "could not determine image type".to_string(),
        })?;

    let mime_type = format.to_mime_type();
    if SUPPORTED_MIME_TYPES.contains(&mime_type) {
        Ok(mime_type)
    } else {
        Err(CodecError::UnsupportedFormat {
            path: path.to_path_buf(),
            detail: format!("{} is not accepted by the backend", mime_type),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    const BMP_MAGIC: &[u8] = &[b'B', b'M', 0x3A, 0, 0, 0, 0, 0, 0, 0, 0x36, 0, 0, 0];

    #[test]
    fn test_png_detected_from_bytes() {
        let image = EncodedImage::from_bytes("fig.bin", PNG_MAGIC).unwrap();
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn test_jpeg_detected_from_bytes() {
        let image = EncodedImage::from_bytes("page_2_img_1", JPEG_MAGIC).unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
    }

    #[test]
    fn test_extension_fallback() {
        let image = EncodedImage::from_bytes("chart.webp", b"not really webp").unwrap();
        assert_eq!(image.mime_type, "image/webp");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = EncodedImage::from_bytes("notes.txt", b"plain text").unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let err = EncodedImage::from_bytes("scan.bmp", BMP_MAGIC).unwrap_err();
        match err {
            CodecError::UnsupportedFormat { detail, .. } => assert!(detail.contains("image/bmp")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_base64_round_trip() {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend((0u8..=255).cycle().take(1000));

        let image = EncodedImage::from_bytes("fig.png", &bytes).unwrap();
        assert!(image.data.is_ascii());
        assert_eq!(image.decode().unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_encode_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("figure.png");
        std::fs::write(&path, PNG_MAGIC).unwrap();

        let image = encode(&path).await.unwrap();
        assert_eq!(image.path, path);
        assert_eq!(image.decode().unwrap(), PNG_MAGIC);
    }

    #[tokio::test]
    async fn test_encode_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = encode(&dir.path().join("missing.png")).await.unwrap_err();
        assert!(matches!(err, CodecError::Io { .. }));
    }
}
