//! Image preparation for the vision model: MIME sniffing, optional
//! downscaling, base64 encoding into `ImageData`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use std::io::Cursor;
use tracing::{debug, warn};

/// MIME type from the file's magic bytes. Unknown signatures are sent as
/// PNG, which every vision endpoint accepts.
pub fn detect_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, 0x50, 0x4E, 0x47, ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'B', b'M', ..] => "image/bmp",
        [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => "image/tiff",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/png",
    }
}

/// Image ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub mime: &'static str,
    pub bytes: Vec<u8>,
    pub resized: bool,
}

/// Downscale PNG/JPEG images whose longest edge exceeds `max_dimension`,
/// re-encoding them as PNG. Everything else (and anything that fails to
/// decode) passes through untouched.
pub fn prepare_image(bytes: &[u8], max_dimension: u32) -> PreparedImage {
    let mime = detect_image_mime(bytes);
    let passthrough = || PreparedImage {
        mime,
        bytes: bytes.to_vec(),
        resized: false,
    };

    if mime != "image/png" && mime != "image/jpeg" {
        return passthrough();
    }

    let img = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(e) => {
            warn!(error = %e, "Image could not be decoded; sending original bytes");
            return passthrough();
        }
    };

    if img.width().max(img.height()) <= max_dimension {
        return passthrough();
    }

    let resized = img.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    let mut buf = Vec::new();
    if let Err(e) = resized.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png) {
        warn!(error = %e, "Re-encoding resized image failed; sending original bytes");
        return passthrough();
    }

    debug!(
        from = %format!("{}x{}", img.width(), img.height()),
        to = %format!("{}x{}", resized.width(), resized.height()),
        bytes = buf.len(),
        "Downscaled image for OCR"
    );
    PreparedImage {
        mime: "image/png",
        bytes: buf,
        resized: true,
    }
}

/// Base64 payload for the vision API. `detail: "high"` keeps fine print
/// legible on tiled models.
pub fn encode_image(prepared: &PreparedImage) -> ImageData {
    let b64 = STANDARD.encode(&prepared.bytes);
    debug!(mime = prepared.mime, base64_len = b64.len(), "Encoded image");
    ImageData::new(b64, prepared.mime).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("encode png");
        buf
    }

    #[test]
    fn sniffs_every_known_signature() {
        assert_eq!(detect_image_mime(&png(1, 1)), "image/png");
        assert_eq!(detect_image_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(detect_image_mime(b"GIF89a"), "image/gif");
        assert_eq!(detect_image_mime(b"BM\0\0"), "image/bmp");
        assert_eq!(detect_image_mime(b"II*\0"), "image/tiff");
        assert_eq!(detect_image_mime(b"MM\0*"), "image/tiff");
        assert_eq!(detect_image_mime(b"RIFF\x10\0\0\0WEBPVP8 "), "image/webp");
    }

    #[test]
    fn unknown_signature_defaults_to_png() {
        assert_eq!(detect_image_mime(b"????"), "image/png");
        assert_eq!(detect_image_mime(&[]), "image/png");
        // RIFF but not WEBP (e.g. WAV)
        assert_eq!(detect_image_mime(b"RIFF\0\0\0\0WAVE"), "image/png");
    }

    #[test]
    fn large_png_is_downscaled() {
        let prepared = prepare_image(&png(400, 100), 200);
        assert!(prepared.resized);
        let img = image::load_from_memory(&prepared.bytes).unwrap();
        assert_eq!(img.width(), 200);
        assert_eq!(img.height(), 50);
    }

    #[test]
    fn small_png_passes_through() {
        let bytes = png(20, 20);
        let prepared = prepare_image(&bytes, 200);
        assert!(!prepared.resized);
        assert_eq!(prepared.bytes, bytes);
    }

    #[test]
    fn undecodable_bytes_pass_through() {
        let prepared = prepare_image(&[0x89, 0x50, 0x4E, 0x47, 1, 2, 3], 10);
        assert!(!prepared.resized);
        assert_eq!(prepared.mime, "image/png");
    }

    #[test]
    fn encoded_image_is_a_high_detail_data_uri() {
        let prepared = PreparedImage {
            mime: "image/gif",
            bytes: b"hi".to_vec(),
            resized: false,
        };
        let data = encode_image(&prepared);
        assert_eq!(data.to_data_uri(), "data:image/gif;base64,aGk=");
        assert_eq!(data.detail.as_deref(), Some("high"));
    }
}
