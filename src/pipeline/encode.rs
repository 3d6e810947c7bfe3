//! Image encoding: `DynamicImage` → PNG bytes → base64.
//!
//! Pages are always sent as lossless PNG.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Media type attached to every page image.
pub const PNG_MEDIA_TYPE: &str = "image/png";

/// PNG-encode a rasterised page.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} page → {} PNG bytes", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Standard (padded) base64, as expected by the Messages API `source.data` field.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let b64 = to_base64(&png);
        let decoded = STANDARD.decode(&b64).expect("valid base64");
        assert_eq!(decoded, png);
    }
}
