//! Image payload encoding

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbaImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("pixel buffer holds {got} bytes, {width}x{height} RGBA needs {expected}")]
    BufferSize {
        width: u32,
        height: u32,
        got: usize,
        expected: usize,
    },

    #[error("PNG encoding failed: {0}")]
    Png(#[from] image::ImageError),
}

/// PNG-encode an RGBA8 buffer and wrap it in standard base64
pub fn encode_png_base64(width: u32, height: u32, rgba: &[u8]) -> Result<String, EncodeError> {
    let expected = width as usize * height as usize * 4;
    let image = RgbaImage::from_raw(width, height, rgba.to_vec()).ok_or(EncodeError::BufferSize {
        width,
        height,
        got: rgba.len(),
        expected,
    })?;
    let mut png = std::io::Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png)?;
    Ok(STANDARD.encode(png.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_roundtrip() {
        let pixels: Vec<u8> = (0..4 * 3 * 4).map(|i| i as u8).collect();
        let encoded = encode_png_base64(4, 3, &pixels).unwrap();
        let png = STANDARD.decode(encoded).unwrap();
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.into_raw(), pixels);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let err = encode_png_base64(4, 4, &[0; 10]).unwrap_err();
        assert!(matches!(err, EncodeError::BufferSize { expected: 64, .. }));
    }
}
