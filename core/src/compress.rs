/// Image compressor: bound the size of user images before hosting or inline preview
use crate::config::Config;
use crate::error::{LetterError, Result};
use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressOptions {
    /// Longest side after compression; smaller images are never upscaled
    pub max_dimension: u32,
    /// 1..=100
    pub jpeg_quality: u8,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            max_dimension: 800,
            jpeg_quality: 70,
        }
    }
}

impl CompressOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_dimension: config.image_max_dimension.max(1),
            jpeg_quality: config.image_jpeg_quality.clamp(1, 100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

impl CompressedImage {
    pub fn to_data_url(&self) -> String {
        to_data_url(self.mime, &self.bytes)
    }
}

pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}

/// Split a `data:<mime>;base64,<payload>` URL back into mime type and bytes.
pub fn parse_data_url(data_url: &str) -> Option<(String, Vec<u8>)> {
    let rest = data_url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let bytes = general_purpose::STANDARD.decode(payload.trim()).ok()?;
    Some((mime.to_string(), bytes))
}

/// Best-effort mime type for raw image bytes (used when compression is skipped).
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(format) => format.to_mime_type(),
        Err(_) => "application/octet-stream",
    }
}

/// Decode, downsample to fit `max_dimension`, and re-encode.
/// Opaque images become JPEG; images with an alpha channel stay PNG.
pub fn compress_image(bytes: &[u8], options: CompressOptions) -> Result<CompressedImage> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = img.dimensions();
    let max = options.max_dimension.max(1);

    let img = if width > max || height > max {
        img.resize(max, max, FilterType::Lanczos3)
    } else {
        img
    };
    let (out_w, out_h) = img.dimensions();

    let (encoded, mime) = if img.color().has_alpha() {
        (encode_png(&img)?, "image/png")
    } else {
        (encode_jpeg(&img, options.jpeg_quality)?, "image/jpeg")
    };

    debug!(
        "Compressed {}x{} ({} bytes) -> {}x{} {} ({} bytes)",
        width,
        height,
        bytes.len(),
        out_w,
        out_h,
        mime,
        encoded.len()
    );

    Ok(CompressedImage {
        bytes: encoded,
        mime,
        width: out_w,
        height: out_h,
    })
}

/// Compression on the blocking pool so the editing session stays responsive.
pub async fn compress_image_async(bytes: Vec<u8>, options: CompressOptions) -> Result<CompressedImage> {
    tokio::task::spawn_blocking(move || compress_image(&bytes, options))
        .await
        .map_err(|e| LetterError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let rgb = img.to_rgb8();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(&rgb)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_large_opaque_image_is_downscaled_to_jpeg() {
        let img = RgbImage::from_fn(1600, 400, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let compressed = compress_image(&png_bytes(DynamicImage::ImageRgb8(img)), CompressOptions::default()).unwrap();

        assert_eq!(compressed.mime, "image/jpeg");
        assert_eq!((compressed.width, compressed.height), (800, 200));
        assert_eq!(image::guess_format(&compressed.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_small_transparent_image_keeps_size_and_alpha() {
        let img = RgbaImage::from_pixel(40, 30, Rgba([255, 0, 0, 90]));
        let compressed = compress_image(&png_bytes(DynamicImage::ImageRgba8(img)), CompressOptions::default()).unwrap();

        assert_eq!(compressed.mime, "image/png");
        assert_eq!((compressed.width, compressed.height), (40, 30));
        let decoded = image::load_from_memory(&compressed.bytes).unwrap();
        assert!(decoded.color().has_alpha());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(matches!(
            compress_image(b"definitely not an image", CompressOptions::default()),
            Err(LetterError::Image(_))
        ));
    }

    #[test]
    fn test_data_url_helpers() {
        let url = to_data_url("image/png", &[1, 2, 3, 4]);
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(parse_data_url(&url), Some(("image/png".to_string(), vec![1, 2, 3, 4])));
        assert_eq!(parse_data_url("https://x.example/a.png"), None);
        assert_eq!(sniff_mime(b"nope"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_compress_async() {
        let img = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        let compressed = compress_image_async(png_bytes(DynamicImage::ImageRgb8(img)), CompressOptions::default())
            .await
            .unwrap();
        assert_eq!(compressed.width, 10);
    }
}
