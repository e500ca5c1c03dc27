//! Clipboard image normalization
//!
//! Decodes raw clipboard image data and produces two JPEG renditions:
//! a "full" one capped at 1440 px on the longest side and a 256 px
//! thumbnail. Images are only ever scaled down.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::thread;
use tracing::{debug, warn};

use super::types::{EncodedImage, ImagePayload};

/// Longest side of the full rendition, in pixels
pub const FULL_MAX_DIMENSION: u32 = 1440;
/// Longest side of the thumbnail rendition, in pixels
pub const THUMBNAIL_MAX_DIMENSION: u32 = 256;
pub const FULL_JPEG_QUALITY: u8 = 85;
pub const THUMBNAIL_JPEG_QUALITY: u8 = 70;

/// Decode `bytes` (any supported raster format) and build both renditions.
pub fn normalize(bytes: &[u8]) -> Result<ImagePayload> {
    let decoded = image::load_from_memory(bytes).context("Failed to decode clipboard image")?;
    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        anyhow::bail!("Clipboard image has no pixels ({}x{})", width, height);
    }

    let full = encode_rendition(&decoded, FULL_MAX_DIMENSION, FULL_JPEG_QUALITY)
        .context("Failed to encode full-size rendition")?;
    let thumbnail = encode_rendition(&decoded, THUMBNAIL_MAX_DIMENSION, THUMBNAIL_JPEG_QUALITY)
        .context("Failed to encode thumbnail")?;

    debug!(
        source_width = width,
        source_height = height,
        full_bytes = full.bytes.len(),
        thumbnail_bytes = thumbnail.bytes.len(),
        "Normalized clipboard image"
    );

    Ok(ImagePayload { full, thumbnail })
}

/// Run `normalize` on a short-lived worker thread and hand the result to
/// `on_done` from that thread. Returns an error only if the thread could not
/// be spawned.
pub fn spawn_normalize<F>(bytes: Vec<u8>, on_done: F) -> Result<()>
where
    F: FnOnce(Result<ImagePayload>) + Send + 'static,
{
    thread::Builder::new()
        .name("clipboard-image-normalize".to_string())
        .spawn(move || {
            let result = normalize(&bytes);
            if let Err(e) = &result {
                warn!(error = %format!("{:#}", e), size = bytes.len(), "Image normalization failed");
            }
            on_done(result);
        })
        .context("Failed to spawn image normalization thread")?;
    Ok(())
}

/// Target size for an image bounded by `max_dimension` on its longest side.
/// Aspect ratio is preserved and the scale never exceeds 1.0.
pub fn scaled_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }
    let scale = max_dimension as f64 / longest as f64;
    let scaled = |side: u32| ((side as f64 * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

fn encode_rendition(source: &DynamicImage, max_dimension: u32, quality: u8) -> Result<EncodedImage> {
    let (width, height) = scaled_dimensions(source.width(), source.height(), max_dimension);
    let resized;
    let image = if (width, height) == (source.width(), source.height()) {
        source
    } else {
        resized = source.resize_exact(width, height, FilterType::Lanczos3);
        &resized
    };

    // JPEG has no alpha channel
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .context("JPEG encoding failed")?;

    Ok(EncodedImage {
        bytes,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_scaled_dimensions_never_upscale() {
        assert_eq!(scaled_dimensions(100, 50, 256), (100, 50));
        assert_eq!(scaled_dimensions(256, 256, 256), (256, 256));
    }

    #[test]
    fn test_scaled_dimensions_preserve_aspect_ratio() {
        assert_eq!(scaled_dimensions(2880, 1800, 1440), (1440, 900));
        assert_eq!(scaled_dimensions(1000, 4000, 256), (64, 256));
        // Extreme aspect ratios keep at least one pixel
        assert_eq!(scaled_dimensions(10_000, 1, 256), (256, 1));
    }

    #[test]
    fn test_normalize_large_image() {
        let payload = normalize(&png_bytes(2000, 1000)).unwrap();
        assert_eq!((payload.full.width, payload.full.height), (1440, 720));
        assert_eq!((payload.thumbnail.width, payload.thumbnail.height), (256, 128));
        assert_eq!(
            image::guess_format(&payload.full.bytes).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_normalize_small_image_is_stable() {
        let first = normalize(&png_bytes(40, 30)).unwrap();
        assert_eq!((first.full.width, first.full.height), (40, 30));
        assert_eq!((first.thumbnail.width, first.thumbnail.height), (40, 30));

        let second = normalize(&first.full.bytes).unwrap();
        assert_eq!((second.full.width, second.full.height), (40, 30));
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize(b"definitely not an image").is_err());
    }

    #[test]
    fn test_spawn_normalize_delivers_result() {
        let (tx, rx) = channel();
        spawn_normalize(png_bytes(8, 8), move |result| {
            let _ = tx.send(result.is_ok());
        })
        .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(10)).unwrap());
    }
}
