//! Image normalizer for attachments and stickers.
//!
//! Images are downscaled to fit a 512px box, transparency is flattened onto
//! white, and the result is re-encoded as base64 JPEG.

use crate::chat::EncodedImage;
use crate::config::{IMAGE_MAX_SIDE, MAX_IMAGES};
use anyhow::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba};
use reqwest::Client as HttpClient;
use std::io::Cursor;
use tracing::{debug, warn};

/// Attachment extensions treated as images
pub const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif"];

/// Whether an attachment filename looks like a supported image
#[must_use]
pub fn is_supported_image(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Candidate image URLs: qualifying attachments first, then stickers
#[must_use]
pub fn select_image_sources<'a>(
    attachments: impl IntoIterator<Item = (&'a str, &'a str)>,
    sticker_urls: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    attachments
        .into_iter()
        .filter(|(filename, _)| is_supported_image(filename))
        .map(|(_, url)| url)
        .chain(sticker_urls)
        .map(str::to_string)
        .collect()
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = u16::from(a);
        let blend = |c: u8| {
            let mixed = (u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255;
            u8::try_from(mixed).unwrap_or(u8::MAX)
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Decode, downscale, flatten and re-encode one image
///
/// # Errors
///
/// Returns an error if the bytes are not a decodable image or JPEG encoding fails.
pub fn normalize_image(bytes: &[u8]) -> Result<EncodedImage> {
    let mut image = image::load_from_memory(bytes)?;
    if image.width() > IMAGE_MAX_SIDE || image.height() > IMAGE_MAX_SIDE {
        image = image.resize(IMAGE_MAX_SIDE, IMAGE_MAX_SIDE, FilterType::Lanczos3);
    }

    let flattened = DynamicImage::ImageRgb8(flatten_onto_white(&image));
    let mut jpeg = Cursor::new(Vec::new());
    flattened.write_to(&mut jpeg, ImageFormat::Jpeg)?;

    Ok(EncodedImage::from_base64(BASE64.encode(jpeg.into_inner())))
}

/// Fetches and normalizes up to [`MAX_IMAGES`] images per message
pub struct ImageNormalizer {
    http: HttpClient,
}

impl ImageNormalizer {
    /// Create a normalizer using `http` for downloads
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Normalize sources in order until [`MAX_IMAGES`] succeed.
    ///
    /// Sources that fail to download or decode are skipped.
    pub async fn load(&self, sources: &[String]) -> Vec<EncodedImage> {
        let mut images = Vec::with_capacity(MAX_IMAGES);
        for url in sources {
            if images.len() >= MAX_IMAGES {
                break;
            }
            match self.load_one(url).await {
                Ok(image) => images.push(image),
                Err(e) => warn!(url = %url, error = %e, "Skipping image"),
            }
        }
        debug!(count = images.len(), "Images normalized");
        images
    }

    async fn load_one(&self, url: &str) -> Result<EncodedImage> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::task::spawn_blocking(move || normalize_image(&bytes)).await?
    }
}
