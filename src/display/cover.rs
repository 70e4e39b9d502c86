use super::RatatuiImage;
use crate::cache::ImageCache;
use anyhow::{anyhow, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgba};
use log::{debug, warn};
use std::time::Duration;

/// Edge length of the rendered cover, in image pixels.
pub const COVER_SIZE: u32 = 16;

#[derive(Clone)]
pub struct CoverArtClient {
    client: reqwest::Client,
    cache: Option<ImageCache>,
    size: u32,
}

impl Default for CoverArtClient {
    fn default() -> Self {
        Self::new(COVER_SIZE)
    }
}

impl CoverArtClient {
    pub fn new(size: u32) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("tracklist/0.1.0")
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        // Without a cache we just download every time
        let cache = ImageCache::new()
            .map_err(|e| warn!("Cover cache disabled - {e}"))
            .ok();

        Self {
            client,
            cache,
            size,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<RatatuiImage> {
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(url)) {
            debug!("Cover cache hit for {url}");
            return Ok(cached);
        }

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("Cover download failed: {}", response.status()));
        }
        let bytes = response.bytes().await?;

        let img = image::load_from_memory(&bytes)?;
        let cover = to_ratatui_image(&img, self.size);

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(url, &cover) {
                warn!("Failed to cache cover: {e}");
            }
        }

        Ok(cover)
    }
}

pub fn to_ratatui_image(img: &DynamicImage, size: u32) -> RatatuiImage {
    let resized = img.resize_exact(size, size, FilterType::Lanczos3);
    let (width, height) = resized.dimensions();

    let pixels = (0..height)
        .map(|y| {
            (0..width)
                .map(|x| {
                    let Rgba([r, g, b, _]) = resized.get_pixel(x, y);
                    (r, g, b)
                })
                .collect()
        })
        .collect();

    RatatuiImage { pixels }
}
