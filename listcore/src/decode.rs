//! Decoded image buffers, cache entries and the decode step of the image
//! pipeline.
//!
//! All budget accounting uses `width * height * 4`, whatever the source
//! encoding was.

use crate::error::{ImageError, Result};
use crate::net::HttpRequest;
use ::image::imageops::FilterType;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bytes per decoded pixel (RGBA8).
pub const BYTES_PER_PIXEL: u64 = 4;

/// Entries older than this are stale regardless of how often they are used.
pub const DEFAULT_IMAGE_TTL: Duration = Duration::from_secs(60 * 60);

/// Largest edge kept after decoding; bigger images are downscaled.
pub const DEFAULT_MAX_DECODE_DIMENSION: u32 = 2048;

/// Budget estimate for a `width` x `height` image.
pub fn estimate_bytes(width: u32, height: u32) -> u64 {
    u64::from(width) * u64::from(height) * BYTES_PER_PIXEL
}

/// An RGBA8 pixel buffer ready for display.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels", &format_args!("<{} bytes>", self.pixels.len()))
            .finish()
    }
}

impl DecodedImage {
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// The 1x1 transparent image shown in place of a failed load.
    pub fn placeholder() -> Self {
        Self::from_rgba(1, 1, vec![0; BYTES_PER_PIXEL as usize])
    }

    pub fn estimated_bytes(&self) -> u64 {
        estimate_bytes(self.width, self.height)
    }
}

/// Where to fetch an image from. The uri doubles as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRequest {
    pub uri: String,
    pub headers: BTreeMap<String, String>,
}

impl ImageRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.uri
    }

    pub fn to_http(&self) -> HttpRequest {
        HttpRequest::get(self.uri.clone()).with_headers(self.headers.clone())
    }
}

/// A cached decode result with its bookkeeping.
#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub image: Arc<DecodedImage>,
    pub size_bytes: u64,
    pub created_at: Instant,
    pub last_accessed: Instant,
}

impl ImageEntry {
    pub fn new(image: Arc<DecodedImage>, now: Instant) -> Self {
        Self {
            size_bytes: image.estimated_bytes(),
            image,
            created_at: now,
            last_accessed: now,
        }
    }

    /// Whether the entry outlived `ttl`. Access does not extend the lifetime.
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_accessed = now;
    }
}

/// Decode `bytes` into RGBA8, downscaling so neither edge exceeds
/// `max_dimension` (aspect ratio preserved).
pub fn decode_image(bytes: &[u8], max_dimension: u32) -> Result<DecodedImage> {
    if bytes.is_empty() {
        return Err(ImageError::EmptyBody);
    }
    let mut decoded =
        ::image::load_from_memory(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;

    let max_dimension = max_dimension.max(1);
    if decoded.width() > max_dimension || decoded.height() > max_dimension {
        log::debug!(
            target: "ChatList/ImageCache",
            "Downscaling {}x{} image to fit {max_dimension}px",
            decoded.width(),
            decoded.height()
        );
        decoded = decoded.resize(max_dimension, max_dimension, FilterType::Triangle);
    }

    let rgba = decoded.into_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage::from_rgba(width, height, rgba.into_raw()))
}
