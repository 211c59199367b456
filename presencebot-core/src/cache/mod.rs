pub mod image_cache;

pub use image_cache::{ImageCache, ImageKey, DEFAULT_IMAGE_TTL};
