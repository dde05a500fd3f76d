use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use image::{imageops, Rgba, RgbaImage};

/// Shared, drawable RGBA image. Clones refer to the same pixels.
#[derive(Clone)]
pub struct ImageHandle {
    pixels: Rc<RefCell<RgbaImage>>,
}

impl ImageHandle {
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_image(RgbaImage::new(width, height))
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { pixels: Rc::new(RefCell::new(image)) }
    }

    pub fn width(&self) -> u32 {
        self.pixels.borrow().width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.borrow().height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.borrow().dimensions()
    }

    /// Composites `source` onto this image with its top-left corner at (`x`, `y`).
    /// Offsets are truncated towards negative infinity; out-of-bounds pixels are clipped.
    pub fn draw(&self, source: &ImageHandle, x: f64, y: f64) {
        let (x, y) = (x.floor() as i64, y.floor() as i64);
        if self.ptr_eq(source) {
            let copy = source.pixels.borrow().clone();
            imageops::overlay(&mut *self.pixels.borrow_mut(), &copy, x, y);
        } else {
            imageops::overlay(&mut *self.pixels.borrow_mut(), &*source.pixels.borrow(), x, y);
        }
    }

    pub fn fill(&self, color: [u8; 4]) {
        for pixel in self.pixels.borrow_mut().pixels_mut() {
            *pixel = Rgba(color);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let pixels = self.pixels.borrow();
        if x < pixels.width() && y < pixels.height() {
            Some(pixels.get_pixel(x, y).0)
        } else {
            None
        }
    }

    pub fn to_image(&self) -> RgbaImage {
        self.pixels.borrow().clone()
    }

    /// Identity comparison: true when both handles share the same pixel buffer.
    pub fn ptr_eq(&self, other: &ImageHandle) -> bool {
        Rc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        f.debug_struct("ImageHandle").field("width", &w).field("height", &h).finish()
    }
}

/// Path-keyed image cache. Entries are never invalidated or evicted.
pub struct AssetCache {
    root: PathBuf,
    images: HashMap<String, ImageHandle>,
}

impl AssetCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), images: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Returns the cached handle for `path`, decoding the file on first use.
    pub fn load_image(&mut self, path: &str) -> Result<ImageHandle> {
        if let Some(handle) = self.images.get(path) {
            return Ok(handle.clone());
        }
        let full_path = self.root.join(path);
        let bytes = std::fs::read(&full_path).with_context(|| format!("Reading image {}", full_path.display()))?;
        let decoded = image::load_from_memory(&bytes)
            .with_context(|| format!("Decoding image {}", full_path.display()))?
            .to_rgba8();
        let handle = ImageHandle::from_image(decoded);
        self.images.insert(path.to_string(), handle.clone());
        Ok(handle)
    }
}
