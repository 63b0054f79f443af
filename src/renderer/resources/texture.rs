use std::path::Path;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;

/// A sampled image living in device memory. The image itself is owned by the main deletion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}

/// Tightly packed RGBA8 pixels
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected || expected == 0 {
            return Err(eyre!(
                "{}x{} RGBA8 image needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len(),
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_image(image: &image::DynamicImage) -> Result<Self> {
        Self::new(image.width(), image.height(), image.to_rgba8().into_raw())
    }

    /// Decodes any supported format from disk into RGBA8
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)?;
        Self::from_image(&image)
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoded_images_are_rgba8() {
        let rgb = image::DynamicImage::ImageRgb8(image::RgbImage::new(3, 2));
        let decoded = DecodedImage::from_image(&rgb).unwrap();
        assert_eq!(decoded.pixels.len(), 3 * 2 * 4);
        assert_eq!(decoded.extent(), vk::Extent2D { width: 3, height: 2 });
    }

    #[test]
    fn mismatched_pixel_count_is_rejected() {
        assert!(DecodedImage::new(2, 2, vec![0; 15]).is_err());
        assert!(DecodedImage::new(0, 0, Vec::new()).is_err());
    }
}
