//! Image handling.
//!
//! This module provides:
//!
//! - The [`Image`] type, an owned RGBA image that video frames are delivered in.
//! - [`Resolution`] and [`Color`].
//! - A variety of [`draw`] functions used to annotate frames.

pub mod draw;

use std::{fmt, path::Path};

use anyhow::Context;
use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{ImageBuffer, Rgba, RgbaImage};

#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => anyhow::bail!(
                "invalid image path '{}' (must have one of the supported extensions)",
                path.display()
            ),
        }
    }
}

/// Returns whether `path` has an extension that [`Image::load`] understands.
pub fn is_supported_path(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok()
}

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone, PartialEq)]
pub struct Image {
    pub(crate) buf: RgbaImage,
}

impl Image {
    /// Loads an image from the filesystem.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let format = ImageFormat::from_path(path)?;
        let data =
            std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
        match format {
            ImageFormat::Jpeg => Self::decode_jpeg(&data),
            ImageFormat::Png => {
                let buf =
                    image::load_from_memory_with_format(&data, image::ImageFormat::Png)?.to_rgba8();
                Ok(Self { buf })
            }
        }
    }

    /// Decodes a JFIF JPEG or Motion JPEG from a byte slice.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        let buf = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8();
        Ok(Self { buf })
    }

    /// Saves an image to the file system.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        self.save_impl(path.as_ref())
    }

    fn save_impl(&self, path: &Path) -> anyhow::Result<()> {
        match ImageFormat::from_path(path)? {
            // JPEG has no alpha channel.
            ImageFormat::Jpeg => Ok(image::DynamicImage::ImageRgba8(self.buf.clone())
                .to_rgb8()
                .save(path)?),
            ImageFormat::Png => Ok(self.buf.save(path)?),
        }
    }

    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf[(x, y)] = Rgba(color.0);
    }

    /// Mirrors the image along its vertical axis.
    pub fn flip_horizontal_in_place(&mut self) {
        image::imageops::flip_horizontal_in_place(&mut self.buf);
    }

    /// Clears the image, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    /// Returns the raw RGBA pixel data, row by row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}

/// Resolution (`width x height`) of an image, camera, or display.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// VGA resolution: `640x480`
    pub const RES_VGA: Self = Self {
        width: 640,
        height: 480,
    };

    /// Creates a new [`Resolution`] of `width x height`.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the width of this [`Resolution`].
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of this [`Resolution`].
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Converts normalized coordinates (`0.0..=1.0` on both axes) to pixel coordinates.
    ///
    /// The result is clamped like in [`Resolution::clamp_pixel`].
    pub fn to_pixel(&self, x: f32, y: f32) -> (i32, i32) {
        self.clamp_pixel(x * self.width as f32, y * self.height as f32)
    }

    /// Converts pixel coordinates to integers, clamping them to at most one image size outside
    /// of the image on each side.
    ///
    /// NaN is mapped to the lower bound, off the image. The result can be offset by small
    /// amounts and drawn without overflowing.
    pub fn clamp_pixel(&self, x: f32, y: f32) -> (i32, i32) {
        fn clamp(v: f32, size: u32) -> i32 {
            let size = size as f32;
            if v.is_nan() {
                return -size as i32;
            }
            v.clamp(-size, 2.0 * size) as i32
        }
        (clamp(x, self.width), clamp(y, self.height))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An 8-bit RGBA color.
///
/// Colors are always in the sRGB color space and use non-premultiplied alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Fully transparent black (all components are 0).
    pub const NULL: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);
    pub const YELLOW: Self = Self([255, 255, 0, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }

    pub fn with_alpha(mut self, a: u8) -> Color {
        self.0[3] = a;
        self
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a(),
        )
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use Color as C;

    fn mkimage<const W: usize, const H: usize>(data: [[Color; W]; H]) -> Image {
        let mut image = Image::new(W as u32, H as u32);
        for (y, row) in data.into_iter().enumerate() {
            for (x, color) in row.into_iter().enumerate() {
                image.set(x as u32, y as u32, color);
            }
        }
        image
    }

    #[test]
    fn flip_horizontal() {
        #[rustfmt::skip]
        let image = mkimage([
            [C::RED, C::GREEN, C::BLUE],
            [C::WHITE, C::BLACK, C::YELLOW],
        ]);

        let mut flipped = image.clone();
        flipped.flip_horizontal_in_place();
        assert_eq!(flipped.get(0, 0), C::BLUE);
        assert_eq!(flipped.get(1, 0), C::GREEN);
        assert_eq!(flipped.get(2, 0), C::RED);
        assert_eq!(flipped.get(0, 1), C::YELLOW);
        assert_eq!(flipped.get(2, 1), C::WHITE);

        flipped.flip_horizontal_in_place();
        assert_eq!(flipped, image);
    }

    #[test]
    fn clear() {
        let mut image = Image::new(4, 3);
        assert_eq!(image.get(3, 2), C::NULL);
        image.clear(C::YELLOW);
        for y in 0..3 {
            for x in 0..4 {
                assert_eq!(image.get(x, y), C::YELLOW);
            }
        }
        assert_eq!(image.data().len(), 4 * 3 * 4);
    }

    #[test]
    fn resolution() {
        let res = Resolution::RES_VGA;
        assert_eq!(res.to_string(), "640x480");
        assert_eq!(res.num_pixels(), 640 * 480);
        assert_eq!(res.to_pixel(0.5, 0.25), (320, 120));
        assert_eq!(res.to_pixel(0.0, 1.0), (0, 480));
    }

    #[test]
    fn out_of_range_pixels_are_clamped() {
        let res = Resolution::new(64, 48);
        assert_eq!(res.to_pixel(f32::INFINITY, 0.5), (128, 24));
        assert_eq!(res.to_pixel(-1e12, -1e12), (-64, -48));
        assert_eq!(res.to_pixel(f32::NAN, f32::NEG_INFINITY), (-64, -48));
        assert_eq!(res.clamp_pixel(1e9, 10.7), (128, 10));
        assert_eq!(res.clamp_pixel(f32::NAN, 96.0), (-64, 96));
    }

    #[test]
    fn color_debug() {
        assert_eq!(format!("{:?}", C::YELLOW), "#ffff00ff");
        assert_eq!(format!("{:?}", C::RED.with_alpha(0x80)), "#ff000080");
    }

    #[test]
    fn supported_paths() {
        assert!(is_supported_path(Path::new("frame.png")));
        assert!(is_supported_path(Path::new("frame.JPG")));
        assert!(!is_supported_path(Path::new("frame.bmp")));
        assert!(!is_supported_path(Path::new("frames")));
    }

    #[test]
    fn save_and_load_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let mut image = Image::new(2, 2);
        image.clear(C::GREEN);
        image.set(1, 1, C::RED);
        image.save(&path).unwrap();

        let loaded = Image::load(&path).unwrap();
        assert_eq!(loaded, image);
    }
}
