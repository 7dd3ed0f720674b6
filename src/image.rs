// SPDX-License-Identifier: MIT
//! Image specialization of the base container.
//!
//! Carries pixel geometry in an extended header and can export the payload
//! as PNM. Adds no storage rules of its own; everything goes through the
//! [`Container`] contract and the engine core treats the payload opaquely.

use std::path::Path;

use serde::Serialize;

use crate::container::Container;
use crate::error::{Error, Result};
use crate::format::{render_json, tags, BASE_HEADER_SIZE};
use crate::persist;

/// Serialized size of an image header: the base header plus
/// `[mode:u16][width:u16][height:u16][bpp:u16]`.
pub const IMAGE_HEADER_SIZE: usize = BASE_HEADER_SIZE + 8;

/// Pixel layout of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PixelMode {
    /// No data stored yet.
    None = 0,
    /// Single gray value per pixel, non-Bayer.
    Gray = 1,
    /// Bayer, first line G,R second B,G.
    Grbg = 2,
    /// Bayer, first line B,G second G,R.
    Bggr = 3,
    /// Three channels per pixel, R,G,B order.
    Rgb = 4,
    /// Three channels per pixel, B,G,R order.
    Bgr = 5,
    /// JPEG-compressed RGB.
    JpegRgb = 6,
    /// YCrCb in 4:2:2.
    Yuv422 = 7,
    /// Four channels per pixel, B,G,R,A order.
    Bgra = 8,
    /// YCrCb 4:2:2 with black at 16, white at 235.
    Bt601Yuv422 = 9,
    /// Bayer, first line R,G second G,B.
    Rggb = 10,
}

impl PixelMode {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(PixelMode::None),
            1 => Some(PixelMode::Gray),
            2 => Some(PixelMode::Grbg),
            3 => Some(PixelMode::Bggr),
            4 => Some(PixelMode::Rgb),
            5 => Some(PixelMode::Bgr),
            6 => Some(PixelMode::JpegRgb),
            7 => Some(PixelMode::Yuv422),
            8 => Some(PixelMode::Bgra),
            9 => Some(PixelMode::Bt601Yuv422),
            10 => Some(PixelMode::Rggb),
            _ => None,
        }
    }
}

/// A container whose payload is one image frame.
#[derive(Debug, Clone, Default)]
pub struct ImageContainer {
    inner: Container,
}

impl ImageContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow as a plain container: same arena, same header position.
    pub fn as_container(&self) -> &Container {
        &self.inner
    }

    /// Allocates for a `width` x `height` frame at `bpp` bits per pixel,
    /// rounded up to `block_size`. Returns the payload capacity.
    pub fn allocate(
        &mut self,
        width: u16,
        height: u16,
        bpp: u16,
        mode: PixelMode,
        block_size: usize,
    ) -> Result<usize> {
        let bits = usize::from(width) * usize::from(height) * usize::from(bpp);
        let payload_bytes = bits.div_ceil(8);
        let capacity = self
            .inner
            .allocate_with_header(payload_bytes, block_size, IMAGE_HEADER_SIZE)?;

        self.inner.set_type_tag(tags::IMAGE)?;
        let mut ext = [0u8; 8];
        ext[0..2].copy_from_slice(&(mode as u16).to_le_bytes());
        ext[2..4].copy_from_slice(&width.to_le_bytes());
        ext[4..6].copy_from_slice(&height.to_le_bytes());
        ext[6..8].copy_from_slice(&bpp.to_le_bytes());
        self.inner
            .arena()
            .write_at(self.inner.base() + BASE_HEADER_SIZE, &ext)?;
        Ok(capacity)
    }

    fn ext_field(&self, at: usize) -> Result<u16> {
        let mut raw = [0u8; 2];
        self.inner
            .arena()
            .read_at(self.inner.base() + BASE_HEADER_SIZE + at, &mut raw)?;
        Ok(u16::from_le_bytes(raw))
    }

    pub fn mode(&self) -> PixelMode {
        self.ext_field(0)
            .ok()
            .and_then(PixelMode::from_raw)
            .unwrap_or(PixelMode::None)
    }

    pub fn width(&self) -> u16 {
        self.ext_field(2).unwrap_or(0)
    }

    pub fn height(&self) -> u16 {
        self.ext_field(4).unwrap_or(0)
    }

    pub fn bpp(&self) -> u16 {
        self.ext_field(6).unwrap_or(0)
    }

    /// Copies `bytes` to the start of the pixel payload.
    pub fn write_pixels(&self, bytes: &[u8]) -> Result<()> {
        self.inner.write_payload(bytes)
    }

    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    pub fn set_id(&self, id: u64) -> Result<()> {
        self.inner.set_id(id)
    }

    pub fn size(&self) -> u64 {
        self.inner.size()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.inner.save(path)
    }

    /// Reinterprets a loaded container as an image after checking its type
    /// tag and header shape.
    pub fn from_container(container: Container) -> Result<Self> {
        let header = container
            .header()
            .ok_or_else(|| Error::InvalidFormat("container is not allocated".to_string()))?;
        header.validate()?;
        if header.type_tag != tags::IMAGE {
            return Err(Error::InvalidFormat(format!(
                "type tag {} is not an image container",
                header.type_tag
            )));
        }
        if header.header_size != IMAGE_HEADER_SIZE as u64 {
            return Err(Error::InvalidFormat(format!(
                "image header must be {IMAGE_HEADER_SIZE} bytes, found {}",
                header.header_size
            )));
        }
        Ok(Self { inner: container })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_container(Container::load(path)?)
    }

    /// Diagnostic JSON extended with the image geometry.
    pub fn to_json(&self, brackets: bool) -> String {
        let Some(header) = self.inner.header() else {
            return String::new();
        };
        render_json(
            &ImageInfo {
                id: header.id,
                type_tag: header.type_tag,
                size: header.total_size,
                offset: header.payload_offset,
                mode: self.mode() as u16,
                width: self.width(),
                height: self.height(),
                bpp: self.bpp(),
            },
            brackets,
        )
    }

    /// Exports the payload as PNM: P5 for 8-bit gray, P6 for 24-bit RGB.
    pub fn save_pnm<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let (magic, channels) = match self.mode() {
            PixelMode::Gray => ("P5", 1usize),
            PixelMode::Rgb => ("P6", 3usize),
            other => {
                return Err(Error::InvalidFormat(format!(
                    "pixel mode {other:?} has no PNM form"
                )))
            }
        };
        if usize::from(self.bpp()) != 8 * channels {
            return Err(Error::InvalidFormat(format!(
                "{} bits per pixel has no PNM form",
                self.bpp()
            )));
        }

        let pixels = self.inner.payload()?;
        let extent = usize::from(self.width()) * usize::from(self.height()) * channels;
        // The payload view includes alignment padding; export the frame only.
        if extent > pixels.len() {
            return Err(Error::InvalidFormat(
                "payload is shorter than the image extent".to_string(),
            ));
        }

        let mut out = format!("{magic}\n{} {}\n255\n", self.width(), self.height()).into_bytes();
        out.extend_from_slice(&pixels[..extent]);
        persist::write_file(path.as_ref(), &out)
    }
}

#[derive(Serialize)]
struct ImageInfo {
    id: u64,
    #[serde(rename = "type")]
    type_tag: u64,
    size: u64,
    offset: u64,
    mode: u16,
    width: u16,
    height: u16,
    bpp: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ContainerKind, BLOCK_SIZE_BYTE};

    #[test]
    fn test_allocate_records_geometry() {
        let mut image = ImageContainer::new();
        let capacity = image
            .allocate(4, 2, 8, PixelMode::Gray, BLOCK_SIZE_BYTE)
            .unwrap();

        assert_eq!(capacity, 8);
        assert_eq!(image.width(), 4);
        assert_eq!(image.height(), 2);
        assert_eq!(image.bpp(), 8);
        assert_eq!(image.mode(), PixelMode::Gray);
        assert_eq!(image.as_container().kind(), ContainerKind::Image);
        assert_eq!(image.size(), (IMAGE_HEADER_SIZE + 8) as u64);
    }

    #[test]
    fn test_sub_byte_modes_round_payload_up() {
        let mut image = ImageContainer::new();
        // 3x3 at 1 bpp is 9 bits, needing 2 bytes.
        let capacity = image
            .allocate(3, 3, 1, PixelMode::Gray, BLOCK_SIZE_BYTE)
            .unwrap();
        assert_eq!(capacity, 2);
    }

    #[test]
    fn test_image_inside_composite() {
        use crate::composite::CompositeContainer;

        let mut image = ImageContainer::new();
        image.allocate(2, 2, 8, PixelMode::Gray, BLOCK_SIZE_BYTE).unwrap();
        image.write_pixels(&[9, 8, 7, 6]).unwrap();

        let mut composite = CompositeContainer::new();
        composite.allocate_with_capacity(500, 4, BLOCK_SIZE_BYTE).unwrap();
        composite.add(image.as_container()).unwrap();

        let restored = ImageContainer::from_container(composite.get(0).unwrap()).unwrap();
        assert_eq!(restored.width(), 2);
        assert_eq!(restored.mode(), PixelMode::Gray);
        assert_eq!(&restored.inner.payload().unwrap()[..], &[9, 8, 7, 6]);
    }

    #[test]
    fn test_from_container_rejects_other_tags() {
        let mut plain = Container::new();
        plain.allocate(16, BLOCK_SIZE_BYTE).unwrap();
        assert!(matches!(
            ImageContainer::from_container(plain),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_save_pnm_gray() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.pgm");

        let mut image = ImageContainer::new();
        image.allocate(2, 2, 8, PixelMode::Gray, BLOCK_SIZE_BYTE).unwrap();
        image.write_pixels(&[10, 20, 30, 40]).unwrap();
        image.save_pnm(&path).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, b"P5\n2 2\n255\n\x0a\x14\x1e\x28");
    }

    #[test]
    fn test_save_pnm_rejects_bayer_modes() {
        let mut image = ImageContainer::new();
        image.allocate(2, 2, 8, PixelMode::Grbg, BLOCK_SIZE_BYTE).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            image.save_pnm(dir.path().join("frame.pnm")),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_image_json_includes_geometry() {
        let mut image = ImageContainer::new();
        image.allocate(4, 2, 8, PixelMode::Gray, BLOCK_SIZE_BYTE).unwrap();
        image.set_id(55).unwrap();

        let rendered = image.to_json(true);
        assert!(rendered.starts_with("{\"id\":55,\"type\":3,"));
        assert!(rendered.contains("\"mode\":1,\"width\":4,\"height\":2,\"bpp\":8"));
    }
}
