//! Texture pixel data and the image-decoding seam used by the renderer.

use std::path::Path;

use corelib::{CoreError, CoreResult};

/// Texture data in CPU-friendly format before GPU upload.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Supported texture formats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextureFormat {
    Rgba8,
}

impl TextureData {
    /// Wrap RGBA8 pixels; fails if the byte count does not match the size.
    pub fn new_rgba8(width: u32, height: u32, data: Vec<u8>) -> CoreResult<Self> {
        let texture = Self {
            data,
            width,
            height,
            format: TextureFormat::Rgba8,
        };
        if !texture.is_valid() {
            return Err(CoreError::Gpu(format!(
                "{} bytes do not describe a {}x{} RGBA8 image",
                texture.data.len(),
                width,
                height
            )));
        }
        Ok(texture)
    }

    /// 1x1 texture of a single color.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            data: rgba.to_vec(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8,
        }
    }

    /// Get the number of bytes per pixel for the format.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self.format {
            TextureFormat::Rgba8 => 4,
        }
    }

    /// Check if the texture data is valid.
    pub fn is_valid(&self) -> bool {
        let expected_size =
            self.width as usize * self.height as usize * self.bytes_per_pixel() as usize;
        self.data.len() == expected_size && self.width > 0 && self.height > 0
    }
}

/// Turns an image file into RGBA8 pixels.
pub trait ImageDecoder: Send {
    fn decode(&self, path: &Path) -> CoreResult<TextureData>;
}

/// Decoder backed by the `image` crate (PNG and JPEG).
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageFileDecoder;

impl ImageDecoder for ImageFileDecoder {
    fn decode(&self, path: &Path) -> CoreResult<TextureData> {
        log::info!("Loading texture from {:?}", path);

        let img = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                CoreError::FileNotFound {
                    path: path.to_path_buf(),
                }
            }
            other => CoreError::TextureDecode {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let data = rgba.into_raw();

        log::info!("Loaded texture {}x{} with {} bytes", width, height, data.len());

        TextureData::new_rgba8(width, height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_mismatch_is_rejected() {
        assert!(TextureData::new_rgba8(2, 2, vec![0; 15]).is_err());
        assert!(TextureData::new_rgba8(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn solid_texture_is_valid() {
        let tex = TextureData::solid([255, 255, 255, 255]);
        assert!(tex.is_valid());
        assert_eq!(tex.bytes_per_pixel(), 4);
    }

    #[test]
    fn decoding_missing_file_fails() {
        let err = ImageFileDecoder
            .decode(Path::new("/definitely/not/here.png"))
            .unwrap_err();
        assert!(matches!(err, CoreError::FileNotFound { .. }));
    }

    #[test]
    fn decoding_garbage_is_decode_error() {
        let path = std::env::temp_dir().join(format!("asset-tex-{}.png", std::process::id()));
        std::fs::write(&path, b"not a png").unwrap();
        let err = ImageFileDecoder.decode(&path).unwrap_err();
        assert!(matches!(err, CoreError::TextureDecode { .. }));
        std::fs::remove_file(&path).ok();
    }
}
