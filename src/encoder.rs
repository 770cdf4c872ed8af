//! RGBA/BGRA frame to JPEG conversion

use crate::errors::StreamError;
use crate::types::{EncodedFrame, FrameSample, PixelLayout};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage, RgbaImage};

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Turns a raw frame sample into upload-ready bytes
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, sample: &FrameSample) -> Result<EncodedFrame, StreamError>;
}

/// Encodes frame samples as baseline JPEG at a fixed quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl JpegFrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl FrameEncoder for JpegFrameEncoder {
    /// Drop the alpha channel and compress.
    ///
    /// Bytes past `width * height * 4` are ignored; a shorter buffer or a zero
    /// dimension is an `EncodeError`.
    fn encode(&self, sample: &FrameSample) -> Result<EncodedFrame, StreamError> {
        if sample.width == 0 || sample.height == 0 {
            return Err(StreamError::EncodeError(format!(
                "Empty frame dimensions {}x{}",
                sample.width, sample.height
            )));
        }

        let expected = sample.expected_len();
        if sample.pixels.len() < expected {
            return Err(StreamError::EncodeError(format!(
                "Pixel buffer too short: expected {} bytes for {}x{}, got {}",
                expected,
                sample.width,
                sample.height,
                sample.pixels.len()
            )));
        }

        let rgb = to_rgb(sample, expected)?;

        let mut data = Vec::with_capacity(expected / 10);
        let mut encoder = JpegEncoder::new_with_quality(&mut data, self.quality);
        encoder
            .encode_image(&rgb)
            .map_err(|e| StreamError::EncodeError(format!("JPEG encoding failed: {}", e)))?;

        Ok(EncodedFrame {
            data: Bytes::from(data),
            width: sample.width,
            height: sample.height,
            quality: self.quality,
        })
    }
}

fn to_rgb(sample: &FrameSample, len: usize) -> Result<RgbImage, StreamError> {
    let pixels = &sample.pixels[..len];
    match sample.layout {
        PixelLayout::Rgba8 => {
            let rgba = RgbaImage::from_raw(sample.width, sample.height, pixels.to_vec())
                .ok_or_else(|| {
                    StreamError::EncodeError("Failed to create image from frame data".to_string())
                })?;
            Ok(DynamicImage::ImageRgba8(rgba).into_rgb8())
        }
        PixelLayout::Bgra8 => {
            let mut rgb = Vec::with_capacity(len / 4 * 3);
            for px in pixels.chunks_exact(4) {
                rgb.extend_from_slice(&[px[2], px[1], px[0]]);
            }
            RgbImage::from_raw(sample.width, sample.height, rgb).ok_or_else(|| {
                StreamError::EncodeError("Failed to create image from frame data".to_string())
            })
        }
    }
}
