// SPDX-License-Identifier: GPL-3.0-only

//! Rendered frame to encoder pixel buffer conversion
//!
//! A [`FrameTexture`] is an owned handle to the pixels of one presented
//! frame: either CPU memory ([`CpuFrame`]) or a GPU readback staged at
//! presentation time ([`GpuReadback`](crate::gpu::GpuReadback)). The
//! [`FrameConverter`] copies it into a pool buffer in the writer's layout.

use super::destination::PixelFormat;
use super::pixel_pool::PixelBuffer;
use crate::errors::{RecordingError, RecordingResult};
use std::sync::Arc;

/// Source pixels for one video frame
pub trait FrameTexture: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> PixelFormat;

    /// Copy `height` rows of `width * 4` bytes into `dst`, one row every
    /// `bytes_per_row` bytes.
    fn read_into(&self, dst: &mut [u8], bytes_per_row: usize) -> Result<(), String>;
}

/// A frame held in CPU memory
#[derive(Debug, Clone)]
pub struct CpuFrame {
    width: u32,
    height: u32,
    bytes_per_row: usize,
    format: PixelFormat,
    data: Arc<[u8]>,
}

impl CpuFrame {
    /// Wrap existing pixel data, checking it covers every row
    pub fn new(
        width: u32,
        height: u32,
        bytes_per_row: usize,
        format: PixelFormat,
        data: impl Into<Arc<[u8]>>,
    ) -> Result<Self, String> {
        let data = data.into();
        let row_bytes = width as usize * PixelFormat::BYTES_PER_PIXEL;
        if bytes_per_row < row_bytes {
            return Err(format!(
                "Row stride {} is smaller than row width {}",
                bytes_per_row, row_bytes
            ));
        }
        let needed = required_len(height, bytes_per_row, row_bytes);
        if data.len() < needed {
            return Err(format!(
                "Frame data has {} bytes, {}x{} needs {}",
                data.len(),
                width,
                height,
                needed
            ));
        }
        Ok(Self {
            width,
            height,
            bytes_per_row,
            format,
            data,
        })
    }

    /// Wrap an RGBA image from the `image` crate
    pub fn from_rgba_image(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            bytes_per_row: width as usize * PixelFormat::BYTES_PER_PIXEL,
            format: PixelFormat::Rgba8,
            data: image.into_raw().into(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }
}

impl FrameTexture for CpuFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn read_into(&self, dst: &mut [u8], bytes_per_row: usize) -> Result<(), String> {
        copy_rows(
            &self.data,
            self.bytes_per_row,
            dst,
            bytes_per_row,
            self.width,
            self.height,
        )
    }
}

/// Copy rows between buffers with different strides
pub(crate) fn copy_rows(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    width: u32,
    height: u32,
) -> Result<(), String> {
    let row_bytes = width as usize * PixelFormat::BYTES_PER_PIXEL;
    if dst_stride < row_bytes || dst.len() < required_len(height, dst_stride, row_bytes) {
        return Err(format!(
            "Destination of {} bytes (stride {}) cannot hold {}x{}",
            dst.len(),
            dst_stride,
            width,
            height
        ));
    }
    if src.len() < required_len(height, src_stride, row_bytes) {
        return Err(format!("Source of {} bytes is truncated", src.len()));
    }

    if src_stride == dst_stride {
        let len = required_len(height, src_stride, row_bytes);
        dst[..len].copy_from_slice(&src[..len]);
        return Ok(());
    }

    for (src_row, dst_row) in src
        .chunks(src_stride)
        .zip(dst.chunks_mut(dst_stride))
        .take(height as usize)
    {
        dst_row[..row_bytes].copy_from_slice(&src_row[..row_bytes]);
    }
    Ok(())
}

fn required_len(height: u32, stride: usize, row_bytes: usize) -> usize {
    match height {
        0 => 0,
        h => stride * (h as usize - 1) + row_bytes,
    }
}

/// Copies frame textures into writer pixel buffers
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameConverter;

impl FrameConverter {
    pub fn new() -> Self {
        Self
    }

    /// Copy `texture` into `target`
    ///
    /// Sizes must match exactly; a mismatch is rejected instead of being
    /// cropped or scaled. The buffer is locked only for the copy.
    pub fn convert(
        &self,
        texture: &dyn FrameTexture,
        target: &mut PixelBuffer,
    ) -> RecordingResult<()> {
        let layout = target.layout();
        if texture.width() != layout.width || texture.height() != layout.height {
            return Err(RecordingError::ConversionFailure(format!(
                "Frame is {}x{} but the writer expects {}x{}",
                texture.width(),
                texture.height(),
                layout.width,
                layout.height
            )));
        }

        let mut lock = target.lock();
        let bytes_per_row = lock.bytes_per_row();
        texture
            .read_into(lock.data(), bytes_per_row)
            .map_err(RecordingError::ConversionFailure)?;

        if texture.format() != layout.format {
            swap_red_blue(lock.data(), bytes_per_row, layout.width, layout.height);
        }
        Ok(())
    }
}

/// RGBA <-> BGRA in place
fn swap_red_blue(data: &mut [u8], bytes_per_row: usize, width: u32, height: u32) {
    let row_bytes = width as usize * PixelFormat::BYTES_PER_PIXEL;
    for row in data.chunks_mut(bytes_per_row).take(height as usize) {
        for pixel in row[..row_bytes].chunks_exact_mut(PixelFormat::BYTES_PER_PIXEL) {
            pixel.swap(0, 2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::destination::PixelLayout;
    use crate::media::pixel_pool::PixelBufferPool;

    fn pool(width: u32, height: u32) -> PixelBufferPool {
        PixelBufferPool::new(PixelLayout::packed(width, height, PixelFormat::Bgra8), 1)
    }

    #[test]
    fn bgra_frame_copies_verbatim() {
        let data: Vec<u8> = (0..2 * 2 * 4).map(|i| i as u8).collect();
        let frame = CpuFrame::new(2, 2, 8, PixelFormat::Bgra8, data.clone()).unwrap();
        let pool = pool(2, 2);
        let mut buffer = pool.acquire().unwrap();

        FrameConverter::new().convert(&frame, &mut buffer).unwrap();
        assert_eq!(buffer.as_ref(), data.as_slice());
    }

    #[test]
    fn rgba_frame_is_swizzled() {
        let mut image = image::RgbaImage::new(1, 1);
        image.put_pixel(0, 0, image::Rgba([10, 20, 30, 255]));
        let frame = CpuFrame::from_rgba_image(image);
        let pool = pool(1, 1);
        let mut buffer = pool.acquire().unwrap();

        FrameConverter::new().convert(&frame, &mut buffer).unwrap();
        assert_eq!(buffer.as_ref(), &[30, 20, 10, 255]);
    }

    #[test]
    fn padded_rows_are_compacted() {
        // 1x2 frame with 4 bytes of padding per row
        let data = vec![1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8];
        let frame = CpuFrame::new(1, 2, 8, PixelFormat::Bgra8, data).unwrap();
        let pool = pool(1, 2);
        let mut buffer = pool.acquire().unwrap();

        FrameConverter::new().convert(&frame, &mut buffer).unwrap();
        assert_eq!(buffer.as_ref(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let frame = CpuFrame::new(4, 4, 16, PixelFormat::Bgra8, vec![0u8; 64]).unwrap();
        let pool = pool(2, 2);
        let mut buffer = pool.acquire().unwrap();

        let err = FrameConverter::new().convert(&frame, &mut buffer).unwrap_err();
        assert!(matches!(err, RecordingError::ConversionFailure(_)));
    }

    #[test]
    fn short_frame_data_is_rejected() {
        assert!(CpuFrame::new(2, 2, 8, PixelFormat::Bgra8, vec![0u8; 15]).is_err());
    }
}
