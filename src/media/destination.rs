// SPDX-License-Identifier: GPL-3.0-only

//! Recording destination and the fixed encode profile

use crate::constants::{BitratePreset, encoding};
use std::fmt;
use std::path::{Path, PathBuf};

/// Byte order of a 4-byte-per-pixel image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra8,
    Rgba8,
}

impl PixelFormat {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// GStreamer video format name
    pub fn gst_name(&self) -> &'static str {
        match self {
            PixelFormat::Bgra8 => "BGRA",
            PixelFormat::Rgba8 => "RGBA",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.gst_name())
    }
}

/// Memory layout a writer expects for one video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: usize,
    pub format: PixelFormat,
}

impl PixelLayout {
    /// Tightly packed layout (no row padding)
    pub fn packed(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            bytes_per_row: width as usize * PixelFormat::BYTES_PER_PIXEL,
            format,
        }
    }

    /// Total bytes of one frame
    pub fn frame_size(&self) -> usize {
        self.bytes_per_row * self.height as usize
    }
}

/// Codec parameters shared by every recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeProfile {
    /// Expected source frame rate; frames still carry their own timestamps
    pub frame_rate_hint: u32,
    /// Target video bitrate
    pub video_bitrate_kbps: u32,
    /// Request H.264 High profile where the encoder allows it
    pub high_profile: bool,
    /// Audio channel count; only mono is supported
    pub audio_channels: u32,
    /// Audio sample rate, normally the microphone's native rate
    pub audio_sample_rate: u32,
    /// AAC bitrate in bits per second
    pub audio_bitrate: i32,
}

impl EncodeProfile {
    /// Profile for an output of the given pixel size
    pub fn for_output(width: u32, height: u32, preset: BitratePreset, sample_rate: u32) -> Self {
        Self {
            frame_rate_hint: encoding::FRAME_RATE_HINT,
            video_bitrate_kbps: preset.bitrate_kbps(width, height),
            high_profile: true,
            audio_channels: encoding::AUDIO_CHANNELS,
            audio_sample_rate: sample_rate,
            audio_bitrate: encoding::AUDIO_BITRATE,
        }
    }
}

/// Where and how a recording is written
///
/// Immutable once a session is built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDestination {
    path: PathBuf,
    width: u32,
    height: u32,
    profile: EncodeProfile,
}

impl MediaDestination {
    /// Destination sized in points and a display scale factor
    ///
    /// `360x640` points at scale 3 records `1080x1920` pixels. Odd pixel
    /// sizes are rounded down to even, which 4:2:0 encoders require.
    pub fn new(
        path: impl Into<PathBuf>,
        width_points: u32,
        height_points: u32,
        scale: u32,
        profile: EncodeProfile,
    ) -> Self {
        let (width, height) = Self::pixel_size(width_points, height_points, scale);
        Self {
            path: path.into(),
            width,
            height,
            profile,
        }
    }

    /// Pixel size for a point size at `scale`
    ///
    /// Saturates instead of overflowing; [`validate`](Self::validate)
    /// rejects anything above [`encoding::MAX_OUTPUT_EDGE`].
    pub fn pixel_size(width_points: u32, height_points: u32, scale: u32) -> (u32, u32) {
        let scale = scale.max(1);
        (
            width_points.saturating_mul(scale) & !1,
            height_points.saturating_mul(scale) & !1,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn profile(&self) -> &EncodeProfile {
        &self.profile
    }

    /// Layout of the frames handed to the writer
    pub fn pixel_layout(&self) -> PixelLayout {
        PixelLayout::packed(self.width, self.height, PixelFormat::Bgra8)
    }

    /// Check the profile is one this crate can encode
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "Output size {}x{} is empty",
                self.width, self.height
            ));
        }
        if self.width > encoding::MAX_OUTPUT_EDGE || self.height > encoding::MAX_OUTPUT_EDGE {
            return Err(format!(
                "Output size {}x{} exceeds {} pixels per edge",
                self.width,
                self.height,
                encoding::MAX_OUTPUT_EDGE
            ));
        }
        if self.profile.audio_channels != encoding::AUDIO_CHANNELS {
            return Err(format!(
                "Only mono audio is supported, got {} channels",
                self.profile.audio_channels
            ));
        }
        if self.profile.audio_sample_rate == 0 {
            return Err("Audio sample rate must be non-zero".to_string());
        }
        if self.profile.frame_rate_hint == 0 {
            return Err("Frame rate hint must be non-zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> EncodeProfile {
        EncodeProfile::for_output(1080, 1920, BitratePreset::Medium, 48_000)
    }

    #[test]
    fn scale_multiplies_points() {
        let dest = MediaDestination::new("/tmp/a.mp4", 360, 640, 3, profile());
        assert_eq!((dest.width(), dest.height()), (1080, 1920));
        assert_eq!(dest.pixel_layout().bytes_per_row, 1080 * 4);
        assert_eq!(dest.pixel_layout().frame_size(), 1080 * 4 * 1920);
    }

    #[test]
    fn odd_sizes_round_down_to_even() {
        let dest = MediaDestination::new("/tmp/a.mp4", 101, 51, 1, profile());
        assert_eq!((dest.width(), dest.height()), (100, 50));
    }

    #[test]
    fn stereo_profile_is_rejected() {
        let mut p = profile();
        p.audio_channels = 2;
        let dest = MediaDestination::new("/tmp/a.mp4", 360, 640, 3, p);
        assert!(dest.validate().is_err());
    }

    #[test]
    fn empty_size_is_rejected() {
        let dest = MediaDestination::new("/tmp/a.mp4", 0, 640, 3, profile());
        assert!(dest.validate().is_err());
    }

    #[test]
    fn oversized_output_is_rejected() {
        let dest = MediaDestination::new("/tmp/a.mp4", 60_000, 60_000, 1, profile());
        assert!(dest.validate().is_err());

        let edge = MediaDestination::new("/tmp/a.mp4", 4096, 2048, 2, profile());
        assert_eq!((edge.width(), edge.height()), (8192, 4096));
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn point_size_overflow_saturates() {
        let dest = MediaDestination::new("/tmp/a.mp4", u32::MAX, 1, 2, profile());
        assert_eq!(dest.width(), u32::MAX & !1);
        assert!(dest.validate().is_err());
    }
}
