// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};

/// Quality setting for the H.264 stream
///
/// Stored by name in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitratePreset {
    /// Half the tier budget
    Low,
    #[default]
    Medium,
    /// Twice the tier budget, capped at [`MAX_VIDEO_BITRATE_KBPS`]
    High,
}

/// Upper bound on any preset's bitrate
pub const MAX_VIDEO_BITRATE_KBPS: u32 = 50_000;

impl BitratePreset {
    /// All preset variants, lowest first
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Target bitrate in kbps for an output of `width` x `height`
    ///
    /// The tier is picked from the longer edge so portrait recordings
    /// (e.g. 1080x1920) get the same budget as their landscape counterpart.
    pub fn bitrate_kbps(&self, width: u32, height: u32) -> u32 {
        let base = ResolutionTier::for_size(width, height).base_kbps();
        match self {
            BitratePreset::Low => base / 2,
            BitratePreset::Medium => base,
            BitratePreset::High => (base * 2).min(MAX_VIDEO_BITRATE_KBPS),
        }
    }
}

/// Output size classes, keyed on the longer edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    /// Below 1280
    SD,
    /// 1280..1920
    HD,
    /// 1920..3840
    FullHD,
    /// 3840 and above
    FourK,
}

impl ResolutionTier {
    pub fn for_size(width: u32, height: u32) -> Self {
        match width.max(height) {
            edge if edge >= 3840 => ResolutionTier::FourK,
            edge if edge >= 1920 => ResolutionTier::FullHD,
            edge if edge >= 1280 => ResolutionTier::HD,
            _ => ResolutionTier::SD,
        }
    }

    /// Medium preset bitrate for the tier
    fn base_kbps(self) -> u32 {
        match self {
            ResolutionTier::SD => 2_000,
            ResolutionTier::HD => 5_000,
            ResolutionTier::FullHD => 8_000,
            ResolutionTier::FourK => 30_000,
        }
    }
}

/// Human readable bitrate, "8 Mbps" or "2.5 Mbps"
pub fn format_bitrate(kbps: u32) -> String {
    match (kbps / 1000, kbps % 1000) {
        (whole, 0) => format!("{} Mbps", whole),
        _ => format!("{:.1} Mbps", kbps as f64 / 1000.0),
    }
}

/// Fixed encode profile defaults
pub mod encoding {
    /// Expected source frame rate handed to the encoder
    pub const FRAME_RATE_HINT: u32 = 60;

    /// Largest accepted output edge in pixels
    pub const MAX_OUTPUT_EDGE: u32 = 8192;

    /// Audio is always recorded as a single channel
    pub const AUDIO_CHANNELS: u32 = 1;

    /// Sample rate used when the microphone does not report a native rate
    pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 48_000;

    /// AAC target bitrate in bits per second
    pub const AUDIO_BITRATE: i32 = 128_000;

    /// Container file extension
    pub const CONTAINER_EXTENSION: &str = "mp4";
}

/// Writer buffering limits
pub mod writer {
    /// Video frames the encoder may have queued before the channel reports not-ready
    pub const VIDEO_QUEUE_FRAMES: u64 = 3;

    /// Seconds of audio buffered before the channel reports not-ready
    pub const AUDIO_QUEUE_SECONDS: u64 = 4;

    /// Pixel buffers kept by the pool; bounds frames in flight to the encoder
    pub const PIXEL_POOL_CAPACITY: usize = 6;
}

/// Capture pipeline settings
pub mod pipeline {
    /// Maximum buffer queue size (keep small for low latency)
    pub const MAX_BUFFERS: u32 = 2;

    /// Pixel format delivered to the renderer
    pub const VIDEO_FORMAT: &str = "BGRA";

    /// Sample format delivered to the recorder
    pub const AUDIO_FORMAT: &str = "S16LE";
}

/// Timing constants
pub mod timing {
    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 60;

    /// How long `start_writing` waits for an immediate pipeline error
    pub const WRITER_START_CHECK_MS: u64 = 100;

    /// Upper bound on waiting for the muxer to finalize the file
    pub const FINALIZE_TIMEOUT_SECS: u64 = 10;

    /// Pipeline state change timeout on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;
}

/// Application information utilities
pub mod app_info {
    use std::path::Path;

    /// Application identifier used for config and output folders
    pub const APP_NAME: &str = "overlay-recorder";

    /// Get the application version
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Check if the application is running inside a Flatpak sandbox
    pub fn is_flatpak() -> bool {
        Path::new("/.flatpak-info").exists()
    }

    /// Get the runtime environment string (e.g., "Flatpak" or "Native")
    pub fn runtime_environment() -> &'static str {
        if is_flatpak() { "Flatpak" } else { "Native" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_uses_longer_edge() {
        assert_eq!(ResolutionTier::for_size(1080, 1920), ResolutionTier::FullHD);
        assert_eq!(ResolutionTier::for_size(1920, 1080), ResolutionTier::FullHD);
        assert_eq!(ResolutionTier::for_size(640, 480), ResolutionTier::SD);
    }

    #[test]
    fn high_preset_is_capped() {
        assert_eq!(BitratePreset::High.bitrate_kbps(3840, 2160), MAX_VIDEO_BITRATE_KBPS);
        assert_eq!(BitratePreset::Low.bitrate_kbps(1280, 720), 2_500);
    }

    #[test]
    fn test_format_bitrate() {
        assert_eq!(format_bitrate(8_000), "8 Mbps");
        assert_eq!(format_bitrate(2_500), "2.5 Mbps");
    }
}
