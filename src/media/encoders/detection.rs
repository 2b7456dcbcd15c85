// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer encoder detection

use super::audio::AAC_ENCODERS;
use super::video::H264_ENCODERS;
use gstreamer as gst;
use tracing::{debug, info};

/// Check if a specific GStreamer element is available
pub fn is_element_available(element_name: &str) -> bool {
    gst::init().ok();
    gst::ElementFactory::make(element_name).build().is_ok()
}

/// Installed H.264 encoders, highest priority first
pub fn detect_h264_encoders() -> Vec<&'static str> {
    let available: Vec<_> = H264_ENCODERS
        .iter()
        .filter(|(name, _)| is_element_available(name))
        .map(|(name, _)| *name)
        .collect();

    for name in &available {
        debug!("Video encoder available: {}", name);
    }
    info!("Detected {} H.264 encoders", available.len());
    available
}

/// Installed AAC encoders, highest priority first
pub fn detect_aac_encoders() -> Vec<&'static str> {
    let available: Vec<_> = AAC_ENCODERS
        .iter()
        .copied()
        .filter(|name| is_element_available(name))
        .collect();

    info!("Detected {} AAC encoders", available.len());
    available
}
