// SPDX-License-Identifier: GPL-3.0-only

//! Capture device selection
//!
//! Video discovery walks [`CATEGORY_FALLBACK`] among front-facing cameras
//! and takes the first hit. Desktop webcams rarely report a position, so
//! when no front camera matches the same walk is repeated over devices
//! with an unspecified position. Back-facing cameras are never picked.

use super::types::{CaptureDevice, DeviceCategory, DevicePosition, MediaType};
use tracing::debug;

/// Camera kinds in order of preference
pub const CATEGORY_FALLBACK: [DeviceCategory; 6] = [
    DeviceCategory::WideAngle,
    DeviceCategory::UltraWide,
    DeviceCategory::Telephoto,
    DeviceCategory::Dual,
    DeviceCategory::DualWide,
    DeviceCategory::Triple,
];

const POSITION_FALLBACK: [DevicePosition; 2] = [DevicePosition::Front, DevicePosition::Unspecified];

/// Pick the camera to record from
///
/// A device whose id equals `preferred` wins outright, unless it faces
/// backwards.
pub fn select_video_device<'a>(
    devices: &'a [CaptureDevice],
    preferred: Option<&str>,
) -> Option<&'a CaptureDevice> {
    let candidates = || {
        devices
            .iter()
            .filter(|d| d.media == MediaType::Video && d.position != DevicePosition::Back)
    };

    if let Some(id) = preferred {
        if let Some(device) = candidates().find(|d| d.id == id) {
            debug!(device = %device, "Using preferred video device");
            return Some(device);
        }
        debug!(preferred = %id, "Preferred video device not found, falling back");
    }

    for position in POSITION_FALLBACK {
        for category in CATEGORY_FALLBACK {
            if let Some(device) =
                candidates().find(|d| d.position == position && d.category == category)
            {
                debug!(device = %device, "Selected video device");
                return Some(device);
            }
        }
    }
    None
}

/// The first audio source is the system default
pub fn select_audio_device(devices: &[CaptureDevice]) -> Option<&CaptureDevice> {
    devices.iter().find(|d| d.media == MediaType::Audio)
}
