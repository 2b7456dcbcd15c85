// SPDX-License-Identifier: GPL-3.0-only

//! AAC encoder selection

use crate::media::destination::EncodeProfile;
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info};

/// AAC encoders in priority order
pub const AAC_ENCODERS: &[&str] = &["avenc_aac", "faac", "voaacenc"];

/// Selected audio encoder
pub struct SelectedAudioEncoder {
    /// The encoder element
    pub encoder: gst::Element,
    /// GStreamer element name of the encoder
    pub element_name: &'static str,
}

/// Select the best available AAC encoder
pub fn select_aac_encoder(profile: &EncodeProfile) -> Result<SelectedAudioEncoder, String> {
    gst::init().map_err(|e| format!("Failed to initialize GStreamer: {}", e))?;

    for encoder_name in AAC_ENCODERS {
        if let Ok(encoder) = gst::ElementFactory::make(encoder_name).build() {
            info!(
                encoder = %encoder_name,
                channels = profile.audio_channels,
                sample_rate = profile.audio_sample_rate,
                "Selected audio encoder"
            );

            configure_aac_encoder(&encoder, encoder_name, profile.audio_bitrate);

            return Ok(SelectedAudioEncoder {
                encoder,
                element_name: encoder_name,
            });
        }
    }

    Err(concat!(
        "No AAC encoder available. Please install gstreamer1-libav (avenc_aac) ",
        "or gstreamer1-plugins-bad (faac, voaacenc)"
    )
    .to_string())
}

fn configure_aac_encoder(encoder: &gst::Element, encoder_name: &str, bitrate: i32) {
    // All three take bits per second, with differing integer types
    encoder.set_property_from_str("bitrate", &bitrate.to_string());
    debug!("Configured {}: bitrate={} bps", encoder_name, bitrate);
}
