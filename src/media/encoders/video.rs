// SPDX-License-Identifier: GPL-3.0-only

//! H.264 encoder selection with hardware acceleration priority

use crate::media::destination::EncodeProfile;
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info};

/// H.264 encoders in priority order, with whether they are hardware backed
pub const H264_ENCODERS: &[(&str, bool)] = &[
    ("vah264enc", true),
    ("vaapih264enc", true),
    ("nvh264enc", true),
    ("x264enc", false),
    ("openh264enc", false),
];

/// Software-only subset, for environments without a usable GPU encoder
pub const SOFTWARE_H264_ENCODERS: &[(&str, bool)] = &[("x264enc", false), ("openh264enc", false)];

/// Selected video encoder with its downstream helpers
pub struct SelectedVideoEncoder {
    /// The encoder element
    pub encoder: gst::Element,
    /// Caps filter pinning the H.264 profile, when the encoder supports High
    pub profile_filter: Option<gst::Element>,
    /// `h264parse`, required by mp4mux for stream-format negotiation
    pub parser: gst::Element,
    /// GStreamer element name of the encoder
    pub element_name: &'static str,
    /// Whether this is hardware accelerated
    pub is_hardware: bool,
}

impl SelectedVideoEncoder {
    /// Elements from encoder to parser, in link order
    pub fn chain(&self) -> Vec<&gst::Element> {
        let mut chain = vec![&self.encoder];
        if let Some(filter) = &self.profile_filter {
            chain.push(filter);
        }
        chain.push(&self.parser);
        chain
    }
}

/// Select the first creatable encoder out of `candidates`
pub fn select_h264_encoder_from(
    candidates: &[(&'static str, bool)],
    profile: &EncodeProfile,
) -> Result<SelectedVideoEncoder, String> {
    gst::init().map_err(|e| format!("Failed to initialize GStreamer: {}", e))?;

    for (encoder_name, is_hardware) in candidates {
        let Ok(encoder) = gst::ElementFactory::make(encoder_name).build() else {
            continue;
        };

        info!(
            encoder = %encoder_name,
            hardware = is_hardware,
            bitrate_kbps = profile.video_bitrate_kbps,
            "Selected video encoder"
        );

        configure_video_encoder(&encoder, encoder_name, profile);

        let profile_filter = if profile.high_profile && supports_high_profile(encoder_name) {
            let caps = gst::Caps::builder("video/x-h264")
                .field("profile", "high")
                .build();
            Some(
                gst::ElementFactory::make("capsfilter")
                    .property("caps", &caps)
                    .build()
                    .map_err(|e| format!("Failed to create capsfilter: {}", e))?,
            )
        } else {
            None
        };

        let parser = gst::ElementFactory::make("h264parse")
            .build()
            .map_err(|e| format!("Failed to create h264parse: {}", e))?;

        return Ok(SelectedVideoEncoder {
            encoder,
            profile_filter,
            parser,
            element_name: encoder_name,
            is_hardware: *is_hardware,
        });
    }

    Err(concat!(
        "No H.264 encoder available. Please install gstreamer1-plugins-ugly (x264enc) ",
        "or gstreamer1-plugin-openh264"
    )
    .to_string())
}

fn supports_high_profile(encoder_name: &str) -> bool {
    encoder_name != "openh264enc"
}

/// Configure encoder for real-time encoding at the profile bitrate
fn configure_video_encoder(encoder: &gst::Element, encoder_name: &str, profile: &EncodeProfile) {
    let bitrate = profile.video_bitrate_kbps;
    let keyframe_interval = (profile.frame_rate_hint * 2).to_string();

    match encoder_name {
        "x264enc" => {
            encoder.set_property_from_str("speed-preset", "veryfast");
            encoder.set_property_from_str("tune", "zerolatency");
            encoder.set_property_from_str("bitrate", &bitrate.to_string());
            encoder.set_property_from_str("key-int-max", &keyframe_interval);
            debug!("Configured x264enc: bitrate={} kbps", bitrate);
        }

        "vah264enc" => {
            encoder.set_property_from_str("rate-control", "cbr");
            encoder.set_property_from_str("bitrate", &bitrate.to_string());
            encoder.set_property_from_str("key-int-max", &keyframe_interval);
            debug!("Configured vah264enc: bitrate={} kbps", bitrate);
        }

        "vaapih264enc" => {
            encoder.set_property_from_str("rate-control", "cbr");
            encoder.set_property_from_str("bitrate", &bitrate.to_string());
            encoder.set_property_from_str("keyframe-period", &keyframe_interval);
            debug!("Configured vaapih264enc: bitrate={} kbps", bitrate);
        }

        "nvh264enc" => {
            encoder.set_property_from_str("bitrate", &bitrate.to_string());
            encoder.set_property_from_str("rc-mode", "vbr");
            encoder.set_property_from_str("zerolatency", "true");
            debug!("Configured nvh264enc: bitrate={} kbps", bitrate);
        }

        "openh264enc" => {
            encoder.set_property_from_str("rate-control", "bitrate");
            encoder.set_property_from_str("bitrate", &(bitrate * 1000).to_string());
            encoder.set_property_from_str("usage-type", "camera");
            debug!("Configured openh264enc: bitrate={} bps", bitrate * 1000);
        }

        _ => {
            debug!("Unknown encoder type, using default configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_encoders_come_last() {
        let first_software = H264_ENCODERS.iter().position(|(_, hw)| !hw).unwrap();
        assert!(H264_ENCODERS[first_software..].iter().all(|(_, hw)| !hw));
    }

    #[test]
    fn openh264_stays_on_baseline() {
        assert!(!supports_high_profile("openh264enc"));
        assert!(supports_high_profile("x264enc"));
    }
}
