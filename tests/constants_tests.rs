// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for encode constants

use overlay_recorder::constants::{
    BitratePreset, MAX_VIDEO_BITRATE_KBPS, ResolutionTier, encoding, format_bitrate,
};

#[test]
fn test_presets_increase_within_every_tier() {
    for (width, height) in [(640, 480), (1280, 720), (1080, 1920), (3840, 2160)] {
        let rates: Vec<u32> = BitratePreset::ALL
            .iter()
            .map(|preset| preset.bitrate_kbps(width, height))
            .collect();
        assert!(
            rates.windows(2).all(|pair| pair[0] < pair[1]),
            "{}x{} rates not increasing: {:?}",
            width,
            height,
            rates
        );
    }
}

#[test]
fn test_bitrate_scales_with_resolution() {
    let hd = BitratePreset::Medium.bitrate_kbps(1280, 720);
    let fhd = BitratePreset::Medium.bitrate_kbps(1920, 1080);
    let uhd = BitratePreset::Medium.bitrate_kbps(3840, 2160);

    assert!(hd < fhd);
    assert!(fhd < uhd);
}

#[test]
fn test_no_preset_exceeds_cap() {
    for preset in BitratePreset::ALL {
        assert!(preset.bitrate_kbps(7680, 4320) <= MAX_VIDEO_BITRATE_KBPS);
    }
}

#[test]
fn test_portrait_matches_landscape_budget() {
    for preset in BitratePreset::ALL {
        assert_eq!(
            preset.bitrate_kbps(1080, 1920),
            preset.bitrate_kbps(1920, 1080)
        );
    }
    assert_eq!(ResolutionTier::for_size(1080, 1920), ResolutionTier::FullHD);
}

#[test]
fn test_format_bitrate_units() {
    assert_eq!(format_bitrate(8_000), "8 Mbps");
    assert_eq!(format_bitrate(2_500), "2.5 Mbps");
    assert_eq!(format_bitrate(50_000), "50 Mbps");
}

#[test]
fn test_encode_profile_defaults() {
    assert_eq!(encoding::AUDIO_CHANNELS, 1);
    assert_eq!(encoding::DEFAULT_AUDIO_SAMPLE_RATE, 48_000);
    assert_eq!(encoding::CONTAINER_EXTENSION, "mp4");
}
