// SPDX-License-Identifier: GPL-3.0-only

//! Encoder selection for the fixed recording profile
//!
//! Video is always H.264 and audio always AAC, both muxed into MP4. Each
//! side tries a priority-ordered list of GStreamer elements and takes the
//! first one that can be created:
//! - **Video**: hardware encoders (VA-API, NVENC) before x264 and OpenH264
//! - **Audio**: `avenc_aac`, then `faac`, then `voaacenc`

pub mod audio;
pub mod detection;
pub mod video;

pub use audio::{SelectedAudioEncoder, select_aac_encoder};
pub use detection::{detect_aac_encoders, detect_h264_encoders, is_element_available};
pub use video::{
    H264_ENCODERS, SOFTWARE_H264_ENCODERS, SelectedVideoEncoder, select_h264_encoder_from,
};
