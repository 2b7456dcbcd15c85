// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for capture backends

use crate::media::destination::PixelFormat;
use crate::pipelines::video::HostTime;
use std::fmt;
use std::sync::Arc;

/// Kind of media a device or sample carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
}

impl MediaType {
    pub const ALL: [MediaType; 2] = [MediaType::Video, MediaType::Audio];
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Video => f.pad("video"),
            MediaType::Audio => f.pad("audio"),
        }
    }
}

/// Where a camera faces relative to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DevicePosition {
    Front,
    Back,
    /// External or desktop cameras that report no location
    #[default]
    Unspecified,
}

impl DevicePosition {
    /// Parse a location property value ("front", "back", "external", ...)
    pub fn from_location(location: &str) -> Self {
        match location.trim().to_ascii_lowercase().as_str() {
            "front" | "user" => DevicePosition::Front,
            "back" | "rear" | "environment" => DevicePosition::Back,
            _ => DevicePosition::Unspecified,
        }
    }
}

impl fmt::Display for DevicePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DevicePosition::Front => "front",
            DevicePosition::Back => "back",
            DevicePosition::Unspecified => "unspecified",
        };
        f.write_str(name)
    }
}

/// Physical camera kind, in the order discovery prefers them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceCategory {
    #[default]
    WideAngle,
    UltraWide,
    Telephoto,
    Dual,
    DualWide,
    Triple,
}

impl DeviceCategory {
    /// Guess the category from a device display name
    ///
    /// Most cameras do not advertise a lens type; they are wide-angle.
    pub fn from_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.contains("triple") {
            DeviceCategory::Triple
        } else if name.contains("dual wide") || name.contains("dual-wide") {
            DeviceCategory::DualWide
        } else if name.contains("dual") {
            DeviceCategory::Dual
        } else if name.contains("ultra wide") || name.contains("ultrawide") {
            DeviceCategory::UltraWide
        } else if name.contains("tele") {
            DeviceCategory::Telephoto
        } else {
            DeviceCategory::WideAngle
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceCategory::WideAngle => "wide-angle",
            DeviceCategory::UltraWide => "ultra-wide",
            DeviceCategory::Telephoto => "telephoto",
            DeviceCategory::Dual => "dual",
            DeviceCategory::DualWide => "dual-wide",
            DeviceCategory::Triple => "triple",
        };
        f.write_str(name)
    }
}

/// A capture device as reported by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    /// Backend-specific stable identifier
    pub id: String,
    pub name: String,
    pub media: MediaType,
    pub position: DevicePosition,
    pub category: DeviceCategory,
}

impl fmt::Display for CaptureDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.media {
            MediaType::Video => write!(
                f,
                "{} [{}] ({}, {})",
                self.name, self.id, self.category, self.position
            ),
            MediaType::Audio => write!(f, "{} [{}]", self.name, self.id),
        }
    }
}

/// Layout of the payload in a [`CaptureSample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Video {
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
    },
    /// Interleaved signed 16-bit little-endian PCM
    Audio { sample_rate: u32, channels: u32 },
}

/// One unit of captured media
#[derive(Debug, Clone)]
pub struct CaptureSample {
    pub media: MediaType,
    pub data: Arc<[u8]>,
    pub format: SampleFormat,
    /// Arrival time on the shared host clock
    pub timestamp: HostTime,
    /// False when the backend flagged the payload as incomplete
    pub data_ready: bool,
}

/// Authorization state of one medium
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Authorized,
    Denied,
    /// Not asked yet; requesting access prompts the user
    NotDetermined,
    /// Blocked by policy, cannot be requested
    Restricted,
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PermissionStatus::Authorized => "authorized",
            PermissionStatus::Denied => "denied",
            PermissionStatus::NotDetermined => "not determined",
            PermissionStatus::Restricted => "restricted",
        };
        f.write_str(name)
    }
}
