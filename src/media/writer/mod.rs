// SPDX-License-Identifier: GPL-3.0-only

//! Container writers
//!
//! [`MediaWriter`] is the seam between the recording state machine and the
//! thing that actually encodes and muxes. The state machine only relies on
//! the lifecycle described here:
//!
//! 1. Inputs are added while the writer is [`WriterStatus::Unknown`].
//! 2. `start_writing` moves it to [`WriterStatus::Writing`].
//! 3. `start_session` fixes the timeline origin once; appends carry
//!    timestamps on the session clock that are rebased onto it.
//! 4. `finish_writing` finalizes asynchronously and reports the end status
//!    through a callback that may run on any thread.

mod pipeline;

pub use pipeline::GstWriter;

use super::destination::PixelLayout;
use super::pixel_pool::PixelBuffer;
use crate::backends::camera::types::{CaptureSample, SampleFormat};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One of the two tracks in the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaChannel {
    Video,
    Audio,
}

impl MediaChannel {
    pub const ALL: [MediaChannel; 2] = [MediaChannel::Video, MediaChannel::Audio];
}

impl fmt::Display for MediaChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaChannel::Video => write!(f, "video"),
            MediaChannel::Audio => write!(f, "audio"),
        }
    }
}

/// Writer lifecycle as reported by the writer itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterStatus {
    /// Inputs may still be added
    Unknown,
    Writing,
    Completed,
    Failed,
}

/// Called once when finalization ends, with the final status and error
pub type FinishCallback = Box<dyn FnOnce(WriterStatus, Option<String>) + Send + 'static>;

/// Interleaved signed 16-bit PCM
#[derive(Debug, Clone)]
pub struct AudioSample {
    data: Arc<[u8]>,
    sample_rate: u32,
    channels: u32,
}

impl AudioSample {
    pub fn new(data: impl Into<Arc<[u8]>>, sample_rate: u32, channels: u32) -> Self {
        Self {
            data: data.into(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Build from PCM samples
    pub fn from_pcm(samples: &[i16], sample_rate: u32, channels: u32) -> Self {
        Self::new(bytemuck::cast_slice::<i16, u8>(samples).to_vec(), sample_rate, channels)
    }

    /// Reuse the bytes of a captured audio sample
    pub fn from_capture(sample: &CaptureSample) -> Option<Self> {
        match sample.format {
            SampleFormat::Audio {
                sample_rate,
                channels,
            } => Some(Self::new(sample.data.clone(), sample_rate, channels)),
            SampleFormat::Video { .. } => None,
        }
    }

    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Number of sample frames (one value per channel)
    pub fn frames(&self) -> usize {
        self.data.len() / (2 * self.channels as usize)
    }

    /// Playback length of the sample
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.frames() as u64 * 1_000_000_000 / self.sample_rate as u64)
    }
}

/// Encoder and muxer behind a recording session
pub trait MediaWriter: Send {
    fn status(&self) -> WriterStatus;

    /// Last error reported by the writer, if any
    fn error(&self) -> Option<String>;

    fn output_path(&self) -> &Path;

    /// Frame layout expected by [`append_pixel_buffer`](Self::append_pixel_buffer)
    fn pixel_layout(&self) -> PixelLayout;

    fn can_add_input(&self, channel: MediaChannel) -> bool;

    fn add_input(&mut self, channel: MediaChannel) -> Result<(), String>;

    fn start_writing(&mut self) -> Result<(), String>;

    /// Fix the timeline origin; timestamps before it must not be appended
    fn start_session(&mut self, anchor: Duration);

    /// Whether the channel accepts more data right now
    fn is_ready(&self, channel: MediaChannel) -> bool;

    fn append_pixel_buffer(&mut self, buffer: PixelBuffer, pts: Duration) -> Result<(), String>;

    fn append_audio(&mut self, sample: &AudioSample, pts: Duration) -> Result<(), String>;

    /// No more data will be appended to this channel
    fn mark_finished(&mut self, channel: MediaChannel);

    fn finish_writing(&mut self, on_done: FinishCallback);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_duration_follows_frame_count() {
        let sample = AudioSample::from_pcm(&[0i16; 480], 48_000, 1);
        assert_eq!(sample.frames(), 480);
        assert_eq!(sample.duration(), Duration::from_millis(10));
    }

    #[test]
    fn stereo_frames_count_pairs() {
        let sample = AudioSample::from_pcm(&[0i16; 480], 48_000, 2);
        assert_eq!(sample.frames(), 240);
    }
}
