// SPDX-License-Identifier: GPL-3.0-only

//! Recording session state machine
//!
//! A [`RecordingSession`] owns one output file from creation to
//! finalization:
//!
//! ```text
//! Idle ──start──▶ Writing ──finish──▶ Finishing ──▶ Completed
//!                                              └──▶ Failed
//! ```
//!
//! Every operation is queued onto the session's own serial thread, so the
//! render loop and the capture threads can call in concurrently without
//! blocking each other. Per-frame problems (channel not ready, sample older
//! than what was already written) drop the sample silently; lifecycle
//! violations and writer failures are returned as errors.
//!
//! The first sample accepted on either channel anchors the file timeline.
//! Audio is allowed to anchor, so video-less recordings work.
//!
//! Completion callbacks run on the session thread. They must not wait on
//! another operation of the same session.

use crate::constants::{timing, writer as limits};
use crate::dispatch::{Completion, SerialQueue, completion_channel};
use crate::errors::{RecordingError, RecordingResult};
use crate::media::destination::MediaDestination;
use crate::media::frame_converter::{FrameConverter, FrameTexture};
use crate::media::pixel_pool::PixelBufferPool;
use crate::media::writer::{AudioSample, GstWriter, MediaChannel, MediaWriter, WriterStatus};
use crate::pipelines::video::clock::{HostTime, SessionClock};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Lifecycle of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    Writing,
    Finishing,
    Completed,
    Failed,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriterState::Idle => "idle",
            WriterState::Writing => "writing",
            WriterState::Finishing => "finishing",
            WriterState::Completed => "completed",
            WriterState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters for one recording
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingStats {
    pub video_frames_appended: u64,
    pub video_frames_dropped: u64,
    pub audio_samples_appended: u64,
    pub audio_samples_dropped: u64,
}

struct SessionCore {
    state: WriterState,
    /// Mirrors `state == Writing` for readers outside the session thread
    writing: Arc<AtomicBool>,
    writer: Box<dyn MediaWriter>,
    pool: PixelBufferPool,
    converter: FrameConverter,
    clock: SessionClock,
    /// Sample rate and channel count every audio sample must carry
    audio_format: (u32, u32),
    /// Set once, by the first accepted sample
    anchor: Option<Duration>,
    last_video_pts: Option<Duration>,
    last_audio_pts: Option<Duration>,
    stats: RecordingStats,
}

impl SessionCore {
    fn set_state(&mut self, state: WriterState) {
        self.state = state;
        self.writing
            .store(state == WriterState::Writing, Ordering::Release);
    }

    fn wrong_state(&self, operation: &'static str) -> RecordingError {
        RecordingError::WrongState {
            operation,
            state: self.state,
        }
    }

    fn start(&mut self) -> RecordingResult<()> {
        if self.state != WriterState::Idle {
            return Err(self.wrong_state("start"));
        }

        let result = self.open_writer();
        match &result {
            Ok(()) => {
                self.set_state(WriterState::Writing);
                info!(path = %self.writer.output_path().display(), "Recording started");
            }
            Err(e) => {
                self.set_state(WriterState::Failed);
                warn!(error = %e, "Recording failed to start");
            }
        }
        result
    }

    fn open_writer(&mut self) -> RecordingResult<()> {
        if let Some(e) = self.writer.error() {
            return Err(RecordingError::SystemFailure(e));
        }

        let mut added = 0;
        for channel in MediaChannel::ALL {
            if !self.writer.can_add_input(channel) {
                debug!(channel = %channel, "Writer cannot take this input");
                continue;
            }
            match self.writer.add_input(channel) {
                Ok(()) => added += 1,
                Err(e) => warn!(channel = %channel, error = %e, "Failed to add writer input"),
            }
        }
        if added == 0 {
            return Err(RecordingError::SystemFailure(
                "No input channel could be added to the writer".to_string(),
            ));
        }

        if let Some(e) = self.writer.error() {
            return Err(RecordingError::SystemFailure(e));
        }

        remove_existing(self.writer.output_path())?;

        self.writer
            .start_writing()
            .map_err(RecordingError::SystemFailure)
    }

    /// Whether a sample at `pts` keeps the channel's timeline monotonic
    fn accepts(&self, channel: MediaChannel, pts: Duration) -> bool {
        if self.anchor.is_some_and(|anchor| pts < anchor) {
            return false;
        }
        let last = match channel {
            MediaChannel::Video => self.last_video_pts,
            MediaChannel::Audio => self.last_audio_pts,
        };
        last.is_none_or(|last| pts >= last)
    }

    fn start_session_if_needed(&mut self, pts: Duration) {
        if self.anchor.is_none() {
            self.writer.start_session(pts);
            self.anchor = Some(pts);
            info!(anchor_ms = pts.as_millis() as u64, "Recording timeline anchored");
        }
    }

    fn append_video(
        &mut self,
        frame: Box<dyn FrameTexture>,
        time: HostTime,
    ) -> RecordingResult<()> {
        if self.state != WriterState::Writing {
            trace!(state = %self.state, "Video frame ignored outside writing");
            return Ok(());
        }
        if !self.writer.is_ready(MediaChannel::Video) {
            self.stats.video_frames_dropped += 1;
            debug!("Video channel not ready, frame dropped");
            return Ok(());
        }

        let pts = self.clock.presentation_time(time);
        if !self.accepts(MediaChannel::Video, pts) {
            self.stats.video_frames_dropped += 1;
            debug!(pts_ms = pts.as_millis() as u64, "Out-of-order video frame dropped");
            return Ok(());
        }

        let mut buffer = self.pool.acquire().ok_or(RecordingError::PoolExhausted)?;
        self.converter.convert(&*frame, &mut buffer)?;
        drop(frame);

        self.start_session_if_needed(pts);
        self.writer
            .append_pixel_buffer(buffer, pts)
            .map_err(RecordingError::SystemFailure)?;

        self.last_video_pts = Some(pts);
        self.stats.video_frames_appended += 1;
        if self.stats.video_frames_appended % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(
                frames = self.stats.video_frames_appended,
                dropped = self.stats.video_frames_dropped,
                "Video frames appended"
            );
        }
        Ok(())
    }

    fn append_audio(&mut self, sample: AudioSample, time: HostTime) -> RecordingResult<()> {
        if self.state != WriterState::Writing {
            trace!(state = %self.state, "Audio sample ignored outside writing");
            return Ok(());
        }
        let (rate, channels) = self.audio_format;
        if sample.sample_rate() != rate || sample.channels() != channels {
            self.stats.audio_samples_dropped += 1;
            return Err(RecordingError::ConversionFailure(format!(
                "Audio sample is {} Hz x{}, recording expects {} Hz x{}",
                sample.sample_rate(),
                sample.channels(),
                rate,
                channels
            )));
        }
        if !self.writer.is_ready(MediaChannel::Audio) {
            self.stats.audio_samples_dropped += 1;
            debug!("Audio channel not ready, sample dropped");
            return Ok(());
        }

        let pts = self.clock.presentation_time(time);
        if !self.accepts(MediaChannel::Audio, pts) {
            self.stats.audio_samples_dropped += 1;
            debug!(pts_ms = pts.as_millis() as u64, "Out-of-order audio sample dropped");
            return Ok(());
        }

        self.start_session_if_needed(pts);
        self.writer
            .append_audio(&sample, pts)
            .map_err(RecordingError::SystemFailure)?;

        self.last_audio_pts = Some(pts);
        self.stats.audio_samples_appended += 1;
        Ok(())
    }

    fn finish(&mut self) -> RecordingResult<()> {
        if self.state != WriterState::Writing {
            return Err(self.wrong_state("finish"));
        }

        let status = self.writer.status();
        if status != WriterStatus::Writing {
            self.set_state(WriterState::Failed);
            return Err(RecordingError::SystemFailure(self.writer.error().unwrap_or_else(
                || format!("Writer is {:?} instead of writing", status),
            )));
        }

        self.set_state(WriterState::Finishing);
        info!(stats = ?self.stats, "Finishing recording");

        // Unready channels are closed by the writer's own finalization
        for channel in MediaChannel::ALL {
            if self.writer.is_ready(channel) {
                self.writer.mark_finished(channel);
            }
        }

        let (tx, rx) = mpsc::channel();
        self.writer.finish_writing(Box::new(move |status, error| {
            let _ = tx.send((status, error));
        }));

        match rx.recv() {
            Ok((WriterStatus::Completed, _)) => {
                self.set_state(WriterState::Completed);
                info!(
                    path = %self.writer.output_path().display(),
                    frames = self.stats.video_frames_appended,
                    audio_samples = self.stats.audio_samples_appended,
                    "Recording completed"
                );
                Ok(())
            }
            Ok((status, error)) => {
                self.set_state(WriterState::Failed);
                let message =
                    error.unwrap_or_else(|| format!("Writer ended as {:?}", status));
                warn!(error = %message, "Recording failed to finalize");
                Err(RecordingError::SystemFailure(message))
            }
            Err(_) => {
                self.set_state(WriterState::Failed);
                Err(RecordingError::SystemFailure(
                    "Writer dropped its completion without reporting".to_string(),
                ))
            }
        }
    }
}

fn remove_existing(path: &Path) -> RecordingResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed existing output file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn lock(core: &Mutex<SessionCore>) -> MutexGuard<'_, SessionCore> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One recording into one file
pub struct RecordingSession {
    core: Arc<Mutex<SessionCore>>,
    writing: Arc<AtomicBool>,
    queue: SerialQueue,
    destination: MediaDestination,
    clock: SessionClock,
}

impl RecordingSession {
    /// Create a session writing an MP4 file to `destination`
    ///
    /// No file I/O happens until [`start`](Self::start).
    pub fn construct(destination: MediaDestination) -> RecordingResult<Self> {
        let writer = GstWriter::new(&destination)?;
        Self::with_writer(destination, Box::new(writer))
    }

    /// Create a session around an existing writer
    pub fn with_writer(
        destination: MediaDestination,
        writer: Box<dyn MediaWriter>,
    ) -> RecordingResult<Self> {
        destination
            .validate()
            .map_err(RecordingError::SystemFailure)?;
        let queue = SerialQueue::new("recording-session")?;
        let clock = SessionClock::start();
        let pool = PixelBufferPool::new(writer.pixel_layout(), limits::PIXEL_POOL_CAPACITY);
        let profile = destination.profile();
        let audio_format = (profile.audio_sample_rate, profile.audio_channels);

        let writing = Arc::new(AtomicBool::new(false));
        let core = SessionCore {
            state: WriterState::Idle,
            writing: writing.clone(),
            writer,
            pool,
            converter: FrameConverter::new(),
            clock,
            audio_format,
            anchor: None,
            last_video_pts: None,
            last_audio_pts: None,
            stats: RecordingStats::default(),
        };

        Ok(Self {
            core: Arc::new(Mutex::new(core)),
            writing,
            queue,
            destination,
            clock,
        })
    }

    pub fn destination(&self) -> &MediaDestination {
        &self.destination
    }

    /// Time base used to turn sample times into presentation timestamps
    pub fn clock(&self) -> SessionClock {
        self.clock
    }

    /// Run `job` on the session thread and hand its result to `completion`
    fn enqueue<T: Send + 'static>(
        &self,
        completion: Completion<T, RecordingError>,
        job: impl FnOnce(&mut SessionCore) -> RecordingResult<T> + Send + 'static,
    ) {
        let core = Arc::downgrade(&self.core);
        self.queue.dispatch(move || {
            let Some(core) = core.upgrade() else {
                completion.resolve(Err(RecordingError::CallerDestroyed));
                return;
            };
            let result = job(&mut lock(&core));
            completion.resolve(result);
        });
    }

    pub fn start_with(&self, on_done: impl FnOnce(RecordingResult<()>) + Send + 'static) {
        self.enqueue(Completion::new(on_done), SessionCore::start);
    }

    /// Open the file and begin accepting samples
    pub async fn start(&self) -> RecordingResult<()> {
        let (completion, result) = completion_channel();
        self.enqueue(completion, SessionCore::start);
        result.await
    }

    pub fn finish_with(&self, on_done: impl FnOnce(RecordingResult<()>) + Send + 'static) {
        self.enqueue(Completion::new(on_done), SessionCore::finish);
    }

    /// Close both channels and wait for the file to be finalized
    pub async fn finish(&self) -> RecordingResult<()> {
        let (completion, result) = completion_channel();
        self.enqueue(completion, SessionCore::finish);
        result.await
    }

    /// Queue a presented frame without waiting
    ///
    /// `time` is when the frame was presented. Errors are logged.
    pub fn submit_video_frame(&self, frame: impl FrameTexture + 'static, time: HostTime) {
        let frame: Box<dyn FrameTexture> = Box::new(frame);
        let completion = Completion::new(|result: RecordingResult<()>| {
            if let Err(e) = result {
                warn!(error = %e, "Video frame append failed");
            }
        });
        self.enqueue(completion, move |core| core.append_video(frame, time));
    }

    pub async fn append_video_frame(
        &self,
        frame: impl FrameTexture + 'static,
        time: HostTime,
    ) -> RecordingResult<()> {
        let frame: Box<dyn FrameTexture> = Box::new(frame);
        let (completion, result) = completion_channel();
        self.enqueue(completion, move |core| core.append_video(frame, time));
        result.await
    }

    /// Queue a captured audio sample without waiting
    pub fn submit_audio_sample(&self, sample: AudioSample, time: HostTime) {
        let completion = Completion::new(|result: RecordingResult<()>| {
            if let Err(e) = result {
                warn!(error = %e, "Audio sample append failed");
            }
        });
        self.enqueue(completion, move |core| core.append_audio(sample, time));
    }

    pub async fn append_audio_sample(
        &self,
        sample: AudioSample,
        time: HostTime,
    ) -> RecordingResult<()> {
        let (completion, result) = completion_channel();
        self.enqueue(completion, move |core| core.append_audio(sample, time));
        result.await
    }

    /// Lock-free hint that the session is writing
    ///
    /// May lag operations still queued on the session thread. Use it to skip
    /// work before submitting a frame; [`is_recording`](Self::is_recording)
    /// gives the ordered answer.
    pub fn accepts_frames(&self) -> bool {
        self.writing.load(Ordering::Acquire)
    }

    /// Whether the session is currently writing
    ///
    /// Answered on the session thread, after everything queued before it.
    pub async fn is_recording(&self) -> bool {
        self.state().await == Ok(WriterState::Writing)
    }

    pub async fn state(&self) -> RecordingResult<WriterState> {
        let (completion, result) = completion_channel();
        self.enqueue(completion, |core| Ok(core.state));
        result.await
    }

    pub async fn stats(&self) -> RecordingResult<RecordingStats> {
        let (completion, result) = completion_channel();
        self.enqueue(completion, |core| Ok(core.stats));
        result.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_display_lowercase() {
        assert_eq!(WriterState::Finishing.to_string(), "finishing");
        assert_eq!(WriterState::Idle.to_string(), "idle");
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let path = std::env::temp_dir().join("overlay-recorder-does-not-exist.mp4");
        assert!(remove_existing(&path).is_ok());
    }
}
