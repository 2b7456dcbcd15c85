// SPDX-License-Identifier: GPL-3.0-only

//! MP4 writer built on GStreamer appsrc branches
//!
//! ```text
//! video: appsrc (BGRA) → videoconvert → H.264 encoder → [caps] → h264parse ─┐
//!                                                                           ├→ mp4mux → filesink
//! audio: appsrc (S16LE mono) → audioconvert → audioresample → AAC encoder ──┘
//! ```
//!
//! Channel readiness mirrors the appsrc queue: `enough-data` clears it and
//! `need-data` sets it again. The video queue holds only a few frames so a
//! slow encoder makes the session drop frames; the audio queue holds
//! seconds so audio rides out short stalls.

use super::{AudioSample, FinishCallback, MediaChannel, MediaWriter, WriterStatus};
use crate::constants::{timing, writer as limits};
use crate::errors::{RecordingError, RecordingResult};
use crate::media::destination::{EncodeProfile, MediaDestination, PixelLayout};
use crate::media::encoders::{self, SelectedVideoEncoder};
use crate::media::pixel_pool::PixelBuffer;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

struct WriterShared {
    status: WriterStatus,
    error: Option<String>,
}

/// One appsrc-fed branch of the pipeline
struct WriterInput {
    channel: MediaChannel,
    appsrc: gst_app::AppSrc,
    /// appsrc first, muxer-facing element last
    elements: Vec<gst::Element>,
    ready: Arc<AtomicBool>,
    added: bool,
    finished: bool,
}

impl WriterInput {
    fn new(
        channel: MediaChannel,
        caps: &gst::Caps,
        max_bytes: u64,
        tail: Vec<gst::Element>,
    ) -> Self {
        let appsrc = gst_app::AppSrc::builder()
            .name(format!("{}_src", channel))
            .caps(caps)
            .format(gst::Format::Time)
            .is_live(true)
            .build();
        appsrc.set_max_bytes(max_bytes);

        let ready = Arc::new(AtomicBool::new(true));
        let need = ready.clone();
        let enough = ready.clone();
        appsrc.set_callbacks(
            gst_app::AppSrcCallbacks::builder()
                .need_data(move |_, _| need.store(true, Ordering::Release))
                .enough_data(move |_| enough.store(false, Ordering::Release))
                .build(),
        );

        let mut elements = vec![appsrc.clone().upcast::<gst::Element>()];
        elements.extend(tail);

        Self {
            channel,
            appsrc,
            elements,
            ready,
            added: false,
            finished: false,
        }
    }

    fn is_active(&self) -> bool {
        self.added && !self.finished
    }

    fn send_eos(&mut self) {
        if !self.is_active() {
            return;
        }
        if let Err(e) = self.appsrc.end_of_stream() {
            warn!(channel = %self.channel, ?e, "Failed to send EOS");
        }
        self.finished = true;
    }
}

/// [`MediaWriter`] producing an H.264/AAC MP4 file
pub struct GstWriter {
    pipeline: gst::Pipeline,
    muxer: gst::Element,
    output_path: PathBuf,
    layout: PixelLayout,
    /// Sample rate and channel count negotiated on the audio appsrc
    audio_format: (u32, u32),
    video: Option<WriterInput>,
    audio: Option<WriterInput>,
    shared: Arc<Mutex<WriterShared>>,
    anchor: Option<Duration>,
    finalizing: bool,
}

impl GstWriter {
    /// Build the writer for `destination` using the preferred encoders
    pub fn new(destination: &MediaDestination) -> RecordingResult<Self> {
        Self::with_video_encoders(destination, encoders::H264_ENCODERS)
    }

    /// Build the writer, choosing the video encoder from `candidates`
    pub fn with_video_encoders(
        destination: &MediaDestination,
        candidates: &[(&'static str, bool)],
    ) -> RecordingResult<Self> {
        destination
            .validate()
            .map_err(RecordingError::SystemFailure)?;
        check_output_path(destination.path())?;
        gst::init()?;

        let profile = destination.profile();
        let layout = destination.pixel_layout();
        let path = destination.path().to_path_buf();

        let pipeline = gst::Pipeline::builder().name("recording-writer").build();
        let muxer = gst::ElementFactory::make("mp4mux").build()?;
        let filesink = gst::ElementFactory::make("filesink")
            .property("location", path.to_string_lossy().to_string())
            .property("async", false)
            .build()?;
        pipeline.add_many([&muxer, &filesink])?;
        gst::Element::link_many([&muxer, &filesink])?;

        let video = match encoders::video::select_h264_encoder_from(candidates, profile) {
            Ok(selected) => Some(video_input(layout, profile, selected)?),
            Err(e) => {
                warn!(error = %e, "Video channel unavailable");
                None
            }
        };

        let audio = match encoders::select_aac_encoder(profile) {
            Ok(selected) => Some(audio_input(profile, selected.encoder)?),
            Err(e) => {
                warn!(error = %e, "Audio channel unavailable");
                None
            }
        };

        if video.is_none() && audio.is_none() {
            return Err(RecordingError::SystemFailure(
                "No encoder available for either channel".to_string(),
            ));
        }

        info!(
            path = %path.display(),
            width = layout.width,
            height = layout.height,
            video = video.is_some(),
            audio = audio.is_some(),
            "Created MP4 writer"
        );

        Ok(Self {
            pipeline,
            muxer,
            output_path: path,
            layout,
            audio_format: (profile.audio_sample_rate, profile.audio_channels),
            video,
            audio,
            shared: Arc::new(Mutex::new(WriterShared {
                status: WriterStatus::Unknown,
                error: None,
            })),
            anchor: None,
            finalizing: false,
        })
    }

    fn input(&self, channel: MediaChannel) -> Option<&WriterInput> {
        match channel {
            MediaChannel::Video => self.video.as_ref(),
            MediaChannel::Audio => self.audio.as_ref(),
        }
    }

    fn input_mut(&mut self, channel: MediaChannel) -> Option<&mut WriterInput> {
        match channel {
            MediaChannel::Video => self.video.as_mut(),
            MediaChannel::Audio => self.audio.as_mut(),
        }
    }

    fn shared(&self) -> std::sync::MutexGuard<'_, WriterShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, message: String) {
        error!(error = %message, "Writer failed");
        let mut shared = self.shared();
        shared.status = WriterStatus::Failed;
        shared.error.get_or_insert(message);
    }

    /// Pick up errors posted by pipeline elements since the last check
    fn poll_bus(&self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(err) = msg.view() {
                self.fail(format!("{} ({:?})", err.error(), err.debug()));
            }
        }
    }

    /// Map a session timestamp onto the file timeline
    fn running_time(&self, pts: Duration) -> Result<gst::ClockTime, String> {
        let anchor = self
            .anchor
            .ok_or_else(|| "Session has not been started".to_string())?;
        let running = pts
            .checked_sub(anchor)
            .ok_or_else(|| format!("Timestamp {:?} precedes session start {:?}", pts, anchor))?;
        Ok(gst::ClockTime::from_nseconds(running.as_nanos() as u64))
    }

    fn push(&self, channel: MediaChannel, buffer: gst::Buffer) -> Result<(), String> {
        let input = self
            .input(channel)
            .filter(|input| input.is_active())
            .ok_or_else(|| format!("The {} input is not active", channel))?;

        input.appsrc.push_buffer(buffer).map(|_| ()).map_err(|e| {
            let message = format!("Failed to push {} buffer: {:?}", channel, e);
            self.fail(message.clone());
            message
        })
    }
}

fn check_output_path(path: &Path) -> RecordingResult<()> {
    if path.is_dir() {
        return Err(RecordingError::SystemFailure(format!(
            "Output path {} is a directory",
            path.display()
        )));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(RecordingError::SystemFailure(format!(
                "Output directory {} does not exist",
                parent.display()
            )))
        }
        _ => Ok(()),
    }
}

fn video_input(
    layout: PixelLayout,
    profile: &EncodeProfile,
    selected: SelectedVideoEncoder,
) -> RecordingResult<WriterInput> {
    let format = gst_video::VideoFormat::Bgra;
    let caps = gst_video::VideoInfo::builder(format, layout.width, layout.height)
        .fps(gst::Fraction::new(profile.frame_rate_hint as i32, 1))
        .build()?
        .to_caps()?;

    let convert = gst::ElementFactory::make("videoconvert").build()?;
    let mut tail = vec![convert];
    tail.extend(selected.chain().into_iter().cloned());

    let max_bytes = layout.frame_size() as u64 * limits::VIDEO_QUEUE_FRAMES;
    debug!(encoder = selected.element_name, max_bytes, "Video input prepared");
    Ok(WriterInput::new(MediaChannel::Video, &caps, max_bytes, tail))
}

fn audio_input(profile: &EncodeProfile, encoder: gst::Element) -> RecordingResult<WriterInput> {
    let caps = gst::Caps::builder("audio/x-raw")
        .field("format", crate::constants::pipeline::AUDIO_FORMAT)
        .field("layout", "interleaved")
        .field("channels", profile.audio_channels as i32)
        .field("rate", profile.audio_sample_rate as i32)
        .build();

    let convert = gst::ElementFactory::make("audioconvert").build()?;
    let resample = gst::ElementFactory::make("audioresample").build()?;

    let bytes_per_second = profile.audio_sample_rate as u64 * 2 * profile.audio_channels as u64;
    let max_bytes = bytes_per_second * limits::AUDIO_QUEUE_SECONDS;
    Ok(WriterInput::new(
        MediaChannel::Audio,
        &caps,
        max_bytes,
        vec![convert, resample, encoder],
    ))
}

/// Wait for the muxer to write the trailer, or for an error
fn wait_for_eos(pipeline: &gst::Pipeline) -> Result<(), String> {
    let bus = pipeline
        .bus()
        .ok_or_else(|| "Pipeline has no bus".to_string())?;

    for msg in bus.iter_timed(gst::ClockTime::from_seconds(timing::FINALIZE_TIMEOUT_SECS)) {
        match msg.view() {
            gst::MessageView::Eos(..) => return Ok(()),
            gst::MessageView::Error(err) => {
                return Err(format!("{} ({:?})", err.error(), err.debug()));
            }
            _ => {}
        }
    }

    Err(format!(
        "Timed out after {}s waiting for the file to be finalized",
        timing::FINALIZE_TIMEOUT_SECS
    ))
}

impl MediaWriter for GstWriter {
    fn status(&self) -> WriterStatus {
        if !self.finalizing && self.shared().status == WriterStatus::Writing {
            self.poll_bus();
        }
        self.shared().status
    }

    fn error(&self) -> Option<String> {
        self.shared().error.clone()
    }

    fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn pixel_layout(&self) -> PixelLayout {
        self.layout
    }

    fn can_add_input(&self, channel: MediaChannel) -> bool {
        self.shared().status == WriterStatus::Unknown
            && self.input(channel).is_some_and(|input| !input.added)
    }

    fn add_input(&mut self, channel: MediaChannel) -> Result<(), String> {
        if !self.can_add_input(channel) {
            return Err(format!("Cannot add the {} input", channel));
        }
        let pipeline = self.pipeline.clone();
        let muxer = self.muxer.clone();
        let input = self
            .input_mut(channel)
            .ok_or_else(|| format!("No {} input", channel))?;

        pipeline
            .add_many(&input.elements)
            .map_err(|e| format!("Failed to add {} elements: {}", channel, e))?;
        gst::Element::link_many(&input.elements)
            .map_err(|e| format!("Failed to link {} elements: {}", channel, e))?;
        if let Some(last) = input.elements.last() {
            last.link(&muxer)
                .map_err(|e| format!("Failed to link {} branch to muxer: {}", channel, e))?;
        }

        input.added = true;
        debug!(channel = %channel, "Writer input added");
        Ok(())
    }

    fn start_writing(&mut self) -> Result<(), String> {
        let any_added = MediaChannel::ALL
            .iter()
            .any(|&channel| self.input(channel).is_some_and(|input| input.added));
        if !any_added {
            return Err("No inputs were added".to_string());
        }

        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| format!("Failed to start writer pipeline: {}", e))?;

        if let Some(bus) = self.pipeline.bus()
            && let Some(msg) = bus.timed_pop_filtered(
                gst::ClockTime::from_mseconds(timing::WRITER_START_CHECK_MS),
                &[gst::MessageType::Error],
            )
            && let gst::MessageView::Error(err) = msg.view()
        {
            let message = format!("{} ({:?})", err.error(), err.debug());
            self.fail(message.clone());
            let _ = self.pipeline.set_state(gst::State::Null);
            return Err(message);
        }

        self.shared().status = WriterStatus::Writing;
        info!(path = %self.output_path.display(), "Writer started");
        Ok(())
    }

    fn start_session(&mut self, anchor: Duration) {
        debug!(anchor_ms = anchor.as_millis() as u64, "Writer session started");
        self.anchor = Some(anchor);
    }

    fn is_ready(&self, channel: MediaChannel) -> bool {
        self.input(channel)
            .is_some_and(|input| input.is_active() && input.ready.load(Ordering::Acquire))
    }

    fn append_pixel_buffer(&mut self, buffer: PixelBuffer, pts: Duration) -> Result<(), String> {
        let running = self.running_time(pts)?;
        let mut gst_buffer = gst::Buffer::from_mut_slice(buffer);
        gst_buffer
            .get_mut()
            .ok_or_else(|| "Failed to get mutable buffer reference".to_string())?
            .set_pts(running);
        self.push(MediaChannel::Video, gst_buffer)
    }

    fn append_audio(&mut self, sample: &AudioSample, pts: Duration) -> Result<(), String> {
        if (sample.sample_rate(), sample.channels()) != self.audio_format {
            return Err(format!(
                "Audio sample is {} Hz x{}, input caps are {} Hz x{}",
                sample.sample_rate(),
                sample.channels(),
                self.audio_format.0,
                self.audio_format.1
            ));
        }
        let running = self.running_time(pts)?;
        let mut gst_buffer = gst::Buffer::from_slice(sample.data().clone());
        {
            let buffer_ref = gst_buffer
                .get_mut()
                .ok_or_else(|| "Failed to get mutable buffer reference".to_string())?;
            buffer_ref.set_pts(running);
            buffer_ref.set_duration(gst::ClockTime::from_nseconds(
                sample.duration().as_nanos() as u64,
            ));
        }
        self.push(MediaChannel::Audio, gst_buffer)
    }

    fn mark_finished(&mut self, channel: MediaChannel) {
        if let Some(input) = self.input_mut(channel) {
            input.send_eos();
        }
    }

    fn finish_writing(&mut self, on_done: FinishCallback) {
        for channel in MediaChannel::ALL {
            self.mark_finished(channel);
        }
        self.finalizing = true;

        let pipeline = self.pipeline.clone();
        let shared = self.shared.clone();
        let path = self.output_path.clone();

        let finalize: Box<dyn FnOnce() + Send> = Box::new(move || {
            let outcome = wait_for_eos(&pipeline);
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                warn!(?e, "Failed to stop writer pipeline");
            }

            let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
            match outcome {
                Ok(()) if state.error.is_none() => {
                    state.status = WriterStatus::Completed;
                    info!(path = %path.display(), "Recording file finalized");
                }
                Ok(()) => state.status = WriterStatus::Failed,
                Err(e) => {
                    error!(error = %e, "Recording file could not be finalized");
                    state.status = WriterStatus::Failed;
                    state.error.get_or_insert(e);
                }
            }
            let (status, error) = (state.status, state.error.clone());
            drop(state);
            on_done(status, error);
        });

        // Kept outside the thread closure so a failed spawn can still run it
        let slot = Arc::new(Mutex::new(Some(finalize)));
        let thread_slot = slot.clone();
        let spawned = thread::Builder::new()
            .name("writer-finalize".to_string())
            .spawn(move || {
                let job = thread_slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(job) = job {
                    job();
                }
            });

        if let Err(e) = spawned {
            warn!(error = %e, "Failed to spawn finalizer thread, finalizing inline");
            let job = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(job) = job {
                job();
            }
        }
    }
}

impl Drop for GstWriter {
    fn drop(&mut self) {
        // The finalizer thread owns shutdown once finishing has begun
        if !self.finalizing {
            let _ = self.pipeline.set_state(gst::State::Null);
        }
    }
}
