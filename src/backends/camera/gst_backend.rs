// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture backend
//!
//! Devices come from a `DeviceMonitor`, which sees PipeWire, V4L2 and
//! PulseAudio sources alike. Each opened device gets its own pipeline that
//! ends in an appsink delivering BGRA frames or mono S16LE audio.

use super::backend::{CaptureBackend, CaptureInput, InputOptions, SampleHandler};
use super::types::{
    CaptureDevice, CaptureSample, DeviceCategory, DevicePosition, MediaType, SampleFormat,
};
use crate::constants::{encoding, pipeline as limits, timing};
use crate::errors::{CaptureError, CaptureResult};
use crate::media::destination::PixelFormat;
use crate::pipelines::video::HostTime;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

/// Property keys that identify a device across monitor runs, best first
const ID_KEYS: [&str; 4] = ["object.serial", "node.name", "api.v4l2.path", "device.path"];

/// Property keys carrying the camera location
const LOCATION_KEYS: [&str; 2] = ["api.libcamera.location", "camera.location"];

fn monitor_class(media: MediaType) -> &'static str {
    match media {
        MediaType::Video => "Video/Source",
        MediaType::Audio => "Audio/Source",
    }
}

/// Read a device property as a string, whatever its GType
fn property(props: &gst::StructureRef, key: &str) -> Option<String> {
    let value = props.value(key).ok()?;
    if let Ok(s) = value.get::<String>() {
        return Some(s);
    }
    value
        .transform::<String>()
        .ok()
        .and_then(|v| v.get::<String>().ok())
}

fn describe(device: &gst::Device, media: MediaType) -> CaptureDevice {
    let name = device.display_name().to_string();
    let props = device.properties();
    let props = props.as_deref();

    let id = props
        .and_then(|p| ID_KEYS.iter().find_map(|key| property(p, key)))
        .unwrap_or_else(|| name.clone());
    let position = props
        .and_then(|p| LOCATION_KEYS.iter().find_map(|key| property(p, key)))
        .map(|location| DevicePosition::from_location(&location))
        .unwrap_or_default();

    CaptureDevice {
        id,
        category: DeviceCategory::from_name(&name),
        name,
        media,
        position,
    }
}

/// Highest fixed rate advertised by an audio device
fn native_rate(device: &gst::Device) -> Option<u32> {
    let caps = device.caps()?;
    caps.iter()
        .filter_map(|s| s.get::<i32>("rate").ok())
        .filter(|rate| *rate > 0)
        .max()
        .map(|rate| rate as u32)
}

/// Capture backend built on GStreamer device monitoring
pub struct GstCaptureBackend;

impl GstCaptureBackend {
    pub fn new() -> CaptureResult<Self> {
        gst::init().map_err(|e| CaptureError::Backend(format!("GStreamer init failed: {}", e)))?;
        Ok(Self)
    }

    fn monitor_devices(&self, media: MediaType) -> Vec<gst::Device> {
        let monitor = gst::DeviceMonitor::new();
        monitor.add_filter(Some(monitor_class(media)), None);
        if let Err(e) = monitor.start() {
            warn!(media = %media, error = %e, "Failed to start device monitor");
            return Vec::new();
        }
        let devices: Vec<gst::Device> = monitor.devices().into_iter().collect();
        monitor.stop();
        debug!(media = %media, count = devices.len(), "Devices enumerated");
        devices
    }
}

impl CaptureBackend for GstCaptureBackend {
    fn devices(&self, media: MediaType) -> Vec<CaptureDevice> {
        self.monitor_devices(media)
            .iter()
            .map(|device| describe(device, media))
            .collect()
    }

    fn open_input(
        &self,
        device: &CaptureDevice,
        options: &InputOptions,
        handler: SampleHandler,
    ) -> CaptureResult<Box<dyn CaptureInput>> {
        let gst_device = self
            .monitor_devices(device.media)
            .into_iter()
            .find(|d| describe(d, device.media).id == device.id)
            .ok_or(CaptureError::DeviceUnavailable(device.media))?;

        let input = match device.media {
            MediaType::Video => {
                GstCaptureInput::video(device.clone(), &gst_device, options, handler)?
            }
            MediaType::Audio => GstCaptureInput::audio(device.clone(), &gst_device, handler)?,
        };
        Ok(Box::new(input))
    }
}

/// One device pipeline
pub struct GstCaptureInput {
    device: CaptureDevice,
    pipeline: gst::Pipeline,
    appsink: AppSink,
    sample_rate: Option<u32>,
    stopped: bool,
}

fn make(factory: &str) -> CaptureResult<gst::Element> {
    gst::ElementFactory::make(factory)
        .build()
        .map_err(|e| CaptureError::Backend(format!("Failed to create {}: {}", factory, e)))
}

impl GstCaptureInput {
    fn video(
        device: CaptureDevice,
        gst_device: &gst::Device,
        options: &InputOptions,
        handler: SampleHandler,
    ) -> CaptureResult<Self> {
        info!(device = %device, mirror = options.mirror, "Creating video capture pipeline");

        let pipeline = gst::Pipeline::with_name("capture-video");
        let source = gst_device.create_element(None)?;
        let convert = make("videoconvert")?;
        let flip = if options.mirror {
            let flip = make("videoflip")?;
            flip.set_property_from_str("method", "horizontal-flip");
            Some(flip)
        } else {
            None
        };

        let caps = gst::Caps::builder("video/x-raw")
            .field("format", limits::VIDEO_FORMAT)
            .build();
        // Late frames are never useful to a live overlay
        let appsink = AppSink::builder()
            .caps(&caps)
            .drop(true)
            .max_buffers(limits::MAX_BUFFERS)
            .sync(false)
            .enable_last_sample(false)
            .build();

        let mut chain = vec![source, convert];
        chain.extend(flip);
        chain.push(appsink.clone().upcast());
        pipeline.add_many(&chain)?;
        gst::Element::link_many(&chain)?;

        let frames = Arc::new(AtomicU64::new(0));
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                    let info = VideoInfo::from_caps(caps).map_err(|e| {
                        error!(error = %e, "Failed to read video caps");
                        gst::FlowError::NotNegotiated
                    })?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

                    let frame_num = frames.fetch_add(1, Ordering::Relaxed);
                    if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                        debug!(
                            frame = frame_num,
                            width = info.width(),
                            height = info.height(),
                            stride = info.stride()[0],
                            "Video sample"
                        );
                    }

                    handler(CaptureSample {
                        media: MediaType::Video,
                        data: Arc::from(map.as_slice()),
                        format: SampleFormat::Video {
                            width: info.width(),
                            height: info.height(),
                            stride: info.stride()[0] as u32,
                            format: PixelFormat::Bgra8,
                        },
                        timestamp: HostTime::now(),
                        data_ready: payload_ready(buffer),
                    });
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        Self::play(device, pipeline, appsink, None)
    }

    fn audio(
        device: CaptureDevice,
        gst_device: &gst::Device,
        handler: SampleHandler,
    ) -> CaptureResult<Self> {
        let rate = native_rate(gst_device).unwrap_or(encoding::DEFAULT_AUDIO_SAMPLE_RATE);
        let channels = encoding::AUDIO_CHANNELS;
        info!(device = %device, rate, "Creating audio capture pipeline");

        let pipeline = gst::Pipeline::with_name("capture-audio");
        let source = gst_device.create_element(None)?;
        let convert = make("audioconvert")?;
        let resample = make("audioresample")?;

        let caps = gst::Caps::builder("audio/x-raw")
            .field("format", limits::AUDIO_FORMAT)
            .field("layout", "interleaved")
            .field("channels", channels as i32)
            .field("rate", rate as i32)
            .build();
        let appsink = AppSink::builder()
            .caps(&caps)
            .sync(false)
            .enable_last_sample(false)
            .build();

        let chain = [source, convert, resample, appsink.clone().upcast()];
        pipeline.add_many(&chain)?;
        gst::Element::link_many(&chain)?;

        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

                    handler(CaptureSample {
                        media: MediaType::Audio,
                        data: Arc::from(map.as_slice()),
                        format: SampleFormat::Audio {
                            sample_rate: rate,
                            channels,
                        },
                        timestamp: HostTime::now(),
                        data_ready: payload_ready(buffer),
                    });
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        Self::play(device, pipeline, appsink, Some(rate))
    }

    fn play(
        device: CaptureDevice,
        pipeline: gst::Pipeline,
        appsink: AppSink,
        sample_rate: Option<u32>,
    ) -> CaptureResult<Self> {
        let input = Self {
            device,
            pipeline,
            appsink,
            sample_rate,
            stopped: false,
        };
        // On failure `input` is dropped, which returns the pipeline to Null
        input.pipeline.set_state(gst::State::Playing).map_err(|e| {
            CaptureError::Backend(format!("Failed to start capture pipeline: {}", e))
        })?;

        if let Some(bus) = input.pipeline.bus()
            && let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error])
            && let gst::MessageView::Error(err) = msg.view()
        {
            return Err(CaptureError::Backend(format!(
                "Capture pipeline error: {}",
                err.error()
            )));
        }
        Ok(input)
    }

    fn release(&mut self) -> CaptureResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        self.appsink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| CaptureError::Backend(format!("Failed to stop capture: {}", e)))?;

        let (result, state, _) = self
            .pipeline
            .state(gst::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));
        debug!(
            result = ?result,
            state = ?state,
            device = %self.device.name,
            "Capture pipeline stopped"
        );
        Ok(())
    }
}

/// Corrupted or gap buffers carry no usable payload
fn payload_ready(buffer: &gst::BufferRef) -> bool {
    !buffer
        .flags()
        .intersects(gst::BufferFlags::CORRUPTED | gst::BufferFlags::GAP)
}

impl CaptureInput for GstCaptureInput {
    fn device(&self) -> &CaptureDevice {
        &self.device
    }

    fn audio_sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    fn stop(mut self: Box<Self>) -> CaptureResult<()> {
        self.release()
    }
}

impl Drop for GstCaptureInput {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "Failed to release capture pipeline");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupted_and_gap_buffers_are_not_ready() {
        gst::init().unwrap();
        let mut buffer = gst::Buffer::with_size(4).unwrap();
        assert!(payload_ready(&buffer));

        buffer
            .get_mut()
            .unwrap()
            .set_flags(gst::BufferFlags::CORRUPTED);
        assert!(!payload_ready(&buffer));

        let mut gap = gst::Buffer::with_size(4).unwrap();
        gap.get_mut().unwrap().set_flags(gst::BufferFlags::GAP);
        assert!(!payload_ready(&gap));
    }

    #[test]
    fn enumeration_does_not_panic_without_devices() {
        let Ok(backend) = GstCaptureBackend::new() else {
            return;
        };
        for device in backend.devices(MediaType::Video) {
            assert_eq!(device.media, MediaType::Video);
            assert!(!device.id.is_empty());
        }
    }
}
