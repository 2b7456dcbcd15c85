// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing capture devices and encoders
//! - Recording a composited camera overlay with microphone audio
//!
//! The `record` command plays the part of the host application: it owns
//! the render loop, draws the camera feed with a recording badge into a
//! frame, presents it through a [`PresentationNotifier`] and lets a
//! [`RecordingBridge`] hand presented frames to the session.

use image::{Rgba, RgbaImage, imageops};
use overlay_recorder::backends::camera::{
    CaptureOptions, CaptureSample, CaptureSource, GstCaptureBackend, InputOptions, MediaType,
    MediumOutcome, PermissionProvider, PermissionStatus, PortalPermissions, SampleFormat,
    SampleListener, StaticPermissions, select_audio_device, select_video_device,
};
use overlay_recorder::config::Config;
use overlay_recorder::constants::{app_info, encoding, format_bitrate};
use overlay_recorder::errors::{AppError, AppResult};
use overlay_recorder::gpu::GpuContext;
use overlay_recorder::media::encoders::{detect_aac_encoders, detect_h264_encoders};
use overlay_recorder::media::{AudioSample, CpuFrame, EncodeProfile, MediaDestination};
use overlay_recorder::pipelines::video::{
    FramePresentedListener, HostTime, PresentationNotifier, PresentedFrame, RecordingBridge,
    RecordingSession,
};
use overlay_recorder::storage;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const BACKGROUND: Rgba<u8> = Rgba([24, 24, 24, 255]);
const BADGE: Rgba<u8> = Rgba([220, 32, 32, 255]);

/// Options of the `record` command
pub struct RecordArgs {
    pub duration: u64,
    pub output: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub scale: u32,
    pub gpu: bool,
    pub audio: bool,
    pub deny_audio: bool,
    pub deny_video: bool,
}

/// List capture devices and encoders
pub fn list_devices() -> AppResult<()> {
    let backend = GstCaptureBackend::new()?;
    let source = CaptureSource::new(
        Arc::new(backend),
        Arc::new(StaticPermissions::allow_all()),
        CaptureOptions::default(),
    )?;
    let config = Config::load();

    println!(
        "{} {} ({})\n",
        app_info::APP_NAME,
        app_info::version(),
        app_info::runtime_environment()
    );

    for media in MediaType::ALL {
        let devices = source.devices(media);
        let selected = match media {
            MediaType::Video => {
                select_video_device(&devices, config.preferred_video_device.as_deref())
            }
            MediaType::Audio => select_audio_device(&devices),
        };

        match media {
            MediaType::Video => println!("Cameras:"),
            MediaType::Audio => println!("Microphones:"),
        }
        if devices.is_empty() {
            println!("  (none)");
        }
        for (index, device) in devices.iter().enumerate() {
            let marker = if selected == Some(device) { "*" } else { " " };
            println!(" {}[{}] {}", marker, index, device);
        }
        println!();
    }

    let list = |names: Vec<&str>| {
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    };
    println!("H.264 encoders: {}", list(detect_h264_encoders()));
    println!("AAC encoders:   {}", list(detect_aac_encoders()));
    Ok(())
}

/// Keeps the newest camera frame for the render loop and forwards
/// microphone samples to the active session
#[derive(Default)]
struct CameraFeed {
    latest: Mutex<Option<CaptureSample>>,
    session: Mutex<Option<Arc<RecordingSession>>>,
}

impl CameraFeed {
    fn latest(&self) -> Option<CaptureSample> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn attach(&self, session: Option<Arc<RecordingSession>>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }
}

impl SampleListener for CameraFeed {
    fn on_video_sample_ready(&self, sample: &CaptureSample, _timestamp: HostTime) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(sample.clone());
    }

    fn on_audio_sample_ready(&self, sample: &CaptureSample, timestamp: HostTime) {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(session) = session
            && let Some(audio) = AudioSample::from_capture(sample)
        {
            session.submit_audio_sample(audio, timestamp);
        }
    }
}

fn permissions_for(args: &RecordArgs) -> Arc<dyn PermissionProvider> {
    if args.deny_audio || args.deny_video {
        let status = |deny: bool| {
            if deny {
                PermissionStatus::Denied
            } else {
                PermissionStatus::Authorized
            }
        };
        Arc::new(StaticPermissions::new(
            status(args.deny_video),
            status(args.deny_audio),
        ))
    } else {
        Arc::new(PortalPermissions::new())
    }
}

/// Record until the duration elapses or Ctrl+C
pub fn record(args: RecordArgs) -> AppResult<()> {
    let config = Config::load();
    let rt = tokio::runtime::Runtime::new()?;

    // Capture
    let source = CaptureSource::new(
        Arc::new(GstCaptureBackend::new()?),
        permissions_for(&args),
        CaptureOptions {
            input: InputOptions {
                mirror: config.mirror_preview,
            },
            preferred_video_device: config.preferred_video_device.clone(),
        },
    )?;
    let feed = Arc::new(CameraFeed::default());
    let listener: Arc<dyn SampleListener> = feed.clone();
    source.add_listener(&listener);

    let report = rt.block_on(source.configure(true, args.audio))?;
    for media in MediaType::ALL {
        match report.outcome(media) {
            MediumOutcome::Active(device) => println!("{:<6} {}", media, device.name),
            MediumOutcome::Unused => println!("{:<6} off", media),
            MediumOutcome::Failed(e) => println!("{:<6} unavailable ({})", media, e),
        }
    }

    // Destination
    let output_path = storage::resolve_output_path(
        args.output.as_deref(),
        config.output_folder.as_deref(),
    )?;
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let sample_rate = source
        .audio_sample_rate()
        .unwrap_or(encoding::DEFAULT_AUDIO_SAMPLE_RATE);
    let (pixel_width, pixel_height) =
        MediaDestination::pixel_size(args.width, args.height, args.scale);
    let mut profile =
        EncodeProfile::for_output(pixel_width, pixel_height, config.bitrate_preset, sample_rate);
    profile.frame_rate_hint = config.frame_rate_hint.max(1);
    let destination =
        MediaDestination::new(&output_path, args.width, args.height, args.scale, profile);
    destination.validate().map_err(AppError::Config)?;
    let (width, height) = (destination.width(), destination.height());

    println!("Output:   {}", output_path.display());
    println!(
        "Size:     {}x{} @ {} fps, {} quality ({})",
        width,
        height,
        destination.profile().frame_rate_hint,
        config.bitrate_preset.display_name(),
        format_bitrate(destination.profile().video_bitrate_kbps)
    );
    println!("Duration: {} seconds", args.duration);

    // Renderer side
    let gpu = if args.gpu {
        let context = pollster::block_on(GpuContext::new("overlay-recorder"))
            .map_err(AppError::Gpu)?;
        println!("GPU:      {}", context.info().adapter_name);
        Some(Arc::new(context))
    } else {
        None
    };
    let target = gpu
        .as_ref()
        .map(|gpu| gpu.create_frame_texture(width, height));

    let session = Arc::new(RecordingSession::construct(destination)?);
    let notifier = PresentationNotifier::new();
    let bridge = Arc::new(RecordingBridge::new(gpu.clone()));
    let bridge_listener: Arc<dyn FramePresentedListener> = bridge.clone();
    notifier.add_listener(&bridge_listener);

    rt.block_on(session.start())?;
    bridge.attach(session.clone());
    feed.attach(Some(session.clone()));

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| AppError::Other(format!("Failed to install Ctrl+C handler: {}", e)))?;

    println!();
    println!("Recording... (press Ctrl+C to stop early)");

    let frame_interval = Duration::from_secs(1) / session.destination().profile().frame_rate_hint;
    let target_duration = Duration::from_secs(args.duration);
    let start = Instant::now();
    let mut next_frame = start;

    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }

        let elapsed = start.elapsed();
        let canvas = compose_frame(feed.latest().as_ref(), width, height, elapsed);
        match (&gpu, &target) {
            (Some(gpu), Some(texture)) => {
                let mut pixels = canvas.into_raw();
                rgba_to_bgra_in_place(&mut pixels);
                gpu.upload(texture, &pixels);
                notifier.frame_presented(PresentedFrame::Gpu(texture));
            }
            _ => {
                let frame = CpuFrame::from_rgba_image(canvas);
                notifier.frame_presented(PresentedFrame::Cpu(&frame));
            }
        }

        let secs = elapsed.as_secs();
        print!("\rRecording: {:02}:{:02}", secs / 60, secs % 60);
        std::io::stdout().flush()?;

        next_frame += frame_interval;
        let now = Instant::now();
        if next_frame > now {
            std::thread::sleep(next_frame - now);
        } else {
            // Running behind; skip ahead instead of bursting
            next_frame = now;
        }
    }
    println!();

    bridge.detach();
    feed.attach(None);
    notifier.remove_all_listeners();

    let finished = rt.block_on(session.finish());
    match rt.block_on(session.stats()) {
        Ok(stats) => info!(?stats, "Recording statistics"),
        Err(e) => warn!(error = %e, "Recording statistics unavailable"),
    }
    if let Err(e) = rt.block_on(source.shutdown()) {
        warn!(error = %e, "Failed to stop capture");
    }
    finished?;

    println!("Recording saved: {}", output_path.display());
    Ok(())
}

/// Draw one overlay frame: the camera image filling the canvas, plus a
/// blinking recording badge
fn compose_frame(
    camera: Option<&CaptureSample>,
    width: u32,
    height: u32,
    elapsed: Duration,
) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);

    if let Some(image) = camera.and_then(camera_image) {
        let cover = f64::max(
            width as f64 / image.width() as f64,
            height as f64 / image.height() as f64,
        );
        let scaled_w = ((image.width() as f64 * cover).round() as u32).max(1);
        let scaled_h = ((image.height() as f64 * cover).round() as u32).max(1);
        let scaled = imageops::resize(&image, scaled_w, scaled_h, imageops::FilterType::Nearest);
        let x = (width as i64 - scaled_w as i64) / 2;
        let y = (height as i64 - scaled_h as i64) / 2;
        imageops::overlay(&mut canvas, &scaled, x, y);
    }

    if elapsed.as_secs() % 2 == 0 {
        let radius = (width.min(height) / 24).max(2);
        let center = radius * 2;
        draw_disc(&mut canvas, center, center, radius, BADGE);
    }
    canvas
}

/// Convert a BGRA camera sample into an RGBA image
fn camera_image(sample: &CaptureSample) -> Option<RgbaImage> {
    let SampleFormat::Video {
        width,
        height,
        stride,
        ..
    } = sample.format
    else {
        return None;
    };
    let row_bytes = width as usize * 4;
    let stride = stride as usize;
    if width == 0
        || height == 0
        || stride < row_bytes
        || sample.data.len() < stride * (height as usize - 1) + row_bytes
    {
        return None;
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in sample.data.chunks(stride).take(height as usize) {
        for px in row[..row_bytes].chunks_exact(4) {
            pixels.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
    }
    RgbaImage::from_raw(width, height, pixels)
}

fn rgba_to_bgra_in_place(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}

fn draw_disc(canvas: &mut RgbaImage, cx: u32, cy: u32, radius: u32, color: Rgba<u8>) {
    let r2 = (radius * radius) as i64;
    let (x0, x1) = (cx.saturating_sub(radius), (cx + radius).min(canvas.width()));
    let (y0, y1) = (cy.saturating_sub(radius), (cy + radius).min(canvas.height()));
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as i64 - cx as i64;
            let dy = y as i64 - cy as i64;
            if dx * dx + dy * dy <= r2 {
                canvas.put_pixel(x, y, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgra_sample(width: u32, height: u32, stride: u32, pixel: [u8; 4]) -> CaptureSample {
        let mut data = vec![0u8; (stride * height) as usize];
        for row in data.chunks_mut(stride as usize) {
            for px in row[..(width * 4) as usize].chunks_exact_mut(4) {
                px.copy_from_slice(&pixel);
            }
        }
        CaptureSample {
            media: MediaType::Video,
            data: Arc::from(data),
            format: SampleFormat::Video {
                width,
                height,
                stride,
                format: overlay_recorder::media::PixelFormat::Bgra8,
            },
            timestamp: HostTime::now(),
            data_ready: true,
        }
    }

    #[test]
    fn camera_image_swaps_channels_and_drops_padding() {
        let sample = bgra_sample(2, 2, 16, [10, 20, 30, 255]);
        let image = camera_image(&sample).unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(1, 1), &Rgba([30, 20, 10, 255]));
    }

    #[test]
    fn short_camera_payload_is_ignored() {
        let mut sample = bgra_sample(4, 4, 16, [0, 0, 0, 255]);
        sample.data = Arc::from(vec![0u8; 8]);
        assert!(camera_image(&sample).is_none());
    }

    #[test]
    fn frame_has_requested_size_and_badge() {
        let frame = compose_frame(None, 120, 240, Duration::ZERO);
        assert_eq!(frame.dimensions(), (120, 240));
        assert_eq!(frame.get_pixel(10, 10), &BADGE);

        let blink = compose_frame(None, 120, 240, Duration::from_secs(1));
        assert_eq!(blink.get_pixel(10, 10), &BACKGROUND);
    }

    #[test]
    fn camera_fills_canvas() {
        let sample = bgra_sample(4, 2, 16, [0, 255, 0, 255]);
        let frame = compose_frame(Some(&sample), 8, 8, Duration::from_secs(1));
        assert_eq!(frame.get_pixel(0, 0), &Rgba([0, 255, 0, 255]));
        assert_eq!(frame.get_pixel(7, 7), &Rgba([0, 255, 0, 255]));
    }
}
