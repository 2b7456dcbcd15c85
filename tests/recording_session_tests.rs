// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the recording session state machine
//!
//! A scripted in-memory writer stands in for the GStreamer muxer so the
//! state machine can be driven deterministically.

use overlay_recorder::constants::BitratePreset;
use overlay_recorder::constants::writer::PIXEL_POOL_CAPACITY;
use overlay_recorder::errors::RecordingError;
use overlay_recorder::gpu::GpuContext;
use overlay_recorder::media::writer::FinishCallback;
use overlay_recorder::media::{
    AudioSample, CpuFrame, EncodeProfile, MediaChannel, MediaDestination, MediaWriter,
    PixelBuffer, PixelFormat, PixelLayout, WriterStatus,
};
use overlay_recorder::pipelines::video::{
    FramePresentedListener, HostTime, PresentationNotifier, PresentedFrame, RecordingBridge,
    RecordingSession, WriterState,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Anchor(Duration),
    Video(Duration),
    Audio(Duration),
    Finished(MediaChannel),
}

/// Knobs and observations shared between a test and its writer
struct Script {
    events: Mutex<Vec<Event>>,
    video_ready: AtomicBool,
    audio_ready: AtomicBool,
    fail_start: Mutex<Option<String>>,
    fail_finish: AtomicBool,
    /// Hold on to appended buffers instead of returning them to the pool
    keep_buffers: AtomicBool,
    /// First pixel of every appended frame
    first_pixels: Mutex<Vec<[u8; 4]>>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            video_ready: AtomicBool::new(true),
            audio_ready: AtomicBool::new(true),
            fail_start: Mutex::new(None),
            fail_finish: AtomicBool::new(false),
            keep_buffers: AtomicBool::new(false),
            first_pixels: Mutex::new(Vec::new()),
        }
    }
}

impl Script {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn timestamps(&self, video: bool) -> Vec<Duration> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Video(pts) if video => Some(pts),
                Event::Audio(pts) if !video => Some(pts),
                _ => None,
            })
            .collect()
    }
}

struct ScriptedWriter {
    path: PathBuf,
    layout: PixelLayout,
    script: Arc<Script>,
    status: WriterStatus,
    payload: Vec<u8>,
    held: Vec<PixelBuffer>,
    /// Blocks `start_writing` after announcing it was entered
    start_gate: Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>,
}

impl ScriptedWriter {
    fn new(destination: &MediaDestination, script: Arc<Script>) -> Self {
        Self {
            path: destination.path().to_path_buf(),
            layout: destination.pixel_layout(),
            script,
            status: WriterStatus::Unknown,
            payload: Vec::new(),
            held: Vec::new(),
            start_gate: None,
        }
    }
}

impl MediaWriter for ScriptedWriter {
    fn status(&self) -> WriterStatus {
        self.status
    }

    fn error(&self) -> Option<String> {
        None
    }

    fn output_path(&self) -> &Path {
        &self.path
    }

    fn pixel_layout(&self) -> PixelLayout {
        self.layout
    }

    fn can_add_input(&self, _channel: MediaChannel) -> bool {
        true
    }

    fn add_input(&mut self, _channel: MediaChannel) -> Result<(), String> {
        Ok(())
    }

    fn start_writing(&mut self) -> Result<(), String> {
        if let Some((entered, release)) = self.start_gate.take() {
            let _ = entered.send(());
            let _ = release.recv();
        }
        if let Some(error) = self.script.fail_start.lock().unwrap().clone() {
            self.status = WriterStatus::Failed;
            return Err(error);
        }
        self.status = WriterStatus::Writing;
        Ok(())
    }

    fn start_session(&mut self, anchor: Duration) {
        self.script.events.lock().unwrap().push(Event::Anchor(anchor));
    }

    fn is_ready(&self, channel: MediaChannel) -> bool {
        match channel {
            MediaChannel::Video => self.script.video_ready.load(Ordering::SeqCst),
            MediaChannel::Audio => self.script.audio_ready.load(Ordering::SeqCst),
        }
    }

    fn append_pixel_buffer(&mut self, buffer: PixelBuffer, pts: Duration) -> Result<(), String> {
        assert_eq!(buffer.layout(), self.layout);
        let pixels = buffer.as_ref();
        self.payload.extend_from_slice(&pixels[..16]);
        self.script
            .first_pixels
            .lock()
            .unwrap()
            .push([pixels[0], pixels[1], pixels[2], pixels[3]]);
        self.script.events.lock().unwrap().push(Event::Video(pts));
        if self.script.keep_buffers.load(Ordering::SeqCst) {
            self.held.push(buffer);
        }
        Ok(())
    }

    fn append_audio(&mut self, sample: &AudioSample, pts: Duration) -> Result<(), String> {
        self.payload.extend_from_slice(sample.data());
        self.script.events.lock().unwrap().push(Event::Audio(pts));
        Ok(())
    }

    fn mark_finished(&mut self, channel: MediaChannel) {
        self.script
            .events
            .lock()
            .unwrap()
            .push(Event::Finished(channel));
    }

    fn finish_writing(&mut self, on_done: FinishCallback) {
        if self.script.fail_finish.load(Ordering::SeqCst) {
            self.status = WriterStatus::Failed;
            on_done(WriterStatus::Failed, Some("disk full".to_string()));
            return;
        }
        match std::fs::write(&self.path, &self.payload) {
            Ok(()) => {
                self.status = WriterStatus::Completed;
                on_done(WriterStatus::Completed, None);
            }
            Err(e) => {
                self.status = WriterStatus::Failed;
                on_done(WriterStatus::Failed, Some(e.to_string()));
            }
        }
    }
}

fn temp_output(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "overlay-recorder-session-{}-{}",
        name,
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("recording.mp4")
}

/// 360x640 points at scale 3
fn portrait_destination(path: &Path) -> MediaDestination {
    let profile = EncodeProfile::for_output(1080, 1920, BitratePreset::Medium, 48_000);
    MediaDestination::new(path, 360, 640, 3, profile)
}

fn small_destination(path: &Path) -> MediaDestination {
    let profile = EncodeProfile::for_output(8, 8, BitratePreset::Low, 48_000);
    MediaDestination::new(path, 8, 8, 1, profile)
}

fn session_with(destination: MediaDestination) -> (RecordingSession, Arc<Script>) {
    let script = Arc::new(Script::default());
    let writer = ScriptedWriter::new(&destination, script.clone());
    let session = RecordingSession::with_writer(destination, Box::new(writer)).unwrap();
    (session, script)
}

fn frame_for(destination: &MediaDestination, shade: u8) -> CpuFrame {
    let (w, h) = (destination.width(), destination.height());
    CpuFrame::new(
        w,
        h,
        w as usize * 4,
        PixelFormat::Bgra8,
        vec![shade; w as usize * h as usize * 4],
    )
    .unwrap()
}

fn audio() -> AudioSample {
    AudioSample::from_pcm(&[1i16; 480], 48_000, 1)
}

fn at(session: &RecordingSession, millis: u64) -> HostTime {
    session.clock().origin() + Duration::from_millis(millis)
}

fn is_non_decreasing(values: &[Duration]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

#[tokio::test]
async fn portrait_recording_completes_with_all_samples() {
    let path = temp_output("portrait");
    let destination = portrait_destination(&path);
    assert_eq!((destination.width(), destination.height()), (1080, 1920));
    let (session, script) = session_with(destination.clone());

    session.start().await.unwrap();
    assert_eq!(session.state().await, Ok(WriterState::Writing));
    assert!(session.is_recording().await);

    session
        .append_video_frame(frame_for(&destination, 1), at(&session, 0))
        .await
        .unwrap();
    session.append_audio_sample(audio(), at(&session, 1)).await.unwrap();
    session
        .append_video_frame(frame_for(&destination, 2), at(&session, 16))
        .await
        .unwrap();
    session.append_audio_sample(audio(), at(&session, 20)).await.unwrap();
    session
        .append_video_frame(frame_for(&destination, 3), at(&session, 33))
        .await
        .unwrap();

    let stats = session.stats().await.unwrap();
    assert_eq!(stats.video_frames_appended, 3);
    assert_eq!(stats.audio_samples_appended, 2);
    assert_eq!(stats.video_frames_dropped + stats.audio_samples_dropped, 0);

    let video = script.timestamps(true);
    let audio = script.timestamps(false);
    assert_eq!(video.len(), 3);
    assert_eq!(audio.len(), 2);
    assert!(is_non_decreasing(&video));
    assert!(is_non_decreasing(&audio));

    session.finish().await.unwrap();
    assert_eq!(session.state().await, Ok(WriterState::Completed));
    assert!(!session.is_recording().await);

    let written = std::fs::metadata(&path).unwrap();
    assert!(written.len() > 0);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn audio_in_another_format_is_rejected() {
    let path = temp_output("audio-format");
    let (session, script) = session_with(small_destination(&path));
    session.start().await.unwrap();

    let stereo = AudioSample::from_pcm(&[0i16; 960], 48_000, 2);
    let result = session.append_audio_sample(stereo, at(&session, 0)).await;
    assert!(matches!(result, Err(RecordingError::ConversionFailure(_))));

    let resampled = AudioSample::from_pcm(&[0i16; 160], 16_000, 1);
    let result = session.append_audio_sample(resampled, at(&session, 10)).await;
    assert!(matches!(result, Err(RecordingError::ConversionFailure(_))));

    assert!(script.events().is_empty());
    let stats = session.stats().await.unwrap();
    assert_eq!(stats.audio_samples_dropped, 2);
    assert_eq!(stats.audio_samples_appended, 0);

    // A matching sample still anchors and is written
    session.append_audio_sample(audio(), at(&session, 20)).await.unwrap();
    assert_eq!(script.timestamps(false), vec![Duration::from_millis(20)]);
    assert_eq!(session.state().await, Ok(WriterState::Writing));
}

#[tokio::test]
async fn exhausted_pool_fails_the_frame_but_keeps_writing() {
    let path = temp_output("pool");
    let destination = small_destination(&path);
    let (session, script) = session_with(destination.clone());
    script.keep_buffers.store(true, Ordering::SeqCst);
    session.start().await.unwrap();

    for i in 0..PIXEL_POOL_CAPACITY as u64 {
        session
            .append_video_frame(frame_for(&destination, 0), at(&session, i * 16))
            .await
            .unwrap();
    }
    let overflow = at(&session, PIXEL_POOL_CAPACITY as u64 * 16);
    assert_eq!(
        session
            .append_video_frame(frame_for(&destination, 0), overflow)
            .await,
        Err(RecordingError::PoolExhausted)
    );

    assert_eq!(session.state().await, Ok(WriterState::Writing));
    assert!(session.is_recording().await);
    let stats = session.stats().await.unwrap();
    assert_eq!(stats.video_frames_appended, PIXEL_POOL_CAPACITY as u64);
    assert_eq!(script.timestamps(true).len(), PIXEL_POOL_CAPACITY);
}

#[test]
fn oversized_destination_is_rejected_up_front() {
    let path = temp_output("oversized");
    let profile = EncodeProfile::for_output(8, 8, BitratePreset::Low, 48_000);
    let destination = MediaDestination::new(&path, 20_000, 8, 1, profile);
    let writer = ScriptedWriter::new(&destination, Arc::new(Script::default()));
    assert!(matches!(
        RecordingSession::with_writer(destination, Box::new(writer)),
        Err(RecordingError::SystemFailure(_))
    ));
}

#[tokio::test]
async fn writing_hint_follows_the_state_machine() {
    let path = temp_output("hint");
    let (session, _script) = session_with(small_destination(&path));
    assert!(!session.accepts_frames());

    session.start().await.unwrap();
    assert!(session.accepts_frames());

    session.finish().await.unwrap();
    assert!(!session.accepts_frames());
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn writing_hint_stays_off_after_failed_start() {
    let path = temp_output("hint-fail");
    let (session, script) = session_with(small_destination(&path));
    *script.fail_start.lock().unwrap() = Some("no encoder".to_string());

    assert!(session.start().await.is_err());
    assert!(!session.accepts_frames());
}

#[tokio::test]
async fn presented_cpu_frames_reach_the_writer() {
    let path = temp_output("bridge-cpu");
    let destination = small_destination(&path);
    let (session, script) = session_with(destination.clone());
    let session = Arc::new(session);

    let notifier = PresentationNotifier::new();
    let bridge = Arc::new(RecordingBridge::new(None));
    let listener: Arc<dyn FramePresentedListener> = bridge.clone();
    notifier.add_listener(&listener);
    bridge.attach(session.clone());

    // Not writing yet
    notifier.frame_presented(PresentedFrame::Cpu(&frame_for(&destination, 7)));
    session.stats().await.unwrap();
    assert!(script.events().is_empty());

    session.start().await.unwrap();
    let origin = session.clock().origin();
    let before = HostTime::now();
    notifier.frame_presented(PresentedFrame::Cpu(&frame_for(&destination, 9)));
    let after = HostTime::now();

    // Queued behind the submitted frame
    let stats = session.stats().await.unwrap();
    assert_eq!(stats.video_frames_appended, 1);

    let video = script.timestamps(true);
    assert_eq!(video.len(), 1);
    assert!(video[0] >= before.saturating_since(origin));
    assert!(video[0] <= after.saturating_since(origin));
    assert_eq!(script.first_pixels.lock().unwrap()[0], [9, 9, 9, 9]);

    assert!(bridge.detach().is_some());
    notifier.frame_presented(PresentedFrame::Cpu(&frame_for(&destination, 3)));
    session.stats().await.unwrap();
    assert_eq!(script.timestamps(true).len(), 1);
}

#[tokio::test]
async fn presented_gpu_frames_are_read_back() {
    let gpu = match GpuContext::new("recording-bridge-test").await {
        Ok(gpu) => Arc::new(gpu),
        Err(e) => {
            eprintln!("No GPU adapter ({}), skipping", e);
            return;
        }
    };

    let path = temp_output("bridge-gpu");
    let destination = small_destination(&path);
    let (session, script) = session_with(destination.clone());
    let session = Arc::new(session);

    let notifier = PresentationNotifier::new();
    let bridge = Arc::new(RecordingBridge::new(Some(gpu.clone())));
    let listener: Arc<dyn FramePresentedListener> = bridge.clone();
    notifier.add_listener(&listener);
    bridge.attach(session.clone());
    session.start().await.unwrap();

    let (w, h) = (destination.width(), destination.height());
    let texture = gpu.create_frame_texture(w, h);
    let pixels: Vec<u8> = [10u8, 20, 30, 255].repeat((w * h) as usize);
    gpu.upload(&texture, &pixels);
    notifier.frame_presented(PresentedFrame::Gpu(&texture));

    let stats = session.stats().await.unwrap();
    assert_eq!(stats.video_frames_appended, 1);
    assert_eq!(script.first_pixels.lock().unwrap()[0], [10, 20, 30, 255]);

    session.finish().await.unwrap();
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn first_sample_anchors_the_timeline_once() {
    let path = temp_output("anchor");
    let destination = small_destination(&path);
    let (session, script) = session_with(destination.clone());
    session.start().await.unwrap();

    session
        .append_video_frame(frame_for(&destination, 0), at(&session, 40))
        .await
        .unwrap();
    session.append_audio_sample(audio(), at(&session, 45)).await.unwrap();
    session
        .append_video_frame(frame_for(&destination, 0), at(&session, 56))
        .await
        .unwrap();

    let anchors: Vec<_> = script
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Anchor(_)))
        .collect();
    assert_eq!(anchors, vec![Event::Anchor(Duration::from_millis(40))]);
    assert_eq!(script.events()[0], Event::Anchor(Duration::from_millis(40)));
}

#[tokio::test]
async fn audio_alone_can_anchor() {
    let path = temp_output("audio-anchor");
    let destination = small_destination(&path);
    let (session, script) = session_with(destination.clone());
    session.start().await.unwrap();

    session.append_audio_sample(audio(), at(&session, 5)).await.unwrap();
    // Earlier than the anchor set by audio
    session
        .append_video_frame(frame_for(&destination, 0), at(&session, 2))
        .await
        .unwrap();
    session
        .append_video_frame(frame_for(&destination, 0), at(&session, 10))
        .await
        .unwrap();

    assert_eq!(
        script.events(),
        vec![
            Event::Anchor(Duration::from_millis(5)),
            Event::Audio(Duration::from_millis(5)),
            Event::Video(Duration::from_millis(10)),
        ]
    );
    let stats = session.stats().await.unwrap();
    assert_eq!(stats.video_frames_dropped, 1);
}

#[tokio::test]
async fn out_of_order_samples_are_dropped_silently() {
    let path = temp_output("order");
    let destination = small_destination(&path);
    let (session, script) = session_with(destination.clone());
    session.start().await.unwrap();

    for millis in [10, 30, 20, 40] {
        session
            .append_video_frame(frame_for(&destination, 0), at(&session, millis))
            .await
            .unwrap();
    }

    assert_eq!(
        script.timestamps(true),
        vec![
            Duration::from_millis(10),
            Duration::from_millis(30),
            Duration::from_millis(40)
        ]
    );
}

#[tokio::test]
async fn samples_before_start_are_ignored() {
    let path = temp_output("before-start");
    let destination = small_destination(&path);
    let (session, script) = session_with(destination.clone());

    session
        .append_video_frame(frame_for(&destination, 0), at(&session, 0))
        .await
        .unwrap();
    session.append_audio_sample(audio(), at(&session, 1)).await.unwrap();

    assert!(script.events().is_empty());
    assert_eq!(session.state().await, Ok(WriterState::Idle));
    assert!(!path.exists());
}

#[tokio::test]
async fn second_start_is_wrong_state() {
    let path = temp_output("double-start");
    let (session, _script) = session_with(small_destination(&path));

    session.start().await.unwrap();
    assert_eq!(
        session.start().await,
        Err(RecordingError::WrongState {
            operation: "start",
            state: WriterState::Writing,
        })
    );
    assert_eq!(session.state().await, Ok(WriterState::Writing));
}

#[tokio::test]
async fn finish_without_start_is_wrong_state() {
    let path = temp_output("finish-idle");
    let (session, script) = session_with(small_destination(&path));

    assert_eq!(
        session.finish().await,
        Err(RecordingError::WrongState {
            operation: "finish",
            state: WriterState::Idle,
        })
    );
    assert!(script.events().is_empty());
    assert!(!path.exists());
}

#[tokio::test]
async fn second_finish_is_wrong_state() {
    let path = temp_output("double-finish");
    let (session, _script) = session_with(small_destination(&path));

    session.start().await.unwrap();
    session.finish().await.unwrap();
    assert!(matches!(
        session.finish().await,
        Err(RecordingError::WrongState {
            state: WriterState::Completed,
            ..
        })
    ));
}

#[tokio::test]
async fn start_replaces_an_existing_file() {
    let path = temp_output("replace");
    std::fs::write(&path, b"stale").unwrap();
    let (session, _script) = session_with(small_destination(&path));

    session.start().await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn unready_video_channel_drops_frames() {
    let path = temp_output("backpressure");
    let destination = small_destination(&path);
    let (session, script) = session_with(destination.clone());
    session.start().await.unwrap();

    script.video_ready.store(false, Ordering::SeqCst);
    session
        .append_video_frame(frame_for(&destination, 0), at(&session, 0))
        .await
        .unwrap();
    assert!(script.events().is_empty());

    script.video_ready.store(true, Ordering::SeqCst);
    session
        .append_video_frame(frame_for(&destination, 0), at(&session, 16))
        .await
        .unwrap();

    let stats = session.stats().await.unwrap();
    assert_eq!(stats.video_frames_dropped, 1);
    assert_eq!(stats.video_frames_appended, 1);
}

#[tokio::test]
async fn finish_only_marks_ready_channels() {
    let path = temp_output("mark-ready");
    let (session, script) = session_with(small_destination(&path));
    session.start().await.unwrap();

    script.audio_ready.store(false, Ordering::SeqCst);
    session.finish().await.unwrap();

    let finished: Vec<_> = script
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Finished(_)))
        .collect();
    assert_eq!(finished, vec![Event::Finished(MediaChannel::Video)]);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn mismatched_frame_is_a_conversion_failure() {
    let path = temp_output("mismatch");
    let (session, script) = session_with(small_destination(&path));
    session.start().await.unwrap();

    let wrong = CpuFrame::new(4, 4, 16, PixelFormat::Bgra8, vec![0u8; 64]).unwrap();
    let result = session.append_video_frame(wrong, at(&session, 0)).await;
    assert!(matches!(result, Err(RecordingError::ConversionFailure(_))));
    assert!(script.events().is_empty());
}

#[tokio::test]
async fn failed_finalization_ends_in_failed() {
    let path = temp_output("finalize-fail");
    let (session, script) = session_with(small_destination(&path));
    session.start().await.unwrap();

    script.fail_finish.store(true, Ordering::SeqCst);
    assert_eq!(
        session.finish().await,
        Err(RecordingError::SystemFailure("disk full".to_string()))
    );
    assert_eq!(session.state().await, Ok(WriterState::Failed));
}

#[tokio::test]
async fn writer_start_failure_is_system_failure() {
    let path = temp_output("start-fail");
    let (session, script) = session_with(small_destination(&path));
    *script.fail_start.lock().unwrap() = Some("encoder unavailable".to_string());

    assert_eq!(
        session.start().await,
        Err(RecordingError::SystemFailure(
            "encoder unavailable".to_string()
        ))
    );
    assert_eq!(session.state().await, Ok(WriterState::Failed));
}

#[test]
fn released_session_resolves_pending_operations() {
    let path = temp_output("released");
    let destination = small_destination(&path);
    let script = Arc::new(Script::default());
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let mut writer = ScriptedWriter::new(&destination, script);
    writer.start_gate = Some((entered_tx, release_rx));
    let session = RecordingSession::with_writer(destination, Box::new(writer)).unwrap();

    let (tx, rx) = mpsc::channel();
    let start_tx = tx.clone();
    session.start_with(move |result| {
        let _ = start_tx.send(("start", result));
    });
    session.finish_with(move |result| {
        let _ = tx.send(("finish", result));
    });

    // Release the session while the start job is blocked inside the writer
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    drop(session);
    release_tx.send(()).unwrap();

    let timeout = Duration::from_secs(5);
    let first = rx.recv_timeout(timeout).unwrap();
    let second = rx.recv_timeout(timeout).unwrap();
    assert_eq!(first, ("start", Ok(())));
    assert_eq!(second, ("finish", Err(RecordingError::CallerDestroyed)));
}
