// SPDX-License-Identifier: GPL-3.0-only

//! Sample listeners and fan-out

use super::types::{CaptureSample, MediaType};
use crate::dispatch::ListenerSet;
use crate::pipelines::video::HostTime;
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Observer of captured samples
///
/// Callbacks run on the capture delivery thread and should return quickly.
pub trait SampleListener: Send + Sync {
    fn on_video_sample_ready(&self, _sample: &CaptureSample, _timestamp: HostTime) {}

    fn on_audio_sample_ready(&self, _sample: &CaptureSample, _timestamp: HostTime) {}
}

pub type SampleListeners = Mutex<ListenerSet<dyn SampleListener>>;

/// Route `sample` to every live listener in insertion order
///
/// Samples whose payload is not ready are discarded. The listener list is
/// snapshotted under the lock and called outside of it, so a listener may
/// be dropped or registered from within a callback.
pub fn dispatch_sample(listeners: &SampleListeners, sample: &CaptureSample) {
    if !sample.data_ready {
        trace!(media = %sample.media, "Sample data not ready, discarded");
        return;
    }

    let live = listeners
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .live();
    for listener in live {
        match sample.media {
            MediaType::Video => listener.on_video_sample_ready(sample, sample.timestamp),
            MediaType::Audio => listener.on_audio_sample_ready(sample, sample.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::SampleFormat;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(&'static str, MediaType)>>,
        name: &'static str,
    }

    impl SampleListener for Recorder {
        fn on_video_sample_ready(&self, sample: &CaptureSample, _timestamp: HostTime) {
            self.seen.lock().unwrap().push((self.name, sample.media));
        }

        fn on_audio_sample_ready(&self, sample: &CaptureSample, _timestamp: HostTime) {
            self.seen.lock().unwrap().push((self.name, sample.media));
        }
    }

    fn audio_sample(ready: bool) -> CaptureSample {
        CaptureSample {
            media: MediaType::Audio,
            data: Arc::from(vec![0u8; 4]),
            format: SampleFormat::Audio {
                sample_rate: 48_000,
                channels: 1,
            },
            timestamp: HostTime::now(),
            data_ready: ready,
        }
    }

    #[test]
    fn unready_samples_are_discarded() {
        let listeners = SampleListeners::default();
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn SampleListener> = recorder.clone();
        listeners.lock().unwrap().add(&listener);

        dispatch_sample(&listeners, &audio_sample(false));
        assert!(recorder.seen.lock().unwrap().is_empty());

        dispatch_sample(&listeners, &audio_sample(true));
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![("", MediaType::Audio)]
        );
    }

    #[test]
    fn audio_reaches_listeners_in_insertion_order() {
        let listeners = SampleListeners::default();
        let first = Arc::new(Recorder {
            name: "first",
            ..Default::default()
        });
        let second = Arc::new(Recorder {
            name: "second",
            ..Default::default()
        });
        let a: Arc<dyn SampleListener> = first.clone();
        let b: Arc<dyn SampleListener> = second.clone();
        listeners.lock().unwrap().add(&a);
        listeners.lock().unwrap().add(&b);

        dispatch_sample(&listeners, &audio_sample(true));
        assert_eq!(first.seen.lock().unwrap().len(), 1);
        assert_eq!(second.seen.lock().unwrap().len(), 1);
    }
}
