//! In-memory capture and playback devices.
//!
//! The capture side produces a deterministic 16-bit ramp so that tests can
//! check which bytes reached the speaker and in what order. The playback side
//! keeps everything it is given.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use latency_core::models::error::LatencyError;
use latency_core::traits::audio_device::{
    AudioBackend, CaptureStream, PlaybackStream, StreamFormat,
};

/// Lifecycle events recorded by [`MemoryBackend`] streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    CaptureOpened,
    CaptureStarted,
    CaptureStopped,
    CaptureReleased,
    PlaybackOpened,
    PlaybackStarted,
    PlaybackStopped,
    PlaybackReleased,
}

/// Behaviour of a [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryBackendOptions {
    /// Bytes produced per capture read.
    pub block_bytes: usize,
    /// Time each capture read takes, if any.
    pub pacing: Option<Duration>,
    pub fail_capture_open: bool,
    pub fail_playback_open: bool,
    pub fail_capture_start: bool,
}

impl MemoryBackendOptions {
    /// Reads paced to the wall clock, `block_bytes` at a time.
    pub fn realtime(format: StreamFormat, block_bytes: usize) -> Self {
        let secs = block_bytes as f64 / format.bytes_per_second().max(1) as f64;
        Self {
            block_bytes,
            pacing: Some(Duration::from_secs_f64(secs)),
            ..Default::default()
        }
    }
}

impl Default for MemoryBackendOptions {
    fn default() -> Self {
        Self {
            block_bytes: 320,
            pacing: Some(Duration::from_millis(1)),
            fail_capture_open: false,
            fail_playback_open: false,
            fail_capture_start: false,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    events: Mutex<Vec<DeviceEvent>>,
    played: Mutex<Vec<u8>>,
}

impl Shared {
    fn record(&self, event: DeviceEvent) {
        self.events.lock().push(event);
    }
}

/// Audio backend whose devices live in memory.
///
/// Cloning shares the recorded events and played bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    options: MemoryBackendOptions,
    shared: Arc<Shared>,
}

impl MemoryBackend {
    pub fn new(options: MemoryBackendOptions) -> Self {
        Self {
            options,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.shared.events.lock().clone()
    }

    /// Everything written to playback streams so far.
    pub fn played(&self) -> Vec<u8> {
        self.shared.played.lock().clone()
    }

    pub fn played_len(&self) -> usize {
        self.shared.played.lock().len()
    }

    /// Streams opened but not yet released.
    pub fn open_streams(&self) -> usize {
        let events = self.shared.events.lock();
        let count = |e: DeviceEvent| events.iter().filter(|&&x| x == e).count();
        let opened = count(DeviceEvent::CaptureOpened) + count(DeviceEvent::PlaybackOpened);
        let released = count(DeviceEvent::CaptureReleased) + count(DeviceEvent::PlaybackReleased);
        opened.saturating_sub(released)
    }

    /// The first `len` bytes every capture stream produces.
    pub fn expected_capture(len: usize) -> Vec<u8> {
        let mut ramp = Ramp::default();
        let mut out = vec![0u8; len];
        ramp.fill(&mut out);
        out
    }
}

impl AudioBackend for MemoryBackend {
    fn open_capture(&self, format: StreamFormat) -> Result<Box<dyn CaptureStream>, LatencyError> {
        if self.options.fail_capture_open {
            return Err(LatencyError::ResourceUnavailable(format!(
                "no microphone at {} Hz",
                format.sample_rate
            )));
        }
        self.shared.record(DeviceEvent::CaptureOpened);
        Ok(Box::new(MemoryCapture {
            options: self.options.clone(),
            shared: Arc::clone(&self.shared),
            ramp: Ramp::default(),
            recording: false,
            released: false,
        }))
    }

    fn open_playback(&self, format: StreamFormat) -> Result<Box<dyn PlaybackStream>, LatencyError> {
        if self.options.fail_playback_open {
            return Err(LatencyError::ResourceUnavailable(format!(
                "no speaker at {} Hz",
                format.sample_rate
            )));
        }
        self.shared.record(DeviceEvent::PlaybackOpened);
        Ok(Box::new(MemoryPlayback {
            shared: Arc::clone(&self.shared),
            playing: false,
            released: false,
        }))
    }
}

/// Byte generator for little-endian 16-bit samples 1, 2, 3, …
#[derive(Debug, Default)]
struct Ramp {
    offset: u64,
}

impl Ramp {
    fn fill(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            let sample = (self.offset / 2 % 0x7fff + 1) as u16;
            *b = sample.to_le_bytes()[(self.offset % 2) as usize];
            self.offset += 1;
        }
    }
}

struct MemoryCapture {
    options: MemoryBackendOptions,
    shared: Arc<Shared>,
    ramp: Ramp,
    recording: bool,
    released: bool,
}

impl CaptureStream for MemoryCapture {
    fn block_bytes(&self) -> usize {
        self.options.block_bytes
    }

    fn start(&mut self) -> Result<(), LatencyError> {
        if self.options.fail_capture_start {
            return Err(LatencyError::ResourceUnavailable(
                "microphone refused to start".into(),
            ));
        }
        self.recording = true;
        self.shared.record(DeviceEvent::CaptureStarted);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LatencyError> {
        if self.released {
            return Err(LatencyError::InvalidState("capture stream released".into()));
        }
        if !self.recording {
            return Ok(0);
        }
        if let Some(pacing) = self.options.pacing {
            thread::sleep(pacing);
        }
        let n = buf.len().min(self.options.block_bytes);
        self.ramp.fill(&mut buf[..n]);
        Ok(n)
    }

    fn stop(&mut self) {
        if self.recording {
            self.recording = false;
            self.shared.record(DeviceEvent::CaptureStopped);
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.record(DeviceEvent::CaptureReleased);
        }
    }
}

struct MemoryPlayback {
    shared: Arc<Shared>,
    playing: bool,
    released: bool,
}

impl PlaybackStream for MemoryPlayback {
    fn play(&mut self) -> Result<(), LatencyError> {
        if self.released {
            return Err(LatencyError::InvalidState("playback stream released".into()));
        }
        self.playing = true;
        self.shared.record(DeviceEvent::PlaybackStarted);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, LatencyError> {
        if !self.playing {
            return Err(LatencyError::InvalidState("playback not started".into()));
        }
        self.shared.played.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn stop(&mut self) {
        if self.playing {
            self.playing = false;
            self.shared.record(DeviceEvent::PlaybackStopped);
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.record(DeviceEvent::PlaybackReleased);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use latency_core::models::config::LoopbackConfiguration;
    use latency_core::models::state::LoopbackState;
    use latency_core::session::loopback::LoopbackSession;

    fn fast_config(delay_deciseconds: u32) -> LoopbackConfiguration {
        LoopbackConfiguration {
            delay_deciseconds,
            idle_wait: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn ramp_is_continuous_across_reads() {
        let backend = MemoryBackend::new(MemoryBackendOptions {
            block_bytes: 3,
            pacing: None,
            ..Default::default()
        });
        let mut capture = backend.open_capture(StreamFormat::mono(16000)).unwrap();
        capture.start().unwrap();

        let mut collected = Vec::new();
        let mut buf = [0u8; 8];
        for _ in 0..5 {
            let n = capture.read(&mut buf).unwrap();
            collected.extend_from_slice(&buf[..n]);
        }

        assert_eq!(collected, MemoryBackend::expected_capture(15));
        assert_eq!(&collected[..4], &[1, 0, 2, 0]);
    }

    #[test]
    fn loopback_plays_silence_then_capture_in_order() {
        let backend = MemoryBackend::default();
        let mut session = LoopbackSession::new(backend.clone(), fast_config(1));

        session.start().unwrap();
        assert_eq!(session.state(), LoopbackState::Running { prefill_bytes: 3200 });
        wait_for(|| backend.played_len() >= 3200 + 4000);
        let diagnostics = session.stop().unwrap();

        let played = backend.played();
        assert!(played[..3200].iter().all(|&b| b == 0));
        let streamed = &played[3200..];
        assert!(!streamed.is_empty());
        assert_eq!(streamed, &MemoryBackend::expected_capture(streamed.len())[..]);

        assert_eq!(diagnostics.bytes_dropped, 0);
        assert_eq!(diagnostics.bytes_played, played.len() as u64);
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn failed_capture_open_leaks_nothing() {
        let backend = MemoryBackend::new(MemoryBackendOptions {
            fail_capture_open: true,
            ..Default::default()
        });
        let mut session = LoopbackSession::new(backend.clone(), fast_config(20));

        let err = session.start().unwrap_err();

        assert!(matches!(err, LatencyError::ResourceUnavailable(_)));
        assert_eq!(
            backend.events(),
            vec![DeviceEvent::PlaybackOpened, DeviceEvent::PlaybackReleased]
        );
        assert_eq!(backend.open_streams(), 0);
        assert!(session.state().is_idle());
    }

    #[test]
    fn failed_capture_start_releases_both_devices() {
        let backend = MemoryBackend::new(MemoryBackendOptions {
            fail_capture_start: true,
            ..Default::default()
        });
        let mut session = LoopbackSession::new(backend.clone(), fast_config(20));

        assert!(session.start().is_err());
        assert_eq!(backend.open_streams(), 0);

        // A later start can still succeed once the device behaves.
        let mut session = LoopbackSession::new(MemoryBackend::default(), fast_config(0));
        session.start().unwrap();
        session.stop().unwrap();
    }

    #[test]
    fn dropping_running_session_releases_devices() {
        let backend = MemoryBackend::default();
        {
            let mut session = LoopbackSession::new(backend.clone(), fast_config(0));
            session.start().unwrap();
            wait_for(|| backend.played_len() > 0);
        }
        assert_eq!(backend.open_streams(), 0);
        let events = backend.events();
        let stopped = events.iter().position(|e| *e == DeviceEvent::CaptureStopped).unwrap();
        let released = events.iter().position(|e| *e == DeviceEvent::CaptureReleased).unwrap();
        assert!(stopped < released);
    }

    #[test]
    fn realtime_pacing_matches_format() {
        let options = MemoryBackendOptions::realtime(StreamFormat::mono(16000), 320);
        assert_eq!(options.pacing, Some(Duration::from_millis(10)));
    }
}
