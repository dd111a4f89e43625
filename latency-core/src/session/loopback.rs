use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::config::LoopbackConfiguration;
use crate::models::error::LatencyError;
use crate::models::state::{LoopbackDiagnostics, LoopbackState};
use crate::processing::pipe::{Pipe, PipeReader, PipeWriter};
use crate::processing::stop_signal::StopSignal;
use crate::traits::audio_device::{AudioBackend, CaptureStream, PlaybackStream, StreamFormat};
use crate::traits::delegate::LoopbackDelegate;

/// Lock-free counters bumped by the worker threads.
#[derive(Debug, Default)]
struct LoopbackCounters {
    captured: AtomicU64,
    dropped: AtomicU64,
    played: AtomicU64,
    prefill: AtomicU64,
    underruns: AtomicU64,
    capture_errors: AtomicU64,
    playback_errors: AtomicU64,
}

impl LoopbackCounters {
    fn reset(&self) {
        for counter in [
            &self.captured,
            &self.dropped,
            &self.played,
            &self.prefill,
            &self.underruns,
            &self.capture_errors,
            &self.playback_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn bump(counter: &AtomicU64, by: usize) {
        counter.fetch_add(by as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LoopbackDiagnostics {
        LoopbackDiagnostics {
            bytes_captured: self.captured.load(Ordering::Relaxed),
            bytes_dropped: self.dropped.load(Ordering::Relaxed),
            bytes_played: self.played.load(Ordering::Relaxed),
            prefill_bytes: self.prefill.load(Ordering::Relaxed),
            underrun_polls: self.underruns.load(Ordering::Relaxed),
            capture_errors: self.capture_errors.load(Ordering::Relaxed),
            playback_errors: self.playback_errors.load(Ordering::Relaxed),
        }
    }
}

type ReaderHandle = thread::JoinHandle<Option<(Box<dyn CaptureStream>, PipeWriter)>>;
type WriterHandle = thread::JoinHandle<Option<(Box<dyn PlaybackStream>, PipeReader)>>;

/// A worker that could not be spawned, with whatever it was meant to own.
type SpawnFailure<T> = (Option<T>, std::io::Error);

/// Delayed microphone-to-speaker loopback.
///
/// Captured audio goes through a [`Pipe`] that is pre-filled with silence, so
/// the speaker lags the microphone by the configured delay:
/// ```text
/// [CaptureStream] → loopback-reader → [Pipe: silence ++ mic] → loopback-writer → [PlaybackStream]
/// ```
/// Both devices and both pipe halves are owned by their worker threads while
/// running and handed back on join, so a device is never released while a
/// worker still uses it.
pub struct LoopbackSession<B: AudioBackend> {
    backend: B,
    config: LoopbackConfiguration,
    state: Arc<Mutex<LoopbackState>>,
    delegate: Option<Arc<dyn LoopbackDelegate>>,

    // Present whenever no workers are running.
    pipe: Option<Pipe>,

    stop: Arc<StopSignal>,
    counters: Arc<LoopbackCounters>,
    reader_handle: Option<ReaderHandle>,
    writer_handle: Option<WriterHandle>,
    started_at: Option<Instant>,
}

impl<B: AudioBackend> LoopbackSession<B> {
    pub fn new(backend: B, config: LoopbackConfiguration) -> Self {
        let pipe = Pipe::new(config.pipe_capacity);
        Self {
            backend,
            config,
            state: Arc::new(Mutex::new(LoopbackState::Idle)),
            delegate: None,
            pipe: Some(pipe),
            stop: Arc::new(StopSignal::new()),
            counters: Arc::new(LoopbackCounters::default()),
            reader_handle: None,
            writer_handle: None,
            started_at: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn LoopbackDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> LoopbackState {
        self.state.lock().clone()
    }

    pub fn config(&self) -> &LoopbackConfiguration {
        &self.config
    }

    pub fn diagnostics(&self) -> LoopbackDiagnostics {
        self.counters.snapshot()
    }

    /// Time since the current session started streaming.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    /// Change the delay used by the next `start`. Out-of-range values are
    /// ignored and return `false`.
    pub fn set_delay_deciseconds(&mut self, delay: u32) -> bool {
        let accepted = self.config.set_delay_deciseconds(delay);
        if !accepted {
            log::warn!("ignoring loopback delay of {} ds", delay);
        }
        accepted
    }

    /// Open both devices, pre-fill the pipe and start streaming.
    /// Transitions: idle → starting → running, or → failed → idle.
    pub fn start(&mut self) -> Result<(), LatencyError> {
        if !self.state.lock().is_idle() {
            return Err(LatencyError::InvalidState(
                "loopback session is already active".into(),
            ));
        }

        if let Err(reason) = self.config.validate() {
            let err = LatencyError::ConfigurationFailed(reason);
            self.fail(&err);
            return Err(err);
        }

        self.set_state(LoopbackState::Starting);
        match self.start_streams() {
            Ok(prefill_bytes) => {
                self.set_state(LoopbackState::Running { prefill_bytes });
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Stop streaming and release both devices.
    /// Transitions: running → stopping → idle.
    pub fn stop(&mut self) -> Result<LoopbackDiagnostics, LatencyError> {
        if !self.state.lock().is_running() {
            return Err(LatencyError::InvalidState(
                "loopback session is not running".into(),
            ));
        }

        self.set_state(LoopbackState::Stopping);
        self.stop.stop();

        // Reader first: it closes the pipe, so the writer drains and exits.
        let (capture, pipe_writer) = match self.reader_handle.take().map(|h| h.join()) {
            Some(Ok(Some((capture, writer)))) => (Some(capture), Some(writer)),
            _ => {
                log::error!("loopback reader thread did not exit cleanly");
                (None, None)
            }
        };
        let (playback, pipe_reader) = match self.writer_handle.take().map(|h| h.join()) {
            Some(Ok(Some((playback, reader)))) => (Some(playback), Some(reader)),
            _ => {
                log::error!("loopback writer thread did not exit cleanly");
                (None, None)
            }
        };

        if let Some(mut capture) = capture {
            capture.stop();
            capture.release();
        }
        if let Some(mut playback) = playback {
            playback.stop();
            playback.release();
        }

        self.pipe = match (pipe_writer, pipe_reader) {
            (Some(writer), Some(reader)) => Pipe::rejoin(writer, reader).ok(),
            _ => None,
        };

        let diagnostics = self.counters.snapshot();
        if let Some(started) = self.started_at.take() {
            log::info!(
                "loopback stopped after {:.1}s: {} bytes captured, {} played, {} dropped",
                started.elapsed().as_secs_f64(),
                diagnostics.bytes_captured,
                diagnostics.bytes_played,
                diagnostics.bytes_dropped
            );
        }
        self.set_state(LoopbackState::Idle);
        Ok(diagnostics)
    }

    // --- Internal helpers ---

    fn set_state(&self, new_state: LoopbackState) {
        *self.state.lock() = new_state.clone();
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(&new_state);
        }
    }

    fn fail(&self, err: &LatencyError) {
        log::error!("loopback failed: {}", err);
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(err);
        }
        self.set_state(LoopbackState::Failed(err.clone()));
        self.set_state(LoopbackState::Idle);
    }

    /// Returns the number of silence bytes queued ahead of the stream.
    fn start_streams(&mut self) -> Result<usize, LatencyError> {
        let format = StreamFormat::mono(self.config.sample_rate);

        let mut playback = self.backend.open_playback(format)?;
        log::debug!("playback stream opened at {} Hz", format.sample_rate);

        let mut capture = match self.backend.open_capture(format) {
            Ok(capture) => capture,
            Err(err) => {
                playback.release();
                return Err(err);
            }
        };
        log::debug!("capture stream opened, block of {} bytes", capture.block_bytes());

        let mut pipe = match self.pipe.take() {
            Some(pipe) if pipe.capacity() == self.config.pipe_capacity => pipe,
            _ => Pipe::new(self.config.pipe_capacity),
        };
        pipe.flush();
        self.counters.reset();
        let prefill = prefill_silence(&mut pipe, self.config.prefill_bytes(), self.config.chunk_bytes);
        LoopbackCounters::bump(&self.counters.prefill, prefill);

        if let Err(err) = playback.play() {
            capture.release();
            playback.release();
            self.pipe = Some(pipe);
            return Err(err);
        }
        if let Err(err) = capture.start() {
            playback.stop();
            capture.release();
            playback.release();
            self.pipe = Some(pipe);
            return Err(err);
        }

        self.stop.reset();
        let (pipe_writer, pipe_reader) = pipe.split();

        let writer_handle = {
            let stop = Arc::clone(&self.stop);
            let counters = Arc::clone(&self.counters);
            let chunk = self.config.chunk_bytes;
            let idle_wait = self.config.idle_wait;
            spawn_worker(
                worker_builder("loopback-writer"),
                (playback, pipe_reader),
                move |(playback, reader)| {
                    playback_loop(playback, reader, &stop, &counters, chunk, idle_wait)
                },
            )
        };
        let writer_handle = match writer_handle {
            Ok(handle) => handle,
            Err((payload, e)) => {
                capture.stop();
                capture.release();
                if let Some((mut playback, pipe_reader)) = payload {
                    playback.stop();
                    playback.release();
                    self.pipe = Pipe::rejoin(pipe_writer, pipe_reader).ok();
                }
                return Err(LatencyError::ResourceUnavailable(format!(
                    "failed to spawn writer: {}",
                    e
                )));
            }
        };

        let reader_handle = {
            let stop = Arc::clone(&self.stop);
            let counters = Arc::clone(&self.counters);
            let idle_wait = self.config.idle_wait;
            spawn_worker(
                worker_builder("loopback-reader"),
                (capture, pipe_writer),
                move |(capture, writer)| capture_loop(capture, writer, &stop, &counters, idle_wait),
            )
        };
        let reader_handle = match reader_handle {
            Ok(handle) => handle,
            Err((payload, e)) => {
                self.stop.stop();
                let writer_side = writer_handle.join().ok().flatten();
                let mut pipe_writer = None;
                let mut pipe_reader = None;
                if let Some((mut capture, writer)) = payload {
                    capture.stop();
                    capture.release();
                    pipe_writer = Some(writer);
                }
                if let Some((mut playback, reader)) = writer_side {
                    playback.stop();
                    playback.release();
                    pipe_reader = Some(reader);
                }
                if let (Some(writer), Some(reader)) = (pipe_writer, pipe_reader) {
                    self.pipe = Pipe::rejoin(writer, reader).ok();
                }
                return Err(LatencyError::ResourceUnavailable(format!(
                    "failed to spawn reader: {}",
                    e
                )));
            }
        };

        self.writer_handle = Some(writer_handle);
        self.reader_handle = Some(reader_handle);
        self.started_at = Some(Instant::now());
        log::info!(
            "loopback started with {} ms delay ({} bytes of silence)",
            self.config.delay_deciseconds * 100,
            prefill
        );
        Ok(prefill)
    }
}

impl<B: AudioBackend> Drop for LoopbackSession<B> {
    fn drop(&mut self) {
        if self.state.lock().is_running() {
            let _ = self.stop();
        }
    }
}

fn worker_builder(name: &str) -> thread::Builder {
    thread::Builder::new().name(name.into())
}

/// Spawn a worker that takes ownership of `payload`. If the thread cannot be
/// created the payload is handed back, so the caller can release it.
fn spawn_worker<T, R, F>(
    builder: thread::Builder,
    payload: T,
    body: F,
) -> Result<thread::JoinHandle<Option<R>>, SpawnFailure<T>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnOnce(T) -> R + Send + 'static,
{
    let slot = Arc::new(Mutex::new(Some(payload)));
    let handoff = Arc::clone(&slot);
    let spawned = builder.spawn(move || {
        let payload = handoff.lock().take();
        payload.map(body)
    });
    spawned.map_err(|e| (slot.lock().take(), e))
}

/// Queue `target` bytes of silence in `chunk`-sized writes, stopping early
/// if the pipe fills up.
fn prefill_silence(pipe: &mut Pipe, target: usize, chunk: usize) -> usize {
    let zeros = vec![0u8; chunk.max(1)];
    let mut filled = 0;
    while filled < target {
        let want = (target - filled).min(zeros.len());
        let written = pipe.write(&zeros[..want]);
        filled += written;
        if written < want {
            log::warn!("pipe full after {} of {} prefill bytes", filled, target);
            break;
        }
    }
    filled
}

/// Microphone → pipe. Closes the pipe on exit.
fn capture_loop(
    mut capture: Box<dyn CaptureStream>,
    mut writer: PipeWriter,
    stop: &StopSignal,
    counters: &LoopbackCounters,
    idle_wait: Duration,
) -> (Box<dyn CaptureStream>, PipeWriter) {
    let mut block = vec![0u8; capture.block_bytes().max(2)];
    while !stop.is_stopped() {
        match capture.read(&mut block) {
            Ok(0) => {
                stop.wait_timeout(idle_wait);
            }
            Ok(n) => {
                let written = writer.write(&block[..n]);
                LoopbackCounters::bump(&counters.captured, n);
                LoopbackCounters::bump(&counters.dropped, n - written);
            }
            Err(err) => {
                LoopbackCounters::bump(&counters.capture_errors, 1);
                log::warn!("capture read failed: {}", err);
                stop.wait_timeout(idle_wait);
            }
        }
    }
    writer.close();
    (capture, writer)
}

/// Pipe → speaker, `chunk` bytes at a time. Playback is already started.
fn playback_loop(
    mut playback: Box<dyn PlaybackStream>,
    mut reader: PipeReader,
    stop: &StopSignal,
    counters: &LoopbackCounters,
    chunk: usize,
    idle_wait: Duration,
) -> (Box<dyn PlaybackStream>, PipeReader) {
    let mut buf = vec![0u8; chunk.max(1)];
    while !stop.is_stopped() {
        match reader.read(&mut buf) {
            None => break,
            Some(0) => {
                LoopbackCounters::bump(&counters.underruns, 1);
                stop.wait_timeout(idle_wait);
            }
            Some(n) => write_chunk(playback.as_mut(), &buf[..n], stop, counters, idle_wait),
        }
    }
    (playback, reader)
}

/// Hand a whole chunk to the speaker, retrying partial writes so bytes stay
/// in order. Gives up on the rest of the chunk on error or stop.
fn write_chunk(
    playback: &mut dyn PlaybackStream,
    data: &[u8],
    stop: &StopSignal,
    counters: &LoopbackCounters,
    idle_wait: Duration,
) {
    let mut offset = 0;
    while offset < data.len() {
        match playback.write(&data[offset..]) {
            Ok(0) => {
                if stop.wait_timeout(idle_wait) {
                    return;
                }
            }
            Ok(accepted) => {
                offset += accepted;
                LoopbackCounters::bump(&counters.played, accepted);
            }
            Err(err) => {
                LoopbackCounters::bump(&counters.playback_errors, 1);
                log::warn!("playback write failed: {}", err);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Records lifecycle events of every stream it opens.
    #[derive(Default)]
    struct Journal {
        events: Mutex<Vec<&'static str>>,
        played: Mutex<Vec<u8>>,
    }

    impl Journal {
        fn push(&self, event: &'static str) {
            self.events.lock().push(event);
        }
    }

    struct TestCapture {
        journal: Arc<Journal>,
        next: u8,
        reads: Arc<AtomicUsize>,
    }

    impl CaptureStream for TestCapture {
        fn block_bytes(&self) -> usize {
            64
        }
        fn start(&mut self) -> Result<(), LatencyError> {
            self.journal.push("capture.start");
            Ok(())
        }
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, LatencyError> {
            thread::sleep(Duration::from_millis(2));
            self.reads.fetch_add(1, Ordering::SeqCst);
            for b in buf.iter_mut() {
                self.next = self.next.wrapping_add(1).max(1);
                *b = self.next;
            }
            Ok(buf.len())
        }
        fn stop(&mut self) {
            self.journal.push("capture.stop");
        }
        fn release(&mut self) {
            self.journal.push("capture.release");
        }
    }

    struct TestPlayback {
        journal: Arc<Journal>,
        fail_play: bool,
        // Accept at most this many bytes per write, refusing every other call.
        max_write: Option<usize>,
        refuse_next: bool,
    }

    impl PlaybackStream for TestPlayback {
        fn play(&mut self) -> Result<(), LatencyError> {
            if self.fail_play {
                return Err(LatencyError::ResourceUnavailable("speaker busy".into()));
            }
            Ok(())
        }
        fn write(&mut self, data: &[u8]) -> Result<usize, LatencyError> {
            let accepted = match self.max_write {
                Some(_) if self.refuse_next => 0,
                Some(limit) => data.len().min(limit),
                None => data.len(),
            };
            if self.max_write.is_some() {
                self.refuse_next = !self.refuse_next;
            }
            self.journal.played.lock().extend_from_slice(&data[..accepted]);
            Ok(accepted)
        }
        fn stop(&mut self) {
            self.journal.push("playback.stop");
        }
        fn release(&mut self) {
            self.journal.push("playback.release");
        }
    }

    #[derive(Default)]
    struct TestBackend {
        journal: Arc<Journal>,
        capture_unavailable: bool,
        playback_fails: bool,
        max_write: Option<usize>,
        reads: Arc<AtomicUsize>,
    }

    impl AudioBackend for TestBackend {
        fn open_capture(&self, _: StreamFormat) -> Result<Box<dyn CaptureStream>, LatencyError> {
            if self.capture_unavailable {
                return Err(LatencyError::ResourceUnavailable("microphone busy".into()));
            }
            Ok(Box::new(TestCapture {
                journal: Arc::clone(&self.journal),
                next: 0,
                reads: Arc::clone(&self.reads),
            }))
        }

        fn open_playback(&self, _: StreamFormat) -> Result<Box<dyn PlaybackStream>, LatencyError> {
            Ok(Box::new(TestPlayback {
                journal: Arc::clone(&self.journal),
                fail_play: self.playback_fails,
                max_write: self.max_write,
                refuse_next: false,
            }))
        }
    }

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<LoopbackState>>,
        errors: Mutex<Vec<LatencyError>>,
    }

    impl LoopbackDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: &LoopbackState) {
            self.states.lock().push(state.clone());
        }
        fn on_error(&self, error: &LatencyError) {
            self.errors.lock().push(error.clone());
        }
    }

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
    fn playback_starts_with_prefilled_silence() {
        let backend = TestBackend::default();
        let journal = Arc::clone(&backend.journal);
        let mut session = LoopbackSession::new(backend, fast_config(1));

        session.start().unwrap();
        assert_eq!(session.state(), LoopbackState::Running { prefill_bytes: 3200 });

        wait_for(|| journal.played.lock().len() > 3200 + 256);
        let diagnostics = session.stop().unwrap();

        let played = journal.played.lock().clone();
        assert!(played.len() > 3200);
        assert!(played[..3200].iter().all(|&b| b == 0));
        assert!(played[3200..].iter().all(|&b| b != 0));
        assert_eq!(diagnostics.prefill_bytes, 3200);
        assert!(diagnostics.bytes_captured > 0);
        assert!(session.state().is_idle());
    }

    #[test]
    fn stop_releases_devices_after_workers_exit() {
        let backend = TestBackend::default();
        let journal = Arc::clone(&backend.journal);
        let reads = Arc::clone(&backend.reads);
        let mut session = LoopbackSession::new(backend, fast_config(0));

        session.start().unwrap();
        wait_for(|| reads.load(Ordering::SeqCst) > 3);
        session.stop().unwrap();

        let reads_at_stop = reads.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(reads.load(Ordering::SeqCst), reads_at_stop);

        let events = journal.events.lock().clone();
        assert_eq!(
            events,
            vec![
                "capture.start",
                "capture.stop",
                "capture.release",
                "playback.stop",
                "playback.release"
            ]
        );
    }

    #[test]
    fn second_start_is_rejected() {
        let mut session = LoopbackSession::new(TestBackend::default(), fast_config(0));
        session.start().unwrap();

        assert!(matches!(session.start(), Err(LatencyError::InvalidState(_))));
        session.stop().unwrap();
    }

    #[test]
    fn stop_without_start_is_rejected() {
        let mut session = LoopbackSession::new(TestBackend::default(), fast_config(0));
        assert!(matches!(session.stop(), Err(LatencyError::InvalidState(_))));
    }

    #[test]
    fn unavailable_capture_releases_playback_and_reports() {
        let backend = TestBackend {
            capture_unavailable: true,
            ..Default::default()
        };
        let journal = Arc::clone(&backend.journal);
        let delegate = Arc::new(RecordingDelegate::default());
        let mut session = LoopbackSession::new(backend, fast_config(20));
        session.set_delegate(delegate.clone());

        let err = session.start().unwrap_err();
        assert!(matches!(err, LatencyError::ResourceUnavailable(_)));
        assert_eq!(*journal.events.lock(), vec!["playback.release"]);
        assert_eq!(delegate.errors.lock().len(), 1);
        assert!(session.state().is_idle());

        let states = delegate.states.lock().clone();
        assert_eq!(states[0], LoopbackState::Starting);
        assert!(states[1].is_failed());
        assert!(states[2].is_idle());
    }

    #[test]
    fn invalid_delay_fails_before_opening_devices() {
        let backend = TestBackend::default();
        let journal = Arc::clone(&backend.journal);
        let config = LoopbackConfiguration {
            delay_deciseconds: 500,
            ..fast_config(0)
        };
        let mut session = LoopbackSession::new(backend, config);

        assert!(matches!(
            session.start(),
            Err(LatencyError::ConfigurationFailed(_))
        ));
        assert!(journal.events.lock().is_empty());
    }

    #[test]
    fn restart_uses_new_delay() {
        let backend = TestBackend::default();
        let journal = Arc::clone(&backend.journal);
        let mut session = LoopbackSession::new(backend, fast_config(0));

        session.start().unwrap();
        session.stop().unwrap();

        assert!(session.set_delay_deciseconds(2));
        assert!(!session.set_delay_deciseconds(101));
        journal.played.lock().clear();

        session.start().unwrap();
        assert_eq!(session.state(), LoopbackState::Running { prefill_bytes: 6400 });
        wait_for(|| journal.played.lock().len() >= 6400);
        session.stop().unwrap();

        let played = journal.played.lock().clone();
        assert!(played[..6400].iter().all(|&b| b == 0));
    }

    #[test]
    fn playback_that_cannot_start_refuses_session() {
        let backend = TestBackend {
            playback_fails: true,
            ..Default::default()
        };
        let journal = Arc::clone(&backend.journal);
        let reads = Arc::clone(&backend.reads);
        let delegate = Arc::new(RecordingDelegate::default());
        let mut session = LoopbackSession::new(backend, fast_config(20));
        session.set_delegate(delegate.clone());

        let err = session.start().unwrap_err();

        assert!(matches!(err, LatencyError::ResourceUnavailable(_)));
        assert!(session.state().is_idle());
        assert_eq!(*journal.events.lock(), vec!["capture.release", "playback.release"]);
        assert_eq!(reads.load(Ordering::SeqCst), 0);
        assert_eq!(delegate.errors.lock().len(), 1);
        assert!(delegate.states.lock()[1].is_failed());
        assert!(matches!(session.stop(), Err(LatencyError::InvalidState(_))));
    }

    #[test]
    fn short_playback_writes_keep_every_byte_in_order() {
        let backend = TestBackend {
            max_write: Some(50),
            ..Default::default()
        };
        let journal = Arc::clone(&backend.journal);
        let mut session = LoopbackSession::new(backend, fast_config(0));

        session.start().unwrap();
        wait_for(|| journal.played.lock().len() > 2000);
        let diagnostics = session.stop().unwrap();

        let played = journal.played.lock().clone();
        let mut expected = 0u8;
        for &b in &played {
            expected = expected.wrapping_add(1).max(1);
            assert_eq!(b, expected);
        }
        assert_eq!(diagnostics.bytes_played, played.len() as u64);
        assert_eq!(diagnostics.playback_errors, 0);
    }

    #[test]
    fn worker_runs_with_its_payload() {
        let handle = spawn_worker(worker_builder("payload-worker"), vec![1u8, 2, 3], |v| v.len())
            .unwrap();
        assert_eq!(handle.join().unwrap(), Some(3));
    }

    #[test]
    fn failed_spawn_hands_payload_back() {
        // No address space can hold this stack, so thread creation fails.
        let builder = worker_builder("huge-stack").stack_size(usize::MAX >> 1);

        let (payload, _) = spawn_worker(builder, vec![1u8, 2, 3], |v| v.len()).unwrap_err();

        assert_eq!(payload, Some(vec![1, 2, 3]));
    }

    #[test]
    fn prefill_stops_when_pipe_is_full() {
        let mut pipe = Pipe::new(300);
        assert_eq!(prefill_silence(&mut pipe, 1000, 128), 300);
        assert_eq!(pipe.len(), 300);
    }
}
