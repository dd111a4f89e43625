use crate::models::error::LatencyError;

/// PCM stream format for loopback devices. Samples are 16-bit little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * 2
    }
}

/// An opened microphone stream.
///
/// Owned by exactly one thread at a time; the loopback session moves it to
/// its reader thread and takes it back before releasing it.
pub trait CaptureStream: Send {
    /// Bytes per `read` call the device prefers.
    fn block_bytes(&self) -> usize;

    /// Begin recording.
    fn start(&mut self) -> Result<(), LatencyError>;

    /// Read one block into `buf`. May block for up to one device period.
    /// Returns 0 when no data arrived.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LatencyError>;

    fn stop(&mut self);

    /// Free the device. The stream is unusable afterwards.
    fn release(&mut self);
}

/// An opened speaker stream.
pub trait PlaybackStream: Send {
    fn play(&mut self) -> Result<(), LatencyError>;

    /// Queue bytes for playback. Returns bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, LatencyError>;

    fn stop(&mut self);

    fn release(&mut self);
}

/// Opens capture and playback devices.
///
/// Implemented by:
/// - `MemoryBackend` (`latency-sim`)
/// - Future: platform audio backends
pub trait AudioBackend: Send + Sync {
    fn open_capture(&self, format: StreamFormat) -> Result<Box<dyn CaptureStream>, LatencyError>;

    fn open_playback(&self, format: StreamFormat)
        -> Result<Box<dyn PlaybackStream>, LatencyError>;
}
