use crate::models::params::AudioParams;

/// Queries the host platform about its audio output.
pub trait PlatformInfo: Send + Sync {
    /// Sample rate and buffer size as reported by the platform, when it can.
    ///
    /// Returned parameters should be marked confident.
    fn authoritative_params(&self) -> Option<AudioParams>;

    /// One-line device description, e.g. manufacturer, model and OS build.
    fn device_description(&self) -> String;
}
