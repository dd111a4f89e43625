pub mod audio_device;
pub mod delegate;
pub mod native_engine;
pub mod platform;
pub mod report_sink;
