pub mod config;
pub mod error;
pub mod measurement;
pub mod params;
pub mod report;
pub mod state;
pub mod trace;
