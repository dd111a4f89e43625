pub mod loopback;
pub mod probe;
