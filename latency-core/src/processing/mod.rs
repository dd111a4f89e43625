pub mod pipe;
pub mod stop_signal;
