use latency_core::models::params::AudioParams;
use latency_core::traits::platform::PlatformInfo;

/// Platform with a fixed description and, optionally, known audio parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticPlatform {
    description: String,
    params: Option<AudioParams>,
}

impl StaticPlatform {
    /// A platform that cannot report its audio parameters.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            params: None,
        }
    }

    /// A platform that reports `sample_rate` and `buffer_size` authoritatively.
    pub fn with_params(description: impl Into<String>, sample_rate: u32, buffer_size: u32) -> Self {
        Self {
            description: description.into(),
            params: Some(AudioParams::authoritative(sample_rate, buffer_size)),
        }
    }
}

impl PlatformInfo for StaticPlatform {
    fn authoritative_params(&self) -> Option<AudioParams> {
        self.params
    }

    fn device_description(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_params_are_confident() {
        let platform = StaticPlatform::with_params("phone", 48000, 192);
        let params = platform.authoritative_params().unwrap();
        assert!(params.confident);
        assert_eq!(params.buffer_size, 192);
        assert_eq!(StaticPlatform::new("phone").authoritative_params(), None);
    }
}
