use crate::models::error::LatencyError;

/// One of the four timestamp channels recorded per audio callback tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// The native audio callback fired.
    Callback,
    /// The callback finished its own work.
    CallbackDone,
    /// The render thread woke up for this tick.
    ThreadWoken,
    /// The render thread finished producing the buffer.
    RenderComplete,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Callback,
        Channel::CallbackDone,
        Channel::ThreadWoken,
        Channel::RenderComplete,
    ];

    /// Position of this channel's segment in the flattened layout.
    pub fn index(self) -> usize {
        match self {
            Channel::Callback => 0,
            Channel::CallbackDone => 1,
            Channel::ThreadWoken => 2,
            Channel::RenderComplete => 3,
        }
    }
}

/// Timestamps captured during one trial, in seconds.
///
/// Stored flat as four contiguous segments of equal length, in the order of
/// [`Channel::ALL`]. This is the layout the native engine fills.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampTrace {
    len: usize,
    data: Vec<f64>,
}

impl TimestampTrace {
    /// A trace of `len` ticks with every timestamp at zero.
    pub fn zeroed(len: usize) -> Self {
        Self {
            len,
            data: vec![0.0; len * 4],
        }
    }

    /// Wrap a flat buffer of `4 * n` timestamps.
    pub fn from_flat(data: Vec<f64>) -> Result<Self, LatencyError> {
        if data.len() % 4 != 0 {
            return Err(LatencyError::ConfigurationFailed(format!(
                "flat trace length {} is not a multiple of 4",
                data.len()
            )));
        }
        Ok(Self {
            len: data.len() / 4,
            data,
        })
    }

    /// Build a trace from four equal-length channels.
    pub fn from_channels(
        callback: &[f64],
        callback_done: &[f64],
        thread_woken: &[f64],
        render_complete: &[f64],
    ) -> Result<Self, LatencyError> {
        let len = callback.len();
        if [callback_done.len(), thread_woken.len(), render_complete.len()]
            .iter()
            .any(|&l| l != len)
        {
            return Err(LatencyError::ConfigurationFailed(
                "trace channels must have equal length".into(),
            ));
        }

        let mut data = Vec::with_capacity(len * 4);
        data.extend_from_slice(callback);
        data.extend_from_slice(callback_done);
        data.extend_from_slice(thread_woken);
        data.extend_from_slice(render_complete);
        Ok(Self { len, data })
    }

    /// Number of ticks per channel.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn channel(&self, channel: Channel) -> &[f64] {
        let start = channel.index() * self.len;
        &self.data[start..start + self.len]
    }

    pub fn channel_mut(&mut self, channel: Channel) -> &mut [f64] {
        let start = channel.index() * self.len;
        &mut self.data[start..start + self.len]
    }

    pub fn callback(&self) -> &[f64] {
        self.channel(Channel::Callback)
    }

    /// The whole flat buffer.
    pub fn as_flat(&self) -> &[f64] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_are_contiguous_segments() {
        let trace = TimestampTrace::from_flat(vec![
            1.0, 2.0, // callback
            3.0, 4.0, // callback done
            5.0, 6.0, // thread woken
            7.0, 8.0, // render complete
        ])
        .unwrap();

        assert_eq!(trace.len(), 2);
        assert_eq!(trace.callback(), &[1.0, 2.0]);
        assert_eq!(trace.channel(Channel::CallbackDone), &[3.0, 4.0]);
        assert_eq!(trace.channel(Channel::ThreadWoken), &[5.0, 6.0]);
        assert_eq!(trace.channel(Channel::RenderComplete), &[7.0, 8.0]);
    }

    #[test]
    fn from_channels_flattens_in_order() {
        let trace =
            TimestampTrace::from_channels(&[1.0], &[2.0], &[3.0], &[4.0]).unwrap();
        assert_eq!(trace.as_flat(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn rejects_ragged_input() {
        assert!(TimestampTrace::from_flat(vec![0.0; 7]).is_err());
        assert!(TimestampTrace::from_channels(&[1.0], &[], &[1.0], &[1.0]).is_err());
    }

    #[test]
    fn channel_mut_writes_only_its_segment() {
        let mut trace = TimestampTrace::zeroed(3);
        trace
            .channel_mut(Channel::ThreadWoken)
            .copy_from_slice(&[1.0, 1.0, 1.0]);

        assert_eq!(trace.callback(), &[0.0; 3]);
        assert_eq!(trace.channel(Channel::ThreadWoken), &[1.0; 3]);
        assert_eq!(trace.channel(Channel::RenderComplete), &[0.0; 3]);
    }
}
