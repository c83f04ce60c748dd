use std::time::Instant;

use crossbeam_channel::Receiver;
use culex_foundation::AppError;
use serde::{Deserialize, Serialize};

/// Geometry-independent description of the microphone array capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayConfig {
    /// Capture sample rate in Hz.
    pub sample_rate_hz: u32,
    /// Physical channels delivered by the device (interleaved).
    pub total_channels: u16,
    /// Logical microphone channels used for detection and DOA, in array order.
    pub mic_indices: Vec<usize>,
    /// Samples per channel per analysis chunk.
    pub chunk_size: usize,
}

impl ArrayConfig {
    /// 4-channel array, every channel is a microphone.
    pub fn quad_array() -> Self {
        Self {
            sample_rate_hz: 16_000,
            total_channels: 4,
            mic_indices: vec![0, 1, 2, 3],
            chunk_size: 160,
        }
    }

    /// 6-channel firmware layout: channels 1-4 are the raw microphones,
    /// channel 0 is processed output and channel 5 is playback loopback.
    pub fn six_channel_array() -> Self {
        Self {
            sample_rate_hz: 16_000,
            total_channels: 6,
            mic_indices: vec![1, 2, 3, 4],
            chunk_size: 160,
        }
    }

    /// Interleaved samples per chunk across all physical channels.
    pub fn frame_len(&self) -> usize {
        self.chunk_size * self.total_channels as usize
    }

    pub fn chunk_duration_ms(&self) -> f32 {
        (self.chunk_size as f32 * 1000.0) / self.sample_rate_hz as f32
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.mic_indices.is_empty() {
            return Err(AppError::Config("at least one microphone index required".into()));
        }
        if self.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be non-zero".into()));
        }
        for &idx in &self.mic_indices {
            if idx >= self.total_channels as usize {
                return Err(AppError::Config(format!(
                    "mic index {} out of range for {} channels",
                    idx, self.total_channels
                )));
            }
        }
        let mut seen = self.mic_indices.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.mic_indices.len() {
            return Err(AppError::Config("duplicate microphone index".into()));
        }
        Ok(())
    }
}

/// One fixed-duration block of interleaved multichannel samples.
///
/// Frames are owned by whichever stage currently holds them; hand-off through
/// the channel transfers ownership. An empty sample buffer is the shutdown
/// sentinel pushed by `CaptureHandle::stop`.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub timestamp: Instant,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples,
            timestamp: Instant::now(),
        }
    }

    pub fn sentinel() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_sentinel(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Extract one logical channel from an interleaved multichannel buffer.
///
/// Pure strided slice: `samples[channel], samples[channel + total], ...`.
/// An out-of-range channel index is a programmer error.
pub fn extract_channel(samples: &[i16], total_channels: u16, channel: usize) -> Vec<i16> {
    let total = total_channels as usize;
    assert!(
        channel < total,
        "channel {} out of range for {} channels",
        channel,
        total
    );
    samples.iter().skip(channel).step_by(total).copied().collect()
}

/// Blocking, strictly-ordered consumer side of the capture hand-off.
///
/// `next_frame` suspends until the capture callback delivers the next chunk
/// and returns `None` once the sentinel arrives or the producer is gone.
/// There is no timeout on the wait: a device that stops delivering frames
/// without erroring leaves the consumer blocked until `stop` is called.
pub struct FrameReceiver {
    rx: Receiver<AudioFrame>,
}

impl FrameReceiver {
    pub fn new(rx: Receiver<AudioFrame>) -> Self {
        Self { rx }
    }

    pub fn next_frame(&self) -> Option<AudioFrame> {
        match self.rx.recv() {
            Ok(frame) if frame.is_sentinel() => None,
            Ok(frame) => Some(frame),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn extract_channel_strides_interleaved_data() {
        // 3 channels, 4 samples each: [a0 b0 c0 a1 b1 c1 ...]
        let samples: Vec<i16> = (0..12).collect();
        assert_eq!(extract_channel(&samples, 3, 0), vec![0, 3, 6, 9]);
        assert_eq!(extract_channel(&samples, 3, 1), vec![1, 4, 7, 10]);
        assert_eq!(extract_channel(&samples, 3, 2), vec![2, 5, 8, 11]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn extract_channel_rejects_bad_index() {
        extract_channel(&[0i16; 6], 3, 3);
    }

    #[test]
    fn array_config_validation() {
        assert!(ArrayConfig::quad_array().validate().is_ok());
        assert!(ArrayConfig::six_channel_array().validate().is_ok());

        let mut bad = ArrayConfig::quad_array();
        bad.mic_indices = vec![0, 4];
        assert!(bad.validate().is_err());

        let mut dup = ArrayConfig::quad_array();
        dup.mic_indices = vec![1, 1];
        assert!(dup.validate().is_err());

        let mut empty = ArrayConfig::quad_array();
        empty.mic_indices.clear();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn receiver_stops_on_sentinel() {
        let (tx, rx) = unbounded();
        let receiver = FrameReceiver::new(rx);
        tx.send(AudioFrame::new(vec![1, 2, 3])).unwrap();
        tx.send(AudioFrame::sentinel()).unwrap();
        tx.send(AudioFrame::new(vec![4, 5, 6])).unwrap();

        assert_eq!(receiver.next_frame().unwrap().samples, vec![1, 2, 3]);
        // Sentinel ends the session even though a frame sits behind it.
        assert!(receiver.next_frame().is_none());
    }

    #[test]
    fn receiver_stops_on_disconnect() {
        let (tx, rx) = unbounded::<AudioFrame>();
        let receiver = FrameReceiver::new(rx);
        drop(tx);
        assert!(receiver.next_frame().is_none());
    }
}
