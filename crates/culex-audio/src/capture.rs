use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, unbounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::device::DeviceManager;
use crate::frame::{ArrayConfig, AudioFrame, FrameReceiver};
use culex_foundation::AudioError;
use culex_telemetry::PipelineMetrics;

/// Continuous background capture from the microphone array.
///
/// The cpal callback is the only producer; it assembles fixed-size interleaved
/// frames and hands them off over an unbounded channel in strict arrival
/// order. The stream lives on a dedicated thread because `cpal::Stream` is not
/// `Send` and the device must be closed from the thread that opened it.
pub struct CaptureThread;

pub struct CaptureHandle {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl CaptureThread {
    pub fn spawn(
        array: ArrayConfig,
        device_name: Option<String>,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<(CaptureHandle, FrameReceiver), AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let running_worker = running.clone();

        let (frame_tx, frame_rx) = unbounded::<AudioFrame>();
        let (start_tx, start_rx) = bounded::<Result<(), AudioError>>(1);

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                capture_main(array, device_name, frame_tx, start_tx, running_worker, metrics);
            })
            .map_err(|e| AudioError::Fatal(format!("Failed to spawn audio thread: {}", e)))?;

        // Wait for the stream to open (or fail) before handing control back.
        match start_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok((
                CaptureHandle {
                    handle: Some(handle),
                    running,
                },
                FrameReceiver::new(frame_rx),
            )),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(AudioError::Fatal(
                    "Audio capture thread did not start within timeout".to_string(),
                ))
            }
        }
    }
}

impl CaptureHandle {
    /// Halt capture: stop the callback producer, close the device, and push
    /// the sentinel so a blocked consumer unblocks instead of hanging.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_main(
    array: ArrayConfig,
    device_name: Option<String>,
    frame_tx: Sender<AudioFrame>,
    start_tx: Sender<Result<(), AudioError>>,
    running: Arc<AtomicBool>,
    metrics: Arc<PipelineMetrics>,
) {
    let stream = match open_stream(&array, device_name.as_deref(), &frame_tx, &running, &metrics) {
        Ok(stream) => {
            let _ = start_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            tracing::error!("Failed to open capture stream: {}", e);
            let _ = start_tx.send(Err(e));
            return;
        }
    };

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    // Close the device before the sentinel so no frame can follow it.
    drop(stream);
    let _ = frame_tx.send(AudioFrame::sentinel());
    tracing::info!("Audio capture thread shut down");
}

fn open_stream(
    array: &ArrayConfig,
    device_name: Option<&str>,
    frame_tx: &Sender<AudioFrame>,
    running: &Arc<AtomicBool>,
    metrics: &Arc<PipelineMetrics>,
) -> Result<cpal::Stream, AudioError> {
    let manager = DeviceManager::new()?;
    let device = match device_name {
        Some(name) => manager.find_input_device_by_name(name, array.total_channels)?,
        None => manager.find_input_device(array.total_channels)?,
    };

    let sample_format = negotiate_sample_format(&device, array.total_channels)?;
    let config = StreamConfig {
        channels: array.total_channels,
        sample_rate: SampleRate(array.sample_rate_hz),
        buffer_size: cpal::BufferSize::Default,
    };

    let assembler = FrameAssembler::new(
        array.frame_len(),
        frame_tx.clone(),
        running.clone(),
        metrics.clone(),
    );

    let err_fn = |err: cpal::StreamError| {
        tracing::error!("Audio stream error: {}", err);
    };

    let stream = match sample_format {
        SampleFormat::I16 => {
            let mut assembler = assembler;
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &_| assembler.push_i16(data),
                err_fn,
                None,
            )?
        }
        SampleFormat::F32 => {
            let mut assembler = assembler;
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &_| assembler.push_f32(data),
                err_fn,
                None,
            )?
        }
        SampleFormat::U16 => {
            let mut assembler = assembler;
            device.build_input_stream(
                &config,
                move |data: &[u16], _: &_| assembler.push_u16(data),
                err_fn,
                None,
            )?
        }
        other => {
            return Err(AudioError::FormatNotSupported {
                format: format!("{:?}", other),
            });
        }
    };

    stream.play()?;
    tracing::info!(
        "Capture stream running: {} ch @ {} Hz, {} samples/chunk",
        array.total_channels,
        array.sample_rate_hz,
        array.chunk_size
    );
    Ok(stream)
}

fn negotiate_sample_format(
    device: &cpal::Device,
    min_channels: u16,
) -> Result<SampleFormat, AudioError> {
    let configs = device.supported_input_configs()?;
    let mut available = Vec::new();
    for range in configs {
        if range.channels() >= min_channels {
            available.push(range.sample_format());
        }
    }
    for preferred in [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16] {
        if available.contains(&preferred) {
            return Ok(preferred);
        }
    }
    Err(AudioError::FormatNotSupported {
        format: format!("{:?}", available),
    })
}

/// Accumulates interleaved samples from the callback and emits fixed-size
/// frames of exactly `chunk_size * total_channels` samples.
struct FrameAssembler {
    pending: Vec<i16>,
    convert: Vec<i16>,
    frame_len: usize,
    frame_tx: Sender<AudioFrame>,
    running: Arc<AtomicBool>,
    metrics: Arc<PipelineMetrics>,
}

impl FrameAssembler {
    fn new(
        frame_len: usize,
        frame_tx: Sender<AudioFrame>,
        running: Arc<AtomicBool>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            pending: Vec::with_capacity(frame_len * 4),
            convert: Vec::new(),
            frame_len,
            frame_tx,
            running,
            metrics,
        }
    }

    fn push_i16(&mut self, data: &[i16]) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        self.pending.extend_from_slice(data);
        while self.pending.len() >= self.frame_len {
            let samples: Vec<i16> = self.pending.drain(..self.frame_len).collect();
            match self.frame_tx.send(AudioFrame::new(samples)) {
                Ok(()) => self.metrics.increment_frames_captured(),
                Err(_) => self.metrics.increment_frames_dropped(),
            }
        }
    }

    fn push_f32(&mut self, data: &[f32]) {
        self.convert.clear();
        self.convert.reserve(data.len());
        for &s in data {
            let clamped = s.clamp(-1.0, 1.0);
            self.convert.push((clamped * 32767.0).round() as i16);
        }
        let converted = std::mem::take(&mut self.convert);
        self.push_i16(&converted);
        self.convert = converted;
    }

    fn push_u16(&mut self, data: &[u16]) {
        self.convert.clear();
        self.convert.reserve(data.len());
        for &s in data {
            // Shift unsigned [0, 65535] to signed [-32768, 32767]
            self.convert.push((s as i32 - 32768) as i16);
        }
        let converted = std::mem::take(&mut self.convert);
        self.push_i16(&converted);
        self.convert = converted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::Receiver;

    fn assembler(frame_len: usize) -> (FrameAssembler, Receiver<AudioFrame>) {
        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(PipelineMetrics::new());
        (FrameAssembler::new(frame_len, tx, running, metrics), rx)
    }

    #[test]
    fn assembler_emits_fixed_size_frames() {
        let (mut asm, rx) = assembler(8);
        asm.push_i16(&[1i16; 5]);
        assert!(rx.try_recv().is_err());
        asm.push_i16(&[1i16; 5]);
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.samples.len(), 8);
        // Two samples carried over into the next frame
        asm.push_i16(&[2i16; 6]);
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.samples, vec![1, 1, 2, 2, 2, 2, 2, 2]);
    }

    #[test]
    fn assembler_preserves_order_across_callbacks() {
        let (mut asm, rx) = assembler(4);
        asm.push_i16(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(rx.try_recv().unwrap().samples, vec![1, 2, 3, 4]);
        assert_eq!(rx.try_recv().unwrap().samples, vec![5, 6, 7, 8]);
    }

    #[test]
    fn assembler_ignores_data_after_stop() {
        let (mut asm, rx) = assembler(4);
        asm.running.store(false, Ordering::SeqCst);
        asm.push_i16(&[1, 2, 3, 4]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn f32_conversion_is_full_scale() {
        let (mut asm, rx) = assembler(5);
        asm.push_f32(&[-1.0, -0.5, 0.0, 0.5, 1.0]);
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.samples, vec![-32767, -16384, 0, 16384, 32767]);
    }

    #[test]
    fn u16_conversion_centers_on_zero() {
        let (mut asm, rx) = assembler(3);
        asm.push_u16(&[0, 32768, 65535]);
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.samples, vec![-32768, 0, 32767]);
    }
}
