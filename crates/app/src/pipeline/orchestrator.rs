use std::sync::Arc;
use std::time::Instant;

use culex_audio::{extract_channel, ArrayConfig, AudioFrame, FrameReceiver};
use culex_dsp::{DoaCombiner, WingbeatDetector};
use culex_foundation::AppError;
use culex_telemetry::PipelineMetrics;

use crate::pipeline::sink::DirectionSink;
use crate::settings::{Settings, TriggerPolicy};

/// Accumulating detection window: raw interleaved frames plus the running
/// count of positive verdicts. Created empty, consumed at window end.
#[derive(Default)]
struct DetectionWindow {
    samples: Vec<i16>,
    chunks: usize,
    hits: usize,
}

impl DetectionWindow {
    fn push(&mut self, frame: &[i16], hit: bool) {
        self.samples.extend_from_slice(frame);
        self.chunks += 1;
        if hit {
            self.hits += 1;
        }
    }

    fn reset(&mut self) {
        self.samples.clear();
        self.chunks = 0;
        self.hits = 0;
    }
}

/// The control loop: pull frames, classify the detection channel, and decide
/// when to spend a bearing computation.
///
/// Two implicit states: idle (accumulating) and resolving (one combiner call
/// per trigger), returning to idle immediately after. Frames are processed
/// strictly in arrival order; nothing is retried or dropped.
pub struct DetectionPipeline {
    array: ArrayConfig,
    policy: TriggerPolicy,
    window_chunks: usize,
    detector: WingbeatDetector,
    combiner: DoaCombiner,
    sink: Box<dyn DirectionSink>,
    metrics: Arc<PipelineMetrics>,
    window: DetectionWindow,
}

impl DetectionPipeline {
    pub fn new(
        settings: &Settings,
        sink: Box<dyn DirectionSink>,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self, AppError> {
        settings.validate()?;
        Ok(Self {
            array: settings.array.clone(),
            policy: settings.policy,
            window_chunks: settings.window_chunks(),
            detector: WingbeatDetector::new(settings.band, settings.array.sample_rate_hz),
            combiner: DoaCombiner::new(
                settings.strategy,
                settings.spacing_m,
                settings.array.sample_rate_hz,
            ),
            sink,
            metrics,
            window: DetectionWindow::default(),
        })
    }

    /// Process frames until the capture side pushes the sentinel or goes
    /// away. The indicator is cleared on every exit path, mid-window
    /// included.
    pub fn run(&mut self, frames: FrameReceiver) {
        tracing::info!("Detection loop started");
        while let Some(frame) = frames.next_frame() {
            self.process_chunk(&frame);
        }
        self.sink.off();
        tracing::info!("Detection loop stopped");
    }

    pub fn process_chunk(&mut self, frame: &AudioFrame) {
        self.metrics.increment_chunks_processed();

        // Detection listens on the first logical microphone.
        let mono = extract_channel(
            &frame.samples,
            self.array.total_channels,
            self.array.mic_indices[0],
        );
        let hit = self.detector.is_wingbeat(&mono);
        if hit {
            self.metrics.record_wingbeat_hit();
        }
        tracing::trace!(verdict = hit as u8, "chunk classified");

        match self.policy {
            TriggerPolicy::WindowedRatio => {
                self.window.push(&frame.samples, hit);
                if self.window.chunks >= self.window_chunks {
                    if self.window.hits * 2 > self.window_chunks {
                        let buffer = std::mem::take(&mut self.window.samples);
                        self.resolve(&buffer);
                    }
                    // The window is consumed either way.
                    self.window.reset();
                }
            }
            TriggerPolicy::Immediate => {
                if hit {
                    self.resolve(&frame.samples);
                }
            }
        }
    }

    fn resolve(&mut self, buffer: &[i16]) {
        let started = Instant::now();

        let mics: Vec<Vec<f64>> = self
            .array
            .mic_indices
            .iter()
            .map(|&idx| {
                extract_channel(buffer, self.array.total_channels, idx)
                    .into_iter()
                    .map(|s| s as f64)
                    .collect()
            })
            .collect();

        let bearing = self.combiner.bearing(&mics);
        let latency_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_window_resolved(latency_ms);

        match bearing {
            Some(angle_deg) => {
                self.sink.set_direction(angle_deg);
                self.metrics.record_bearing_emitted();
                tracing::info!(latency_ms, "Wingbeat detected at {:.0}°", angle_deg);
            }
            None => {
                self.sink.off();
                tracing::info!(latency_ms, "Wingbeat detected, direction unknown");
            }
        }
    }
}
