use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared metrics for cross-thread pipeline monitoring
#[derive(Clone, Default)]
pub struct PipelineMetrics {
    // Capture side
    pub frames_captured: Arc<AtomicU64>,
    pub frames_dropped: Arc<AtomicU64>,

    // Processing side
    pub chunks_processed: Arc<AtomicU64>,
    pub wingbeat_hits: Arc<AtomicU64>,
    pub windows_resolved: Arc<AtomicU64>,
    pub bearings_emitted: Arc<AtomicU64>,

    // Latency tracking
    pub last_doa_latency_ms: Arc<AtomicU64>,
    pub last_detection_time: Arc<RwLock<Option<Instant>>>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_frames_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_frames_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_chunks_processed(&self) {
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wingbeat_hit(&self) {
        self.wingbeat_hits.fetch_add(1, Ordering::Relaxed);
        *self.last_detection_time.write() = Some(Instant::now());
    }

    pub fn record_window_resolved(&self, doa_latency_ms: u64) {
        self.windows_resolved.fetch_add(1, Ordering::Relaxed);
        self.last_doa_latency_ms
            .store(doa_latency_ms, Ordering::Relaxed);
    }

    pub fn record_bearing_emitted(&self) {
        self.bearings_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunks_processed(&self) -> u64 {
        self.chunks_processed.load(Ordering::Relaxed)
    }

    pub fn bearings_emitted(&self) -> u64 {
        self.bearings_emitted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let metrics = PipelineMetrics::new();
        metrics.increment_chunks_processed();
        metrics.increment_chunks_processed();
        metrics.record_bearing_emitted();
        assert_eq!(metrics.chunks_processed(), 2);
        assert_eq!(metrics.bearings_emitted(), 1);
    }

    #[test]
    fn shared_across_clones() {
        let metrics = PipelineMetrics::new();
        let other = metrics.clone();
        other.record_window_resolved(12);
        assert_eq!(metrics.windows_resolved.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.last_doa_latency_ms.load(Ordering::Relaxed), 12);
    }
}
