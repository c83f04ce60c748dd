/// External direction display (LED ring or equivalent).
///
/// Fire-and-forget: calls carry no acknowledgement and sink failures are
/// never propagated back into the detection core.
pub trait DirectionSink: Send {
    fn set_direction(&mut self, angle_deg: f64);
    fn off(&mut self);
}

/// Logs direction events; stands in for ring hardware on headless builds.
pub struct LogSink;

impl DirectionSink for LogSink {
    fn set_direction(&mut self, angle_deg: f64) {
        tracing::info!("Direction indicator: {:.0}°", angle_deg);
    }

    fn off(&mut self) {
        tracing::info!("Direction indicator off");
    }
}

pub struct NullSink;

impl DirectionSink for NullSink {
    fn set_direction(&mut self, _angle_deg: f64) {}
    fn off(&mut self) {}
}
