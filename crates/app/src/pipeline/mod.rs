pub mod orchestrator;
pub mod sink;

pub use orchestrator::DetectionPipeline;
pub use sink::{DirectionSink, LogSink, NullSink};
