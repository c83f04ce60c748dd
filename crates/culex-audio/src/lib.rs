pub mod capture;
pub mod device;
pub mod frame;

// Public API
pub use capture::{CaptureHandle, CaptureThread};
pub use device::DeviceManager;
pub use frame::{extract_channel, ArrayConfig, AudioFrame, FrameReceiver};
