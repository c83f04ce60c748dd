use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SupportedStreamConfigRange};
use culex_foundation::AudioError;

pub struct DeviceManager {
    host: Host,
}

impl DeviceManager {
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        Ok(Self { host })
    }

    pub fn host_id(&self) -> cpal::HostId {
        self.host.id()
    }

    /// Find the first input device able to deliver at least `min_channels`
    /// interleaved channels. Fails fatally when none qualifies; the pipeline
    /// cannot run without the full array.
    pub fn find_input_device(&self, min_channels: u16) -> Result<Device, AudioError> {
        let devices = self
            .host
            .input_devices()
            .map_err(|e| AudioError::Fatal(format!("Cannot enumerate input devices: {}", e)))?;

        for device in devices {
            if Self::max_input_channels(&device) >= min_channels {
                if let Ok(name) = device.name() {
                    tracing::info!(
                        "Using input device: {} (host: {:?})",
                        name,
                        self.host.id()
                    );
                }
                return Ok(device);
            }
        }

        Err(AudioError::DeviceNotFound {
            required_channels: min_channels,
        })
    }

    /// Find a specific device by exact name, still enforcing the channel
    /// requirement.
    pub fn find_input_device_by_name(
        &self,
        name: &str,
        min_channels: u16,
    ) -> Result<Device, AudioError> {
        if let Ok(devices) = self.host.input_devices() {
            for device in devices {
                if device.name().map(|n| n == name).unwrap_or(false) {
                    if Self::max_input_channels(&device) >= min_channels {
                        return Ok(device);
                    }
                    tracing::warn!(
                        "Device '{}' found but offers fewer than {} channels",
                        name,
                        min_channels
                    );
                }
            }
        }
        Err(AudioError::DeviceNotFound {
            required_channels: min_channels,
        })
    }

    pub fn enumerate_device_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(devices) = self.host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name() {
                    names.push(name);
                }
            }
        }
        names
    }

    fn max_input_channels(device: &Device) -> u16 {
        device
            .supported_input_configs()
            .map(|configs| {
                configs
                    .map(|c: SupportedStreamConfigRange| c.channels())
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}
