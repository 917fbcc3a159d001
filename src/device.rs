//! # Compute Device Selection
//!
//! Picks the candle device local translation models run on. GPU backends are
//! probed once; anything that fails to initialize falls back to the CPU.

use candle_core::Device;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Best device found by the first auto-detection.
static DETECTED_DEVICE: OnceLock<Device> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    /// Falls back to CPU when no CUDA device initializes
    Cuda,
    /// Falls back to CPU when no Metal device initializes
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

pub fn select_device(preference: DevicePreference) -> Device {
    match preference {
        DevicePreference::Auto => DETECTED_DEVICE.get_or_init(detect_device).clone(),
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => cuda_device().unwrap_or(Device::Cpu),
        DevicePreference::Metal => metal_device().unwrap_or(Device::Cpu),
    }
}

fn detect_device() -> Device {
    if let Some(device) = cuda_device() {
        info!("Translation models will run on CUDA");
        return device;
    }
    if let Some(device) = metal_device() {
        info!("Translation models will run on Metal");
        return device;
    }
    info!("Translation models will run on CPU");
    Device::Cpu
}

fn cuda_device() -> Option<Device> {
    Device::new_cuda(0)
        .map_err(|e| debug!("CUDA not available: {}", e))
        .ok()
}

fn metal_device() -> Option<Device> {
    Device::new_metal(0)
        .map_err(|e| debug!("Metal not available: {}", e))
        .ok()
}

/// Short name for logs and the health endpoint.
pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

/// Parse the configured device name, using auto-detection for unknown values.
pub fn create_device_from_string(device_str: &str) -> Device {
    let preference = device_str.parse().unwrap_or_else(|e: String| {
        warn!("{}, using auto", e);
        DevicePreference::Auto
    });
    let device = select_device(preference);
    debug!("Device '{}' resolved to {}", device_str, device_label(&device));
    device
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_parsing() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("CPU".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("gpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert_eq!("metal".parse::<DevicePreference>().unwrap(), DevicePreference::Metal);
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn cpu_is_always_available() {
        assert_eq!(device_label(&create_device_from_string("cpu")), "cpu");
    }
}
