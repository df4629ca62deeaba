//! Feature traits for board capabilities.
//!
//! Boards opt-in to features by implementing these traits and returning
//! `Some(self)` from the corresponding `as_*()` method in the Board trait.

use chrono::{DateTime, Local};

/// Errors that can occur during board operations
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// No matching device could be opened
    #[error("device not found")]
    DeviceNotFound,

    /// Command could not be encoded for the device
    #[error("command failed: {0}")]
    CommandFailed(&'static str),

    /// HID communication error
    #[error("hid error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BoardError>;

/// Time synchronization capability
pub trait HasTime {
    fn set_time(&mut self, time: DateTime<Local>) -> Result<()>;
}

/// CPU temperature display capability
pub trait HasCpuTemp {
    fn set_cpu_temp(&mut self, temp: u8) -> Result<()>;
}

/// GPU temperature display capability. Not every firmware has it.
pub trait HasGpuTemp {
    fn set_gpu_temp(&mut self, temp: u8) -> Result<()>;
}

/// Fan speed display capability
pub trait HasFanSpeed {
    fn set_fan_speed(&mut self, rpm: u16) -> Result<()>;
}

/// Network throughput display capability
pub trait HasNetSpeed {
    /// Throughput in bytes per second
    fn set_net_speed(&mut self, speed: u32) -> Result<()>;
}

/// Weather display capability
pub trait HasWeather {
    /// Set weather display. WMO code is converted to board-specific icon internally.
    /// Temperatures are unitless, each board clamps to its native range.
    fn set_weather(&mut self, wmo: u8, is_day: bool, current: i16, high: i16) -> Result<()>;
}
