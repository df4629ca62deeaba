//! Core Board trait and related types.

use crate::features::{HasCpuTemp, HasFanSpeed, HasGpuTemp, HasNetSpeed, HasTime, HasWeather};

/// Static information about a board type for detection and logging
#[derive(Debug, Clone, Copy)]
pub struct BoardInfo {
    pub name: &'static str,
    pub cli_name: &'static str,
    pub vendor_id: u16,
    /// Known product ids. Empty matches any product from the vendor.
    pub product_ids: &'static [u16],
    /// Logical HID interface carrying the screen protocol
    pub interface_number: i32,
}

/// Core board trait - object-safe for `dyn Board`
///
/// Boards should provide a static `INFO` constant and discovery function separately.
pub trait Board: Send {
    /// Get board info (instance method for object safety)
    fn info(&self) -> &'static BoardInfo;

    /// Where this board is connected, used to tell sessions apart in logs
    fn location(&self) -> &str {
        self.info().cli_name
    }

    /// Feature opt-in methods - override to return `Some(self)` if feature is supported
    fn as_time(&mut self) -> Option<&mut dyn HasTime> {
        None
    }
    fn as_cpu_temp(&mut self) -> Option<&mut dyn HasCpuTemp> {
        None
    }
    fn as_gpu_temp(&mut self) -> Option<&mut dyn HasGpuTemp> {
        None
    }
    fn as_fan_speed(&mut self) -> Option<&mut dyn HasFanSpeed> {
        None
    }
    fn as_net_speed(&mut self) -> Option<&mut dyn HasNetSpeed> {
        None
    }
    fn as_weather(&mut self) -> Option<&mut dyn HasWeather> {
        None
    }
}
