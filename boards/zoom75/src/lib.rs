//! High level hidapi abstraction for interacting with Zoom75 screen modules.
//!
//! This crate provides reverse-engineered bindings to drive the Zoom75 keyboard's
//! built-in display via HID. The protocol uses fire-and-forget 32-byte output
//! reports carrying an additive body checksum and a CRC-16/CCITT-FALSE frame crc.
//! The keyboard exposes several HID interfaces; only one of them carries the
//! screen protocol.

use chrono::{DateTime, Local, TimeZone};
use hidapi::{HidApi, HidDevice};
use tracing::{debug, info, warn};
use zoom_sync_core::{
    Board, BoardError, BoardInfo, DeviceDescriptor, HasCpuTemp, HasFanSpeed, HasGpuTemp,
    HasNetSpeed, HasTime, HasWeather, HidBackend, HidHandle, Result,
};

pub mod abi;
pub mod checksum;
pub mod types;

pub use types::{Report, WeatherIcon, REPORT_LEN};

pub mod consts {
    /// USB Vendor ID
    pub const VENDOR_ID: u16 = 0x1EA7;
    /// Known USB Product IDs
    pub const PRODUCT_IDS: &[u16] = &[0xCED3, 0xCD68, 0xCE81];
    /// HID interface number carrying the screen protocol
    pub const INTERFACE_NUMBER: i32 = 1;
}

/// Static board info for detection
pub static INFO: BoardInfo = BoardInfo {
    name: "Zoom75",
    cli_name: "zoom75",
    vendor_id: consts::VENDOR_ID,
    product_ids: consts::PRODUCT_IDS,
    interface_number: consts::INTERFACE_NUMBER,
};

/// What discovery does when no session could be opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingDevice {
    /// Report [`BoardError::DeviceNotFound`]
    #[default]
    Fail,
    /// Log a warning and carry on with zero sessions
    Continue,
}

/// Device selection and firmware options, passed explicitly into [`discover`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub vendor_id: u16,
    /// Accepted product ids. Empty accepts any product from the vendor.
    pub product_ids: Vec<u16>,
    pub interface_number: i32,
    /// Whether the firmware understands the GPU temperature command
    pub gpu_temp: bool,
    pub on_missing: MissingDevice,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: INFO.vendor_id,
            product_ids: INFO.product_ids.to_vec(),
            interface_number: INFO.interface_number,
            gpu_temp: true,
            on_missing: MissingDevice::Fail,
        }
    }
}

impl DeviceConfig {
    /// Check if an enumerated interface is one we should open
    pub fn matches(&self, device: &DeviceDescriptor) -> bool {
        device.vendor_id == self.vendor_id
            && (self.product_ids.is_empty() || self.product_ids.contains(&device.product_id))
            && device.interface_number == self.interface_number
    }
}

/// List the interfaces matching `config` without opening them
pub fn candidates<B: HidBackend>(
    backend: &mut B,
    config: &DeviceConfig,
) -> Result<Vec<DeviceDescriptor>> {
    Ok(backend
        .enumerate(config.vendor_id)?
        .into_iter()
        .filter(|d| config.matches(d))
        .collect())
}

/// Open every matching interface as a session.
///
/// Interfaces that fail to open are logged and skipped. When nothing could be
/// opened, [`DeviceConfig::on_missing`] decides between an error and an empty list.
pub fn discover<B: HidBackend>(
    backend: &mut B,
    config: &DeviceConfig,
) -> Result<Vec<Zoom75<B::Handle>>> {
    let mut sessions = Vec::new();
    for descriptor in candidates(backend, config)? {
        let path = descriptor.path.to_string_lossy().into_owned();
        debug!(%path, pid = descriptor.product_id, "opening device");
        let opened = backend.open(&descriptor.path).and_then(|mut handle| {
            handle.set_nonblocking()?;
            Ok(handle)
        });
        match opened {
            Ok(handle) => sessions.push(Zoom75::new(handle, path, config.gpu_temp)),
            Err(e) => warn!(%path, "failed to open device: {e}"),
        }
    }

    info!("opened {} device(s)", sessions.len());
    if sessions.is_empty() {
        match config.on_missing {
            MissingDevice::Fail => return Err(BoardError::DeviceNotFound),
            MissingDevice::Continue => warn!("no keyboard found, continuing without one"),
        }
    }
    Ok(sessions)
}

/// High level abstraction for one open Zoom75 screen interface
pub struct Zoom75<H = HidDevice> {
    device: H,
    path: String,
    gpu_temp: bool,
}

impl Zoom75 {
    /// Find and open every connected keyboard matching `config`
    pub fn open_all(config: &DeviceConfig) -> Result<Vec<Self>> {
        let mut api = HidApi::new()?;
        discover(&mut api, config)
    }
}

impl<H: HidHandle> Zoom75<H> {
    /// Wrap an already opened handle
    pub fn new(device: H, path: String, gpu_temp: bool) -> Self {
        Self {
            device,
            path,
            gpu_temp,
        }
    }

    /// Platform path of the underlying interface
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Write one report to the device. Failures are returned, never retried.
    pub fn send(&mut self, report: &Report) -> Result<()> {
        self.device.write(report.as_bytes())?;
        Ok(())
    }

    /// Sync the date and time to the keyboard display.
    pub fn set_time<Tz: TimeZone>(&mut self, time: DateTime<Tz>) -> Result<()> {
        self.send(&abi::datetime(&time))
    }

    /// Update the displayed CPU temperature.
    pub fn set_cpu_temp(&mut self, temp: u8) -> Result<()> {
        self.send(&abi::set_cpu_temp(temp))
    }

    /// Update the displayed GPU temperature.
    ///
    /// Firmware without GPU support ignores this; see [`Board::as_gpu_temp`].
    pub fn set_gpu_temp(&mut self, temp: u8) -> Result<()> {
        self.send(&abi::set_gpu_temp(temp))
    }

    /// Update the displayed fan speed.
    pub fn set_fan_speed(&mut self, rpm: u16) -> Result<()> {
        self.send(&abi::set_fan_speed(rpm))
    }

    /// Update the displayed network throughput.
    pub fn set_net_speed(&mut self, speed: u32) -> Result<()> {
        self.send(&abi::set_net_speed(speed))
    }

    /// Update the weather display.
    pub fn set_weather(&mut self, icon: WeatherIcon, current: u8, high: u8) -> Result<()> {
        self.send(&abi::set_weather(icon, current, high))
    }
}

// === Trait Implementations ===

impl<H: HidHandle> Board for Zoom75<H> {
    fn info(&self) -> &'static BoardInfo {
        &INFO
    }

    fn location(&self) -> &str {
        &self.path
    }

    fn as_time(&mut self) -> Option<&mut dyn HasTime> {
        Some(self)
    }

    fn as_cpu_temp(&mut self) -> Option<&mut dyn HasCpuTemp> {
        Some(self)
    }

    fn as_gpu_temp(&mut self) -> Option<&mut dyn HasGpuTemp> {
        if self.gpu_temp {
            Some(self)
        } else {
            None
        }
    }

    fn as_fan_speed(&mut self) -> Option<&mut dyn HasFanSpeed> {
        Some(self)
    }

    fn as_net_speed(&mut self) -> Option<&mut dyn HasNetSpeed> {
        Some(self)
    }

    fn as_weather(&mut self) -> Option<&mut dyn HasWeather> {
        Some(self)
    }
}

impl<H: HidHandle> HasTime for Zoom75<H> {
    fn set_time(&mut self, time: DateTime<Local>) -> Result<()> {
        Zoom75::set_time(self, time)
    }
}

impl<H: HidHandle> HasCpuTemp for Zoom75<H> {
    fn set_cpu_temp(&mut self, temp: u8) -> Result<()> {
        Zoom75::set_cpu_temp(self, temp)
    }
}

impl<H: HidHandle> HasGpuTemp for Zoom75<H> {
    fn set_gpu_temp(&mut self, temp: u8) -> Result<()> {
        Zoom75::set_gpu_temp(self, temp)
    }
}

impl<H: HidHandle> HasFanSpeed for Zoom75<H> {
    fn set_fan_speed(&mut self, rpm: u16) -> Result<()> {
        Zoom75::set_fan_speed(self, rpm)
    }
}

impl<H: HidHandle> HasNetSpeed for Zoom75<H> {
    fn set_net_speed(&mut self, speed: u32) -> Result<()> {
        Zoom75::set_net_speed(self, speed)
    }
}

impl<H: HidHandle> HasWeather for Zoom75<H> {
    fn set_weather(&mut self, wmo: u8, is_day: bool, current: i16, high: i16) -> Result<()> {
        let icon = WeatherIcon::from_wmo(wmo, is_day)
            .ok_or(BoardError::CommandFailed("unknown WMO code"))?;
        // Clamp to u8 range for this board's protocol
        Zoom75::set_weather(
            self,
            icon,
            current.clamp(0, 255) as u8,
            high.clamp(0, 255) as u8,
        )
    }
}
