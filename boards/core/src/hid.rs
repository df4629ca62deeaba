//! The HID surface boards are written against.
//!
//! Sessions only ever need to write whole reports and switch the handle to
//! non-blocking mode, so that is all [`HidHandle`] exposes. Enumeration sits
//! behind [`HidBackend`]. Both are implemented for hidapi and can be faked in
//! tests.

use std::ffi::{CStr, CString};

use hidapi::{HidApi, HidDevice};

use crate::Result;

/// Identity of one enumerated HID interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub path: CString,
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface_number: i32,
}

/// Write side of an open HID interface
pub trait HidHandle: Send {
    /// Write one output report, returning the number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;
    /// Make subsequent writes return instead of waiting on the device
    fn set_nonblocking(&mut self) -> Result<()>;
}

/// OS level enumeration and opening of HID interfaces
pub trait HidBackend {
    type Handle: HidHandle;

    /// List every interface exposed by devices from the given vendor
    fn enumerate(&mut self, vendor_id: u16) -> Result<Vec<DeviceDescriptor>>;

    /// Open a previously enumerated interface
    fn open(&mut self, path: &CStr) -> Result<Self::Handle>;
}

impl HidHandle for HidDevice {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(HidDevice::write(self, data)?)
    }

    fn set_nonblocking(&mut self) -> Result<()> {
        Ok(self.set_blocking_mode(false)?)
    }
}

impl HidBackend for HidApi {
    type Handle = HidDevice;

    fn enumerate(&mut self, vendor_id: u16) -> Result<Vec<DeviceDescriptor>> {
        self.refresh_devices()?;
        Ok(self
            .device_list()
            .filter(|d| d.vendor_id() == vendor_id)
            .map(|d| DeviceDescriptor {
                path: d.path().to_owned(),
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
                interface_number: d.interface_number(),
            })
            .collect())
    }

    fn open(&mut self, path: &CStr) -> Result<HidDevice> {
        Ok(self.open_path(path)?)
    }
}
