//! Core traits and types for zoom75-sync board abstraction.
//!
//! This crate provides:
//! - Feature traits (`HasTime`, `HasCpuTemp`, etc.) that boards can implement
//! - The `Board` trait with `as_*()` methods for feature discovery
//! - The narrow HID seam (`HidHandle`, `HidBackend`) sessions are written against

mod board;
mod features;
mod hid;

pub use board::{Board, BoardInfo};
pub use features::{
    BoardError, HasCpuTemp, HasFanSpeed, HasGpuTemp, HasNetSpeed, HasTime, HasWeather, Result,
};
pub use hid::{DeviceDescriptor, HidBackend, HidHandle};
