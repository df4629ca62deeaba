//! Type definitions for the Zoom75 screen protocol.

use std::fmt::Debug;

/// Size of every output report in bytes
pub const REPORT_LEN: usize = 32;

/// One complete output report, ready to be written to the device.
///
/// Reports are only produced by the builders in [`crate::abi`], so the
/// checksum and crc are always consistent with the rest of the frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Report(pub(crate) [u8; REPORT_LEN]);

impl Report {
    /// Raw frame bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; REPORT_LEN] {
        &self.0
    }

    /// Command identifier at offset 9
    #[inline]
    pub fn command(&self) -> u8 {
        self.0[9]
    }

    /// Number of payload bytes, as declared at offset 11
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.0[11] as usize
    }

    /// Payload bytes, starting at offset 12
    pub fn payload(&self) -> &[u8] {
        &self.0[12..12 + self.payload_len()]
    }

    /// Body checksum byte directly after the payload
    pub fn checksum(&self) -> u8 {
        self.0[12 + self.payload_len()]
    }

    /// Frame crc stored little-endian at offsets 6-7
    #[inline]
    pub fn crc(&self) -> u16 {
        u16::from_le_bytes([self.0[6], self.0[7]])
    }
}

impl AsRef<[u8]> for Report {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Report({:02X?})", &self.0[..])
    }
}

/// Weather icons shown on the screen module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WeatherIcon {
    DayClear = 0,
    DayPartlyCloudy = 1,
    DayPartlyRainy = 2,
    NightPartlyCloudy = 3,
    NightClear = 4,
    Cloudy = 5,
    Rainy = 6,
    Snowfall = 7,
    Thunderstorm = 8,
}

impl WeatherIcon {
    /// Convert a WMO index into a weather icon, adapting for day and night
    /// Adapted from the list at the bottom of <https://open-meteo.com/en/docs>
    pub fn from_wmo(wmo: u8, is_day: bool) -> Option<Self> {
        match wmo {
            // clear and mainly clear
            0 | 1 => Some(if is_day { Self::DayClear } else { Self::NightClear }),

            // partly cloudy
            2 => Some(if is_day {
                Self::DayPartlyCloudy
            } else {
                Self::NightPartlyCloudy
            }),

            // overcast and foggy
            3 | 45 | 48 => Some(Self::Cloudy),

            // drizzle, freezing drizzle, rain, freezing rain
            51 | 53 | 55 | 56 | 57 | 61 | 63 | 65 | 66 | 67 => Some(Self::Rainy),

            // rain showers
            80..=82 => Some(if is_day { Self::DayPartlyRainy } else { Self::Rainy }),

            // snowfall and snow showers
            71 | 73 | 75 | 77 | 85 | 86 => Some(Self::Snowfall),

            // thunderstorm
            95 | 96 | 99 => Some(Self::Thunderstorm),

            _ => None,
        }
    }
}
