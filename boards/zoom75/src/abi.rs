//! HID report builders for the Zoom75 screen module.
//!
//! Packet structure (32 bytes):
//! - Byte 0: 0x1C (report id)
//! - Bytes 1-4: Reserved (0)
//! - Byte 5: Frame length (4 + payload length + 1)
//! - Bytes 6-7: CRC16 (little-endian)
//! - Byte 8: 0xA5 (magic identifier)
//! - Byte 9: Command byte
//! - Byte 10: Reserved (0)
//! - Byte 11: Payload length
//! - Bytes 12+: Payload data, multi-byte values big-endian
//! - Final byte: Checksum over the frame before the header is written
//!
//! Every builder is pure. The same arguments always produce the same frame.

use chrono::{DateTime, Datelike, TimeZone, Timelike};

use crate::checksum::{checksum, crc16};
use crate::types::{Report, WeatherIcon, REPORT_LEN};

/// Report id of the screen output report
pub const REPORT_ID: u8 = 0x1C;
/// Sentinel present in every command
pub const MAGIC: u8 = 0xA5;

/// Command identifiers
pub mod cmd {
    /// CPU temperature command
    pub const CPU_TEMP: u8 = 0x37;
    /// GPU temperature command
    pub const GPU_TEMP: u8 = 0x38;
    /// Fan speed command
    pub const FAN_SPEED: u8 = 0x39;
    /// Weather display command
    pub const WEATHER: u8 = 0x3B;
    /// Network throughput command
    pub const NET_SPEED: u8 = 0x3D;
    /// DateTime sync command
    pub const DATETIME: u8 = 0x3F;
}

/// Largest payload that still leaves room for the checksum byte
const MAX_PAYLOAD: usize = REPORT_LEN - 13;

/// Build a 32-byte report with proper framing, checksum and CRC.
///
/// The checksum covers the frame while the report id and length are still
/// zero, and the CRC covers the whole frame with its own slots zero. Reordering
/// these steps produces frames the firmware rejects.
fn build_packet(command: u8, payload: &[u8]) -> Report {
    debug_assert!(payload.len() <= MAX_PAYLOAD);
    let mut packet = [0u8; REPORT_LEN];
    let data_length = payload.len();

    // Magic and command structure
    packet[8] = MAGIC;
    packet[9] = command;
    packet[10] = 0;
    packet[11] = data_length as u8;
    packet[12..12 + data_length].copy_from_slice(payload);

    // Body checksum directly after the payload
    packet[12 + data_length] = checksum(&packet);

    // Report header
    packet[0] = REPORT_ID;
    packet[5] = (4 + data_length + 1) as u8;

    // CRC16 last, little-endian
    let [lo, hi] = crc16(&packet).to_le_bytes();
    packet[6] = lo;
    packet[7] = hi;

    Report(packet)
}

/// Build a datetime sync report.
///
/// Payload structure (10 bytes):
/// - Bytes 0-1: Format flags (0x00, 0x01)
/// - Bytes 2-3: Year (big-endian)
/// - Byte 4: Month (1-12)
/// - Byte 5: Day of month (1-31)
/// - Byte 6: Hours (0-23)
/// - Byte 7: Minutes (0-59)
/// - Byte 8: Seconds (0-59)
/// - Byte 9: Trailing flag (0x01)
pub fn set_time(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Report {
    let [year_hi, year_lo] = year.to_be_bytes();
    let payload = [
        0x00, 0x01, year_hi, year_lo, month, day, hour, minute, second, 0x01,
    ];
    build_packet(cmd::DATETIME, &payload)
}

/// Build a datetime sync report from a timestamp in any timezone.
/// Years outside `0..=65535` saturate to the nearest bound.
pub fn datetime<Tz: TimeZone>(time: &DateTime<Tz>) -> Report {
    set_time(
        time.year().clamp(0, u16::MAX as i32) as u16,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
}

/// Build a CPU temperature report. Payload: `00 00 TT`
pub fn set_cpu_temp(temp: u8) -> Report {
    build_packet(cmd::CPU_TEMP, &[0x00, 0x00, temp])
}

/// Build a GPU temperature report. Payload: `00 00 TT`
pub fn set_gpu_temp(temp: u8) -> Report {
    build_packet(cmd::GPU_TEMP, &[0x00, 0x00, temp])
}

/// Build a fan speed report. Payload: `00` followed by the rpm as a big-endian u16
pub fn set_fan_speed(rpm: u16) -> Report {
    let [hi, lo] = rpm.to_be_bytes();
    build_packet(cmd::FAN_SPEED, &[0x00, hi, lo])
}

/// Build a network throughput report. Payload: `00` followed by bytes/s as a big-endian u32
pub fn set_net_speed(speed: u32) -> Report {
    let mut payload = [0u8; 5];
    payload[1..].copy_from_slice(&speed.to_be_bytes());
    build_packet(cmd::NET_SPEED, &payload)
}

/// Build a weather report.
///
/// Payload structure (4 bytes):
/// - Byte 0: Format byte (0x00)
/// - Byte 1: Weather icon
/// - Byte 2: Current temperature
/// - Byte 3: Daily high temperature
pub fn set_weather(icon: WeatherIcon, current: u8, high: u8) -> Report {
    set_weather_raw(icon as u8, current, high)
}

/// Build a weather report from a raw icon code
pub fn set_weather_raw(code: u8, current: u8, high: u8) -> Report {
    build_packet(cmd::WEATHER, &[0x00, code, current, high])
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::checksum::crc16_range;

    /// Known good set time frame for 2023-10-02 23:20:25
    const KNOWN_GOOD_TIME: [u8; 32] = [
        0x1C, 0x00, 0x00, 0x00, 0x00, 0x0F, 0x37, 0xFE, 0xA5, 0x3F, 0x00, 0x0A, 0x00, 0x01, 0x07,
        0xE7, 0x0A, 0x02, 0x17, 0x14, 0x19, 0x01, 0xD1, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00,
    ];

    fn at(h: u32, m: u32, s: u32) -> DateTime<chrono::Utc> {
        NaiveDate::from_ymd_opt(2023, 10, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
            .and_utc()
    }

    /// Recompute the crc the way the device does, with the crc slots zeroed
    fn recomputed_crc(report: &Report) -> u16 {
        let mut frame = *report.as_bytes();
        frame[6] = 0;
        frame[7] = 0;
        crc16_range(&frame, 0, REPORT_LEN)
    }

    fn head(report: &Report, n: usize) -> &[u8] {
        &report.as_bytes()[..n]
    }

    #[test]
    fn known_good_set_time() {
        let report = set_time(2023, 10, 2, 23, 20, 25);
        assert_eq!(report.as_bytes(), &KNOWN_GOOD_TIME);
        assert_eq!(report.crc(), 0xFE37);
        assert_eq!(report.checksum(), 0xD1);
    }

    #[test]
    fn datetime_matches_fields() {
        assert_eq!(datetime(&at(23, 20, 25)).as_bytes(), &KNOWN_GOOD_TIME);
    }

    #[test]
    fn datetime_saturates_year() {
        let year = |y| {
            NaiveDate::from_ymd_opt(y, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
        };
        assert_eq!(datetime(&year(100_000)), set_time(u16::MAX, 1, 1, 0, 0, 0));
        assert_eq!(datetime(&year(-44)), set_time(0, 1, 1, 0, 0, 0));
        assert_eq!(datetime(&year(2023)), set_time(2023, 1, 1, 0, 0, 0));
    }

    #[test]
    fn set_time_is_deterministic() {
        assert_eq!(datetime(&at(23, 20, 25)), datetime(&at(23, 20, 25)));
    }

    #[test]
    fn set_time_differs_only_in_time_fields() {
        let a = datetime(&at(23, 20, 25));
        let b = datetime(&at(8, 5, 59));
        let differing: Vec<usize> = (0..REPORT_LEN)
            .filter(|&i| a.as_bytes()[i] != b.as_bytes()[i])
            .collect();
        assert!(!differing.is_empty());
        for i in differing {
            // crc, time fields (hour/minute/second) or the checksum
            assert!(matches!(i, 6 | 7 | 18..=20 | 22), "unexpected change at offset {i}");
        }
    }

    #[test]
    fn cpu_temp_report() {
        let report = set_cpu_temp(42);
        assert_eq!(
            head(&report, 16),
            &[
                0x1C, 0x00, 0x00, 0x00, 0x00, 0x08, 0x80, 0x61, 0xA5, 0x37, 0x00, 0x03, 0x00, 0x00,
                0x2A, 0xF6
            ]
        );
        assert_eq!(report.command(), cmd::CPU_TEMP);
        assert_eq!(report.as_bytes()[5], 0x08);
        assert_eq!(report.as_bytes()[14], 42);
        assert_eq!(report.crc(), recomputed_crc(&report));
        assert!(report.as_bytes()[16..].iter().all(|b| *b == 0));
    }

    #[test]
    fn gpu_temp_differs_only_by_command() {
        let report = set_gpu_temp(55);
        assert_eq!(
            head(&report, 16),
            &[
                0x1C, 0x00, 0x00, 0x00, 0x00, 0x08, 0xF0, 0xAA, 0xA5, 0x38, 0x00, 0x03, 0x00, 0x00,
                0x37, 0xE8
            ]
        );
        assert_eq!(set_gpu_temp(42).payload(), set_cpu_temp(42).payload());
        assert_ne!(set_gpu_temp(42).command(), set_cpu_temp(42).command());
    }

    #[test]
    fn fan_speed_report() {
        let report = set_fan_speed(1500);
        assert_eq!(
            head(&report, 16),
            &[
                0x1C, 0x00, 0x00, 0x00, 0x00, 0x08, 0xDE, 0x84, 0xA5, 0x39, 0x00, 0x03, 0x00, 0x05,
                0xDC, 0x3D
            ]
        );
        assert_eq!(report.crc(), recomputed_crc(&report));
    }

    #[test]
    fn net_speed_report() {
        let report = set_net_speed(123_456_789);
        assert_eq!(
            head(&report, 18),
            &[
                0x1C, 0x00, 0x00, 0x00, 0x00, 0x0A, 0x6C, 0x47, 0xA5, 0x3D, 0x00, 0x05, 0x00, 0x07,
                0x5B, 0xCD, 0x15, 0xD4
            ]
        );
        assert_eq!(report.payload_len(), 5);
        assert_eq!(report.crc(), recomputed_crc(&report));
    }

    #[test]
    fn weather_report() {
        let report = set_weather(WeatherIcon::Cloudy, 18, 24);
        assert_eq!(
            head(&report, 17),
            &[
                0x1C, 0x00, 0x00, 0x00, 0x00, 0x09, 0x57, 0x83, 0xA5, 0x3B, 0x00, 0x04, 0x00, 0x05,
                0x12, 0x18, 0xEC
            ]
        );
        assert_eq!(report, set_weather_raw(5, 18, 24));
    }

    #[test]
    fn checksum_byte_in_range() {
        for temp in 0..=u8::MAX {
            assert_ne!(set_cpu_temp(temp).checksum(), 255);
        }
    }
}
