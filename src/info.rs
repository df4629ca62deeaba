//! Utilities for getting system info

use std::sync::LazyLock;
use std::time::Instant;

use either::Either;
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::{Device, Nvml};
use sysinfo::{Component, Components, Networks};
use tracing::warn;

use crate::config::{GpuSource, SensorConfig};

/// One point in time capture of every reading sent to the keyboards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub cpu_temp: u8,
    /// `None` when no gpu temperature is available
    pub gpu_temp: Option<u8>,
    pub fan_rpm: u16,
    /// Received bytes per second
    pub net_speed: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("no temperature sensor matches module {module:?} label {label:?} (available: {available})")]
    NotFound {
        module: String,
        label: String,
        available: String,
    },
    #[error("sensor module {module:?} label {label:?} is ambiguous, matched: {matched}")]
    Ambiguous {
        module: String,
        label: String,
        matched: String,
    },
    #[error("sensor {0:?} stopped reporting a temperature")]
    Unavailable(String),
}

/// Source of telemetry for the update loop
pub trait TelemetrySource {
    fn snapshot(&mut self) -> Result<TelemetrySnapshot, SensorError>;
}

/// Find the index of the one component label matching a module and sensor label.
///
/// Component labels look like `"{module} {label}"`, e.g. `"coretemp Package id 0"` or
/// `"k10temp Tctl"`. An exact label wins; otherwise the label may be a substring of the
/// sensor label, as long as only one sensor in the module matches.
pub fn find_sensor<'a>(
    labels: impl IntoIterator<Item = &'a str>,
    module: &str,
    label: &str,
) -> Result<usize, SensorError> {
    let labels: Vec<&str> = labels.into_iter().collect();
    let in_module: Vec<(usize, &str)> = labels
        .iter()
        .enumerate()
        .filter_map(|(i, l)| {
            l.strip_prefix(module)
                .and_then(|rest| rest.strip_prefix(' '))
                .map(|rest| (i, rest))
        })
        .collect();

    let exact: Vec<usize> = in_module
        .iter()
        .filter(|(_, rest)| *rest == label)
        .map(|(i, _)| *i)
        .collect();
    let matched = if exact.is_empty() {
        in_module
            .iter()
            .filter(|(_, rest)| rest.contains(label))
            .map(|(i, _)| *i)
            .collect()
    } else {
        exact
    };

    match matched.as_slice() {
        [index] => Ok(*index),
        [] => Err(SensorError::NotFound {
            module: module.into(),
            label: label.into(),
            available: labels.join(", "),
        }),
        many => Err(SensorError::Ambiguous {
            module: module.into(),
            label: label.into(),
            matched: many
                .iter()
                .map(|i| labels[*i])
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Labels of every temperature sensor on this machine
pub fn sensor_labels() -> Vec<String> {
    Components::new_with_refreshed_list()
        .list()
        .iter()
        .map(|c| c.label().to_string())
        .collect()
}

/// Convert a celsius reading to the unit shown on the screen, saturating into a byte
pub fn display_temp(celsius: f32, fahrenheit: bool) -> u8 {
    let temp = if fahrenheit {
        celsius * 9. / 5. + 32.
    } else {
        celsius
    };
    temp as u8
}

/// A single hardware temperature sensor
pub struct SensorTemp {
    component: Component,
}

impl SensorTemp {
    /// Look up the sensor, requiring exactly one match
    pub fn new(module: &str, label: &str) -> Result<Self, SensorError> {
        let mut comps: Vec<Component> = Components::new_with_refreshed_list().into();
        let index = find_sensor(comps.iter().map(|c| c.label()), module, label)?;
        Ok(Self {
            component: comps.swap_remove(index),
        })
    }

    /// Refresh and poll the current temperature in celsius
    pub fn read(&mut self) -> Result<f32, SensorError> {
        self.component.refresh();
        self.component
            .temperature()
            .ok_or_else(|| SensorError::Unavailable(self.component.label().into()))
    }
}

/// Helper struct to track nvidia gpu temperature
pub struct GpuTemp {
    maybe_device: Option<Device<'static>>,
}

impl GpuTemp {
    /// Construct a new gpu temperature monitor, selecting by device index
    pub fn new(index: u32) -> Self {
        static NVML: LazyLock<Option<Nvml>> = LazyLock::new(|| {
            let nvml = Nvml::init().ok();
            if nvml.is_none() {
                warn!("nvml not found (nvidia gpu temp unavailable)");
            }
            nvml
        });

        let maybe_device = NVML.as_ref().and_then(|nvml| {
            let device = nvml.device_by_index(index).ok();
            if device.is_none() {
                warn!("gpu device {index} not found")
            }
            device
        });

        Self { maybe_device }
    }

    /// Poll the current temperature in celsius
    pub fn get_temp(&self) -> Option<f32> {
        self.maybe_device
            .as_ref()
            .and_then(|d| d.temperature(TemperatureSensor::Gpu).ok())
            .map(|v| v as f32)
    }
}

/// Receive throughput summed over every interface
pub struct NetSpeed {
    networks: Networks,
    last: Instant,
}

impl NetSpeed {
    fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            last: Instant::now(),
        }
    }

    /// Bytes per second received since the previous call
    pub fn bytes_per_sec(&mut self) -> u32 {
        self.networks.refresh(true);
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.last = now;

        let received: u64 = self.networks.list().values().map(|n| n.received()).sum();
        if elapsed > 0. {
            (received as f64 / elapsed) as u32
        } else {
            0
        }
    }
}

/// Telemetry read from the host's sensors
pub struct SystemTelemetry {
    cpu: Either<SensorTemp, u8>,
    gpu: Option<Either<GpuTemp, SensorTemp>>,
    net: Option<NetSpeed>,
    fahrenheit: bool,
}

impl SystemTelemetry {
    /// Resolve every configured sensor. A sensor that can't be resolved is fatal.
    ///
    /// A manual cpu temperature replaces the cpu sensor entirely.
    pub fn new(
        sensors: &SensorConfig,
        manual_cpu: Option<u8>,
        net: bool,
        fahrenheit: bool,
    ) -> Result<Self, SensorError> {
        let cpu = match manual_cpu {
            Some(temp) => Either::Right(temp),
            None => Either::Left(SensorTemp::new(&sensors.cpu_module, &sensors.cpu_label)?),
        };
        let gpu = match &sensors.gpu {
            GpuSource::Off => None,
            GpuSource::Nvml { index } => Some(Either::Left(GpuTemp::new(*index))),
            GpuSource::Sensor { module, label } => {
                Some(Either::Right(SensorTemp::new(module, label)?))
            },
        };
        Ok(Self {
            cpu,
            gpu,
            net: net.then(NetSpeed::new),
            fahrenheit,
        })
    }
}

impl TelemetrySource for SystemTelemetry {
    fn snapshot(&mut self) -> Result<TelemetrySnapshot, SensorError> {
        let fahrenheit = self.fahrenheit;
        let cpu_temp = match &mut self.cpu {
            Either::Left(sensor) => display_temp(sensor.read()?, fahrenheit),
            Either::Right(manual) => *manual,
        };

        let gpu_temp = match &mut self.gpu {
            None => None,
            Some(Either::Left(nvml)) => nvml.get_temp().map(|t| display_temp(t, fahrenheit)),
            Some(Either::Right(sensor)) => Some(display_temp(sensor.read()?, fahrenheit)),
        };

        let net_speed = self.net.as_mut().map_or(0, NetSpeed::bytes_per_sec);

        Ok(TelemetrySnapshot {
            cpu_temp,
            gpu_temp,
            // no portable fan rpm source, the command is still wired
            fan_rpm: 0,
            net_speed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELS: &[&str] = &[
        "coretemp Package id 0",
        "coretemp Core 0",
        "coretemp Core 1",
        "nvme Composite",
        "amdgpu edge",
    ];

    #[test]
    fn exact_sensor_match() {
        assert_eq!(find_sensor(LABELS.iter().copied(), "coretemp", "Package id 0").unwrap(), 0);
        assert_eq!(find_sensor(LABELS.iter().copied(), "amdgpu", "edge").unwrap(), 4);
    }

    #[test]
    fn partial_sensor_match() {
        assert_eq!(find_sensor(LABELS.iter().copied(), "coretemp", "Package").unwrap(), 0);
        assert_eq!(find_sensor(LABELS.iter().copied(), "nvme", "Comp").unwrap(), 3);
    }

    #[test]
    fn ambiguous_sensor() {
        let err = find_sensor(LABELS.iter().copied(), "coretemp", "Core").unwrap_err();
        assert!(matches!(err, SensorError::Ambiguous { .. }), "{err}");
        assert!(err.to_string().contains("coretemp Core 1"));
    }

    #[test]
    fn missing_sensor() {
        let err = find_sensor(LABELS.iter().copied(), "k10temp", "Tctl").unwrap_err();
        assert!(matches!(err, SensorError::NotFound { .. }));
        assert!(err.to_string().contains("nvme Composite"));

        // module must match as a whole word
        assert!(find_sensor(LABELS.iter().copied(), "core", "Package").is_err());
        assert!(find_sensor(Vec::<&str>::new(), "coretemp", "Package").is_err());
    }

    #[test]
    fn display_conversion() {
        assert_eq!(display_temp(42.7, false), 42);
        assert_eq!(display_temp(100., true), 212);
        assert_eq!(display_temp(-5., false), 0);
        assert_eq!(display_temp(300., false), 255);
    }
}
