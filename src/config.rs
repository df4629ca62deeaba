//! Configuration file handling

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use zoom75::{DeviceConfig, MissingDevice};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub refresh: RefreshConfig,
    pub device: DeviceSection,
    pub sensors: SensorConfig,
    pub features: FeatureConfig,
    pub weather: WeatherConfig,
}

impl Config {
    /// Get the config file path for this platform
    pub fn path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "zoom75-sync").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load config from an explicit path, or from the platform path (created with defaults
    /// if it doesn't exist yet)
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        match path {
            Some(path) => Self::read(path),
            None => Self::load_or_create(),
        }
    }

    /// Load config from file, or create default if it doesn't exist
    pub fn load_or_create() -> Result<Self, Box<dyn Error>> {
        let path = Self::path().ok_or("could not determine config directory")?;

        if path.exists() {
            Self::read(&path)
        } else {
            let config = Config::default();
            config.save_with_header(&path)?;
            tracing::info!("created default config at {}", path.display());
            Ok(config)
        }
    }

    fn read(path: &Path) -> Result<Self, Box<dyn Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {e}", path.display()))?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save config with header comments for new files
    pub fn save_with_header(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let header = r#"# zoom75-sync configuration file
# https://github.com/ozwaldorf/zoom-sync

"#;
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, format!("{header}{contents}"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Use fahrenheit instead of celsius for fetched temperatures
    pub fahrenheit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// System info refresh interval
    #[serde(with = "humantime_serde")]
    pub system: Duration,
    /// Weather refresh interval
    #[serde(with = "humantime_serde")]
    pub weather: Duration,
    /// Longest a single weather fetch may take before it is abandoned
    #[serde(with = "humantime_serde")]
    pub weather_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            system: Duration::from_secs(1),
            weather: Duration::from_secs(60 * 60),
            weather_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// USB vendor id
    pub vendor_id: u16,
    /// Accepted USB product ids, empty to accept any
    pub product_ids: Vec<u16>,
    /// HID interface carrying the screen protocol
    pub interface_number: i32,
    /// Firmware supports the gpu temperature command
    pub gpu_temp: bool,
    /// Keep running when no keyboard is connected
    pub allow_missing: bool,
}

impl Default for DeviceSection {
    fn default() -> Self {
        let device = DeviceConfig::default();
        Self {
            vendor_id: device.vendor_id,
            product_ids: device.product_ids,
            interface_number: device.interface_number,
            gpu_temp: device.gpu_temp,
            allow_missing: true,
        }
    }
}

impl DeviceSection {
    /// Device selection for discovery, with an explicit missing device policy
    pub fn device_config(&self, on_missing: MissingDevice) -> DeviceConfig {
        DeviceConfig {
            vendor_id: self.vendor_id,
            product_ids: self.product_ids.clone(),
            interface_number: self.interface_number,
            gpu_temp: self.gpu_temp,
            on_missing,
        }
    }

    /// Missing device policy for keep-alive mode
    pub fn keep_alive_policy(&self) -> MissingDevice {
        if self.allow_missing {
            MissingDevice::Continue
        } else {
            MissingDevice::Fail
        }
    }
}

/// Where the gpu temperature comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum GpuSource {
    /// Don't read or send the gpu temperature
    Off,
    /// NVIDIA device index, read through nvml
    Nvml { index: u32 },
    /// Hardware sensor, looked up like the cpu sensor
    Sensor { module: String, label: String },
}

impl Default for GpuSource {
    fn default() -> Self {
        Self::Nvml { index: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Sensor module (hwmon driver name) providing the cpu temperature
    pub cpu_module: String,
    /// Sensor label within the module
    pub cpu_label: String,
    pub gpu: GpuSource,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            cpu_module: "coretemp".into(),
            cpu_label: "Package id 0".into(),
            gpu: GpuSource::default(),
        }
    }
}

/// Reports that are wired up but off unless asked for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Send fan speed every cycle
    pub fan: bool,
    /// Send network throughput every cycle
    pub net: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Enable weather updates
    pub enabled: bool,
    /// Manual latitude (optional)
    pub latitude: Option<f64>,
    /// Manual longitude (optional)
    pub longitude: Option<f64>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            latitude: None,
            longitude: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(toml::from_str::<Config>(&text).unwrap(), config);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [refresh]
            system = "2s"

            [sensors]
            cpu_module = "k10temp"
            cpu_label = "Tctl"
            gpu = { source = "sensor", module = "amdgpu", label = "edge" }

            [features]
            net = true
            "#,
        )
        .unwrap();
        assert_eq!(config.refresh.system, Duration::from_secs(2));
        assert_eq!(config.refresh.weather, Duration::from_secs(3600));
        assert_eq!(config.refresh.weather_timeout, Duration::from_secs(10));
        assert_eq!(config.sensors.cpu_module, "k10temp");
        assert_eq!(
            config.sensors.gpu,
            GpuSource::Sensor {
                module: "amdgpu".into(),
                label: "edge".into()
            }
        );
        assert!(config.features.net);
        assert!(!config.features.fan);
        assert_eq!(config.device, DeviceSection::default());
    }

    #[test]
    fn device_defaults_match_board() {
        let section = DeviceSection::default();
        assert_eq!(section.vendor_id, 0x1EA7);
        assert_eq!(section.interface_number, 1);
        assert_eq!(section.keep_alive_policy(), MissingDevice::Continue);

        let device = section.device_config(MissingDevice::Fail);
        assert_eq!(device.product_ids, zoom75::consts::PRODUCT_IDS);
        assert_eq!(device.on_missing, MissingDevice::Fail);
    }

    #[test]
    fn gpu_off() {
        let config: Config = toml::from_str("[sensors.gpu]\nsource = \"off\"\n").unwrap();
        assert_eq!(config.sensors.gpu, GpuSource::Off);
    }

    #[test]
    fn save_and_load() {
        let dir = std::env::temp_dir().join(format!("zoom75-sync-test-{}", std::process::id()));
        let path = dir.join("config.toml");
        let mut config = Config::default();
        config.general.fahrenheit = true;
        config.save_with_header(&path).unwrap();
        assert_eq!(Config::load(Some(path.as_path())).unwrap(), config);
        fs::remove_dir_all(dir).unwrap();
    }
}
