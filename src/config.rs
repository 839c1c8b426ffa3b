use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::thresholds::ThresholdSet;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ParcelwatchConfig {
    pub device: DeviceConfig,
    pub sensors: SensorConfig,
    pub thresholds: ThresholdConfig,
    pub schedule: ScheduleConfig,
    pub remote: RemoteConfig,
    pub alerts: AlertConfig,
    pub network: NetworkConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    /// Prefix for the generated device name (prefix + last 6 MAC hex digits)
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Hardware MAC address, with or without separators
    #[serde(default = "default_mac_address")]
    pub mac_address: String,

    /// Firmware version reported in the device record
    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,

    /// mDNS hostname advertised for local access
    #[serde(default = "default_mdns_hostname")]
    pub mdns_hostname: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SensorConfig {
    /// Minimum interval between temperature/humidity hardware reads
    #[serde(default = "default_climate_min_interval_ms")]
    pub climate_min_interval_ms: u64,

    /// Whether a temperature/humidity sensor is fitted
    #[serde(default = "default_true")]
    pub climate_enabled: bool,

    /// Whether an inertial motion sensor is fitted
    #[serde(default = "default_true")]
    pub motion_enabled: bool,

    /// Scenario driving the simulated sensor drivers
    #[serde(default = "default_scenario")]
    pub scenario: String,
}

/// Compiled-in alert thresholds, used wherever the remote override is silent
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ThresholdConfig {
    #[serde(default = "default_temp_min")]
    pub temp_min: f32,
    #[serde(default = "default_temp_max")]
    pub temp_max: f32,
    #[serde(default = "default_humidity_min")]
    pub humidity_min: f32,
    #[serde(default = "default_humidity_max")]
    pub humidity_max: f32,
    /// Allowed deviation from standard gravity in m/s²
    #[serde(default = "default_vibration")]
    pub vibration: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_upload_interval_ms")]
    pub upload_interval_ms: u64,
    #[serde(default = "default_liveness_interval_ms")]
    pub liveness_interval_ms: u64,
    #[serde(default = "default_assignment_interval_ms")]
    pub assignment_interval_ms: u64,
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    /// Sleep between scheduler loop iterations
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteTransport {
    Http,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_transport")]
    pub transport: RemoteTransport,

    /// Database root URL, e.g. https://project-id.firebaseio.com
    #[serde(default)]
    pub database_url: String,

    /// Collection holding one subtree per device
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Database secret or ID token appended as ?auth=
    #[serde(default)]
    pub auth_token: String,

    /// Upper bound on every remote call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Mirror the registration record onto the device root path as well
    #[serde(default = "default_true")]
    pub mirror_to_device_root: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResendPolicy {
    /// Re-emit a persistent condition on every evaluation cycle
    EveryCycle,
    /// Re-emit a persistent condition at most once per interval
    MinInterval,
    /// Emit only when a condition starts firing
    EdgeTriggered,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlertConfig {
    #[serde(default = "default_resend_policy")]
    pub resend_policy: ResendPolicy,

    /// Used by the min_interval policy
    #[serde(default = "default_min_resend_interval_ms")]
    pub min_resend_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    /// Whether the network link starts connected
    #[serde(default = "default_true")]
    pub connected: bool,

    #[serde(default = "default_ssid")]
    pub ssid: String,

    #[serde(default = "default_ip_address")]
    pub ip_address: String,

    #[serde(default = "default_rssi")]
    pub rssi: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Stop the scheduler after this many seconds (runs until signalled when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_for_seconds: Option<u64>,
}

impl ParcelwatchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("parcelwatch.toml")
    }

    /// Default configuration rendered as TOML
    pub fn default_toml() -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Keep all remote state in memory; the remote connection settings are
    /// then unused and no longer validated
    pub fn force_offline(&mut self) {
        self.remote.transport = RemoteTransport::Memory;
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("device.name_prefix", default_name_prefix())?
            .set_default("device.mac_address", default_mac_address())?
            .set_default("device.firmware_version", default_firmware_version())?
            .set_default("device.mdns_hostname", default_mdns_hostname())?
            .set_default(
                "sensors.climate_min_interval_ms",
                default_climate_min_interval_ms(),
            )?
            .set_default("sensors.climate_enabled", true)?
            .set_default("sensors.motion_enabled", true)?
            .set_default("sensors.scenario", default_scenario())?
            .set_default("thresholds.temp_min", default_temp_min() as f64)?
            .set_default("thresholds.temp_max", default_temp_max() as f64)?
            .set_default("thresholds.humidity_min", default_humidity_min() as f64)?
            .set_default("thresholds.humidity_max", default_humidity_max() as f64)?
            .set_default("thresholds.vibration", default_vibration() as f64)?
            .set_default("schedule.sample_interval_ms", default_sample_interval_ms())?
            .set_default("schedule.upload_interval_ms", default_upload_interval_ms())?
            .set_default(
                "schedule.liveness_interval_ms",
                default_liveness_interval_ms(),
            )?
            .set_default(
                "schedule.assignment_interval_ms",
                default_assignment_interval_ms(),
            )?
            .set_default("schedule.report_interval_ms", default_report_interval_ms())?
            .set_default("schedule.poll_interval_ms", default_poll_interval_ms())?
            .set_default("remote.transport", "http")?
            .set_default("remote.database_url", "")?
            .set_default("remote.base_path", default_base_path())?
            .set_default("remote.auth_token", "")?
            .set_default("remote.timeout_ms", default_timeout_ms())?
            .set_default("remote.mirror_to_device_root", true)?
            .set_default("alerts.resend_policy", "every_cycle")?
            .set_default(
                "alerts.min_resend_interval_ms",
                default_min_resend_interval_ms(),
            )?
            .set_default("network.connected", true)?
            .set_default("network.ssid", default_ssid())?
            .set_default("network.ip_address", default_ip_address())?
            .set_default("network.rssi", default_rssi() as i64)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // PARCELWATCH_REMOTE__DATABASE_URL=... style overrides
            .add_source(
                Environment::with_prefix("PARCELWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ParcelwatchConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if crate::device::normalize_mac(&self.device.mac_address).is_none() {
            return Err(ConfigError::Message(format!(
                "Device mac_address '{}' must contain exactly 12 hex digits",
                self.device.mac_address
            )));
        }

        if self.sensors.climate_min_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Sensor climate_min_interval_ms must be greater than 0".to_string(),
            ));
        }

        if let Err(e) = self.sensors.scenario.parse::<crate::sensors::Scenario>() {
            return Err(ConfigError::Message(format!("Sensor {}", e)));
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("temp_min", t.temp_min),
            ("temp_max", t.temp_max),
            ("humidity_min", t.humidity_min),
            ("humidity_max", t.humidity_max),
            ("vibration", t.vibration),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Message(format!(
                    "Threshold {} must be a finite number",
                    name
                )));
            }
        }
        if t.temp_min >= t.temp_max {
            return Err(ConfigError::Message(
                "Threshold temp_min must be below temp_max".to_string(),
            ));
        }
        if t.humidity_min >= t.humidity_max {
            return Err(ConfigError::Message(
                "Threshold humidity_min must be below humidity_max".to_string(),
            ));
        }
        if !(t.vibration > 0.0) {
            return Err(ConfigError::Message(
                "Threshold vibration must be greater than 0".to_string(),
            ));
        }

        let s = &self.schedule;
        for (name, value) in [
            ("sample_interval_ms", s.sample_interval_ms),
            ("upload_interval_ms", s.upload_interval_ms),
            ("liveness_interval_ms", s.liveness_interval_ms),
            ("assignment_interval_ms", s.assignment_interval_ms),
            ("report_interval_ms", s.report_interval_ms),
            ("poll_interval_ms", s.poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Message(format!(
                    "Schedule {} must be greater than 0",
                    name
                )));
            }
        }

        if self.remote.transport == RemoteTransport::Http
            && self.remote.database_url.trim().is_empty()
        {
            return Err(ConfigError::Message(
                "Remote database_url is required for the http transport".to_string(),
            ));
        }

        if self.remote.base_path.trim_matches('/').is_empty() {
            return Err(ConfigError::Message(
                "Remote base_path must not be empty".to_string(),
            ));
        }

        if self.remote.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Remote timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.alerts.resend_policy == ResendPolicy::MinInterval
            && self.alerts.min_resend_interval_ms == 0
        {
            return Err(ConfigError::Message(
                "Alert min_resend_interval_ms must be greater than 0 for min_interval".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl ThresholdConfig {
    /// Threshold set substituted for absent or malformed override fields
    pub fn defaults(&self) -> ThresholdSet {
        ThresholdSet {
            temp_min: self.temp_min,
            temp_max: self.temp_max,
            humid_min: self.humidity_min,
            humid_max: self.humidity_max,
            vibration: self.vibration,
        }
    }
}

impl Default for ParcelwatchConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                name_prefix: default_name_prefix(),
                mac_address: default_mac_address(),
                firmware_version: default_firmware_version(),
                mdns_hostname: default_mdns_hostname(),
            },
            sensors: SensorConfig {
                climate_min_interval_ms: default_climate_min_interval_ms(),
                climate_enabled: true,
                motion_enabled: true,
                scenario: default_scenario(),
            },
            thresholds: ThresholdConfig {
                temp_min: default_temp_min(),
                temp_max: default_temp_max(),
                humidity_min: default_humidity_min(),
                humidity_max: default_humidity_max(),
                vibration: default_vibration(),
            },
            schedule: ScheduleConfig {
                sample_interval_ms: default_sample_interval_ms(),
                upload_interval_ms: default_upload_interval_ms(),
                liveness_interval_ms: default_liveness_interval_ms(),
                assignment_interval_ms: default_assignment_interval_ms(),
                report_interval_ms: default_report_interval_ms(),
                poll_interval_ms: default_poll_interval_ms(),
            },
            remote: RemoteConfig {
                transport: default_transport(),
                database_url: String::new(),
                base_path: default_base_path(),
                auth_token: String::new(),
                timeout_ms: default_timeout_ms(),
                mirror_to_device_root: true,
            },
            alerts: AlertConfig {
                resend_policy: default_resend_policy(),
                min_resend_interval_ms: default_min_resend_interval_ms(),
            },
            network: NetworkConfig {
                connected: true,
                ssid: default_ssid(),
                ip_address: default_ip_address(),
                rssi: default_rssi(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                run_for_seconds: None,
            },
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_name_prefix() -> String {
    "TRACEON_".to_string()
}
fn default_mac_address() -> String {
    "24:6F:28:00:00:01".to_string()
}
fn default_firmware_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_mdns_hostname() -> String {
    "traceon".to_string()
}

fn default_climate_min_interval_ms() -> u64 {
    2000
} // DHT11 hardware limit
fn default_scenario() -> String {
    "calm".to_string()
}

fn default_temp_min() -> f32 {
    5.0
}
fn default_temp_max() -> f32 {
    40.0
}
fn default_humidity_min() -> f32 {
    20.0
}
fn default_humidity_max() -> f32 {
    80.0
}
fn default_vibration() -> f32 {
    15.0
}

fn default_sample_interval_ms() -> u64 {
    2000
}
fn default_upload_interval_ms() -> u64 {
    2000
}
fn default_liveness_interval_ms() -> u64 {
    30_000
}
fn default_assignment_interval_ms() -> u64 {
    30_000
}
fn default_report_interval_ms() -> u64 {
    60_000
}
fn default_poll_interval_ms() -> u64 {
    10
}

fn default_transport() -> RemoteTransport {
    RemoteTransport::Http
}
fn default_base_path() -> String {
    "SmartParcels".to_string()
}
fn default_timeout_ms() -> u64 {
    10_000
}

fn default_resend_policy() -> ResendPolicy {
    ResendPolicy::EveryCycle
}
fn default_min_resend_interval_ms() -> u64 {
    60_000
}

fn default_ssid() -> String {
    "parcelwatch-dev".to_string()
}
fn default_ip_address() -> String {
    "127.0.0.1".to_string()
}
fn default_rssi() -> i32 {
    -60
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn memory_config() -> ParcelwatchConfig {
        let mut config = ParcelwatchConfig::default();
        config.remote.transport = RemoteTransport::Memory;
        config
    }

    #[test]
    fn test_default_config() {
        let config = memory_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.temp_min, 5.0);
        assert_eq!(config.thresholds.vibration, 15.0);
        assert_eq!(config.sensors.climate_min_interval_ms, 2000);
        assert_eq!(config.alerts.resend_policy, ResendPolicy::EveryCycle);
    }

    #[test]
    fn test_http_transport_requires_database_url() {
        let mut config = ParcelwatchConfig::default();
        assert!(config.validate().is_err());

        config.remote.database_url = "https://example.firebaseio.com".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_offline_default_config_validates() {
        let mut config = ParcelwatchConfig::default();
        assert!(config.validate().is_err());

        config.force_offline();
        assert_eq!(config.remote.transport, RemoteTransport::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_finite_thresholds_rejected() {
        let mut config = memory_config();

        config.thresholds.temp_max = f32::NAN;
        assert!(config.validate().is_err());
        config.thresholds.temp_max = 40.0;

        config.thresholds.vibration = f32::INFINITY;
        assert!(config.validate().is_err());
        config.thresholds.vibration = 15.0;

        config.thresholds.humidity_min = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_toml_matches_defaults() {
        let text = ParcelwatchConfig::default_toml().unwrap();
        assert!(text.contains("[remote]"));
        assert!(!text.contains("run_for_seconds"));

        let parsed: ParcelwatchConfig = toml::from_str(&text).unwrap();
        let defaults = ParcelwatchConfig::default();
        assert_eq!(parsed.device.mac_address, defaults.device.mac_address);
        assert_eq!(parsed.thresholds.vibration, defaults.thresholds.vibration);
        assert_eq!(parsed.schedule.liveness_interval_ms, 30_000);
        assert_eq!(parsed.remote.transport, RemoteTransport::Http);
        assert_eq!(parsed.alerts.resend_policy, ResendPolicy::EveryCycle);
        assert!(parsed.system.run_for_seconds.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = memory_config();

        config.thresholds.temp_min = 50.0;
        assert!(config.validate().is_err());
        config.thresholds.temp_min = 5.0;

        config.thresholds.vibration = 0.0;
        assert!(config.validate().is_err());
        config.thresholds.vibration = 15.0;

        config.schedule.upload_interval_ms = 0;
        assert!(config.validate().is_err());
        config.schedule.upload_interval_ms = 2000;

        config.device.mac_address = "not-a-mac".to_string();
        assert!(config.validate().is_err());
        config.device.mac_address = "AABBCCDDEEFF".to_string();

        config.sensors.scenario = "tornado".to_string();
        assert!(config.validate().is_err());
        config.sensors.scenario = "upside-down".to_string();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[remote]
transport = "memory"
base_path = "Fleet"

[thresholds]
temp_max = 30.0

[alerts]
resend_policy = "edge_triggered"
"#
        )
        .unwrap();

        let config = ParcelwatchConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.remote.transport, RemoteTransport::Memory);
        assert_eq!(config.remote.base_path, "Fleet");
        assert_eq!(config.thresholds.temp_max, 30.0);
        assert_eq!(config.thresholds.temp_min, 5.0);
        assert_eq!(config.alerts.resend_policy, ResendPolicy::EdgeTriggered);
        assert_eq!(config.schedule.liveness_interval_ms, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ParcelwatchConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.remote.base_path, "SmartParcels");
        assert_eq!(config.schedule.sample_interval_ms, 2000);
        assert!(config.system.run_for_seconds.is_none());
    }

    #[test]
    fn test_threshold_config_defaults() {
        let config = memory_config();
        let set = config.thresholds.defaults();
        assert_eq!(set, ThresholdSet::default());
    }
}
