//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `vehiclelink.toml` in the working directory. Every field has a
//! default so the file is optional. Environment variables take precedence
//! over file values.

use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;
use vehiclelink_app::services::connection_manager::GattProfile;
use vehiclelink_app::services::orchestrator::OrchestratorSettings;
use vehiclelink_app::services::peripheral_profile::ProfileSettings;
use vehiclelink_domain::uuids;
use vehiclelink_domain::vehicle::{Temperature, VehicleCommand};

/// Name of the optional configuration file.
pub const CONFIG_FILE: &str = "vehiclelink.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub central: CentralConfig,
    pub peripheral: PeripheralConfig,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Central role settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CentralConfig {
    /// Bound on connect plus discovery. Absent waits indefinitely.
    pub connect_timeout_secs: Option<u64>,
    pub command_interval_ms: u64,
    pub speed: u8,
    pub direction: u8,
    /// Service an advertisement must carry to be considered.
    pub target_service: Uuid,
}

/// Peripheral role settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    pub device_name: String,
    pub sensor_interval_secs: u64,
    /// Degrees Celsius.
    pub initial_temperature: f32,
    /// Degrees Celsius added per sensor tick.
    pub temperature_step: f32,
    pub battery_level: u8,
    /// Attribute slots available to the attribute store.
    pub attribute_capacity: usize,
}

impl Config {
    /// Load configuration from `vehiclelink.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting values are invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file(CONFIG_FILE)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("VEHICLELINK_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(secs) = var("VEHICLELINK_CONNECT_TIMEOUT_SECS").and_then(|val| val.parse().ok()) {
            self.central.connect_timeout_secs = Some(secs);
        }
        if let Some(val) = var("VEHICLELINK_DEVICE_NAME") {
            self.peripheral.device_name = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.central.command_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "command_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.central.connect_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "connect_timeout_secs must be non-zero when set".to_string(),
            ));
        }
        if self.peripheral.sensor_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "sensor_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.peripheral.device_name.is_empty() {
            return Err(ConfigError::Validation("device_name must not be empty".to_string()));
        }
        if self.peripheral.battery_level > 100 {
            return Err(ConfigError::Validation(
                "battery_level is a percentage".to_string(),
            ));
        }
        if !self.peripheral.initial_temperature.is_finite()
            || !self.peripheral.temperature_step.is_finite()
        {
            return Err(ConfigError::Validation(
                "temperatures must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

impl CentralConfig {
    #[must_use]
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            target_service: self.target_service,
            profile: GattProfile::vehicle_sensor(),
            command: VehicleCommand {
                speed: self.speed,
                direction: self.direction,
            },
            command_interval: Duration::from_millis(self.command_interval_ms),
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
        }
    }
}

impl PeripheralConfig {
    #[must_use]
    pub fn profile_settings(&self) -> ProfileSettings {
        ProfileSettings {
            device_name: self.device_name.clone(),
            initial_temperature: Temperature::from_celsius(self.initial_temperature),
            battery_level: self.battery_level,
            ..ProfileSettings::default()
        }
    }

    #[must_use]
    pub fn sensor_interval(&self) -> Duration {
        Duration::from_secs(self.sensor_interval_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "vehiclelink=info".to_string(),
        }
    }
}

impl Default for CentralConfig {
    fn default() -> Self {
        let command = VehicleCommand::default();
        Self {
            connect_timeout_secs: None,
            command_interval_ms: 1000,
            speed: command.speed,
            direction: command.direction,
            target_service: uuids::SENSOR_SERVICE,
        }
    }
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            device_name: "Sample3".to_string(),
            sensor_interval_secs: 5,
            initial_temperature: 23.4,
            temperature_step: 1.3,
            battery_level: 94,
            attribute_capacity: vehiclelink_app::services::attribute_store::DEFAULT_ATTRIBUTE_CAPACITY,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
