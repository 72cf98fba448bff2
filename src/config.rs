//! Daemon configuration.
//!
//! Loaded from a TOML file. Every field carries a default so a minimal
//! file still yields a runnable configuration; `validate()` performs the
//! checks that must reject bad input before any device interaction.

use crate::configure::baud_code;
use crate::error::Result;
use crate::streaming::wire::WireFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level driver configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub gps: GpsConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial device configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Serial port path
    #[serde(default = "default_port")]
    pub port: String,
    /// Host serial baud rate; also written to the device's sensor-output
    /// baud field during configuration
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Frame identifier stamped on every outbound message
    #[serde(default = "default_frame_id")]
    pub frame_id: String,
}

/// GPS configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GpsConfig {
    /// Enable the five GPS broadcast channels
    #[serde(default)]
    pub enable: bool,
    /// Baud rate of the GPS receiver attached to the device
    #[serde(default = "default_gps_baud")]
    pub baud: u32,
    /// GPS home position, written only when GPS is enabled
    #[serde(default)]
    pub home: Option<Vector3Param>,
    /// Topic name for the derived GPS odometry output; absent disables it
    #[serde(default)]
    pub odom_topic: Option<String>,
}

/// Onboard estimator options
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    /// Feed magnetometer measurements to the onboard EKF
    #[serde(default = "default_true")]
    pub mag_updates: bool,
    /// Feed accelerometer measurements to the onboard EKF
    #[serde(default = "default_true")]
    pub accel_updates: bool,
    /// Zero the gyros once during startup configuration
    #[serde(default = "default_true")]
    pub zero_gyros: bool,
}

/// Optional reference and bias vectors written during configuration.
/// An absent vector is silently skipped.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CalibrationConfig {
    #[serde(default)]
    pub mag_ref: Option<Vector3Param>,
    #[serde(default)]
    pub accel_ref: Option<Vector3Param>,
    #[serde(default)]
    pub mag_bias: Option<Vector3Param>,
    #[serde(default)]
    pub accel_bias: Option<Vector3Param>,
    #[serde(default)]
    pub gyro_bias: Option<Vector3Param>,
}

/// TCP streaming configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// TCP bind address for outbound telemetry topics
    #[serde(default = "default_pub_address")]
    pub pub_address: String,
    /// TCP bind address for the reset request/response endpoint
    #[serde(default = "default_cmd_address")]
    pub cmd_address: String,
    /// Wire format for all framed messages
    #[serde(default)]
    pub format: WireFormat,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// A configurable 3-component vector
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Vector3Param {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3Param {
    pub fn components(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl DriverConfig {
    /// Load configuration from a TOML file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: DriverConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configuration values the device cannot accept.
    ///
    /// Runs before the serial port is ever opened, so a misconfiguration
    /// never reaches the configuration sequence.
    pub fn validate(&self) -> Result<()> {
        baud_code(self.device.baud)?;
        baud_code(self.gps.baud)?;
        Ok(())
    }
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud() -> u32 {
    115_200
}

fn default_frame_id() -> String {
    "imu_link".to_string()
}

fn default_gps_baud() -> u32 {
    9600
}

fn default_true() -> bool {
    true
}

fn default_pub_address() -> String {
    "0.0.0.0:5555".to_string()
}

fn default_cmd_address() -> String {
    "0.0.0.0:5556".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: default_baud(),
            frame_id: default_frame_id(),
        }
    }
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            enable: false,
            baud: default_gps_baud(),
            home: None,
            odom_topic: None,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mag_updates: true,
            accel_updates: true,
            zero_gyros: true,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            pub_address: default_pub_address(),
            cmd_address: default_cmd_address(),
            format: WireFormat::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.device.port, "/dev/ttyUSB0");
        assert_eq!(config.device.baud, 115_200);
        assert_eq!(config.device.frame_id, "imu_link");
        assert!(!config.gps.enable);
        assert_eq!(config.gps.baud, 9600);
        assert!(config.filter.mag_updates);
        assert!(config.filter.accel_updates);
        assert!(config.filter.zero_gyros);
        assert!(config.calibration.mag_ref.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[device]
port = "/dev/ttyS1"
baud = 57600

[gps]
enable = true
odom_topic = "gps/odom"

[gps.home]
x = 43.4
y = -80.5
z = 320.0

[filter]
mag_updates = false

[calibration.mag_ref]
x = 0.2
y = 0.0
z = 0.4
"#;
        let config: DriverConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.device.port, "/dev/ttyS1");
        assert_eq!(config.device.baud, 57600);
        assert!(config.gps.enable);
        assert_eq!(config.gps.odom_topic.as_deref(), Some("gps/odom"));
        assert_eq!(
            config.gps.home.unwrap().components(),
            [43.4, -80.5, 320.0]
        );
        assert!(!config.filter.mag_updates);
        assert!(config.filter.accel_updates);
        assert_eq!(config.calibration.mag_ref.unwrap().y, 0.0);
        assert!(config.calibration.gyro_bias.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_baud_rejected() {
        let mut config = DriverConfig::default();
        config.device.baud = 921_600;
        assert!(config.validate().is_err());

        let mut config = DriverConfig::default();
        config.gps.baud = 4800;
        assert!(config.validate().is_err());
    }
}
