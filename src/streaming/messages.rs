//! Message types published on the telemetry topics and exchanged on the
//! reset endpoint.
//!
//! All vectors and orientations are ENU; angles are radians. Every
//! outbound message carries a [`Header`] stamping the burst it came from.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Common message header
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Header {
    /// Microseconds since the Unix epoch
    pub timestamp: u64,
    /// Coordinate frame the data is expressed in
    pub frame_id: String,
}

impl Header {
    pub fn now(frame_id: &str) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Header {
            timestamp,
            frame_id: frame_id.to_string(),
        }
    }
}

/// Orientation and inertial rates, published on `imu/data`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImuMessage {
    pub header: Header,
    /// Unit quaternion as [x, y, z, w]
    pub orientation: [f64; 4],
    /// Row-major 3x3 orientation covariance
    pub orientation_covariance: [f64; 9],
    /// rad/s
    pub angular_velocity: [f64; 3],
    /// m/s^2
    pub linear_acceleration: [f64; 3],
}

/// A stamped 3-vector, published on `imu/mag`, `imu/rpy`, `imu/gps_abs`,
/// `imu/gps_rel`, and `imu/gps_dop`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VectorMessage {
    pub header: Header,
    pub vector: [f64; 3],
}

/// Board temperature, published on `imu/temperature`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TemperatureMessage {
    pub header: Header,
    /// Degrees Celsius
    pub celsius: f64,
}

/// GPS fix state, published on `imu/gps_status`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GpsStatusMessage {
    pub header: Header,
    /// 0 no receiver, 1 no fix, 2 2D fix, 3 3D fix
    pub mode: u8,
}

/// Visible satellite count, published on `imu/gps_num_sat`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SatelliteCountMessage {
    pub header: Header,
    pub satellites: u8,
}

/// GPS-derived planar odometry, published on the configured topic
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OdometryMessage {
    pub header: Header,
    /// Absolute position as reported by the receiver
    pub position: [f64; 3],
    /// Identity; the GPS carries no attitude
    pub orientation: [f64; 4],
    /// Variance applied to each position axis
    pub position_variance: f64,
    /// Variance applied to unestimated pose and twist axes
    pub unknown_variance: f64,
    /// Planar velocity from course and speed, m/s
    pub velocity: [f64; 3],
}

/// Reply to a [`crate::dispatch::ResetRequest`]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ResetResponse {
    /// Every requested command was acknowledged
    pub ok: bool,
}
