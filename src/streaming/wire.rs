//! Wire format serialization abstraction.
//!
//! All TCP traffic is length-prefix framed; the payload inside a frame is
//! one message in the configured wire format:
//!
//! - **JSON** (default): human-readable, easy to debug from any client
//! - **Postcard**: compact binary for high-rate telemetry
//!
//! Both ends of a deployment must be configured for the same format.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Binary format using postcard - fast and compact
    Postcard,
    /// JSON format - human-readable for debugging
    #[default]
    Json,
}

/// Serializer that can handle both formats
#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    format: WireFormat,
}

impl Serializer {
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    /// Serialize a message to payload bytes
    pub fn serialize<T: Serialize>(&self, message: &T) -> Result<Vec<u8>> {
        match self.format {
            WireFormat::Postcard => {
                postcard::to_allocvec(message).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::to_vec(message).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Deserialize payload bytes to a message
    pub fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self.format {
            WireFormat::Postcard => {
                postcard::from_bytes(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ResetRequest;

    #[test]
    fn test_json_round_trip() {
        let serializer = Serializer::new(WireFormat::Json);
        let request = ResetRequest {
            zero_gyros: true,
            reset_ekf: false,
            set_mag_ref: true,
            set_accel_ref: false,
        };
        let bytes = serializer.serialize(&request).unwrap();
        let decoded: ResetRequest = serializer.deserialize(&bytes).unwrap();
        assert!(decoded.zero_gyros);
        assert!(!decoded.reset_ekf);
        assert!(decoded.set_mag_ref);
    }

    #[test]
    fn test_postcard_round_trip() {
        let serializer = Serializer::new(WireFormat::Postcard);
        let request = ResetRequest {
            zero_gyros: false,
            reset_ekf: true,
            set_mag_ref: false,
            set_accel_ref: true,
        };
        let bytes = serializer.serialize(&request).unwrap();
        let decoded: ResetRequest = serializer.deserialize(&bytes).unwrap();
        assert!(decoded.reset_ekf);
        assert!(decoded.set_accel_ref);
    }

    #[test]
    fn test_format_from_config_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: WireFormat,
        }
        let w: Wrapper = toml::from_str(r#"format = "postcard""#).unwrap();
        assert_eq!(w.format, WireFormat::Postcard);
        let w: Wrapper = toml::from_str(r#"format = "json""#).unwrap();
        assert_eq!(w.format, WireFormat::Json);
    }
}
