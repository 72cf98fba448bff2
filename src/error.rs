//! Error types for the UM6 driver.

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Driver error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Invalid configuration value, rejected before any device interaction
    #[error("Configuration error: {0}")]
    Config(String),

    /// Communication timeout
    #[error("Communication timeout")]
    Timeout,

    /// Invalid packet or response
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Checksum mismatch on an inbound packet
    #[error("Checksum error: computed {computed:#06x}, transmitted {transmitted:#06x}")]
    Checksum {
        /// Checksum computed over the received bytes
        computed: u16,
        /// Checksum carried in the packet
        transmitted: u16,
    },

    /// Device did not acknowledge a register write or command
    #[error("No acknowledgment for register {0:#04x}")]
    NoAck(u8),

    /// Wire serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
