//! TCP streaming surface: outbound telemetry topics and the inbound
//! reset endpoint.

pub mod command_server;
pub mod messages;
pub mod publisher;
pub mod topics;
pub mod wire;

pub use command_server::CommandServer;
pub use publisher::{PublisherHandle, TcpPublisher};
pub use topics::TelemetryPublisher;
pub use wire::{Serializer, WireFormat};
