//! Topic fan-out: one register snapshot in, one envelope per topic out.
//!
//! Mirrors the device's broadcast burst. The publisher serializes every
//! topic from the same snapshot, so all messages of a burst share a
//! header and any field the burst did not refresh is republished at its
//! last-known value.

use crate::config::DriverConfig;
use crate::error::Result;
use crate::registers::Registers;
use crate::streaming::messages::{
    GpsStatusMessage, Header, ImuMessage, OdometryMessage, SatelliteCountMessage,
    TemperatureMessage, VectorMessage,
};
use crate::streaming::publisher::{Envelope, PublisherHandle};
use crate::streaming::wire::Serializer;
use crate::transform::{self, TelemetryRecord};
use serde::Serialize;

pub const IMU: &str = "imu/data";
pub const MAG: &str = "imu/mag";
pub const RPY: &str = "imu/rpy";
pub const TEMPERATURE: &str = "imu/temperature";
pub const GPS_STATUS: &str = "imu/gps_status";
pub const GPS_ABS: &str = "imu/gps_abs";
pub const GPS_REL: &str = "imu/gps_rel";
pub const GPS_DOP: &str = "imu/gps_dop";
pub const GPS_NUM_SAT: &str = "imu/gps_num_sat";

/// Publishes the telemetry topic set derived from a register snapshot
pub struct TelemetryPublisher {
    handle: PublisherHandle,
    serializer: Serializer,
    frame_id: String,
    gps_enabled: bool,
    odom_topic: Option<String>,
}

impl TelemetryPublisher {
    pub fn new(handle: PublisherHandle, serializer: Serializer, config: &DriverConfig) -> Self {
        TelemetryPublisher {
            handle,
            serializer,
            frame_id: config.device.frame_id.clone(),
            gps_enabled: config.gps.enable,
            odom_topic: config.gps.odom_topic.clone(),
        }
    }

    /// Publish every configured topic from the current snapshot.
    ///
    /// With no connected subscriber this is a no-op; nothing is
    /// serialized.
    pub fn publish(&self, regs: &Registers) -> Result<()> {
        if self.handle.client_count() == 0 {
            return Ok(());
        }

        let header = Header::now(&self.frame_id);
        let record = transform::build_record(regs, self.gps_enabled, self.odom_topic.is_some());

        self.push(IMU, &imu_message(&record, &header))?;
        self.push(
            MAG,
            &VectorMessage {
                header: header.clone(),
                vector: record.magnetic_field,
            },
        )?;
        self.push(
            RPY,
            &VectorMessage {
                header: header.clone(),
                vector: record.euler,
            },
        )?;
        self.push(
            TEMPERATURE,
            &TemperatureMessage {
                header: header.clone(),
                celsius: record.temperature,
            },
        )?;

        if let Some(gps) = &record.gps {
            self.push(
                GPS_STATUS,
                &GpsStatusMessage {
                    header: header.clone(),
                    mode: gps.mode,
                },
            )?;
            self.push(
                GPS_ABS,
                &VectorMessage {
                    header: header.clone(),
                    vector: gps.absolute,
                },
            )?;
            self.push(
                GPS_REL,
                &VectorMessage {
                    header: header.clone(),
                    vector: gps.relative,
                },
            )?;
            self.push(
                GPS_DOP,
                &VectorMessage {
                    header: header.clone(),
                    vector: [gps.hdop, gps.hdop, gps.vdop],
                },
            )?;
            self.push(
                GPS_NUM_SAT,
                &SatelliteCountMessage {
                    header: header.clone(),
                    satellites: gps.satellites,
                },
            )?;
        }

        if let (Some(topic), Some(odom)) = (&self.odom_topic, &record.odometry) {
            self.push(
                topic,
                &OdometryMessage {
                    header,
                    position: odom.position,
                    orientation: [0.0, 0.0, 0.0, 1.0],
                    position_variance: odom.position_variance,
                    unknown_variance: odom.unknown_variance,
                    velocity: odom.velocity,
                },
            )?;
        }

        Ok(())
    }

    fn push<T: Serialize>(&self, topic: &str, message: &T) -> Result<()> {
        let payload = self.serializer.serialize(message)?;
        self.handle.push(Envelope {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

fn imu_message(record: &TelemetryRecord, header: &Header) -> ImuMessage {
    ImuMessage {
        header: header.clone(),
        orientation: record.imu.orientation,
        orientation_covariance: record.imu.orientation_covariance,
        angular_velocity: record.imu.angular_velocity,
        linear_acceleration: record.imu.linear_acceleration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::wire::WireFormat;

    fn drain_topics(handle: &PublisherHandle) -> Vec<String> {
        let mut topics = Vec::new();
        while let Some(envelope) = handle.pop() {
            topics.push(envelope.topic);
        }
        topics
    }

    #[test]
    fn test_no_subscribers_publishes_nothing() {
        let handle = PublisherHandle::detached();
        let publisher = TelemetryPublisher::new(
            handle.clone(),
            Serializer::new(WireFormat::Json),
            &DriverConfig::default(),
        );

        publisher.publish(&Registers::new()).unwrap();
        assert!(drain_topics(&handle).is_empty());
    }

    #[test]
    fn test_imu_topic_set() {
        let handle = PublisherHandle::detached();
        handle.set_client_count(1);
        let publisher = TelemetryPublisher::new(
            handle.clone(),
            Serializer::new(WireFormat::Json),
            &DriverConfig::default(),
        );

        publisher.publish(&Registers::new()).unwrap();
        assert_eq!(drain_topics(&handle), vec![IMU, MAG, RPY, TEMPERATURE]);
    }

    #[test]
    fn test_gps_topic_set_with_odometry() {
        let mut config = DriverConfig::default();
        config.gps.enable = true;
        config.gps.odom_topic = Some("gps/odom".to_string());

        let handle = PublisherHandle::detached();
        handle.set_client_count(1);
        let publisher =
            TelemetryPublisher::new(handle.clone(), Serializer::new(WireFormat::Json), &config);

        publisher.publish(&Registers::new()).unwrap();
        assert_eq!(
            drain_topics(&handle),
            vec![
                IMU,
                MAG,
                RPY,
                TEMPERATURE,
                GPS_STATUS,
                GPS_ABS,
                GPS_REL,
                GPS_DOP,
                GPS_NUM_SAT,
                "gps/odom",
            ]
        );
    }

    #[test]
    fn test_published_message_decodes() {
        let serializer = Serializer::new(WireFormat::Json);
        let handle = PublisherHandle::detached();
        handle.set_client_count(1);
        let publisher =
            TelemetryPublisher::new(handle.clone(), serializer, &DriverConfig::default());

        let mut regs = Registers::new();
        regs.write_raw(crate::registers::UM6_TEMPERATURE, &25.5f32.to_be_bytes());
        publisher.publish(&regs).unwrap();

        let temperature = drain_topics_payloads(&handle)
            .into_iter()
            .find(|(topic, _)| topic == TEMPERATURE)
            .map(|(_, payload)| serializer.deserialize::<TemperatureMessage>(&payload).unwrap())
            .unwrap();
        assert_eq!(temperature.celsius, 25.5);
        assert_eq!(temperature.header.frame_id, "imu_link");
    }

    fn drain_topics_payloads(handle: &PublisherHandle) -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
        while let Some(envelope) = handle.pop() {
            out.push((envelope.topic, envelope.payload));
        }
        out
    }
}
