//! Startup configuration sequence.
//!
//! Runs once per established connection, writing every configured value to
//! the device in a fixed order. Each write blocks on the device's
//! acknowledgment; the first failed acknowledgment aborts the remainder of
//! the sequence and fails the connection attempt.

use crate::comms::RegisterClient;
use crate::config::{DriverConfig, Vector3Param};
use crate::error::{Error, Result};
use crate::registers::{self, Accessor, RegValue, Registers, UM6_ZERO_GYROS};

/// Map a baud rate to the 3-bit code the communication register expects
pub fn baud_code(baud: u32) -> Result<u32> {
    match baud {
        9600 => Ok(0),
        14400 => Ok(1),
        19200 => Ok(2),
        38400 => Ok(3),
        57600 => Ok(4),
        115_200 => Ok(5),
        _ => Err(Error::Config(format!("unsupported baud rate: {}", baud))),
    }
}

/// Compute the UM6_COMMUNICATION register value for this configuration.
///
/// Always enables the broadcast channels the telemetry engine consumes;
/// the five GPS channels are gated on `gps.enable`.
pub fn communication_value(config: &DriverConfig) -> Result<u32> {
    let mut value = registers::COM_BROADCAST_ENABLED
        | registers::COM_GYROS_PROC_ENABLED
        | registers::COM_ACCELS_PROC_ENABLED
        | registers::COM_MAG_PROC_ENABLED
        | registers::COM_QUAT_ENABLED
        | registers::COM_EULER_ENABLED
        | registers::COM_COV_ENABLED
        | registers::COM_TEMPERATURE_ENABLED;

    value |= baud_code(config.device.baud)? << registers::COM_BAUD_START_BIT;
    value |= baud_code(config.gps.baud)? << registers::COM_GPS_BAUD_START_BIT;

    if config.gps.enable {
        value |= registers::COM_GPS_POSITION_ENABLED
            | registers::COM_GPS_REL_POSITION_ENABLED
            | registers::COM_GPS_COURSE_SPEED_ENABLED
            | registers::COM_GPS_SAT_SUMMARY_ENABLED
            | registers::COM_GPS_SAT_DATA_ENABLED;
    }

    Ok(value)
}

/// Compute the UM6_MISC_CONFIG register value for this configuration.
/// Quaternion estimation is always on; EKF measurement inputs follow the
/// filter section.
pub fn misc_config_value(config: &DriverConfig) -> u32 {
    let mut value = registers::MISC_QUAT_ESTIMATE_ENABLED;
    if config.filter.mag_updates {
        value |= registers::MISC_MAG_UPDATE_ENABLED;
    } else {
        log::warn!("Excluding magnetometer updates from EKF");
    }
    if config.filter.accel_updates {
        value |= registers::MISC_ACCEL_UPDATE_ENABLED;
    } else {
        log::warn!("Excluding accelerometer updates from EKF");
    }
    value
}

/// Write one u32 configuration register and wait for its acknowledgment
fn configure_register(
    client: &mut dyn RegisterClient,
    accessor: Accessor<u32>,
    value: u32,
    label: &str,
) -> Result<()> {
    log::info!("Configuring {} register: {:#010x}", label, value);
    let mut scratch = Registers::new();
    accessor.set(&mut scratch, 0, value);
    client.write_and_await_ack(
        accessor.index,
        scratch.register_bytes(accessor.index, accessor.num_registers()),
    )
}

/// Write a 3-component calibrated vector and wait for its acknowledgment
fn configure_vector3<T: RegValue>(
    client: &mut dyn RegisterClient,
    accessor: Accessor<T>,
    vector: &Vector3Param,
    label: &str,
) -> Result<()> {
    log::info!(
        "Configuring {}: [{}, {}, {}]",
        label,
        vector.x,
        vector.y,
        vector.z
    );
    let mut scratch = Registers::new();
    for (field, component) in vector.components().iter().enumerate() {
        accessor.set_scaled(&mut scratch, field, *component);
    }
    client.write_and_await_ack(
        accessor.index,
        scratch.register_bytes(accessor.index, accessor.num_registers()),
    )
}

/// Run the full startup configuration sequence.
///
/// Order is fixed: communication register, misc config, gyro zeroing,
/// the optional calibration vectors, then the GPS home position. Absent
/// optional values are skipped without a device write.
pub fn configure_device(client: &mut dyn RegisterClient, config: &DriverConfig) -> Result<()> {
    configure_register(
        client,
        Registers::COMMUNICATION,
        communication_value(config)?,
        "communication",
    )?;
    configure_register(
        client,
        Registers::MISC_CONFIG,
        misc_config_value(config),
        "misc",
    )?;

    if config.filter.zero_gyros {
        client.send_command(UM6_ZERO_GYROS, "zero gyroscopes")?;
    }

    let cal = &config.calibration;
    if let Some(v) = &cal.mag_ref {
        configure_vector3(client, Registers::MAG_REF, v, "magnetic reference vector")?;
    }
    if let Some(v) = &cal.accel_ref {
        configure_vector3(client, Registers::ACCEL_REF, v, "accelerometer reference vector")?;
    }
    if let Some(v) = &cal.mag_bias {
        configure_vector3(client, Registers::MAG_BIAS, v, "magnetometer bias")?;
    }
    if let Some(v) = &cal.accel_bias {
        configure_vector3(client, Registers::ACCEL_BIAS, v, "accelerometer bias")?;
    }
    if let Some(v) = &cal.gyro_bias {
        configure_vector3(client, Registers::GYRO_BIAS, v, "gyroscope bias")?;
    }

    if config.gps.enable {
        if let Some(home) = &config.gps.home {
            configure_vector3(client, Registers::GPS_HOME, home, "GPS home position")?;
        }
    }

    log::info!("Device configuration complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{
        UM6_ACCEL_BIAS_XY, UM6_ACCEL_REF_X, UM6_COMMUNICATION, UM6_GPS_HOME_LAT, UM6_GYRO_BIAS_XY,
        UM6_MAG_BIAS_XY, UM6_MAG_REF_X, UM6_MISC_CONFIG,
    };
    use crate::support::MockClient;

    fn vec3(x: f64, y: f64, z: f64) -> Vector3Param {
        Vector3Param { x, y, z }
    }

    #[test]
    fn test_baud_code_mapping() {
        assert_eq!(baud_code(9600).unwrap(), 0);
        assert_eq!(baud_code(14400).unwrap(), 1);
        assert_eq!(baud_code(19200).unwrap(), 2);
        assert_eq!(baud_code(38400).unwrap(), 3);
        assert_eq!(baud_code(57600).unwrap(), 4);
        assert_eq!(baud_code(115_200).unwrap(), 5);
        assert!(baud_code(4800).is_err());
        assert!(baud_code(921_600).is_err());
    }

    #[test]
    fn test_communication_value_bits() {
        let mut config = DriverConfig::default();
        let value = communication_value(&config).unwrap();
        assert_ne!(value & registers::COM_BROADCAST_ENABLED, 0);
        assert_ne!(value & registers::COM_TEMPERATURE_ENABLED, 0);
        assert_eq!(value & registers::COM_GPS_POSITION_ENABLED, 0);
        // 115200 host baud, 9600 GPS baud
        assert_eq!((value >> registers::COM_BAUD_START_BIT) & 0x07, 5);
        assert_eq!((value >> registers::COM_GPS_BAUD_START_BIT) & 0x07, 0);

        config.gps.enable = true;
        config.gps.baud = 57600;
        let value = communication_value(&config).unwrap();
        assert_ne!(value & registers::COM_GPS_POSITION_ENABLED, 0);
        assert_ne!(value & registers::COM_GPS_SAT_DATA_ENABLED, 0);
        assert_eq!((value >> registers::COM_GPS_BAUD_START_BIT) & 0x07, 4);
    }

    #[test]
    fn test_misc_config_value_bits() {
        let mut config = DriverConfig::default();
        let value = misc_config_value(&config);
        assert_ne!(value & registers::MISC_QUAT_ESTIMATE_ENABLED, 0);
        assert_ne!(value & registers::MISC_MAG_UPDATE_ENABLED, 0);
        assert_ne!(value & registers::MISC_ACCEL_UPDATE_ENABLED, 0);

        config.filter.mag_updates = false;
        config.filter.accel_updates = false;
        let value = misc_config_value(&config);
        assert_ne!(value & registers::MISC_QUAT_ESTIMATE_ENABLED, 0);
        assert_eq!(value & registers::MISC_MAG_UPDATE_ENABLED, 0);
        assert_eq!(value & registers::MISC_ACCEL_UPDATE_ENABLED, 0);
    }

    #[test]
    fn test_minimal_sequence() {
        let mut config = DriverConfig::default();
        config.filter.zero_gyros = false;

        let mut client = MockClient::new();
        configure_device(&mut client, &config).unwrap();

        let addresses: Vec<u8> = client.ops.iter().map(|(a, _)| *a).collect();
        assert_eq!(addresses, vec![UM6_COMMUNICATION, UM6_MISC_CONFIG]);
        // The communication payload carries the computed register value.
        let expected = communication_value(&config).unwrap();
        assert_eq!(client.ops[0].1, expected.to_be_bytes().to_vec());
        // Command writes carry no data; register writes always do.
        assert_eq!(client.ops[1].1.len(), 4);
    }

    #[test]
    fn test_full_sequence_order() {
        let mut config = DriverConfig::default();
        config.gps.enable = true;
        config.gps.home = Some(vec3(43.4, -80.5, 320.0));
        config.calibration.mag_ref = Some(vec3(0.2, 0.0, 0.4));
        config.calibration.accel_ref = Some(vec3(0.0, 0.0, -1.0));
        config.calibration.mag_bias = Some(vec3(0.01, 0.02, 0.03));
        config.calibration.accel_bias = Some(vec3(0.001, 0.002, 0.003));
        config.calibration.gyro_bias = Some(vec3(0.0001, 0.0002, 0.0003));

        let mut client = MockClient::new();
        configure_device(&mut client, &config).unwrap();

        let addresses: Vec<u8> = client.ops.iter().map(|(a, _)| *a).collect();
        assert_eq!(
            addresses,
            vec![
                UM6_COMMUNICATION,
                UM6_MISC_CONFIG,
                UM6_ZERO_GYROS,
                UM6_MAG_REF_X,
                UM6_ACCEL_REF_X,
                UM6_MAG_BIAS_XY,
                UM6_ACCEL_BIAS_XY,
                UM6_GYRO_BIAS_XY,
                UM6_GPS_HOME_LAT,
            ]
        );
        // Zero gyros is a bare command.
        assert!(client.ops[2].1.is_empty());
        // Float vectors span three registers, int16 vectors two.
        assert_eq!(client.ops[3].1.len(), 12);
        assert_eq!(client.ops[5].1.len(), 8);
    }

    #[test]
    fn test_home_skipped_when_gps_disabled() {
        let mut config = DriverConfig::default();
        config.filter.zero_gyros = false;
        config.gps.enable = false;
        config.gps.home = Some(vec3(43.4, -80.5, 320.0));

        let mut client = MockClient::new();
        configure_device(&mut client, &config).unwrap();
        assert!(client
            .ops
            .iter()
            .all(|(a, _)| *a != UM6_GPS_HOME_LAT));
    }

    #[test]
    fn test_aborts_on_first_failed_ack() {
        let config = DriverConfig::default();

        // Third operation (zero gyros) fails; nothing after it runs.
        let mut client = MockClient::new();
        client.fail_from = Some(2);
        match configure_device(&mut client, &config) {
            Err(Error::NoAck(address)) => assert_eq!(address, UM6_ZERO_GYROS),
            other => panic!("expected NoAck, got {:?}", other),
        }
        assert_eq!(client.ops.len(), 3);
    }
}
