//! Telemetry transforms from raw register values to output samples.
//!
//! The device reports vectors and orientation in NED (north-east-down)
//! body coordinates; all outputs here are ENU (east-north-up): swap the
//! first two components and negate the third. The orientation quaternion
//! arrives as [w, x, y, z] and is emitted as [x, y, z, w] with the same
//! frame change applied.

use crate::registers::{
    Accessor, RegValue, Registers, GPS_HDOP_MASK, GPS_HDOP_START_BIT, GPS_MODE_MASK,
    GPS_MODE_START_BIT, GPS_SAT_COUNT_MASK, GPS_SAT_COUNT_START_BIT, GPS_VDOP_MASK,
    GPS_VDOP_START_BIT,
};

/// Course arrives in hundredths of a degree
const COURSE_SCALE: f64 = 0.0314159265;
/// Speed arrives in centimeters per second
const SPEED_SCALE: f64 = 0.01;
/// Variance for fields the GPS cannot estimate
const UNKNOWN_VARIANCE: f64 = 999_999.0;

/// Orientation plus inertial rates, ENU
#[derive(Debug, Clone, PartialEq)]
pub struct ImuSample {
    /// Unit quaternion as [x, y, z, w]
    pub orientation: [f64; 4],
    /// Row-major 3x3 orientation covariance
    pub orientation_covariance: [f64; 9],
    /// rad/s
    pub angular_velocity: [f64; 3],
    /// m/s^2
    pub linear_acceleration: [f64; 3],
}

/// GPS fix state and position
#[derive(Debug, Clone, PartialEq)]
pub struct GpsSample {
    /// 0 no receiver, 1 no fix, 2 2D fix, 3 3D fix
    pub mode: u8,
    pub satellites: u8,
    pub hdop: f64,
    pub vdop: f64,
    /// Longitude, latitude, altitude as reported
    pub absolute: [f64; 3],
    /// Position relative to the configured home, meters
    pub relative: [f64; 3],
}

/// GPS-derived planar odometry
#[derive(Debug, Clone, PartialEq)]
pub struct OdometrySample {
    /// Absolute position, identity orientation implied
    pub position: [f64; 3],
    /// Variance applied to each position axis
    pub position_variance: f64,
    /// Variance applied to unestimated pose and twist axes
    pub unknown_variance: f64,
    /// Planar velocity decomposed from course and speed, m/s
    pub velocity: [f64; 3],
}

/// Everything derived from one broadcast burst
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub imu: ImuSample,
    /// Magnetic field, ENU, device units
    pub magnetic_field: [f64; 3],
    /// Roll, pitch, yaw in radians, ENU
    pub euler: [f64; 3],
    /// Degrees Celsius
    pub temperature: f64,
    pub gps: Option<GpsSample>,
    pub odometry: Option<OdometrySample>,
}

/// Read a scaled 3-vector in ENU from its NED register order
pub fn ned_to_enu<T: RegValue>(accessor: &Accessor<T>, regs: &Registers) -> [f64; 3] {
    [
        accessor.get_scaled(regs, 1),
        accessor.get_scaled(regs, 0),
        -accessor.get_scaled(regs, 2),
    ]
}

/// Orientation quaternion, device [w, x, y, z] NED to [x, y, z, w] ENU
pub fn orientation_enu(regs: &Registers) -> [f64; 4] {
    [
        Registers::QUAT.get_scaled(regs, 2),
        Registers::QUAT.get_scaled(regs, 1),
        -Registers::QUAT.get_scaled(regs, 3),
        Registers::QUAT.get_scaled(regs, 0),
    ]
}

/// Orientation covariance, taking the attitude block of the device's
/// 4x4 [w, x, y, z] covariance as the output 3x3
pub fn orientation_covariance(regs: &Registers) -> [f64; 9] {
    let pick = [5, 6, 7, 9, 10, 11, 13, 14, 15];
    let mut out = [0.0; 9];
    for (slot, index) in out.iter_mut().zip(pick) {
        *slot = Registers::COVARIANCE.get_scaled(regs, index);
    }
    out
}

pub fn gps_mode(regs: &Registers) -> u8 {
    ((Registers::GPS_STATUS.get(regs, 0) >> GPS_MODE_START_BIT) & GPS_MODE_MASK) as u8
}

pub fn gps_satellites(regs: &Registers) -> u8 {
    ((Registers::GPS_STATUS.get(regs, 0) >> GPS_SAT_COUNT_START_BIT) & GPS_SAT_COUNT_MASK) as u8
}

pub fn gps_hdop(regs: &Registers) -> f64 {
    f64::from((Registers::GPS_STATUS.get(regs, 0) >> GPS_HDOP_START_BIT) & GPS_HDOP_MASK)
}

pub fn gps_vdop(regs: &Registers) -> f64 {
    f64::from((Registers::GPS_STATUS.get(regs, 0) >> GPS_VDOP_START_BIT) & GPS_VDOP_MASK)
}

pub fn imu_sample(regs: &Registers) -> ImuSample {
    ImuSample {
        orientation: orientation_enu(regs),
        orientation_covariance: orientation_covariance(regs),
        angular_velocity: ned_to_enu(&Registers::GYRO, regs),
        linear_acceleration: ned_to_enu(&Registers::ACCEL, regs),
    }
}

pub fn gps_sample(regs: &Registers) -> GpsSample {
    GpsSample {
        mode: gps_mode(regs),
        satellites: gps_satellites(regs),
        hdop: gps_hdop(regs),
        vdop: gps_vdop(regs),
        absolute: [
            Registers::GPS_ABS.get_scaled(regs, 0),
            Registers::GPS_ABS.get_scaled(regs, 1),
            Registers::GPS_ABS.get_scaled(regs, 2),
        ],
        relative: [
            Registers::GPS_REL.get_scaled(regs, 0),
            Registers::GPS_REL.get_scaled(regs, 1),
            Registers::GPS_REL.get_scaled(regs, 2),
        ],
    }
}

/// Planar odometry from the absolute fix plus course and speed.
///
/// Position variance is estimated as the combined dilution of precision;
/// orientation and angular rates are marked unknown.
pub fn odometry_sample(regs: &Registers) -> OdometrySample {
    let hdop = gps_hdop(regs);
    let vdop = gps_vdop(regs);
    let pdop = (hdop * hdop + vdop * vdop).sqrt();

    let course = f64::from(Registers::GPS_COURSE_SPEED.get(regs, 0)) * COURSE_SCALE;
    let speed = f64::from(Registers::GPS_COURSE_SPEED.get(regs, 1)) * SPEED_SCALE;

    OdometrySample {
        position: [
            Registers::GPS_ABS.get_scaled(regs, 0),
            Registers::GPS_ABS.get_scaled(regs, 1),
            Registers::GPS_ABS.get_scaled(regs, 2),
        ],
        position_variance: pdop,
        unknown_variance: UNKNOWN_VARIANCE,
        velocity: [speed * course.cos(), speed * course.sin(), 0.0],
    }
}

/// Derive the full output set from the current register snapshot.
///
/// Every field reflects the latest value the snapshot holds, whether or
/// not this burst refreshed it.
pub fn build_record(regs: &Registers, gps_enabled: bool, odometry: bool) -> TelemetryRecord {
    TelemetryRecord {
        imu: imu_sample(regs),
        magnetic_field: ned_to_enu(&Registers::MAG, regs),
        euler: ned_to_enu(&Registers::EULER, regs),
        temperature: Registers::TEMPERATURE.get_scaled(regs, 0),
        gps: gps_enabled.then(|| gps_sample(regs)),
        odometry: (gps_enabled && odometry).then(|| odometry_sample(regs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{UM6_GPS_COURSE_SPEED, UM6_GPS_LONGITUDE, UM6_GPS_SAT_SUMMARY};

    fn set_vector_raw(accessor: &Accessor<i16>, regs: &mut Registers, raw: [i16; 3]) {
        for (field, value) in raw.into_iter().enumerate() {
            accessor.set(regs, field, value);
        }
    }

    #[test]
    fn test_vector_ned_to_enu() {
        let mut regs = Registers::new();
        set_vector_raw(&Registers::GYRO, &mut regs, [100, 200, 300]);

        let scale = Registers::GYRO.get_scaled(&regs, 0) / 100.0;
        let enu = ned_to_enu(&Registers::GYRO, &regs);
        assert_eq!(enu[0], 200.0 * scale);
        assert_eq!(enu[1], 100.0 * scale);
        assert_eq!(enu[2], -300.0 * scale);
    }

    #[test]
    fn test_identity_orientation_is_frame_invariant() {
        let mut regs = Registers::new();
        Registers::QUAT.set_scaled(&mut regs, 0, 1.0);

        let q = orientation_enu(&regs);
        assert_eq!(q[0], 0.0);
        assert_eq!(q[1], 0.0);
        assert_eq!(q[2], 0.0);
        assert!((q[3] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_orientation_component_order() {
        let mut regs = Registers::new();
        // Device order is [w, x, y, z].
        for (field, raw) in [10000i16, 2000, 3000, 4000].into_iter().enumerate() {
            Registers::QUAT.set(&mut regs, field, raw);
        }

        let q = orientation_enu(&regs);
        assert_eq!(q[0], Registers::QUAT.get_scaled(&regs, 2));
        assert_eq!(q[1], Registers::QUAT.get_scaled(&regs, 1));
        assert_eq!(q[2], -Registers::QUAT.get_scaled(&regs, 3));
        assert_eq!(q[3], Registers::QUAT.get_scaled(&regs, 0));
    }

    #[test]
    fn test_orientation_covariance_block() {
        let mut regs = Registers::new();
        for field in 0..16 {
            Registers::COVARIANCE.set(&mut regs, field, field as f32);
        }

        // Rows and columns for w are dropped.
        let cov = orientation_covariance(&regs);
        assert_eq!(cov, [5.0, 6.0, 7.0, 9.0, 10.0, 11.0, 13.0, 14.0, 15.0]);
    }

    #[test]
    fn test_gps_status_fields() {
        let mut regs = Registers::new();
        let packed = 3u32 | (120 << GPS_HDOP_START_BIT) | (80 << GPS_VDOP_START_BIT)
            | (7 << GPS_SAT_COUNT_START_BIT);
        regs.write_raw(UM6_GPS_SAT_SUMMARY, &packed.to_be_bytes());

        assert_eq!(gps_mode(&regs), 3);
        assert_eq!(gps_satellites(&regs), 7);
        assert_eq!(gps_hdop(&regs), 120.0);
        assert_eq!(gps_vdop(&regs), 80.0);
    }

    #[test]
    fn test_odometry_sample() {
        let mut regs = Registers::new();
        let packed = (30u32 << GPS_HDOP_START_BIT) | (40 << GPS_VDOP_START_BIT);
        regs.write_raw(UM6_GPS_SAT_SUMMARY, &packed.to_be_bytes());
        Registers::GPS_COURSE_SPEED.set(&mut regs, 0, 9000); // 90.00 degrees
        Registers::GPS_COURSE_SPEED.set(&mut regs, 1, 250); // 2.5 m/s
        let mut abs = Vec::new();
        for v in [-80.5f32, 43.4, 320.0] {
            abs.extend_from_slice(&v.to_be_bytes());
        }
        regs.write_raw(UM6_GPS_LONGITUDE, &abs);

        let odom = odometry_sample(&regs);
        assert_eq!(odom.position_variance, 50.0);
        assert_eq!(odom.unknown_variance, 999_999.0);
        assert_eq!(odom.position, [f64::from(-80.5f32), f64::from(43.4f32), 320.0]);

        let course = 9000.0 * COURSE_SCALE;
        assert!((odom.velocity[0] - 2.5 * course.cos()).abs() < 1e-9);
        assert!((odom.velocity[1] - 2.5 * course.sin()).abs() < 1e-9);
        assert_eq!(odom.velocity[2], 0.0);
    }

    #[test]
    fn test_record_gating() {
        let regs = Registers::new();

        let record = build_record(&regs, false, true);
        assert!(record.gps.is_none());
        assert!(record.odometry.is_none());

        let record = build_record(&regs, true, false);
        assert!(record.gps.is_some());
        assert!(record.odometry.is_none());

        let record = build_record(&regs, true, true);
        assert!(record.gps.is_some());
        assert!(record.odometry.is_some());
    }

    #[test]
    fn test_record_reflects_stale_snapshot() {
        let mut regs = Registers::new();
        regs.write_raw(UM6_GPS_COURSE_SPEED, &[0x00, 0x64, 0x00, 0x64]);
        set_vector_raw(&Registers::MAG, &mut regs, [10, 20, 30]);

        // No further magnetometer frames; the record still carries the
        // last-known field.
        let record = build_record(&regs, true, true);
        assert_eq!(record.magnetic_field, ned_to_enu(&Registers::MAG, &regs));
        assert_ne!(record.magnetic_field, [0.0, 0.0, 0.0]);
    }
}
