//! UM6 register map and snapshot.
//!
//! The device exposes a flat 8-bit address space split into configuration
//! registers, broadcast data registers, and command registers. Each
//! register is nominally one 32-bit word, big-endian on the wire; XYZ
//! vectors are stored as int16 pairs packed across consecutive registers,
//! other quantities as float32 or packed bitfields.
//!
//! [`Accessor`] views take care of the byte-order and scale-factor
//! transforms so driver logic reads calibrated values directly.

use std::marker::PhantomData;

pub const CONFIG_REG_START: u8 = 0x00;
pub const DATA_REG_START: u8 = 0x55;
pub const COMMAND_START: u8 = 0xAA;
const COMMAND_COUNT: usize = 10;

/// Number of 32-bit registers tracked in the snapshot
pub const NUM_REGISTERS: usize = COMMAND_START as usize + COMMAND_COUNT;

// Configuration registers
pub const UM6_COMMUNICATION: u8 = CONFIG_REG_START;
pub const UM6_MISC_CONFIG: u8 = CONFIG_REG_START + 1;
pub const UM6_MAG_REF_X: u8 = CONFIG_REG_START + 2;
pub const UM6_ACCEL_REF_X: u8 = CONFIG_REG_START + 5;
pub const UM6_MAG_BIAS_XY: u8 = CONFIG_REG_START + 8;
pub const UM6_ACCEL_BIAS_XY: u8 = CONFIG_REG_START + 10;
pub const UM6_GYRO_BIAS_XY: u8 = CONFIG_REG_START + 12;
pub const UM6_GPS_HOME_LAT: u8 = CONFIG_REG_START + 40;

// Data registers
pub const UM6_GYRO_PROC_XY: u8 = DATA_REG_START + 7;
pub const UM6_ACCEL_PROC_XY: u8 = DATA_REG_START + 9;
pub const UM6_MAG_PROC_XY: u8 = DATA_REG_START + 11;
pub const UM6_EULER_PHI_THETA: u8 = DATA_REG_START + 13;
pub const UM6_QUAT_AB: u8 = DATA_REG_START + 15;
pub const UM6_ERROR_COV_00: u8 = DATA_REG_START + 17;
pub const UM6_TEMPERATURE: u8 = DATA_REG_START + 33;
pub const UM6_GPS_LONGITUDE: u8 = DATA_REG_START + 34;
pub const UM6_GPS_POSITION_N: u8 = DATA_REG_START + 37;
pub const UM6_GPS_COURSE_SPEED: u8 = DATA_REG_START + 40;
pub const UM6_GPS_SAT_SUMMARY: u8 = DATA_REG_START + 41;

// Command registers (written with no data)
pub const UM6_ZERO_GYROS: u8 = COMMAND_START + 2;
pub const UM6_RESET_EKF: u8 = COMMAND_START + 3;
pub const UM6_SET_ACCEL_REF: u8 = COMMAND_START + 5;
pub const UM6_SET_MAG_REF: u8 = COMMAND_START + 6;

// UM6_COMMUNICATION bit assignments
pub const COM_BROADCAST_ENABLED: u32 = 1 << 30;
pub const COM_GYROS_PROC_ENABLED: u32 = 1 << 26;
pub const COM_ACCELS_PROC_ENABLED: u32 = 1 << 25;
pub const COM_MAG_PROC_ENABLED: u32 = 1 << 24;
pub const COM_QUAT_ENABLED: u32 = 1 << 23;
pub const COM_EULER_ENABLED: u32 = 1 << 22;
pub const COM_COV_ENABLED: u32 = 1 << 21;
pub const COM_TEMPERATURE_ENABLED: u32 = 1 << 20;
pub const COM_GPS_POSITION_ENABLED: u32 = 1 << 19;
pub const COM_GPS_REL_POSITION_ENABLED: u32 = 1 << 18;
pub const COM_GPS_COURSE_SPEED_ENABLED: u32 = 1 << 17;
pub const COM_GPS_SAT_SUMMARY_ENABLED: u32 = 1 << 16;
pub const COM_GPS_SAT_DATA_ENABLED: u32 = 1 << 15;
/// Sensor-output baud code, 3 bits
pub const COM_BAUD_START_BIT: u32 = 8;
/// GPS receiver baud code, 3 bits
pub const COM_GPS_BAUD_START_BIT: u32 = 11;

// UM6_MISC_CONFIG bit assignments
pub const MISC_MAG_UPDATE_ENABLED: u32 = 1 << 31;
pub const MISC_ACCEL_UPDATE_ENABLED: u32 = 1 << 30;
pub const MISC_QUAT_ESTIMATE_ENABLED: u32 = 1 << 28;

// UM6_GPS_SAT_SUMMARY bitfields
pub const GPS_MODE_START_BIT: u32 = 0;
pub const GPS_MODE_MASK: u32 = 0x03;
pub const GPS_HDOP_START_BIT: u32 = 2;
pub const GPS_HDOP_MASK: u32 = 0x3FF;
pub const GPS_VDOP_START_BIT: u32 = 12;
pub const GPS_VDOP_MASK: u32 = 0x3FF;
pub const GPS_SAT_COUNT_START_BIT: u32 = 22;
pub const GPS_SAT_COUNT_MASK: u32 = 0x0F;

pub const TO_RADIANS: f64 = std::f64::consts::PI / 180.0;

/// A value type that can live inside UM6 registers.
pub trait RegValue: Copy {
    const SIZE: usize;
    fn from_be_slice(bytes: &[u8]) -> Self;
    fn write_be(self, out: &mut [u8]);
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl RegValue for i16 {
    const SIZE: usize = 2;
    fn from_be_slice(bytes: &[u8]) -> Self {
        i16::from_be_bytes([bytes[0], bytes[1]])
    }
    fn write_be(self, out: &mut [u8]) {
        out[..2].copy_from_slice(&self.to_be_bytes());
    }
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
    fn from_f64(value: f64) -> Self {
        value as i16
    }
}

impl RegValue for u16 {
    const SIZE: usize = 2;
    fn from_be_slice(bytes: &[u8]) -> Self {
        u16::from_be_bytes([bytes[0], bytes[1]])
    }
    fn write_be(self, out: &mut [u8]) {
        out[..2].copy_from_slice(&self.to_be_bytes());
    }
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
    fn from_f64(value: f64) -> Self {
        value as u16
    }
}

impl RegValue for u32 {
    const SIZE: usize = 4;
    fn from_be_slice(bytes: &[u8]) -> Self {
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
    fn write_be(self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.to_be_bytes());
    }
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
    fn from_f64(value: f64) -> Self {
        value as u32
    }
}

impl RegValue for f32 {
    const SIZE: usize = 4;
    fn from_be_slice(bytes: &[u8]) -> Self {
        f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
    fn write_be(self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.to_be_bytes());
    }
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

/// Typed view over fields stored in one or more consecutive registers.
#[derive(Debug, Clone, Copy)]
pub struct Accessor<T> {
    /// First register address
    pub index: u8,
    /// Number of fields of type `T`
    pub len: u16,
    scale: f64,
    _value: PhantomData<T>,
}

impl<T: RegValue> Accessor<T> {
    pub const fn new(index: u8, len: u16) -> Self {
        Self::scaled(index, len, 1.0)
    }

    pub const fn scaled(index: u8, len: u16, scale: f64) -> Self {
        Accessor {
            index,
            len,
            scale,
            _value: PhantomData,
        }
    }

    fn offset(&self, field: usize) -> usize {
        self.index as usize * 4 + field * T::SIZE
    }

    /// Read the raw field value
    pub fn get(&self, regs: &Registers, field: usize) -> T {
        debug_assert!(field < self.len as usize);
        let off = self.offset(field);
        T::from_be_slice(&regs.raw[off..off + T::SIZE])
    }

    /// Read the field as a calibrated value
    pub fn get_scaled(&self, regs: &Registers, field: usize) -> f64 {
        self.get(regs, field).to_f64() * self.scale
    }

    /// Write the raw field value
    pub fn set(&self, regs: &mut Registers, field: usize, value: T) {
        debug_assert!(field < self.len as usize);
        let off = self.offset(field);
        value.write_be(&mut regs.raw[off..off + T::SIZE]);
    }

    /// Write a calibrated value, dividing out the scale factor
    pub fn set_scaled(&self, regs: &mut Registers, field: usize, value: f64) {
        self.set(regs, field, T::from_f64(value / self.scale));
    }

    /// Number of whole registers this accessor spans
    pub fn num_registers(&self) -> usize {
        (self.len as usize * T::SIZE).div_ceil(4)
    }
}

/// Accumulated latest-known raw values for every tracked register.
///
/// Mutated in place, register by register, as frames arrive; a field keeps
/// its last-known value until a newer frame overwrites it. There is no
/// expiry, so output can republish stale data for fields that stopped
/// updating.
pub struct Registers {
    raw: [u8; NUM_REGISTERS * 4],
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Registers {
    pub fn new() -> Self {
        Registers {
            raw: [0; NUM_REGISTERS * 4],
        }
    }

    /// Copy raw wire bytes into the snapshot starting at `address`.
    /// Byte-order correction happens at access time, not here.
    pub fn write_raw(&mut self, address: u8, data: &[u8]) {
        let start = address as usize * 4;
        if start >= self.raw.len() {
            return;
        }
        let end = (start + data.len()).min(self.raw.len());
        self.raw[start..end].copy_from_slice(&data[..end - start]);
    }

    /// Raw wire bytes for `count` registers starting at `address`, used
    /// when serializing an outbound register write.
    pub fn register_bytes(&self, address: u8, count: usize) -> &[u8] {
        let start = address as usize * 4;
        &self.raw[start..start + count * 4]
    }

    // Broadcast data accessors, with scale factors from the device
    // datasheet (identical to the vendor's Python driver).
    pub const GYRO: Accessor<i16> = Accessor::scaled(UM6_GYRO_PROC_XY, 3, 0.0610352 * TO_RADIANS);
    pub const ACCEL: Accessor<i16> = Accessor::scaled(UM6_ACCEL_PROC_XY, 3, 0.000183105);
    pub const MAG: Accessor<i16> = Accessor::scaled(UM6_MAG_PROC_XY, 3, 0.000305176);
    pub const EULER: Accessor<i16> =
        Accessor::scaled(UM6_EULER_PHI_THETA, 3, 0.0109863 * TO_RADIANS);
    pub const QUAT: Accessor<i16> = Accessor::scaled(UM6_QUAT_AB, 4, 0.0000335693);
    pub const COVARIANCE: Accessor<f32> = Accessor::new(UM6_ERROR_COV_00, 16);
    pub const TEMPERATURE: Accessor<f32> = Accessor::new(UM6_TEMPERATURE, 1);

    // GPS data accessors
    pub const GPS_ABS: Accessor<f32> = Accessor::new(UM6_GPS_LONGITUDE, 3);
    pub const GPS_REL: Accessor<f32> = Accessor::new(UM6_GPS_POSITION_N, 3);
    /// Course in hundredths of a degree, speed in centimeters per second
    pub const GPS_COURSE_SPEED: Accessor<u16> = Accessor::new(UM6_GPS_COURSE_SPEED, 2);
    pub const GPS_STATUS: Accessor<u32> = Accessor::new(UM6_GPS_SAT_SUMMARY, 1);

    // Configuration accessors
    pub const COMMUNICATION: Accessor<u32> = Accessor::new(UM6_COMMUNICATION, 1);
    pub const MISC_CONFIG: Accessor<u32> = Accessor::new(UM6_MISC_CONFIG, 1);
    pub const MAG_REF: Accessor<f32> = Accessor::new(UM6_MAG_REF_X, 3);
    pub const ACCEL_REF: Accessor<f32> = Accessor::new(UM6_ACCEL_REF_X, 3);
    pub const MAG_BIAS: Accessor<i16> = Accessor::scaled(UM6_MAG_BIAS_XY, 3, 0.000305176);
    pub const ACCEL_BIAS: Accessor<i16> = Accessor::scaled(UM6_ACCEL_BIAS_XY, 3, 0.000183105);
    pub const GYRO_BIAS: Accessor<i16> =
        Accessor::scaled(UM6_GYRO_BIAS_XY, 3, 0.0610352 * TO_RADIANS);
    pub const GPS_HOME: Accessor<f32> = Accessor::new(UM6_GPS_HOME_LAT, 3);
}
