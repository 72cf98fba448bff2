//! Reset command dispatch.
//!
//! Reset requests arrive over the command endpoint while the session is
//! streaming. The session services them between broadcast bursts, so a
//! request never interleaves with packet reception on the serial link.

use crate::comms::RegisterClient;
use crate::error::Result;
use crate::registers::{UM6_RESET_EKF, UM6_SET_ACCEL_REF, UM6_SET_MAG_REF, UM6_ZERO_GYROS};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

/// Device commands requested in one reset call
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub zero_gyros: bool,
    #[serde(default)]
    pub reset_ekf: bool,
    #[serde(default)]
    pub set_mag_ref: bool,
    #[serde(default)]
    pub set_accel_ref: bool,
}

/// A reset request paired with its reply channel
pub struct ResetCommand {
    pub request: ResetRequest,
    pub reply: Sender<bool>,
}

/// Issue the requested commands in fixed order, stopping at the first
/// one the device fails to acknowledge.
pub fn handle_reset(client: &mut dyn RegisterClient, request: &ResetRequest) -> Result<()> {
    if request.zero_gyros {
        client.send_command(UM6_ZERO_GYROS, "zero gyroscopes")?;
    }
    if request.reset_ekf {
        client.send_command(UM6_RESET_EKF, "reset EKF")?;
    }
    if request.set_mag_ref {
        client.send_command(UM6_SET_MAG_REF, "set magnetometer reference")?;
    }
    if request.set_accel_ref {
        client.send_command(UM6_SET_ACCEL_REF, "set accelerometer reference")?;
    }
    Ok(())
}
