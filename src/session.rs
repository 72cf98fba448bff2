//! Device session lifecycle.
//!
//! A session owns the serial link for its whole life: connect, run the
//! configuration sequence, then stream broadcast bursts until the link
//! fails or shutdown is requested. Any failure tears the session down and
//! a fresh connection attempt starts after a fixed delay; the daemon
//! never gives up on a missing or flaky device.
//!
//! The session thread is the only code that touches the transport. Reset
//! requests arriving from the command server are serviced between
//! broadcast bursts, so register writes never race packet reception.

use crate::comms::{Comms, RegisterClient};
use crate::config::{DeviceConfig, DriverConfig};
use crate::configure::configure_device;
use crate::dispatch::{handle_reset, ResetCommand};
use crate::error::Result;
use crate::registers::{Registers, UM6_TEMPERATURE};
use crate::streaming::TelemetryPublisher;
use crate::transport::SerialTransport;
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Temperature is the last register of every broadcast burst; its
/// arrival means the snapshot now holds a complete, coherent burst.
pub const TRIGGER_REGISTER: u8 = UM6_TEMPERATURE;

/// Delay between connection attempts
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Where the session currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Configuring,
    Streaming,
    Faulted,
}

/// Counters accumulated over the life of the daemon
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Connection attempts, including failed ones
    pub connect_attempts: u64,
    /// Failures that produced a warning; repeats of the same outage
    /// are demoted to debug
    pub connect_warnings: u64,
    /// Sessions that reached the streaming state
    pub sessions: u64,
    /// Complete broadcast bursts published
    pub bursts: u64,
    /// Reset requests serviced
    pub resets: u64,
}

/// Opens a fresh register client for each connection attempt
pub trait Connector {
    type Client: RegisterClient;

    fn connect(&mut self) -> Result<Self::Client>;
}

/// Connector for a real device on a serial port
pub struct SerialConnector {
    port: String,
    baud: u32,
}

impl SerialConnector {
    pub fn new(config: &DeviceConfig) -> Self {
        SerialConnector {
            port: config.port.clone(),
            baud: config.baud,
        }
    }
}

impl Connector for SerialConnector {
    type Client = Comms<SerialTransport>;

    fn connect(&mut self) -> Result<Self::Client> {
        Ok(Comms::new(SerialTransport::open(&self.port, self.baud)?))
    }
}

/// The device session loop
pub struct Session<C: Connector> {
    connector: C,
    config: DriverConfig,
    telemetry: TelemetryPublisher,
    commands: Receiver<ResetCommand>,
    running: Arc<AtomicBool>,
    retry_interval: Duration,
    state: SessionState,
    stats: SessionStats,
    warned: bool,
}

impl<C: Connector> Session<C> {
    pub fn new(
        connector: C,
        config: DriverConfig,
        telemetry: TelemetryPublisher,
        commands: Receiver<ResetCommand>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Session {
            connector,
            config,
            telemetry,
            commands,
            running,
            retry_interval: RETRY_INTERVAL,
            state: SessionState::Disconnected,
            stats: SessionStats::default(),
            warned: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Run sessions until shutdown is requested.
    ///
    /// The first failure of an outage is warned; repeats are logged at
    /// debug until a session reaches streaming again.
    pub fn run(&mut self) {
        while self.running.load(Ordering::Relaxed) {
            self.stats.connect_attempts += 1;
            match self.connect_and_serve() {
                Ok(()) => break,
                Err(e) => {
                    if self.warned {
                        log::debug!("Connection attempt failed: {}", e);
                    } else {
                        log::warn!(
                            "Device session failed: {}; retrying every {:?}",
                            e,
                            self.retry_interval
                        );
                        self.warned = true;
                        self.stats.connect_warnings += 1;
                    }
                    self.sleep_before_retry();
                    self.state = SessionState::Disconnected;
                }
            }
        }
        self.state = SessionState::Disconnected;
        log::info!(
            "Session loop ended: {} sessions, {} bursts, {} resets",
            self.stats.sessions,
            self.stats.bursts,
            self.stats.resets
        );
    }

    /// One connection attempt. On failure the state reflects where it
    /// happened: a failed open falls back to `Disconnected`, anything
    /// after a successful open is `Faulted`.
    fn connect_and_serve(&mut self) -> Result<()> {
        self.state = SessionState::Connecting;
        log::info!("Connecting to device");
        let mut client = match self.connector.connect() {
            Ok(client) => client,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };
        // A successful open rearms the outage warning.
        self.warned = false;

        self.state = SessionState::Configuring;
        if let Err(e) = configure_device(&mut client, &self.config) {
            self.state = SessionState::Faulted;
            return Err(e);
        }

        self.state = SessionState::Streaming;
        self.stats.sessions += 1;
        log::info!("Streaming");
        match self.serve(&mut client) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = SessionState::Faulted;
                Err(e)
            }
        }
    }

    /// Stream until shutdown or a link failure.
    ///
    /// Publication and command servicing both happen on the burst
    /// trigger, when the snapshot is coherent and the device is quiet
    /// between bursts.
    fn serve(&mut self, client: &mut C::Client) -> Result<()> {
        let mut registers = Registers::new();
        while self.running.load(Ordering::Relaxed) {
            let address = client.receive_next(&mut registers)?;
            if address == TRIGGER_REGISTER {
                self.stats.bursts += 1;
                if let Err(e) = self.telemetry.publish(&registers) {
                    log::warn!("Failed to publish telemetry: {}", e);
                }
                self.service_commands(client);
            }
        }
        Ok(())
    }

    fn service_commands(&mut self, client: &mut C::Client) {
        while let Ok(command) = self.commands.try_recv() {
            self.stats.resets += 1;
            let result = handle_reset(&mut *client, &command.request);
            if let Err(e) = &result {
                log::error!("Reset request failed: {}", e);
            }
            let _ = command.reply.send(result.is_ok());
        }
    }

    fn sleep_before_retry(&self) {
        let deadline = Instant::now() + self.retry_interval;
        while self.running.load(Ordering::Relaxed) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
    }
}
