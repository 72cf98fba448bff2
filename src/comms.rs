//! Register transport client: packet framing, checksum, ack matching.
//!
//! Wire format (device native, all multi-byte values big-endian):
//!
//! ```text
//! 's' 'n' 'p'  PT  ADDRESS  [DATA, 4 bytes per register]  CHECKSUM (2)
//! ```
//!
//! PT bit 7 marks a data-bearing packet, bit 6 a batch; bits 2..5 carry
//! the batch length in registers. The checksum is the 16-bit sum of every
//! preceding byte, including the "snp" header. A packet without the data
//! bit is an acknowledgment (or command echo) for its address.

use crate::error::{Error, Result};
use crate::registers::{Registers, NUM_REGISTERS};
use crate::transport::Transport;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const PACKET_HAS_DATA: u8 = 1 << 7;
const PACKET_IS_BATCH: u8 = 1 << 6;
const PACKET_BATCH_LENGTH_MASK: u8 = 0x0F;
const PACKET_BATCH_LENGTH_OFFSET: u8 = 2;

/// How long a receive waits for a complete packet before giving up
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);
/// Idle poll interval while waiting for bytes
const READ_POLL: Duration = Duration::from_millis(1);
/// Send attempts per acknowledged write
const ACK_SEND_TRIES: usize = 5;
/// Inbound packets scanned for the ack after each send
const ACK_LISTEN_PACKETS: usize = 20;
/// Data frames held for the next receive after an ack wait
const PENDING_CAPACITY: usize = 256;

/// The register transport boundary consumed by the session, the
/// configuration sequencer, and the command dispatcher.
pub trait RegisterClient {
    /// Write a register (or issue a command when `data` is empty) and
    /// block until the device acknowledges it.
    fn write_and_await_ack(&mut self, address: u8, data: &[u8]) -> Result<()>;

    /// Block until the next valid inbound register frame has been copied
    /// into `snapshot`, returning the register address it carried.
    fn receive_next(&mut self, snapshot: &mut Registers) -> Result<u8>;

    /// Issue a zero-argument command register write, logging its name.
    fn send_command(&mut self, address: u8, name: &str) -> Result<()> {
        log::info!("Sending command: {}", name);
        self.write_and_await_ack(address, &[])
    }
}

/// One parsed inbound frame. `data` is empty for acknowledgments.
struct Frame {
    address: u8,
    data: Vec<u8>,
}

/// Register transport client over a byte-stream transport.
pub struct Comms<T> {
    transport: T,
    receive_timeout: Duration,
    first_spin: bool,
    /// Data frames scanned past while waiting for an acknowledgment;
    /// delivered by the next `receive_next` so no field goes stale
    pending: VecDeque<Frame>,
}

impl<T: Transport> Comms<T> {
    pub fn new(transport: T) -> Self {
        Comms {
            transport,
            receive_timeout: RECEIVE_TIMEOUT,
            first_spin: true,
            pending: VecDeque::new(),
        }
    }

    /// Override the receive deadline, used by tests to avoid real waits
    pub fn with_receive_timeout(transport: T, timeout: Duration) -> Self {
        Comms {
            transport,
            receive_timeout: timeout,
            first_spin: true,
            pending: VecDeque::new(),
        }
    }

    /// Serialize one outbound packet for `address`.
    ///
    /// `data` must be a whole number of 4-byte registers; empty data
    /// produces a command packet.
    pub fn packet(address: u8, data: &[u8]) -> Vec<u8> {
        debug_assert!(data.len() % 4 == 0);
        debug_assert!(data.len() / 4 <= PACKET_BATCH_LENGTH_MASK as usize);

        let mut pt = 0u8;
        if !data.is_empty() {
            pt |= PACKET_HAS_DATA;
            let num_registers = (data.len() / 4) as u8;
            if num_registers > 1 {
                pt |= PACKET_IS_BATCH
                    | ((num_registers & PACKET_BATCH_LENGTH_MASK) << PACKET_BATCH_LENGTH_OFFSET);
            }
        }

        let mut buf = Vec::with_capacity(7 + data.len());
        buf.extend_from_slice(b"snp");
        buf.push(pt);
        buf.push(address);
        buf.extend_from_slice(data);
        let checksum = byte_sum(&buf);
        buf.extend_from_slice(&checksum.to_be_bytes());
        buf
    }

    fn send(&mut self, address: u8, data: &[u8]) -> Result<()> {
        let packet = Self::packet(address, data);
        log::debug!("TX register {:#04x}, {} bytes", address, packet.len());
        let mut written = 0;
        while written < packet.len() {
            written += self.transport.write(&packet[written..])?;
        }
        self.transport.flush()
    }

    fn read_byte(&mut self, deadline: Instant) -> Result<u8> {
        let mut byte = [0u8; 1];
        loop {
            if self.transport.read(&mut byte)? == 1 {
                return Ok(byte[0]);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            std::thread::sleep(READ_POLL);
        }
    }

    fn read_exact(&mut self, buf: &mut [u8], deadline: Instant) -> Result<()> {
        for slot in buf.iter_mut() {
            *slot = self.read_byte(deadline)?;
        }
        Ok(())
    }

    /// Read one complete frame: sync, header, data, checksum.
    fn read_frame(&mut self) -> Result<Frame> {
        let deadline = Instant::now() + self.receive_timeout;

        // Search the stream for the start-of-packet sequence.
        let mut sync = [0u8; 3];
        let mut consumed = 0usize;
        loop {
            let byte = self.read_byte(deadline)?;
            sync = [sync[1], sync[2], byte];
            consumed += 1;
            if &sync == b"snp" {
                break;
            }
        }
        let discarded = consumed.saturating_sub(3);
        if discarded > 0 && !self.first_spin {
            log::warn!("Discarded {} junk byte(s) preceding packet", discarded);
        }
        self.first_spin = false;

        let mut header = [0u8; 2];
        self.read_exact(&mut header, deadline)?;
        let (pt, address) = (header[0], header[1]);

        let mut checksum = byte_sum(b"snp").wrapping_add(u16::from(pt)).wrapping_add(u16::from(address));

        let num_registers = if pt & PACKET_HAS_DATA == 0 {
            0
        } else if pt & PACKET_IS_BATCH != 0 {
            usize::from((pt >> PACKET_BATCH_LENGTH_OFFSET) & PACKET_BATCH_LENGTH_MASK)
        } else {
            1
        };

        let mut data = vec![0u8; num_registers * 4];
        self.read_exact(&mut data, deadline)?;
        checksum = checksum.wrapping_add(byte_sum(&data));

        let mut transmitted = [0u8; 2];
        self.read_exact(&mut transmitted, deadline)?;
        let transmitted = u16::from_be_bytes(transmitted);
        if transmitted != checksum {
            return Err(Error::Checksum {
                computed: checksum,
                transmitted,
            });
        }

        if address as usize + num_registers > NUM_REGISTERS {
            return Err(Error::InvalidPacket(format!(
                "register batch {:#04x}+{} out of range",
                address, num_registers
            )));
        }

        log::trace!("RX register {:#04x}, {} register(s)", address, num_registers);
        Ok(Frame { address, data })
    }

    /// Like `read_frame`, but skips packets discarded for bad checksums
    /// or malformed batch windows instead of failing the stream.
    fn read_valid_frame(&mut self) -> Result<Frame> {
        loop {
            match self.read_frame() {
                Ok(frame) => return Ok(frame),
                Err(Error::Checksum {
                    computed,
                    transmitted,
                }) => {
                    log::warn!("Discarding packet due to bad checksum");
                    log::debug!(
                        "Computed checksum: {:04x}  Transmitted checksum: {:04x}",
                        computed,
                        transmitted
                    );
                }
                Err(Error::InvalidPacket(reason)) => {
                    log::warn!("Discarding packet: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T: Transport> RegisterClient for Comms<T> {
    fn write_and_await_ack(&mut self, address: u8, data: &[u8]) -> Result<()> {
        for attempt in 1..=ACK_SEND_TRIES {
            self.send(address, data)?;

            // Inbound broadcast data keeps flowing while we wait; scan a
            // bounded number of packets for the echo of our address and
            // hold the data frames for the next receive.
            for _ in 0..ACK_LISTEN_PACKETS {
                match self.read_valid_frame() {
                    Ok(frame) if frame.address == address => return Ok(()),
                    Ok(frame) => {
                        if !frame.data.is_empty() {
                            if self.pending.len() >= PENDING_CAPACITY {
                                self.pending.pop_front();
                            }
                            self.pending.push_back(frame);
                        }
                    }
                    Err(Error::Timeout) => break,
                    Err(e) => return Err(e),
                }
            }
            log::debug!(
                "No ack for register {:#04x} (attempt {}/{})",
                address,
                attempt,
                ACK_SEND_TRIES
            );
        }
        Err(Error::NoAck(address))
    }

    fn receive_next(&mut self, snapshot: &mut Registers) -> Result<u8> {
        let frame = match self.pending.pop_front() {
            Some(frame) => frame,
            None => self.read_valid_frame()?,
        };
        if !frame.data.is_empty() {
            snapshot.write_raw(frame.address, &frame.data);
        }
        Ok(frame.address)
    }
}

/// 16-bit wrapping byte sum, the device's checksum primitive
fn byte_sum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)))
}
