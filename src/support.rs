//! Shared test doubles for the session, configuration, and dispatch tests.

use crate::comms::RegisterClient;
use crate::error::{Error, Result};
use crate::registers::Registers;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Scripted register client.
///
/// Records every acknowledged write in order and replays a queue of
/// inbound frames. Once the queue drains, `receive_next` reports the link
/// as closed so a session loop under test winds down.
pub struct MockClient {
    /// Every `write_and_await_ack` call, in order
    pub ops: Vec<(u8, Vec<u8>)>,
    /// Index of the first write that fails to acknowledge
    pub fail_from: Option<usize>,
    /// Inbound frames replayed by `receive_next`
    pub frames: VecDeque<(u8, Vec<u8>)>,
    /// Cleared when the frame queue drains, instead of failing the link
    pub stop_when_drained: Option<Arc<AtomicBool>>,
}

impl MockClient {
    pub fn new() -> Self {
        MockClient {
            ops: Vec::new(),
            fail_from: None,
            frames: VecDeque::new(),
            stop_when_drained: None,
        }
    }

    pub fn push_frame(&mut self, address: u8, data: &[u8]) {
        self.frames.push_back((address, data.to_vec()));
    }
}

impl RegisterClient for MockClient {
    fn write_and_await_ack(&mut self, address: u8, data: &[u8]) -> Result<()> {
        let index = self.ops.len();
        self.ops.push((address, data.to_vec()));
        match self.fail_from {
            Some(first_failing) if index >= first_failing => Err(Error::NoAck(address)),
            _ => Ok(()),
        }
    }

    fn receive_next(&mut self, snapshot: &mut Registers) -> Result<u8> {
        match self.frames.pop_front() {
            Some((address, data)) => {
                if !data.is_empty() {
                    snapshot.write_raw(address, &data);
                }
                Ok(address)
            }
            None => match &self.stop_when_drained {
                Some(flag) => {
                    flag.store(false, Ordering::Relaxed);
                    Ok(0)
                }
                None => Err(Error::Other("mock link closed".to_string())),
            },
        }
    }
}
