//! Topic publisher using TCP sockets.
//!
//! A dedicated publisher thread owns the TCP listener; the session thread
//! pushes serialized envelopes to a lock-free queue and never blocks on
//! the network.
//!
//! Frame format on the socket:
//!
//! ```text
//! [4-byte length, big-endian][topic bytes][0x00][payload]
//! ```
//!
//! The length covers the topic, its terminator, and the payload.

use crate::error::Result;
use crossbeam_queue::ArrayQueue;
use log::{debug, error, info, warn};
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One serialized message bound for a topic
pub struct Envelope {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Queue depth; a broadcast burst enqueues at most a dozen envelopes
const QUEUE_CAPACITY: usize = 256;

/// Session-side handle for pushing envelopes
#[derive(Clone)]
pub struct PublisherHandle {
    queue: Arc<ArrayQueue<Envelope>>,
    clients: Arc<AtomicUsize>,
}

impl PublisherHandle {
    /// Handle backed by a fresh queue with no listener, for tests
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        PublisherHandle {
            queue: Arc::new(ArrayQueue::new(QUEUE_CAPACITY)),
            clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of currently connected subscribers
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn set_client_count(&self, count: usize) {
        self.clients.store(count, Ordering::Relaxed);
    }

    /// Enqueue an envelope without blocking; drops it if the publisher
    /// thread has fallen behind
    pub fn push(&self, envelope: Envelope) {
        if self.queue.push(envelope).is_err() {
            debug!("Publish queue full, dropping envelope");
        }
    }

    #[cfg(test)]
    pub(crate) fn pop(&self) -> Option<Envelope> {
        self.queue.pop()
    }
}

/// Telemetry publisher broadcasting framed envelopes to TCP subscribers
pub struct TcpPublisher {
    handle: PublisherHandle,
    local_addr: SocketAddr,
    publisher_thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl TcpPublisher {
    /// Bind the listener and spawn the publisher thread
    pub fn bind(bind_address: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let handle = PublisherHandle {
            queue: Arc::new(ArrayQueue::new(QUEUE_CAPACITY)),
            clients: Arc::new(AtomicUsize::new(0)),
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_handle = handle.clone();
        let thread_shutdown = Arc::clone(&shutdown);

        let publisher_thread = thread::Builder::new()
            .name("tcp-publisher".to_string())
            .spawn(move || {
                Self::publisher_thread_loop(listener, thread_handle, thread_shutdown);
            })?;

        info!("Telemetry publisher listening on {}", local_addr);

        Ok(Self {
            handle,
            local_addr,
            publisher_thread: Some(publisher_thread),
            shutdown,
        })
    }

    /// Session-side handle for this publisher
    pub fn handle(&self) -> PublisherHandle {
        self.handle.clone()
    }

    /// Bound address, with the OS-assigned port resolved
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn publisher_thread_loop(
        listener: TcpListener,
        handle: PublisherHandle,
        shutdown: Arc<AtomicBool>,
    ) {
        let mut clients: Vec<TcpStream> = Vec::new();
        let mut frame_buffer = Vec::with_capacity(4096);

        while !shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nonblocking(false) {
                        warn!("Failed to set blocking mode for client {}: {}", addr, e);
                    } else {
                        info!("Subscriber connected: {}", addr);
                        clients.push(stream);
                        handle.clients.store(clients.len(), Ordering::Relaxed);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    error!("Error accepting subscriber: {}", e);
                }
            }

            let mut batch = 0;
            while let Some(envelope) = handle.queue.pop() {
                Self::broadcast(&mut clients, &envelope, &mut frame_buffer);
                handle.clients.store(clients.len(), Ordering::Relaxed);

                batch += 1;
                if batch >= 50 {
                    break;
                }
            }

            if handle.queue.is_empty() {
                thread::sleep(Duration::from_millis(10));
            }
        }

        info!("Publisher thread exiting");
    }

    /// Frame an envelope and write it to every subscriber, pruning the
    /// ones that disconnected
    fn broadcast(clients: &mut Vec<TcpStream>, envelope: &Envelope, buffer: &mut Vec<u8>) {
        frame_into(buffer, &envelope.topic, &envelope.payload);

        clients.retain_mut(|client| match client.write_all(buffer) {
            Ok(_) => true,
            Err(e) => {
                if let Ok(addr) = client.peer_addr() {
                    debug!("Subscriber {} disconnected: {}", addr, e);
                }
                false
            }
        });
    }

    /// Stop the publisher
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Drop for TcpPublisher {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.publisher_thread.take() {
            let _ = thread.join();
        }
    }
}

/// Serialize one frame into `buffer`, replacing its contents
fn frame_into(buffer: &mut Vec<u8>, topic: &str, payload: &[u8]) {
    buffer.clear();
    buffer.reserve(4 + topic.len() + 1 + payload.len());

    let frame_length = (topic.len() + 1 + payload.len()) as u32;
    buffer.extend_from_slice(&frame_length.to_be_bytes());
    buffer.extend_from_slice(topic.as_bytes());
    buffer.push(0);
    buffer.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_frame_layout() {
        let mut buffer = Vec::new();
        frame_into(&mut buffer, "imu/data", b"\x01\x02\x03");

        assert_eq!(&buffer[..4], &12u32.to_be_bytes());
        assert_eq!(&buffer[4..12], b"imu/data");
        assert_eq!(buffer[12], 0);
        assert_eq!(&buffer[13..], b"\x01\x02\x03");
    }

    #[test]
    fn test_broadcast_to_subscriber() {
        let publisher = TcpPublisher::bind("127.0.0.1:0").unwrap();
        let handle = publisher.handle();

        let mut client = TcpStream::connect(publisher.local_addr()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        // Wait until the publisher thread has accepted the connection so
        // the envelope is not broadcast to an empty client list.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while handle.client_count() == 0 {
            assert!(std::time::Instant::now() < deadline, "subscriber never seen");
            thread::sleep(Duration::from_millis(5));
        }

        handle.push(Envelope {
            topic: "imu/temperature".to_string(),
            payload: b"25.5".to_vec(),
        });

        let mut len = [0u8; 4];
        client.read_exact(&mut len).unwrap();
        let mut frame = vec![0u8; u32::from_be_bytes(len) as usize];
        client.read_exact(&mut frame).unwrap();

        let split = frame.iter().position(|&b| b == 0).unwrap();
        assert_eq!(&frame[..split], b"imu/temperature");
        assert_eq!(&frame[split + 1..], b"25.5");
    }
}
