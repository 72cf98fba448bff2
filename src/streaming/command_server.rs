//! TCP endpoint for reset requests.
//!
//! Clients connect, send a length-prefixed [`ResetRequest`], and receive a
//! length-prefixed [`ResetResponse`] once the session has serviced the
//! request. The server forwards requests to the session over a channel;
//! the session issues the device commands itself, between broadcast
//! bursts, so this thread never touches the serial link.
//!
//! One client is served at a time. Requests are serialized against the
//! device anyway, so concurrent connections would only queue.

use crate::dispatch::{ResetCommand, ResetRequest};
use crate::error::{Error, Result};
use crate::streaming::messages::ResetResponse;
use crate::streaming::wire::Serializer;
use crossbeam_channel::{bounded, Sender};
use log::{debug, error, info, warn};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Largest accepted request payload
const MAX_REQUEST_BYTES: usize = 64 * 1024;
/// How long a client waits for the session to service its request
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener for the reset request/response endpoint
pub struct CommandServer {
    local_addr: SocketAddr,
    server_thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl CommandServer {
    /// Bind the listener and spawn the server thread
    pub fn spawn(
        bind_address: &str,
        serializer: Serializer,
        commands: Sender<ResetCommand>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);

        let server_thread = thread::Builder::new()
            .name("command-server".to_string())
            .spawn(move || {
                Self::accept_loop(listener, serializer, commands, thread_shutdown);
            })?;

        info!("Command server listening on {}", local_addr);

        Ok(Self {
            local_addr,
            server_thread: Some(server_thread),
            shutdown,
        })
    }

    /// Bound address, with the OS-assigned port resolved
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn accept_loop(
        listener: TcpListener,
        serializer: Serializer,
        commands: Sender<ResetCommand>,
        shutdown: Arc<AtomicBool>,
    ) {
        while !shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    info!("Command client connected: {}", addr);
                    match Self::serve_client(stream, &serializer, &commands, &shutdown) {
                        Ok(()) => info!("Command client disconnected: {}", addr),
                        Err(e) => warn!("Command client {} failed: {}", addr, e),
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    error!("Error accepting command client: {}", e);
                }
            }
        }
        info!("Command server exiting");
    }

    fn serve_client(
        mut stream: TcpStream,
        serializer: &Serializer,
        commands: &Sender<ResetCommand>,
        shutdown: &AtomicBool,
    ) -> Result<()> {
        stream.set_nonblocking(false)?;
        // Read timeout so the shutdown flag is checked periodically
        stream.set_read_timeout(Some(Duration::from_millis(500)))?;

        let mut payload = Vec::new();
        loop {
            let request = match Self::read_request(&mut stream, serializer, &mut payload) {
                Ok(Some(request)) => request,
                Ok(None) => {
                    if shutdown.load(Ordering::Relaxed) {
                        return Ok(());
                    }
                    continue;
                }
                Err(Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof
                        || e.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            debug!("Received reset request: {:?}", request);
            let ok = Self::dispatch(commands, request);

            let response = serializer.serialize(&ResetResponse { ok })?;
            stream.write_all(&(response.len() as u32).to_be_bytes())?;
            stream.write_all(&response)?;
        }
    }

    /// Forward the request to the session and wait for its verdict
    fn dispatch(commands: &Sender<ResetCommand>, request: ResetRequest) -> bool {
        let (reply_tx, reply_rx) = bounded(1);
        if commands
            .send(ResetCommand {
                request,
                reply: reply_tx,
            })
            .is_err()
        {
            warn!("Session inbox closed, rejecting reset request");
            return false;
        }
        match reply_rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(ok) => ok,
            Err(_) => {
                warn!("Timed out waiting for the session to service a reset");
                false
            }
        }
    }

    /// Read one length-prefixed request; `None` on a read timeout
    fn read_request(
        stream: &mut TcpStream,
        serializer: &Serializer,
        payload: &mut Vec<u8>,
    ) -> Result<Option<ResetRequest>> {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf) {
            Ok(_) => {}
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(e)),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_REQUEST_BYTES {
            return Err(Error::InvalidPacket(format!(
                "request too large: {} bytes",
                len
            )));
        }

        payload.clear();
        payload.resize(len, 0);
        stream.read_exact(payload)?;
        Ok(Some(serializer.deserialize(payload)?))
    }

    /// Stop the server
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}
