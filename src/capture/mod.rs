//! Capture of a tracked heap from a running heap tracking server
//!
//! The client connects, then polls the socket at a fixed interval. Every poll
//! that finds data decodes it into a heap fragment. The stream ends with a
//! batch whose last operation is the zero-sized sentinel allocation, after
//! which the fragments are joined and deallocations of memory allocated before
//! the capture started are dropped.

use std::io::{self, Read};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::heap::TrackedHeap;
use crate::wire::{self, Batch, WireError};

/// Port the heap tracking server listens on.
pub const DEFAULT_PORT: u16 = 8989;

/// Wait between two socket polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 64 * 1024;

/// Errors raised while capturing.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The host name did not resolve to any address.
    #[error("unknown host {0}")]
    UnknownHost(String),

    /// No resolved address accepted the connection.
    #[error("unable to connect to {address}")]
    ConnectionFailure {
        /// `host:port` as requested.
        address: String,
        /// Error of the last connection attempt.
        #[source]
        source: io::Error,
    },

    /// Reading from the socket failed.
    #[error("socket error during capture")]
    Io(#[from] io::Error),

    /// A received update could not be decoded.
    #[error("unable to decode heap update")]
    Decode(#[from] WireError),

    /// The configured deadline passed before the sentinel arrived.
    #[error("no final heap operation received within {0:?}")]
    TimedOut(Duration),

    /// The cancel flag was raised.
    #[error("capture cancelled")]
    Cancelled,
}

/// How updates are delimited on the socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    /// Whatever is available at a poll is one whole update.
    #[default]
    Legacy,
    /// Every update is preceded by its varint-encoded length.
    LengthDelimited,
}

/// Capture settings.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sleep between two socket polls.
    pub poll_interval: Duration,
    /// How updates are delimited.
    pub framing: Framing,
    /// Give up when the sentinel has not arrived after this long.
    pub deadline: Option<Duration>,
    /// Abort as soon as this flag is raised.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            framing: Framing::default(),
            deadline: None,
            cancel: None,
        }
    }
}

impl CaptureConfig {
    /// Set the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the framing.
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Fail with [`CaptureError::TimedOut`] after `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fail with [`CaptureError::Cancelled`] once `cancel` is set.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Result of one poll.
enum Poll {
    Empty,
    Data(Vec<u8>),
    /// Peer closed the connection; carries whatever arrived before that.
    Closed(Vec<u8>),
}

/// Drains everything currently readable from a non-blocking stream.
fn poll_stream(stream: &mut TcpStream) -> io::Result<Poll> {
    let mut probe = [0u8; 1];
    match stream.peek(&mut probe) {
        Ok(0) => return Ok(Poll::Closed(Vec::new())),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Poll::Empty),
        Err(e) => return Err(e),
    }

    let mut received = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(Poll::Closed(received)),
            Ok(n) => received.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Poll::Data(received)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Client side of the capture protocol.
#[derive(Debug, Clone, Default)]
pub struct CaptureClient {
    config: CaptureConfig,
}

impl CaptureClient {
    /// Client using `config` for every capture.
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Connect to `host:port` and capture until the server sends its last
    /// heap operation.
    pub fn capture(&self, host: &str, port: u16) -> Result<TrackedHeap, CaptureError> {
        let addresses: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|e| {
                debug!(error = %e, host, "host resolution failed");
                CaptureError::UnknownHost(host.to_string())
            })?
            .collect();
        if addresses.is_empty() {
            return Err(CaptureError::UnknownHost(host.to_string()));
        }

        let stream =
            TcpStream::connect(&addresses[..]).map_err(|source| CaptureError::ConnectionFailure {
                address: format!("{host}:{port}"),
                source,
            })?;
        info!(host, port, "connected to heap tracking server");
        self.capture_stream(stream)
    }

    /// Capture from an already connected stream.
    pub fn capture_stream(&self, mut stream: TcpStream) -> Result<TrackedHeap, CaptureError> {
        stream.set_nonblocking(true)?;
        let started = Instant::now();
        let mut fragments = Vec::new();
        let mut pending = Vec::new();

        loop {
            self.check_interrupted(started)?;
            thread::sleep(self.config.poll_interval);

            let (received, closed) = match poll_stream(&mut stream)? {
                Poll::Empty => continue,
                Poll::Data(bytes) => (bytes, false),
                Poll::Closed(bytes) => (bytes, true),
            };

            let mut finished = false;
            for batch in self.decode_batches(received, &mut pending)? {
                debug!(
                    operations = batch.heap.len(),
                    markers = batch.heap.markers().len(),
                    "received heap update"
                );
                fragments.push(batch.heap);
                if batch.is_last {
                    finished = true;
                    break;
                }
            }

            if finished {
                info!("last heap operation received, closing connection");
                if let Err(e) = stream.shutdown(Shutdown::Both) {
                    debug!(error = %e, "socket shutdown failed");
                }
                break;
            }
            if closed {
                warn!(
                    fragments = fragments.len(),
                    "server closed the connection before the last heap operation"
                );
                break;
            }
        }

        let heap = TrackedHeap::concatenate(fragments).map_err(WireError::from)?;
        let filtered = heap.without_unmatched_deallocs();
        info!(
            operations = filtered.len(),
            dropped = heap.len() - filtered.len(),
            "capture complete"
        );
        Ok(filtered)
    }

    fn decode_batches(
        &self,
        received: Vec<u8>,
        pending: &mut Vec<u8>,
    ) -> Result<Vec<Batch>, WireError> {
        match self.config.framing {
            Framing::Legacy if received.is_empty() => Ok(Vec::new()),
            Framing::Legacy => Ok(vec![wire::decode_batch(&received)?]),
            Framing::LengthDelimited => {
                pending.extend_from_slice(&received);
                let mut batches = Vec::new();
                while let Some(frame) = wire::take_length_delimited(pending)? {
                    batches.push(wire::decode_batch(&frame)?);
                }
                Ok(batches)
            }
        }
    }

    fn check_interrupted(&self, started: Instant) -> Result<(), CaptureError> {
        if let Some(cancel) = &self.config.cancel {
            if cancel.load(Ordering::Relaxed) {
                return Err(CaptureError::Cancelled);
            }
        }
        if let Some(deadline) = self.config.deadline {
            if started.elapsed() >= deadline {
                return Err(CaptureError::TimedOut(deadline));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_server() {
        let config = CaptureConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.framing, Framing::Legacy);
        assert!(config.deadline.is_none());
        assert!(config.cancel.is_none());
    }

    #[test]
    fn builder_methods_override_defaults() {
        let flag = Arc::new(AtomicBool::new(false));
        let config = CaptureConfig::default()
            .with_poll_interval(Duration::from_millis(5))
            .with_framing(Framing::LengthDelimited)
            .with_deadline(Duration::from_secs(2))
            .with_cancel_flag(flag);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.framing, Framing::LengthDelimited);
        assert_eq!(config.deadline, Some(Duration::from_secs(2)));
    }

    #[test]
    fn raised_flag_cancels() {
        let flag = Arc::new(AtomicBool::new(true));
        let client = CaptureClient::new(CaptureConfig::default().with_cancel_flag(flag));
        assert!(matches!(
            client.check_interrupted(Instant::now()),
            Err(CaptureError::Cancelled)
        ));
    }
}
