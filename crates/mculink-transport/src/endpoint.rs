use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Socket-level tuning for an endpoint.
///
/// The runtime itself imposes no timeouts (a stuck transfer blocks),
/// so deadlines live here, on the channel, where callers opt in.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointConfig {
    /// Deadline for each blocking pull. `None` blocks forever.
    pub read_timeout: Option<Duration>,
    /// Deadline for each blocking push. `None` blocks forever.
    pub write_timeout: Option<Duration>,
}

/// A channel to one device (or, on the device side, to one host).
///
/// Both transfer operations are blocking and total: `push` returns once
/// every byte of `data` is on the channel, `pull` returns once `buf` is
/// full. A transaction is one pushed packet (plus an optional raw-byte
/// transfer for the bulk classes) followed by one pulled result.
///
/// Teardown is `Drop`.
pub trait Endpoint: Send {
    /// Prepare the channel (socket options, bridge negotiation).
    /// Called once before the first transfer.
    fn configure(&mut self) -> Result<()>;

    /// Write all of `data` to the channel.
    fn push(&mut self, data: &[u8]) -> Result<()>;

    /// Fill `buf` from the channel.
    fn pull(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// Adapter turning any blocking byte stream into an [`Endpoint`].
///
/// Retries `Interrupted`, maps EOF in the middle of a transfer to
/// [`TransportError::Closed`], and propagates `WouldBlock`/`TimedOut`
/// so socket deadlines from [`EndpointConfig`] actually fire.
pub struct StreamEndpoint<T> {
    inner: T,
}

impl<T: Read + Write + Send> StreamEndpoint<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the adapter and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Write + Send> Endpoint for StreamEndpoint<T> {
    fn configure(&mut self) -> Result<()> {
        Ok(())
    }

    fn push(&mut self, data: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < data.len() {
            match self.inner.write(&data[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn pull(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < buf.len() {
            match self.inner.read(&mut buf[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }
}
