use std::net::{TcpStream, ToSocketAddrs};

use tracing::debug;

use crate::endpoint::{Endpoint, EndpointConfig, StreamEndpoint};
use crate::error::{Result, TransportError};

/// TCP channel to a networked device.
pub struct TcpEndpoint {
    inner: StreamEndpoint<TcpStream>,
    peer: String,
}

impl TcpEndpoint {
    /// Connect to a device at `target` (blocking).
    pub fn connect(target: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        Self::connect_with_config(target, EndpointConfig::default())
    }

    /// Connect with explicit socket deadlines.
    pub fn connect_with_config(
        target: impl ToSocketAddrs + std::fmt::Display,
        config: EndpointConfig,
    ) -> Result<Self> {
        let peer = target.to_string();
        let stream = TcpStream::connect(&target).map_err(|e| TransportError::Connect {
            target: peer.clone(),
            source: e,
        })?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        debug!(%peer, "connected to networked device");
        Ok(Self {
            inner: StreamEndpoint::new(stream),
            peer,
        })
    }

    /// The peer address this endpoint was connected to.
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl Endpoint for TcpEndpoint {
    fn configure(&mut self) -> Result<()> {
        // Packets are small and latency-bound; never batch them.
        self.inner.get_ref().set_nodelay(true)?;
        Ok(())
    }

    fn push(&mut self, data: &[u8]) -> Result<()> {
        self.inner.push(data)
    }

    fn pull(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.pull(buf)
    }
}
