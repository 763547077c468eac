//! Transport bindings for the mculink message runtime.
//!
//! An endpoint is an opaque byte-stream channel with exactly four
//! operations: configure, push, pull, destroy (destroy is `Drop`).
//! Push and pull are blocking and total: they return only once every
//! requested byte has moved, or with an error. No partial transfers
//! reach the upper layers.

pub mod endpoint;
pub mod error;
pub mod tcp;
#[cfg(unix)]
pub mod uds;

pub use endpoint::{Endpoint, EndpointConfig, StreamEndpoint};
pub use error::{Result, TransportError};
pub use tcp::TcpEndpoint;
#[cfg(unix)]
pub use uds::UnixDomainSocket;
