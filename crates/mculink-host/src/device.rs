use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use mculink_transport::{Endpoint, TcpEndpoint, UnixDomainSocket};
use mculink_wire::{
    crc, packet, CallResult, Configuration, PointerWidth, CONFIGURATION_SIZE, RESULT_SIZE,
};

use crate::error::{latch, HostError, Result};

/// Directory scanned by [`attach_usb`] for bridge sockets, overridable
/// through `MCULINK_BRIDGE_DIR`.
pub const DEFAULT_BRIDGE_DIR: &str = "/run/mculink";

/// A host-side record of one attached device.
///
/// The endpoint sits behind a mutex: a transaction holds it from the
/// packet push to the result pull, which serializes invocations into the
/// strict request/reply order the device expects.
pub struct Device {
    name: String,
    identifier: u16,
    configuration: Configuration,
    pub(crate) channel: Mutex<Box<dyn Endpoint>>,
}

/// The device ambient (non-device-qualified) host calls operate on.
/// Mutated only by select/attach/detach.
static SELECTED: Mutex<Option<Arc<Device>>> = Mutex::new(None);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Device {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// CRC-16 of the device name; checked against the configuration
    /// record at attach time.
    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub(crate) fn pointer_width(&self) -> PointerWidth {
        self.configuration.pointer_width()
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("identifier", &format_args!("{:#06x}", self.identifier))
            .finish()
    }
}

/// Attach a device reachable through an already-constructed endpoint.
///
/// Configures the endpoint, loads the device's configuration record,
/// verifies the identifier matches `name`, and selects the device.
pub fn attach_endpoint(name: &str, endpoint: Box<dyn Endpoint>) -> Result<Arc<Device>> {
    attach_inner(name, endpoint).map_err(latch)
}

fn attach_inner(name: &str, mut endpoint: Box<dyn Endpoint>) -> Result<Arc<Device>> {
    if name.len() > Configuration::NAME_CAPACITY {
        return Err(HostError::Name(name.to_string()));
    }

    endpoint.configure()?;
    let configuration = load_configuration(&mut *endpoint)?;

    let identifier = crc::crc16(name.as_bytes());
    if configuration.identifier != identifier {
        warn!(
            name,
            expected = format_args!("{identifier:#06x}"),
            got = format_args!("{:#06x}", configuration.identifier),
            "identifier mismatch"
        );
        return Err(HostError::Identity(name.to_string()));
    }

    info!(name, version = configuration.version, "attached device");
    let device = Arc::new(Device {
        name: name.to_string(),
        identifier,
        configuration,
        channel: Mutex::new(endpoint),
    });
    select(&device);
    Ok(device)
}

/// Attach a networked device at `target` (`host:port`).
pub fn attach_tcp(name: &str, target: &str) -> Result<Arc<Device>> {
    let endpoint = TcpEndpoint::connect(target).map_err(|e| latch(e.into()))?;
    attach_endpoint(name, Box::new(endpoint))
}

/// Attach a device behind a local bridge socket.
pub fn attach_unix(name: &str, path: impl AsRef<Path>) -> Result<Arc<Device>> {
    let endpoint = UnixDomainSocket::connect(path).map_err(|e| latch(e.into()))?;
    attach_endpoint(name, Box::new(endpoint))
}

/// Attach every device exposed by the local USB bridge daemon.
///
/// The bridge binds one `<name>.sock` per device under its socket
/// directory (`MCULINK_BRIDGE_DIR`, default [`DEFAULT_BRIDGE_DIR`]).
/// Sockets that fail to attach are logged and skipped. The last device
/// attached is left selected.
pub fn attach_usb() -> Result<Vec<Arc<Device>>> {
    let dir = std::env::var("MCULINK_BRIDGE_DIR").unwrap_or_else(|_| DEFAULT_BRIDGE_DIR.into());
    attach_usb_in(dir)
}

/// [`attach_usb`] against an explicit bridge socket directory.
pub fn attach_usb_in(dir: impl AsRef<Path>) -> Result<Vec<Arc<Device>>> {
    let dir = dir.as_ref();
    let mut devices = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), %err, "bridge directory unreadable");
            return Ok(devices);
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sock") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match attach_unix(name, &path) {
            Ok(device) => devices.push(device),
            Err(err) => warn!(socket = %path.display(), %err, "skipping bridge socket"),
        }
    }

    Ok(devices)
}

/// Make `device` the selected device.
pub fn select(device: &Arc<Device>) {
    *lock(&SELECTED) = Some(Arc::clone(device));
}

/// The currently selected device, if any.
pub fn selected() -> Option<Arc<Device>> {
    lock(&SELECTED).clone()
}

/// Forget `device`. Deselects it if it was selected; the endpoint is
/// destroyed when the last reference drops.
pub fn detach(device: &Arc<Device>) {
    let mut slot = lock(&SELECTED);
    if slot.as_ref().is_some_and(|held| Arc::ptr_eq(held, device)) {
        *slot = None;
    }
}

/// One configuration transaction: configuration packet out, then the
/// record, then the result.
fn load_configuration(endpoint: &mut dyn Endpoint) -> Result<Configuration> {
    endpoint.push(packet::encode_configuration().as_bytes())?;

    let mut record = [0u8; CONFIGURATION_SIZE];
    endpoint.pull(&mut record)?;

    let mut reply = [0u8; RESULT_SIZE];
    endpoint.pull(&mut reply)?;
    let result = CallResult::decode(&reply)?;
    if !result.is_ok() {
        return Err(HostError::Device(result.fault()));
    }

    Configuration::decode(&record).map_err(Into::into)
}
