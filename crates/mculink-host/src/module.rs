use std::sync::Arc;

use tracing::debug;

use mculink_wire::{crc, ArgList, Configuration, WireType, USER_INVOCATION_BIT};

use crate::device::{selected, Device};
use crate::error::{latch, HostError, Result};

/// A host-side shim for one device-resident module.
///
/// A shim starts unbound: it knows its name and name-CRC identifier but
/// no index. [`Module::bind`] asks the selected device's dynamic loader
/// for the matching module and records the assigned index with the
/// user-invocation bit set. Shims for ROM modules whose index is fixed
/// at build time use [`Module::with_index`] instead.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    identifier: u16,
    index: Option<u8>,
    device: Option<Arc<Device>>,
}

impl Module {
    pub fn new(name: &str) -> Result<Module> {
        if name.len() > Configuration::NAME_CAPACITY {
            return Err(latch(HostError::Name(name.to_string())));
        }
        Ok(Module {
            name: name.to_string(),
            identifier: crc::identifier(name),
            index: None,
            device: None,
        })
    }

    /// A shim with a build-time index: calls go out as standard
    /// invocations on `device`.
    pub fn with_index(name: &str, index: u8, device: &Arc<Device>) -> Result<Module> {
        let mut module = Module::new(name)?;
        module.index = Some(index);
        module.device = Some(Arc::clone(device));
        Ok(module)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// CRC-16 of the module name including the NUL terminator.
    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    /// The bound index, if any. Bound shims carry the user bit.
    pub fn index(&self) -> Option<u8> {
        self.index
    }

    /// Bind this shim to its counterpart on the selected device.
    ///
    /// Binding twice yields the same `(identifier, index)`.
    pub fn bind(&mut self) -> Result<()> {
        let device = selected().ok_or(HostError::NoDevice).map_err(latch)?;
        self.bind_to(&device)
    }

    /// Bind this shim against an explicit device.
    pub fn bind_to(&mut self, device: &Arc<Device>) -> Result<()> {
        let index = device.module_index(self.identifier)?;
        debug!(module = %self.name, index, "bound module");
        self.index = Some(index | USER_INVOCATION_BIT);
        self.device = Some(Arc::clone(device));
        Ok(())
    }

    fn resolved(&self) -> Result<(&Arc<Device>, u8)> {
        let device = self
            .device
            .as_ref()
            .ok_or(HostError::NoDevice)
            .map_err(latch)?;
        let index = self
            .index
            .ok_or_else(|| latch(HostError::Unbound(self.name.clone())))?;
        Ok((device, index))
    }

    /// Invoke a function in this module.
    pub fn invoke(&self, function: u8, ret: WireType, args: ArgList) -> Result<u64> {
        let (device, index) = self.resolved()?;
        device.invoke(index, function, ret, args)
    }

    /// Push `data` through a function in this module.
    pub fn push(&self, function: u8, data: &[u8], args: ArgList) -> Result<u64> {
        let (device, index) = self.resolved()?;
        device.push(index, function, data, args)
    }

    /// Pull `buf.len()` bytes through a function in this module.
    pub fn pull(&self, function: u8, buf: &mut [u8], args: ArgList) -> Result<u64> {
        let (device, index) = self.resolved()?;
        device.pull(index, function, buf, args)
    }
}
