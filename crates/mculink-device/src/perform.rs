//! The device-side perform engine.
//!
//! Runs one transaction at a time against a single statically-sized
//! packet buffer: pull a packet, validate it, dispatch by class, reply.
//! The result is always the last thing on the wire for a transaction;
//! any raw-byte transfer precedes it.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;

use tracing::{debug, warn};

use mculink_transport::{Endpoint, TransportError};
use mculink_wire::{
    fault, packet, Body, CallResult, Configuration, InvocationBody, PacketClass, PointerWidth,
    WireError, WireType, MODULE_NOT_LOADED, PACKET_SIZE,
};

use crate::error::{DeviceError, Result};
use crate::memory::DeviceMemory;
use crate::registry::{Entry, Function, Module, Registry};
use crate::trampoline;

/// The device-side runtime: configuration, module registry, memory
/// arena, and the one packet buffer every transaction reuses.
pub struct DeviceRuntime {
    configuration: Configuration,
    registry: Arc<Mutex<Registry>>,
    memory: Arc<Mutex<DeviceMemory>>,
    packet: [u8; PACKET_SIZE],
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DeviceRuntime {
    /// Create a runtime for a device described by `configuration`.
    ///
    /// Module 0 is always the dynamic loader, whose function 0 maps a
    /// name identifier to a module index for host-side binds.
    pub fn new(configuration: Configuration) -> Self {
        let registry = Arc::new(Mutex::new(Registry::new()));
        let memory = Arc::new(Mutex::new(DeviceMemory::new()));

        let lookup = {
            let registry: Weak<Mutex<Registry>> = Arc::downgrade(&registry);
            Function::new(
                move |args: &[u64]| {
                    let Some(registry) = registry.upgrade() else {
                        return u64::from(MODULE_NOT_LOADED);
                    };
                    let identifier = args.first().copied().unwrap_or(0) as u16;
                    let index = lock(&registry).index_of(identifier);
                    u64::from(index)
                },
                vec![WireType::U16],
                WireType::U16,
            )
        };
        let loader = Module::new("loader", vec![lookup]).expect("loader name fits the bound");
        lock(&registry)
            .register(loader)
            .expect("empty registry accepts the loader");

        Self {
            configuration,
            registry,
            memory,
            packet: [0; PACKET_SIZE],
        }
    }

    /// Register a module. Indices are assigned in registration order and
    /// stay stable for the device's lifetime.
    pub fn register(&mut self, module: Module) -> Result<u8> {
        lock(&self.registry).register(module)
    }

    /// The shared memory arena, for native entry points that read or
    /// write transfer buffers.
    pub fn memory(&self) -> Arc<Mutex<DeviceMemory>> {
        Arc::clone(&self.memory)
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Serve transactions until the host disconnects.
    pub fn serve(&mut self, endpoint: &mut dyn Endpoint) -> Result<()> {
        loop {
            match self.run_once(endpoint) {
                Ok(()) => continue,
                Err(DeviceError::Transport(TransportError::Closed)) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    /// Accept and answer exactly one transaction.
    ///
    /// Malformed packets are logged and answered with a zero value and
    /// the fault code; only channel failures abort the transaction.
    pub fn run_once(&mut self, endpoint: &mut dyn Endpoint) -> Result<()> {
        endpoint.pull(&mut self.packet)?;

        let value = match packet::parse(&self.packet) {
            Ok(parsed) => {
                debug!(class = ?parsed.class, "performing packet");
                match self.dispatch(endpoint, parsed.class, parsed.body) {
                    Ok(value) => value,
                    Err(DeviceError::Transport(err)) => return Err(err.into()),
                    Err(err) => {
                        warn!(%err, "perform failed");
                        fault::raise(err.fault());
                        0
                    }
                }
            }
            Err(err) => {
                warn!(%err, "rejecting packet");
                fault::raise(err.fault());
                0
            }
        };

        let result = CallResult { value, error: fault::get().code() };
        endpoint.push(&result.encode())?;
        Ok(())
    }

    fn dispatch(&mut self, endpoint: &mut dyn Endpoint, class: PacketClass, body: Body) -> Result<u64> {
        match body {
            Body::Configuration => {
                endpoint.push(&self.configuration.encode())?;
                Ok(0)
            }
            Body::Invocation(call) => self.execute(&call),
            Body::PushPull(body) => match class {
                // Both stage incoming bytes into fresh memory; ram-load
                // is the executable-image variant of send.
                PacketClass::RamLoad | PacketClass::Send => {
                    let address = self.accept(endpoint, body.length)?;
                    Ok(u64::from(address))
                }
                PacketClass::Push => {
                    let address = self.accept(endpoint, body.length)?;
                    let call = patch_pointer(&body.call, address, self.pointer_width())?;
                    self.execute(&call)
                }
                PacketClass::Pull => {
                    let address = lock(&self.memory).alloc(body.length)?;
                    let call = patch_pointer(&body.call, address, self.pointer_width())?;
                    let value = self.execute(&call)?;
                    let data = lock(&self.memory).read(address, body.length)?.to_vec();
                    endpoint.push(&data)?;
                    Ok(value)
                }
                PacketClass::Receive => {
                    let address = first_pointer(&body.call, self.pointer_width())?;
                    let data = lock(&self.memory).read(address, body.length)?.to_vec();
                    endpoint.push(&data)?;
                    Ok(u64::from(address))
                }
                other => Err(WireError::Class(other.code()).into()),
            },
            Body::Event => Ok(0),
        }
    }

    fn execute(&self, call: &InvocationBody) -> Result<u64> {
        eprintln!("DEBUG execute enter module={} function={}", call.module, call.function);
        let entry: Entry = {
            let registry = lock(&self.registry);
            eprintln!("DEBUG got registry lock");
            let function = registry.function(call.module, call.function)?;
            eprintln!("DEBUG got function");
            Arc::clone(&function.entry)
        };
        eprintln!("DEBUG registry lock released, calling entry");
        // The registry lock is released before the call so entry points
        // (the loader included) may take it themselves.
        let r = trampoline::call(
            &*entry,
            call.ret,
            call.argc,
            call.types,
            &call.parameters,
            self.pointer_width(),
        );
        eprintln!("DEBUG entry returned {}", r);
        Ok(r)
    }

    /// Pull `length` raw bytes from the channel into fresh memory.
    fn accept(&mut self, endpoint: &mut dyn Endpoint, length: u32) -> Result<u32> {
        let address = lock(&self.memory).alloc(length)?;
        let mut data = vec![0u8; length as usize];
        endpoint.pull(&mut data)?;
        lock(&self.memory).write(address, &data)?;
        Ok(address)
    }

    fn pointer_width(&self) -> PointerWidth {
        self.configuration.pointer_width()
    }
}

/// Rewrite the first implicit `Ptr` argument with a device address.
fn patch_pointer(call: &InvocationBody, address: u32, pointer: PointerWidth) -> Result<InvocationBody> {
    first_pointer_width(call, pointer)?;
    let width = pointer.bytes();
    let mut parameters = call.parameters.to_vec();
    parameters[..width].copy_from_slice(&address.to_le_bytes()[..width]);
    Ok(InvocationBody {
        parameters: Bytes::from(parameters),
        ..call.clone()
    })
}

/// Read the first parameter slot as a device address.
fn first_pointer(call: &InvocationBody, pointer: PointerWidth) -> Result<u32> {
    first_pointer_width(call, pointer)?;
    let value = WireType::Ptr
        .unpack(&call.parameters, pointer)
        .map_err(DeviceError::Wire)?;
    Ok(value as u32)
}

fn first_pointer_width(call: &InvocationBody, pointer: PointerWidth) -> Result<()> {
    let first_tag = (call.types & 0xF) as u8;
    if call.argc == 0 || WireType::from_tag(first_tag) != Some(WireType::Ptr) {
        return Err(DeviceError::MissingPointer);
    }
    if call.parameters.len() < pointer.bytes() {
        return Err(WireError::Truncated.into());
    }
    Ok(())
}
