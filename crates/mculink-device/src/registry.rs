use std::sync::Arc;

use mculink_wire::{crc, WireType, MODULE_NOT_LOADED, USER_INVOCATION_BIT};

use crate::error::{DeviceError, Result};

/// A native function entry point.
///
/// Arguments arrive widened to 64 bits, in call order; the raw return
/// register value is a `u64`. Entries that fail at runtime raise a
/// fault through [`mculink_wire::fault::raise`] and return whatever
/// they like; the fault slot decides the reply's error field.
pub type Entry = Arc<dyn Fn(&[u64]) -> u64 + Send + Sync>;

/// One function in a module's ordered table.
pub struct Function {
    pub entry: Entry,
    pub parameters: Vec<WireType>,
    pub ret: WireType,
}

impl Function {
    pub fn new(
        entry: impl Fn(&[u64]) -> u64 + Send + Sync + 'static,
        parameters: Vec<WireType>,
        ret: WireType,
    ) -> Self {
        Self {
            entry: Arc::new(entry),
            parameters,
            ret,
        }
    }

    pub fn arity(&self) -> u8 {
        self.parameters.len() as u8
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("parameters", &self.parameters)
            .field("ret", &self.ret)
            .finish()
    }
}

/// A named, indexable table of function entry points.
#[derive(Debug)]
pub struct Module {
    name: String,
    identifier: u16,
    index: u8,
    functions: Vec<Function>,
}

impl Module {
    /// Bounded name: 15 bytes plus the NUL terminator on the wire.
    pub const NAME_CAPACITY: usize = 15;

    pub fn new(name: &str, functions: Vec<Function>) -> Result<Module> {
        if name.len() > Self::NAME_CAPACITY {
            return Err(DeviceError::Name(name.to_string()));
        }
        Ok(Module {
            name: name.to_string(),
            // The identifier hashes the terminator too, matching what
            // host-side shims compute at bind time.
            identifier: crc::identifier(name),
            index: 0,
            functions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    /// Index assigned at registration. Stable for the registry's
    /// lifetime.
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn function(&self, index: u8) -> Option<&Function> {
        self.functions.get(usize::from(index))
    }
}

/// The device's module table.
///
/// Lookup is by integer `(module index, function index)`; the parallel
/// identifier map serves the dynamic loader so host shims can locate a
/// module by the CRC of its name.
#[derive(Debug, Default)]
pub struct Registry {
    modules: Vec<Module>,
}

impl Registry {
    /// Highest assignable module index; bit 7 marks user invocations.
    const MAX_INDEX: usize = (USER_INVOCATION_BIT - 1) as usize;

    pub fn new() -> Self {
        Self { modules: Vec::new() }
    }

    /// Register a module and assign its index.
    pub fn register(&mut self, mut module: Module) -> Result<u8> {
        if self.modules.len() > Self::MAX_INDEX {
            return Err(DeviceError::RegistryFull);
        }
        let index = self.modules.len() as u8;
        module.index = index;
        self.modules.push(module);
        Ok(index)
    }

    /// Look up a module by wire index. The user-invocation bit is
    /// ignored: loaded modules share the table with built-ins.
    pub fn module(&self, index: u8) -> Result<&Module> {
        let masked = index & !USER_INVOCATION_BIT;
        self.modules
            .get(usize::from(masked))
            .ok_or(DeviceError::NoModule(index))
    }

    /// Look up a function by `(module, function)` wire indices.
    pub fn function(&self, module: u8, function: u8) -> Result<&Function> {
        let found = self.module(module)?;
        found
            .function(function)
            .ok_or(DeviceError::NoFunction { module, function })
    }

    /// Reverse lookup for the dynamic loader: module index by name CRC.
    /// Returns [`MODULE_NOT_LOADED`] when nothing matches.
    pub fn index_of(&self, identifier: u16) -> u16 {
        self.modules
            .iter()
            .find(|module| module.identifier == identifier)
            .map(|module| u16::from(module.index))
            .unwrap_or(MODULE_NOT_LOADED)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
