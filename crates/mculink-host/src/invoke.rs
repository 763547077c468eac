//! Typed remote calls and bulk transfers against one device.
//!
//! Every operation is one transaction: the full packet goes out first,
//! any raw payload moves in the class's documented direction, and the
//! 12-byte result is always the last bytes on the wire.

use tracing::debug;

use mculink_transport::Endpoint;
use mculink_wire::{
    crc, fault, packet, ArgList, CallResult, PacketClass, WireType, LOADER_LOOKUP, LOADER_MODULE,
    MODULE_NOT_LOADED, RESULT_SIZE, USER_INVOCATION_BIT,
};

use crate::device::{lock, Device};
use crate::error::{latch, HostError, Result};

impl Device {
    /// Invoke `(module, function)` with typed arguments and return the
    /// normalized 64-bit result value.
    ///
    /// The class is standard unless `module` carries the
    /// user-invocation bit. Blocks until the device replies; a non-zero
    /// reply error is latched into the thread-local fault slot and
    /// surfaced as [`HostError::Device`].
    pub fn invoke(&self, module: u8, function: u8, ret: WireType, args: ArgList) -> Result<u64> {
        self.invoke_inner(module, function, ret, args).map_err(latch)
    }

    fn invoke_inner(&self, module: u8, function: u8, ret: WireType, args: ArgList) -> Result<u64> {
        debug!(module, function, ?ret, argc = args.len(), "invoke");
        let frame = packet::encode_invocation(module, function, ret, args, self.pointer_width())?;

        let mut channel = lock(&self.channel);
        channel.push(frame.as_bytes())?;
        surface(pull_result(&mut **channel)?)
    }

    /// Invoke a function in a module addressed by name. The index is
    /// resolved through the device's dynamic loader, so the call goes
    /// out as a user invocation.
    pub fn invoke_by_name(
        &self,
        module: &str,
        function: u8,
        ret: WireType,
        args: ArgList,
    ) -> Result<u64> {
        let index = self.module_index(crc::identifier(module))?;
        self.invoke(index | USER_INVOCATION_BIT, function, ret, args)
    }

    /// Ask the device's loader for the index of the module whose name
    /// hashes to `identifier`.
    pub fn module_index(&self, identifier: u16) -> Result<u8> {
        let mut args = ArgList::new();
        args.append(u64::from(identifier), WireType::U16)
            .map_err(HostError::from)
            .map_err(latch)?;
        let value = self.invoke(LOADER_MODULE, LOADER_LOOKUP, WireType::U16, args)?;
        if value as u16 == MODULE_NOT_LOADED {
            return Err(latch(HostError::NotLoaded(identifier)));
        }
        Ok(value as u8)
    }

    /// Push `data` into the device, then invoke `(module, function)`
    /// with the implicit `(ptr, length)` pair prepended to `args`.
    ///
    /// Wire order: packet, raw payload, result. A zero-length push
    /// short-circuits to success.
    pub fn push(&self, module: u8, function: u8, data: &[u8], args: ArgList) -> Result<u64> {
        self.push_inner(module, function, data, args).map_err(latch)
    }

    fn push_inner(&self, module: u8, function: u8, data: &[u8], args: ArgList) -> Result<u64> {
        if data.is_empty() {
            return Ok(0);
        }
        let length = data.len() as u32;
        let frame = packet::encode_push_pull(
            PacketClass::Push,
            module,
            function,
            WireType::Void,
            length,
            implicit_args(length, args)?,
            self.pointer_width(),
        )?;

        let mut channel = lock(&self.channel);
        channel.push(frame.as_bytes())?;
        channel.push(data)?;
        surface(pull_result(&mut **channel)?)
    }

    /// Invoke `(module, function)` with the implicit `(ptr, length)`
    /// pair, then pull `buf.len()` bytes the function produced.
    ///
    /// Wire order: packet out, raw payload back, result back.
    pub fn pull(&self, module: u8, function: u8, buf: &mut [u8], args: ArgList) -> Result<u64> {
        self.pull_inner(module, function, buf, args).map_err(latch)
    }

    fn pull_inner(&self, module: u8, function: u8, buf: &mut [u8], args: ArgList) -> Result<u64> {
        if buf.is_empty() {
            return Ok(0);
        }
        let length = buf.len() as u32;
        let frame = packet::encode_push_pull(
            PacketClass::Pull,
            module,
            function,
            WireType::Void,
            length,
            implicit_args(length, args)?,
            self.pointer_width(),
        )?;

        let mut channel = lock(&self.channel);
        channel.push(frame.as_bytes())?;
        channel.pull(buf)?;
        surface(pull_result(&mut **channel)?)
    }

    /// Copy `data` into freshly-allocated device memory and return its
    /// device address.
    pub fn send(&self, data: &[u8]) -> Result<u32> {
        self.transfer_in(PacketClass::Send, data).map_err(latch)
    }

    /// Stage an executable image into device RAM and return the load
    /// address.
    pub fn ram_load(&self, image: &[u8]) -> Result<u32> {
        self.transfer_in(PacketClass::RamLoad, image).map_err(latch)
    }

    fn transfer_in(&self, class: PacketClass, data: &[u8]) -> Result<u32> {
        if data.is_empty() {
            return Ok(0);
        }
        let frame = packet::encode_push_pull(
            class,
            0,
            0,
            WireType::Void,
            data.len() as u32,
            ArgList::new(),
            self.pointer_width(),
        )?;

        let mut channel = lock(&self.channel);
        channel.push(frame.as_bytes())?;
        channel.push(data)?;
        let value = surface(pull_result(&mut **channel)?)?;
        Ok(value as u32)
    }

    /// Copy `buf.len()` bytes out of device memory at `address`.
    pub fn receive(&self, address: u32, buf: &mut [u8]) -> Result<()> {
        self.receive_inner(address, buf).map_err(latch)
    }

    fn receive_inner(&self, address: u32, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let mut args = ArgList::new();
        args.append(u64::from(address), WireType::Ptr)?;
        let frame = packet::encode_push_pull(
            PacketClass::Receive,
            0,
            0,
            WireType::Void,
            buf.len() as u32,
            args,
            self.pointer_width(),
        )?;

        let mut channel = lock(&self.channel);
        channel.push(frame.as_bytes())?;
        channel.pull(buf)?;
        surface(pull_result(&mut **channel)?)?;
        Ok(())
    }
}

/// Prepend the implicit `(ptr placeholder, length)` pair a push/pull
/// call carries. The device patches the pointer once it has allocated
/// the transfer buffer.
fn implicit_args(length: u32, args: ArgList) -> Result<ArgList> {
    let mut merged = ArgList::new();
    merged.append(0, WireType::Ptr)?;
    merged.append(u64::from(length), WireType::U32)?;
    for arg in &args {
        merged.append(arg.value, arg.ty)?;
    }
    Ok(merged)
}

fn pull_result(endpoint: &mut dyn Endpoint) -> Result<CallResult> {
    let mut reply = [0u8; RESULT_SIZE];
    endpoint.pull(&mut reply)?;
    CallResult::decode(&reply).map_err(Into::into)
}

/// Surface a device reply: the value on success, the device's fault
/// (latched for `lf_error_get`) on failure.
fn surface(result: CallResult) -> Result<u64> {
    if result.is_ok() {
        Ok(result.value)
    } else {
        fault::raise(result.fault());
        Err(HostError::Device(result.fault()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use mculink_transport::{Result as TransportResult, TransportError};
    use mculink_wire::{Configuration, Fault, ATTRIBUTE_32_BIT, CONFIGURATION_SIZE, PACKET_SIZE};

    use super::*;
    use crate::device::attach_endpoint;

    /// Endpoint double that records every transfer direction in order,
    /// and replays scripted device replies.
    struct RecordingChannel {
        input: VecDeque<u8>,
        log: Arc<Mutex<Vec<(char, usize)>>>,
    }

    impl Endpoint for RecordingChannel {
        fn configure(&mut self) -> TransportResult<()> {
            Ok(())
        }

        fn push(&mut self, data: &[u8]) -> TransportResult<()> {
            self.log.lock().unwrap().push(('>', data.len()));
            Ok(())
        }

        fn pull(&mut self, buf: &mut [u8]) -> TransportResult<()> {
            self.log.lock().unwrap().push(('<', buf.len()));
            for slot in buf.iter_mut() {
                *slot = self.input.pop_front().ok_or(TransportError::Closed)?;
            }
            Ok(())
        }
    }

    fn scripted(replies: &[&[u8]]) -> (Box<RecordingChannel>, Arc<Mutex<Vec<(char, usize)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut input = VecDeque::new();
        for reply in replies {
            input.extend(reply.iter().copied());
        }
        (
            Box::new(RecordingChannel { input, log: Arc::clone(&log) }),
            log,
        )
    }

    fn configuration_reply() -> (Vec<u8>, Vec<u8>) {
        let config = Configuration::new("argon", 1, ATTRIBUTE_32_BIT).unwrap();
        (
            config.encode().to_vec(),
            CallResult::new(0, Fault::Ok).encode().to_vec(),
        )
    }

    #[test]
    fn invocation_wire_order_is_packet_then_result() {
        let (config, ok) = configuration_reply();
        let value = CallResult::new(7, Fault::Ok).encode().to_vec();
        let (channel, log) = scripted(&[&config, &ok, &value]);

        let device = attach_endpoint("argon", channel).unwrap();
        let value = device
            .invoke(1, 0, WireType::U8, ArgList::new())
            .unwrap();
        assert_eq!(value, 7);

        let log = log.lock().unwrap();
        // Attach: packet out, record in, result in. Invoke: packet out,
        // result in. No reply precedes its request.
        assert_eq!(
            log.as_slice(),
            &[
                ('>', PACKET_SIZE),
                ('<', CONFIGURATION_SIZE),
                ('<', RESULT_SIZE),
                ('>', PACKET_SIZE),
                ('<', RESULT_SIZE),
            ]
        );
    }

    #[test]
    fn push_sends_payload_between_packet_and_result() {
        let (config, ok) = configuration_reply();
        let done = CallResult::new(0, Fault::Ok).encode().to_vec();
        let (channel, log) = scripted(&[&config, &ok, &done]);

        let device = attach_endpoint("argon", channel).unwrap();
        device.push(2, 1, &[0xDE, 0xAD, 0xBE, 0xEF], ArgList::new()).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(
            log.as_slice()[3..],
            [('>', PACKET_SIZE), ('>', 4), ('<', RESULT_SIZE)]
        );
    }

    #[test]
    fn pull_reads_payload_before_result() {
        let (config, ok) = configuration_reply();
        let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let done = CallResult::new(0, Fault::Ok).encode().to_vec();
        let (channel, log) = scripted(&[&config, &ok, &payload, &done]);

        let device = attach_endpoint("argon", channel).unwrap();
        let mut buf = [0u8; 8];
        device.pull(3, 1, &mut buf, ArgList::new()).unwrap();
        assert_eq!(buf, payload);

        let log = log.lock().unwrap();
        assert_eq!(
            log.as_slice()[3..],
            [('>', PACKET_SIZE), ('<', 8), ('<', RESULT_SIZE)]
        );
    }

    #[test]
    fn device_fault_is_latched_and_surfaced() {
        let (config, ok) = configuration_reply();
        let failure = CallResult::new(0, Fault::Checksum).encode().to_vec();
        let (channel, _log) = scripted(&[&config, &ok, &failure]);

        let device = attach_endpoint("argon", channel).unwrap();
        fault::clear();
        let err = device
            .invoke(1, 0, WireType::Void, ArgList::new())
            .unwrap_err();

        assert!(matches!(err, HostError::Device(Fault::Checksum)));
        assert_eq!(fault::get(), Fault::Checksum);
    }

    #[test]
    fn zero_length_transfers_short_circuit() {
        let (config, ok) = configuration_reply();
        let (channel, log) = scripted(&[&config, &ok]);

        let device = attach_endpoint("argon", channel).unwrap();
        assert_eq!(device.push(2, 1, &[], ArgList::new()).unwrap(), 0);
        assert_eq!(device.send(&[]).unwrap(), 0);
        device.receive(0x2000_0000, &mut []).unwrap();

        // Nothing beyond the attach transaction hit the wire.
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn identifier_mismatch_fails_attach() {
        let (config, ok) = configuration_reply();
        let (channel, _log) = scripted(&[&config, &ok]);

        let err = attach_endpoint("boron", channel).unwrap_err();
        assert!(matches!(err, HostError::Identity(_)));
    }
}
