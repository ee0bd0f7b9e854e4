//! # Slave Role
//!
//! Function-code dispatch against a [`RegisterStore`].
//!
//! Every handler validates in the same order and stops at the first failure:
//!
//! 1. table enabled, else `ILLEGAL_FUNCTION`
//! 2. count within the function's bound (zero is never legal), else `ILLEGAL_DATA_VALUE`
//! 3. multi-writes only: byte count and payload length, else `ILLEGAL_DATA_VALUE`
//! 4. every addressed item exists, else `ILLEGAL_DATA_ADDRESS`
//! 5. execute and build the normal response
//!
//! Broadcast requests (address 0) are executed but never answered, not even
//! with an exception.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, trace};

use crate::base::ModbusBase;
use crate::constants::{
    COIL_OFF, COIL_ON, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_SLAVE_ADDRESS, MAX_WRITE_COILS,
    MAX_WRITE_REGISTERS, MIN_SLAVE_ADDRESS,
};
use crate::counters::DiagnosticCounters;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{Frame, FrameBuilder};
use crate::hal::{Clock, GpioBank, OutputPin, SerialPort};
use crate::protocol::{DiagnosticSubFunction, ExceptionCode, ModbusFunction, SlaveId};
use crate::store::RegisterStore;

type HandlerResult = Result<Frame, ExceptionCode>;

/// Start address and quantity carried in the first two payload words
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Range {
    start: u16,
    count: u16,
}

impl Range {
    fn parse(request: &Frame) -> Self {
        match (request.word(0), request.word(2)) {
            (Some(start), Some(count)) => Self { start, count },
            _ => Self::default(),
        }
    }

    #[inline]
    fn count_within(&self, max: u16) -> bool {
        (1..=max).contains(&self.count)
    }
}

/// State owned by a node in the slave role
pub struct SlaveState {
    address: SlaveId,
    store: RegisterStore,
    gpio: Option<Box<dyn GpioBank + Send>>,
    auto_sync_gpio: bool,
}

impl fmt::Debug for SlaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlaveState")
            .field("address", &self.address)
            .field("store", &self.store)
            .field("gpio", &self.gpio.is_some())
            .field("auto_sync_gpio", &self.auto_sync_gpio)
            .finish()
    }
}

impl SlaveState {
    /// `address` must be a unicast address (1-247)
    pub fn new(address: SlaveId) -> ModbusResult<Self> {
        if !(MIN_SLAVE_ADDRESS..=MAX_SLAVE_ADDRESS).contains(&address) {
            return Err(ModbusError::InvalidSlaveAddress { address });
        }
        Ok(Self {
            address,
            store: RegisterStore::new(),
            gpio: None,
            auto_sync_gpio: false,
        })
    }

    #[inline]
    pub fn address(&self) -> SlaveId {
        self.address
    }

    #[inline]
    pub fn store(&self) -> &RegisterStore {
        &self.store
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut RegisterStore {
        &mut self.store
    }

    /// Attach the GPIO bank used for coil mirroring
    pub fn set_gpio(&mut self, gpio: impl GpioBank + Send + 'static) {
        self.gpio = Some(Box::new(gpio));
    }

    pub fn enable_holding_registers(&mut self, size: u16) {
        self.store.enable_holding_registers(size);
    }

    pub fn enable_input_registers(&mut self, size: u16) {
        self.store.enable_input_registers(size);
    }

    /// Enable coils. With `auto_gpio`, coil `n` is mirrored onto GPIO pin
    /// `n` after every bus write, for pins the bank has.
    pub fn enable_coils(&mut self, initial: BTreeMap<u16, bool>, auto_gpio: bool) {
        self.auto_sync_gpio = auto_gpio;
        if auto_gpio {
            if let Some(gpio) = self.gpio.as_mut() {
                let pins = gpio.pin_count();
                for (&pin, &level) in initial.iter().filter(|(&pin, _)| pin < pins) {
                    gpio.init_output(pin);
                    gpio.write(pin, level);
                }
            }
        }
        self.store.enable_coils(initial);
    }

    pub fn enable_discrete_inputs(&mut self, initial: BTreeMap<u16, bool>) {
        self.store.enable_discrete_inputs(initial);
    }

    /// Drive every mirrored coil onto its GPIO pin
    pub fn update_gpio_outputs(&mut self) {
        if !self.auto_sync_gpio {
            return;
        }
        let (Some(gpio), Some(coils)) = (self.gpio.as_mut(), self.store.coils()) else {
            return;
        };
        let pins = gpio.pin_count();
        for (&pin, &level) in coils.iter().filter(|(&pin, _)| pin < pins) {
            gpio.write(pin, level);
        }
    }

    /// Handle a received frame on behalf of `base`: execute it, update the
    /// counters and callbacks, and queue the reply.
    pub(crate) fn on_frame<S, C, P>(
        &mut self,
        request: &Frame,
        base: &mut ModbusBase<S, C, P>,
    ) -> ModbusResult<()>
    where
        S: SerialPort,
        C: Clock,
        P: OutputPin,
    {
        let counters = base.counters();
        let Some(result) = self.handle_request(request, &counters) else {
            return Ok(());
        };
        let broadcast = request.is_broadcast();

        match result {
            Ok(response) => {
                base.counters_mut().record_slave_message();
                base.notify_message(request);
                if broadcast {
                    base.counters_mut().record_no_response();
                } else {
                    base.queue_write(&response)?;
                }
            }
            Err(code) => {
                debug!(
                    "Request FC={:02X} from master rejected: {}",
                    request.function_code, code
                );
                if broadcast {
                    base.counters_mut().record_no_response();
                } else {
                    base.counters_mut().record_exception();
                    let reply =
                        FrameBuilder::exception_response(self.address, request.function_code, code)?;
                    base.queue_write(&reply)?;
                }
            }
        }
        Ok(())
    }

    /// Execute a request against the store.
    ///
    /// `None` when the frame is addressed to another slave. Otherwise the
    /// normal response or the exception to report; the caller decides
    /// whether a reply goes out.
    pub fn handle_request(
        &mut self,
        request: &Frame,
        counters: &DiagnosticCounters,
    ) -> Option<HandlerResult> {
        if request.address != self.address && !request.is_broadcast() {
            trace!("Ignoring frame for slave {}", request.address);
            return None;
        }

        let range = Range::parse(request);
        let result = match ModbusFunction::from_u8(request.function_code) {
            Ok(ModbusFunction::ReadCoils) => self.read_coils(range),
            Ok(ModbusFunction::ReadDiscreteInputs) => self.read_discrete_inputs(range),
            Ok(ModbusFunction::ReadHoldingRegisters) => self.read_holding_registers(range),
            Ok(ModbusFunction::ReadInputRegisters) => self.read_input_registers(range),
            Ok(ModbusFunction::WriteSingleCoil) => self.write_single_coil(request),
            Ok(ModbusFunction::WriteSingleRegister) => self.write_single_register(request),
            Ok(ModbusFunction::WriteMultipleCoils) => self.write_multiple_coils(request, range),
            Ok(ModbusFunction::WriteMultipleRegisters) => {
                self.write_multiple_registers(request, range)
            }
            Ok(ModbusFunction::Diagnostics) => self.diagnostics(request, counters),
            Err(_) => Err(ExceptionCode::IllegalFunction),
        };
        Some(result)
    }

    // ===== Handlers =====

    fn read_coils(&self, range: Range) -> HandlerResult {
        let coils = self.store.coils().ok_or(ExceptionCode::IllegalFunction)?;
        if !range.count_within(MAX_READ_COILS) {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let bits = RegisterStore::read_bits(coils, range.start, range.count)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        FrameBuilder::read_coils_response(self.address, &bits).map_err(build_failure)
    }

    fn read_discrete_inputs(&self, range: Range) -> HandlerResult {
        let inputs = self
            .store
            .discrete_inputs()
            .ok_or(ExceptionCode::IllegalFunction)?;
        if !range.count_within(MAX_READ_COILS) {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let bits = RegisterStore::read_bits(inputs, range.start, range.count)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        FrameBuilder::read_discrete_inputs_response(self.address, &bits).map_err(build_failure)
    }

    fn read_holding_registers(&self, range: Range) -> HandlerResult {
        if !self.store.is_holding_registers_enabled() {
            return Err(ExceptionCode::IllegalFunction);
        }
        if !range.count_within(MAX_READ_REGISTERS) {
            return Err(ExceptionCode::IllegalDataValue);
        }
        if !self.store.check_hregister_exist(range.start, range.count) {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        let values = self
            .store
            .read_holding(range.start, range.count)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        FrameBuilder::read_registers_response(
            self.address,
            ModbusFunction::ReadHoldingRegisters,
            values,
        )
        .map_err(build_failure)
    }

    fn read_input_registers(&self, range: Range) -> HandlerResult {
        if !self.store.is_input_registers_enabled() {
            return Err(ExceptionCode::IllegalFunction);
        }
        if !range.count_within(MAX_READ_REGISTERS) {
            return Err(ExceptionCode::IllegalDataValue);
        }
        if !self.store.check_iregister_exist(range.start, range.count) {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        let values = self
            .store
            .read_input(range.start, range.count)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        FrameBuilder::read_registers_response(
            self.address,
            ModbusFunction::ReadInputRegisters,
            values,
        )
        .map_err(build_failure)
    }

    fn write_single_coil(&mut self, request: &Frame) -> HandlerResult {
        if !self.store.is_coils_enabled() {
            return Err(ExceptionCode::IllegalFunction);
        }
        let (Some(coil), Some(raw)) = (request.word(0), request.word(2)) else {
            return Err(ExceptionCode::IllegalDataValue);
        };
        let value = match raw {
            COIL_ON => true,
            COIL_OFF => false,
            _ => return Err(ExceptionCode::IllegalDataValue),
        };
        self.store
            .set_coil(coil, value)
            .map_err(|_| ExceptionCode::IllegalDataAddress)?;
        self.update_gpio_outputs();
        FrameBuilder::write_single_coil_response(self.address, coil, value).map_err(build_failure)
    }

    fn write_single_register(&mut self, request: &Frame) -> HandlerResult {
        if !self.store.is_holding_registers_enabled() {
            return Err(ExceptionCode::IllegalFunction);
        }
        let (Some(register), Some(value)) = (request.word(0), request.word(2)) else {
            return Err(ExceptionCode::IllegalDataValue);
        };
        self.store
            .set_holding_register(register, value)
            .map_err(|_| ExceptionCode::IllegalDataAddress)?;
        FrameBuilder::write_single_register_response(self.address, register, value)
            .map_err(build_failure)
    }

    fn write_multiple_coils(&mut self, request: &Frame, range: Range) -> HandlerResult {
        if !self.store.is_coils_enabled() {
            return Err(ExceptionCode::IllegalFunction);
        }
        if !range.count_within(MAX_WRITE_COILS) {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let expected = range.count.div_ceil(8) as usize;
        let data = byte_counted_data(request, expected)?;
        if !self.store.check_coils_exist(range.start, range.count) {
            return Err(ExceptionCode::IllegalDataAddress);
        }

        for i in 0..range.count {
            let bit = (data[(i / 8) as usize] >> (i % 8)) & 0x01 != 0;
            self.store
                .set_coil(range.start + i, bit)
                .map_err(|_| ExceptionCode::IllegalDataAddress)?;
        }
        self.update_gpio_outputs();
        FrameBuilder::write_multiple_coils_response(self.address, range.start, range.count)
            .map_err(build_failure)
    }

    fn write_multiple_registers(&mut self, request: &Frame, range: Range) -> HandlerResult {
        if !self.store.is_holding_registers_enabled() {
            return Err(ExceptionCode::IllegalFunction);
        }
        if !range.count_within(MAX_WRITE_REGISTERS) {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let data = byte_counted_data(request, range.count as usize * 2)?;
        if !self.store.check_hregister_exist(range.start, range.count) {
            return Err(ExceptionCode::IllegalDataAddress);
        }

        let values: Vec<u16> = data
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        if !self.store.write_holding(range.start, &values) {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        FrameBuilder::write_multiple_registers_response(self.address, range.start, range.count)
            .map_err(build_failure)
    }

    fn diagnostics(&self, request: &Frame, counters: &DiagnosticCounters) -> HandlerResult {
        let (Some(sub_function), Some(data)) = (request.word(0), request.word(2)) else {
            return Err(ExceptionCode::IllegalDataValue);
        };
        let sub = DiagnosticSubFunction::from_u16(sub_function)
            .ok_or(ExceptionCode::IllegalFunction)?;
        let value = counters.get(sub).unwrap_or(data);
        FrameBuilder::diagnostics_response(self.address, sub, value).map_err(build_failure)
    }
}

/// Data bytes of a multi-write after validating the byte-count field
fn byte_counted_data(request: &Frame, expected: usize) -> Result<&[u8], ExceptionCode> {
    let byte_count = *request
        .payload
        .get(4)
        .ok_or(ExceptionCode::IllegalDataValue)? as usize;
    if byte_count != expected {
        return Err(ExceptionCode::IllegalDataValue);
    }
    request
        .payload
        .get(5..5 + byte_count)
        .ok_or(ExceptionCode::IllegalDataValue)
}

fn build_failure(e: ModbusError) -> ExceptionCode {
    debug!("Failed to build response: {}", e);
    ExceptionCode::SlaveDeviceFailure
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::sim::SimGpio;

    fn slave() -> SlaveState {
        let mut slave = SlaveState::new(2).unwrap();
        slave.enable_holding_registers(4);
        slave.enable_input_registers(2);
        slave.enable_coils((0..10).map(|a| (a, false)).collect(), false);
        slave.enable_discrete_inputs([(0, true), (1, false), (2, true)].into_iter().collect());
        slave
    }

    fn handle(slave: &mut SlaveState, request: &Frame) -> HandlerResult {
        slave
            .handle_request(request, &DiagnosticCounters::default())
            .unwrap()
    }

    #[test]
    fn test_address_validation() {
        assert_eq!(
            SlaveState::new(0).unwrap_err(),
            ModbusError::InvalidSlaveAddress { address: 0 }
        );
        assert!(SlaveState::new(248).is_err());
        assert!(SlaveState::new(1).is_ok());
        assert_eq!(SlaveState::new(247).unwrap().address(), 247);
    }

    #[test]
    fn test_ignores_other_slaves() {
        let mut slave = slave();
        let request = FrameBuilder::read_holding_registers_request(3, 0, 1).unwrap();
        assert!(slave
            .handle_request(&request, &DiagnosticCounters::default())
            .is_none());
    }

    #[test]
    fn test_read_holding_registers() {
        let mut slave = slave();
        slave.store_mut().set_holding_register(0, 42).unwrap();
        let request = FrameBuilder::read_holding_registers_request(2, 0, 1).unwrap();
        let response = handle(&mut slave, &request).unwrap();
        assert_eq!(response.function_code, 0x03);
        assert_eq!(response.payload.as_slice(), &[0x02, 0x00, 0x2A]);
    }

    #[test]
    fn test_count_zero_is_illegal_value() {
        let mut slave = slave();
        for request in [
            FrameBuilder::read_holding_registers_request(2, 0, 0).unwrap(),
            FrameBuilder::read_holding_registers_request(2, 4, 0).unwrap(),
            FrameBuilder::read_input_registers_request(2, 0, 0).unwrap(),
            FrameBuilder::read_coils_request(2, 0, 0).unwrap(),
            FrameBuilder::read_discrete_inputs_request(2, 0, 0).unwrap(),
            FrameBuilder::write_multiple_registers_request(2, 0, &[]).unwrap(),
            FrameBuilder::write_multiple_coils_request(2, 0, &[]).unwrap(),
        ] {
            assert_eq!(
                handle(&mut slave, &request),
                Err(ExceptionCode::IllegalDataValue),
                "FC {:02X}",
                request.function_code
            );
        }
    }

    #[test]
    fn test_count_upper_bounds() {
        let mut slave = slave();
        let over = FrameBuilder::read_holding_registers_request(2, 0, 126).unwrap();
        assert_eq!(handle(&mut slave, &over), Err(ExceptionCode::IllegalDataValue));
        let at_limit = FrameBuilder::read_holding_registers_request(2, 0, 125).unwrap();
        assert_eq!(
            handle(&mut slave, &at_limit),
            Err(ExceptionCode::IllegalDataAddress)
        );
        let coils = FrameBuilder::read_coils_request(2, 0, 2001).unwrap();
        assert_eq!(handle(&mut slave, &coils), Err(ExceptionCode::IllegalDataValue));
    }

    #[test]
    fn test_disabled_table_is_illegal_function() {
        let mut slave = SlaveState::new(2).unwrap();
        let request = FrameBuilder::read_input_registers_request(2, 0, 0).unwrap();
        assert_eq!(handle(&mut slave, &request), Err(ExceptionCode::IllegalFunction));
        let request = FrameBuilder::write_single_coil_request(2, 0, true).unwrap();
        assert_eq!(handle(&mut slave, &request), Err(ExceptionCode::IllegalFunction));
    }

    #[test]
    fn test_unknown_function() {
        let mut slave = slave();
        let request = Frame::new(2, 0x2B, &[0x0E, 0x01, 0x00]).unwrap();
        assert_eq!(handle(&mut slave, &request), Err(ExceptionCode::IllegalFunction));
    }

    #[test]
    fn test_read_coils_and_discrete_inputs() {
        let mut slave = slave();
        slave.store_mut().set_coil(0, true).unwrap();
        slave.store_mut().set_coil(9, true).unwrap();
        let response = handle(
            &mut slave,
            &FrameBuilder::read_coils_request(2, 0, 10).unwrap(),
        )
        .unwrap();
        assert_eq!(response.payload.as_slice(), &[0x02, 0x01, 0x02]);

        let response = handle(
            &mut slave,
            &FrameBuilder::read_discrete_inputs_request(2, 0, 3).unwrap(),
        )
        .unwrap();
        assert_eq!(response.payload.as_slice(), &[0x01, 0x05]);

        let missing = FrameBuilder::read_discrete_inputs_request(2, 2, 2).unwrap();
        assert_eq!(
            handle(&mut slave, &missing),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn test_write_single_coil() {
        let mut slave = slave();
        let request = FrameBuilder::write_single_coil_request(2, 3, true).unwrap();
        let response = handle(&mut slave, &request).unwrap();
        assert_eq!(response, request);
        assert_eq!(slave.store().get_coil(3), Ok(true));

        let bad_value = Frame::new(2, 0x05, &[0x00, 0x03, 0x12, 0x34]).unwrap();
        assert_eq!(
            handle(&mut slave, &bad_value),
            Err(ExceptionCode::IllegalDataValue)
        );
        let short = Frame::new(2, 0x05, &[0x00, 0x03]).unwrap();
        assert_eq!(handle(&mut slave, &short), Err(ExceptionCode::IllegalDataValue));
        let missing = FrameBuilder::write_single_coil_request(2, 50, true).unwrap();
        assert_eq!(
            handle(&mut slave, &missing),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn test_write_single_register() {
        let mut slave = slave();
        let request = FrameBuilder::write_single_register_request(2, 3, 0xBEEF).unwrap();
        assert_eq!(handle(&mut slave, &request).unwrap(), request);
        assert_eq!(slave.store().get_holding_register(3), Ok(0xBEEF));

        let out_of_range = FrameBuilder::write_single_register_request(2, 4, 1).unwrap();
        assert_eq!(
            handle(&mut slave, &out_of_range),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn test_write_multiple_registers() {
        let mut slave = slave();
        let request =
            FrameBuilder::write_multiple_registers_request(2, 1, &[0x0102, 0x0304]).unwrap();
        let response = handle(&mut slave, &request).unwrap();
        assert_eq!(response.payload.as_slice(), &[0x00, 0x01, 0x00, 0x02]);
        assert_eq!(slave.store().holding_registers(), Some(&[0, 0x0102, 0x0304, 0][..]));

        let too_far = FrameBuilder::write_multiple_registers_request(2, 3, &[1, 2]).unwrap();
        assert_eq!(
            handle(&mut slave, &too_far),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn test_multi_write_byte_count_checked_before_address() {
        let mut slave = slave();
        // start=100 does not exist, but the byte count is wrong first
        let bad_count = Frame::new(2, 0x10, &[0x00, 0x64, 0x00, 0x02, 0x03, 0, 1, 0, 2]).unwrap();
        assert_eq!(
            handle(&mut slave, &bad_count),
            Err(ExceptionCode::IllegalDataValue)
        );
        let truncated = Frame::new(2, 0x10, &[0x00, 0x00, 0x00, 0x02, 0x04, 0, 1]).unwrap();
        assert_eq!(
            handle(&mut slave, &truncated),
            Err(ExceptionCode::IllegalDataValue)
        );
        let coils = Frame::new(2, 0x0F, &[0x00, 0x00, 0x00, 0x09, 0x01, 0xFF]).unwrap();
        assert_eq!(handle(&mut slave, &coils), Err(ExceptionCode::IllegalDataValue));
    }

    #[test]
    fn test_write_multiple_coils() {
        let mut slave = slave();
        let values = [true, false, true, true, false, false, true, true, true];
        let request = FrameBuilder::write_multiple_coils_request(2, 1, &values).unwrap();
        let response = handle(&mut slave, &request).unwrap();
        assert_eq!(response.payload.as_slice(), &[0x00, 0x01, 0x00, 0x09]);
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(slave.store().get_coil(1 + i as u16), Ok(v));
        }
    }

    #[test]
    fn test_diagnostics() {
        let mut slave = slave();
        let counters = DiagnosticCounters {
            slave_message: 5,
            bus_character_overrun: 2,
            ..Default::default()
        };

        let echo = FrameBuilder::diagnostics_request(2, 0x0000, 0xA537).unwrap();
        let response = slave.handle_request(&echo, &counters).unwrap().unwrap();
        assert_eq!(response.payload.as_slice(), &[0x00, 0x00, 0xA5, 0x37]);

        let count = FrameBuilder::diagnostics_request(2, 0x000E, 0).unwrap();
        let response = slave.handle_request(&count, &counters).unwrap().unwrap();
        assert_eq!(response.word(2), Some(5));

        let overrun = FrameBuilder::diagnostics_request(2, 0x0012, 0).unwrap();
        let response = slave.handle_request(&overrun, &counters).unwrap().unwrap();
        assert_eq!(response.word(2), Some(2));

        let unknown = FrameBuilder::diagnostics_request(2, 0x0001, 0).unwrap();
        assert_eq!(
            slave.handle_request(&unknown, &counters).unwrap(),
            Err(ExceptionCode::IllegalFunction)
        );

        let short = Frame::new(2, 0x08, &[0x00]).unwrap();
        assert_eq!(
            slave.handle_request(&short, &counters).unwrap(),
            Err(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn test_broadcast_is_executed() {
        let mut slave = slave();
        let request = FrameBuilder::write_single_register_request(0, 1, 77).unwrap();
        assert!(handle(&mut slave, &request).is_ok());
        assert_eq!(slave.store().get_holding_register(1), Ok(77));
    }

    #[test]
    fn test_gpio_mirroring() {
        let gpio = SimGpio::new(30);
        let mut slave = SlaveState::new(2).unwrap();
        slave.set_gpio(gpio.clone());
        slave.enable_coils([(5, true), (28, false), (40, true)].into_iter().collect(), true);

        assert!(gpio.is_output(5));
        assert_eq!(gpio.level(5), Some(true));
        assert_eq!(gpio.level(28), Some(false));

        let request = FrameBuilder::write_single_coil_request(2, 28, true).unwrap();
        handle(&mut slave, &request).unwrap();
        assert_eq!(gpio.level(28), Some(true));
        assert_eq!(slave.store().get_coil(40), Ok(true));

        slave.store_mut().set_coil(5, false).unwrap();
        assert_eq!(gpio.level(5), Some(true));
        slave.update_gpio_outputs();
        assert_eq!(gpio.level(5), Some(false));
    }

    #[test]
    fn test_gpio_not_driven_without_auto_sync() {
        let gpio = SimGpio::new(30);
        let mut slave = SlaveState::new(2).unwrap();
        slave.set_gpio(gpio.clone());
        slave.enable_coils([(3, true)].into_iter().collect(), false);
        let request = FrameBuilder::write_single_coil_request(2, 3, false).unwrap();
        handle(&mut slave, &request).unwrap();
        slave.update_gpio_outputs();
        assert_eq!(gpio.level(3), None);
        assert!(!gpio.is_output(3));
    }
}
