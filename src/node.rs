//! # RTU Node
//!
//! A [`ModbusNode`] is one end of an RS-485 link: the shared
//! [`ModbusBase`] plus a [`Role`] that decides what happens to received
//! frames and when the outbound queue may transmit.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use voltage_rtu::sim::{SimClock, SimSerial};
//! use voltage_rtu::{ModbusNode, ModbusStream, RtuConfig, RxSlot};
//!
//! # fn main() -> voltage_rtu::ModbusResult<()> {
//! let config = RtuConfig::default();
//! let stream = ModbusStream::new(SimSerial::new(), SimClock::new(), RxSlot::allocate(), &config);
//! let mut node = ModbusNode::slave(1, stream, config)?;
//!
//! if let Some(slave) = node.slave_mut() {
//!     slave.enable_holding_registers(16);
//!     slave.enable_coils((0..8).map(|a| (a, false)).collect::<BTreeMap<_, _>>(), false);
//! }
//!
//! loop {
//!     node.pump()?;
//! }
//! # }
//! ```

use std::time::Duration;

use tracing::{debug, info};

use crate::base::ModbusBase;
use crate::config::RtuConfig;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{Frame, FrameBuilder};
use crate::hal::{Clock, NoPin, OutputPin, SerialPort};
use crate::master::MasterState;
use crate::protocol::SlaveId;
use crate::slave::SlaveState;
use crate::stream::ModbusStream;

/// What a node does with the frames it receives
#[derive(Debug)]
pub enum Role {
    Master(MasterState),
    Slave(SlaveState),
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Master(_) => "master",
            Self::Slave(_) => "slave",
        }
    }
}

pub struct ModbusNode<S, C, P = NoPin> {
    base: ModbusBase<S, C, P>,
    role: Role,
}

impl<S, C, P> ModbusNode<S, C, P>
where
    S: SerialPort,
    C: Clock,
    P: OutputPin,
{
    pub fn new(base: ModbusBase<S, C, P>, role: Role) -> Self {
        Self { base, role }
    }

    /// Create a master on `stream`
    pub fn master(stream: ModbusStream<S, C, P>, config: RtuConfig) -> ModbusResult<Self> {
        config.validate()?;
        info!("Modbus RTU master on {} baud", config.baud_rate);
        Ok(Self::new(
            ModbusBase::new(stream, config),
            Role::Master(MasterState::new()),
        ))
    }

    /// Create a slave answering to `address` (1-247) on `stream`
    pub fn slave(
        address: SlaveId,
        stream: ModbusStream<S, C, P>,
        config: RtuConfig,
    ) -> ModbusResult<Self> {
        config.validate()?;
        let state = SlaveState::new(address)?;
        info!(
            "Modbus RTU slave {} on {} baud",
            address, config.baud_rate
        );
        Ok(Self::new(ModbusBase::new(stream, config), Role::Slave(state)))
    }

    #[inline]
    pub fn base(&self) -> &ModbusBase<S, C, P> {
        &self.base
    }

    #[inline]
    pub fn base_mut(&mut self) -> &mut ModbusBase<S, C, P> {
        &mut self.base
    }

    #[inline]
    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn is_master(&self) -> bool {
        matches!(self.role, Role::Master(_))
    }

    pub fn slave_state(&self) -> Option<&SlaveState> {
        match &self.role {
            Role::Slave(slave) => Some(slave),
            Role::Master(_) => None,
        }
    }

    pub fn slave_mut(&mut self) -> Option<&mut SlaveState> {
        match &mut self.role {
            Role::Slave(slave) => Some(slave),
            Role::Master(_) => None,
        }
    }

    /// Slave address, `None` for a master
    pub fn address(&self) -> Option<SlaveId> {
        self.slave_state().map(SlaveState::address)
    }

    /// One main-loop iteration: poll the link, route any received frame,
    /// transmit at most one queued frame, then check timeouts.
    ///
    /// Errors from handling or transmitting are returned after the whole
    /// iteration has run.
    pub fn pump(&mut self) -> ModbusResult<()> {
        let received = self.base.poll_link();
        match &mut self.role {
            Role::Master(master) => {
                if let Some(frame) = received {
                    if !master.on_frame(&frame) && !self.base.dispatch_transaction(&frame) {
                        debug!(
                            "Unsolicited frame: addr={} FC={:02X}",
                            frame.address, frame.function_code
                        );
                    }
                }

                let transmitted = if master.may_transmit() {
                    self.base.transmit_one()
                } else {
                    None
                };
                let written = match transmitted {
                    Some((frame, Ok(()))) => {
                        master.on_transmitted(&frame);
                        Ok(())
                    }
                    Some((frame, Err(e))) => {
                        if master.on_transmit_failed(&frame) {
                            self.base.counters_mut().record_no_response();
                        }
                        Err(e)
                    }
                    None => Ok(()),
                };

                let stream = self.base.stream();
                let (now, since_rx, t3_5) =
                    (stream.now_us(), stream.time_since_last_rx(), stream.t3_5_us());
                if master.check_timeout(now, since_rx, t3_5) {
                    self.base.counters_mut().record_no_response();
                }
                self.base.expire_transactions();

                written
            }
            Role::Slave(slave) => {
                let handled = match received {
                    Some(frame) => slave.on_frame(&frame, &mut self.base),
                    None => Ok(()),
                };
                let transmitted = self.base.transmit_next();
                handled?;
                transmitted.map(|_| ())
            }
        }
    }

    // ===== Master requests =====

    fn master_state(&self) -> ModbusResult<&MasterState> {
        match &self.role {
            Role::Master(master) => Ok(master),
            Role::Slave(_) => Err(ModbusError::RoleMismatch { expected: "master" }),
        }
    }

    /// Whether a request is awaiting its response
    pub fn is_request_pending(&self) -> bool {
        self.master_state()
            .is_ok_and(|master| master.is_request_pending())
    }

    /// Send `request` with the configured response timeout
    pub fn send_request(
        &self,
        request: &Frame,
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        self.send_request_with_timeout(request, handler, self.base.config().response_timeout)
    }

    /// Queue `request`, replacing any pending one. `handler` runs with the
    /// matching response (normal or exception); it is never called on
    /// timeout.
    pub fn send_request_with_timeout(
        &self,
        request: &Frame,
        handler: impl FnOnce(&Frame) + Send + 'static,
        timeout: Duration,
    ) -> ModbusResult<()> {
        self.master_state()?
            .send_request(request, Box::new(handler), timeout, &self.base)
    }

    pub fn send_read_coils(
        &self,
        slave: SlaveId,
        start: u16,
        count: u16,
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        let request = FrameBuilder::read_coils_request(slave, start, count)?;
        self.send_request(&request, handler)
    }

    pub fn send_read_discrete_inputs(
        &self,
        slave: SlaveId,
        start: u16,
        count: u16,
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        let request = FrameBuilder::read_discrete_inputs_request(slave, start, count)?;
        self.send_request(&request, handler)
    }

    pub fn send_read_holding_registers(
        &self,
        slave: SlaveId,
        start: u16,
        count: u16,
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        let request = FrameBuilder::read_holding_registers_request(slave, start, count)?;
        self.send_request(&request, handler)
    }

    pub fn send_read_input_registers(
        &self,
        slave: SlaveId,
        start: u16,
        count: u16,
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        let request = FrameBuilder::read_input_registers_request(slave, start, count)?;
        self.send_request(&request, handler)
    }

    pub fn send_read_single_coil(
        &self,
        slave: SlaveId,
        coil: u16,
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        self.send_read_coils(slave, coil, 1, handler)
    }

    pub fn send_read_single_discrete_input(
        &self,
        slave: SlaveId,
        input: u16,
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        self.send_read_discrete_inputs(slave, input, 1, handler)
    }

    pub fn send_read_single_holding_register(
        &self,
        slave: SlaveId,
        register: u16,
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        self.send_read_holding_registers(slave, register, 1, handler)
    }

    pub fn send_read_single_input_register(
        &self,
        slave: SlaveId,
        register: u16,
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        self.send_read_input_registers(slave, register, 1, handler)
    }

    pub fn send_write_single_coil(
        &self,
        slave: SlaveId,
        coil: u16,
        value: bool,
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        let request = FrameBuilder::write_single_coil_request(slave, coil, value)?;
        self.send_request(&request, handler)
    }

    pub fn send_write_single_register(
        &self,
        slave: SlaveId,
        register: u16,
        value: u16,
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        let request = FrameBuilder::write_single_register_request(slave, register, value)?;
        self.send_request(&request, handler)
    }

    pub fn send_write_multiple_coils(
        &self,
        slave: SlaveId,
        start: u16,
        values: &[bool],
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        let request = FrameBuilder::write_multiple_coils_request(slave, start, values)?;
        self.send_request(&request, handler)
    }

    pub fn send_write_multiple_registers(
        &self,
        slave: SlaveId,
        start: u16,
        values: &[u16],
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        let request = FrameBuilder::write_multiple_registers_request(slave, start, values)?;
        self.send_request(&request, handler)
    }

    /// Diagnostics (0x08) with a raw sub-function code
    pub fn send_diagnostic_request(
        &self,
        slave: SlaveId,
        sub_function: u16,
        data: u16,
        handler: impl FnOnce(&Frame) + Send + 'static,
    ) -> ModbusResult<()> {
        let request = FrameBuilder::diagnostics_request(slave, sub_function, data)?;
        self.send_request(&request, handler)
    }
}
