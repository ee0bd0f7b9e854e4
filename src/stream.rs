//! # RTU Link Layer
//!
//! Frame acquisition is split across two execution contexts:
//!
//! - **Interrupt context**: [`RxSlot::on_byte`] runs once per received
//!   character. It appends to a fixed buffer, enforces the T1.5
//!   inter-character limit and suppresses the echo of our own transmission.
//!   It never logs, allocates or blocks.
//! - **Main loop**: [`ModbusStream::process_if_ready`] is polled
//!   cooperatively. Once the line has been silent for T3.5 the buffered bytes
//!   are promoted to a frame (or reported as a link error).
//!
//! Each hardware UART owns one statically allocated slot in [`RX_SLOTS`]. A
//! board's UART interrupt vector forwards to [`on_uart_byte`] with its UART
//! index; no dynamic dispatch sits between the vector and the buffer.
//!
//! Transmission is blocking and half-duplex: the receive interrupt is masked,
//! the bus is left idle for T3.5, the transceiver is switched to drive mode,
//! the frame is written and flushed, then the transceiver returns to receive
//! mode.

use core::cell::RefCell;

use critical_section::Mutex;
use tracing::{debug, trace};

use crate::checksum;
use crate::config::{RtuConfig, Timing};
use crate::constants::{MIN_FRAME_SIZE, RX_BUFFER_SIZE, UART_COUNT};
use crate::error::ModbusResult;
use crate::frame::{Frame, WireBuffer};
use crate::hal::{Clock, NoPin, OutputPin, SerialPort};

/// Hardware receive error flagged alongside a character
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    Framing,
    Parity,
    Overrun,
    Break,
}

/// Outcome of a silence poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A frame with a valid CRC
    Frame(Frame),
    /// Under-length capture (placeholder frame) or CRC mismatch (parsed frame)
    Error(Frame),
}

struct RxState {
    buf: [u8; RX_BUFFER_SIZE],
    len: usize,
    last_byte_us: u64,
    received_any: bool,
    tx_in_progress: bool,
    t1_5_us: u32,
    /// Line errors and buffer overflows since the last drain
    faults: u16,
}

impl RxState {
    const fn new() -> Self {
        Self {
            buf: [0; RX_BUFFER_SIZE],
            len: 0,
            last_byte_us: 0,
            received_any: false,
            tx_in_progress: false,
            t1_5_us: 0,
            faults: 0,
        }
    }
}

/// Receive state shared between a UART interrupt and the main loop
pub struct RxSlot {
    state: Mutex<RefCell<RxState>>,
}

/// One receive slot per hardware UART
pub static RX_SLOTS: [RxSlot; UART_COUNT] = [RxSlot::new(), RxSlot::new()];

/// Interrupt entry point: route a received character to its UART's slot.
///
/// Out-of-range UART indices are ignored.
#[inline]
pub fn on_uart_byte(uart: usize, byte: u8, error: Option<LineError>, now_us: u64) {
    if let Some(slot) = RX_SLOTS.get(uart) {
        slot.on_byte(byte, error, now_us);
    }
}

impl Default for RxSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl RxSlot {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(RxState::new())),
        }
    }

    /// Heap-allocate a slot that lives for the rest of the program.
    ///
    /// For hosts and tests that create links at runtime instead of binding
    /// them to [`RX_SLOTS`].
    pub fn allocate() -> &'static Self {
        Box::leak(Box::new(Self::new()))
    }

    /// Per-character handler, called from interrupt context
    pub fn on_byte(&self, byte: u8, error: Option<LineError>, now_us: u64) {
        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);

            if st.tx_in_progress {
                return;
            }

            // A T1.5 gap ends the partial frame. This is framing, not a
            // line fault, so `faults` is left alone.
            if st.len > 0 && now_us.saturating_sub(st.last_byte_us) >= u64::from(st.t1_5_us) {
                st.len = 0;
            }

            st.last_byte_us = now_us;
            st.received_any = true;

            if error.is_some() {
                st.len = 0;
                st.faults = st.faults.wrapping_add(1);
                return;
            }

            if st.len >= RX_BUFFER_SIZE {
                st.len = 0;
                st.faults = st.faults.wrapping_add(1);
            }

            let idx = st.len;
            st.buf[idx] = byte;
            st.len += 1;
        });
    }

    /// Number of bytes captured for the frame in progress
    pub fn buffered_len(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).len)
    }

    pub fn is_transmitting(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).tx_in_progress)
    }

    /// Reset the slot and load the inter-character limit
    pub fn configure(&self, timing: Timing) {
        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            *st = RxState::new();
            st.t1_5_us = timing.t1_5_us;
        });
    }

    /// Remove the buffered bytes if the line has been silent for `t3_5_us`
    fn take_if_silent(&self, now_us: u64, t3_5_us: u32) -> Option<WireBuffer> {
        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            if st.len == 0 || now_us.saturating_sub(st.last_byte_us) < u64::from(t3_5_us) {
                return None;
            }
            let captured = WireBuffer::from_slice(&st.buf[..st.len]).ok();
            st.len = 0;
            captured
        })
    }

    fn begin_transmit(&self) {
        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            st.tx_in_progress = true;
            st.len = 0;
        });
    }

    fn end_transmit(&self) {
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).tx_in_progress = false;
        });
    }

    fn last_byte_us(&self) -> Option<u64> {
        critical_section::with(|cs| {
            let st = self.state.borrow_ref(cs);
            st.received_any.then_some(st.last_byte_us)
        })
    }

    fn take_faults(&self) -> u16 {
        critical_section::with(|cs| core::mem::take(&mut self.state.borrow_ref_mut(cs).faults))
    }
}

/// Turn a silence-delimited capture into a link event.
///
/// All-zero captures are line noise from an undriven bus and yield nothing.
pub fn promote(captured: &[u8]) -> Option<LinkEvent> {
    if captured.iter().all(|&b| b == 0) {
        trace!("Discarding {} bytes of idle-line noise", captured.len());
        return None;
    }

    if captured.len() < MIN_FRAME_SIZE {
        debug!("Discarding short RTU frame: {} bytes", captured.len());
        return Some(LinkEvent::Error(Frame::empty()));
    }

    match Frame::from_wire(captured) {
        Ok(frame) if checksum::verify(&frame) => Some(LinkEvent::Frame(frame)),
        Ok(frame) => {
            debug!(
                "CRC mismatch: addr={} FC={:02X} received=0x{:04X}",
                frame.address, frame.function_code, frame.crc
            );
            Some(LinkEvent::Error(frame))
        }
        Err(e) => {
            debug!("Unparseable RTU frame: {}", e);
            Some(LinkEvent::Error(Frame::empty()))
        }
    }
}

/// Main-loop side of one RTU link
pub struct ModbusStream<S, C, P = NoPin> {
    serial: S,
    clock: C,
    slot: &'static RxSlot,
    timing: Timing,
    /// Driver enable, active high
    de_pin: Option<P>,
    /// Receiver enable, active low
    re_pin: Option<P>,
}

impl<S, C> ModbusStream<S, C, NoPin>
where
    S: SerialPort,
    C: Clock,
{
    /// Link without direction pins (auto-direction transceiver)
    pub fn new(serial: S, clock: C, slot: &'static RxSlot, config: &RtuConfig) -> Self {
        Self::with_direction_pins(serial, clock, slot, config, None, None)
    }
}

impl<S, C, P> ModbusStream<S, C, P>
where
    S: SerialPort,
    C: Clock,
    P: OutputPin,
{
    /// Link with optional DE/RE transceiver control pins. The transceiver
    /// starts in receive mode and the receive interrupt is enabled.
    pub fn with_direction_pins(
        mut serial: S,
        clock: C,
        slot: &'static RxSlot,
        config: &RtuConfig,
        de_pin: Option<P>,
        re_pin: Option<P>,
    ) -> Self {
        let timing = config.timing();
        slot.configure(timing);
        serial.set_rx_interrupt(true);

        let mut stream = Self {
            serial,
            clock,
            slot,
            timing,
            de_pin,
            re_pin,
        };
        stream.set_drive(false);
        debug!(
            "RTU link ready: baud={} parity={:?} T1.5={}us T3.5={}us",
            config.baud_rate, config.parity, timing.t1_5_us, timing.t3_5_us
        );
        stream
    }

    #[inline]
    pub fn timing(&self) -> Timing {
        self.timing
    }

    #[inline]
    pub fn t3_5_us(&self) -> u32 {
        self.timing.t3_5_us
    }

    #[inline]
    pub fn now_us(&self) -> u64 {
        self.clock.now_us()
    }

    #[inline]
    pub fn slot(&self) -> &'static RxSlot {
        self.slot
    }

    /// Microseconds since the last received character; `u64::MAX` if none yet
    pub fn time_since_last_rx(&self) -> u64 {
        match self.slot.last_byte_us() {
            Some(last) => self.clock.now_us().saturating_sub(last),
            None => u64::MAX,
        }
    }

    /// Line errors and receive-buffer overflows since the previous call
    pub fn take_line_faults(&self) -> u16 {
        self.slot.take_faults()
    }

    /// Silence poll: promote the buffered bytes once T3.5 has elapsed.
    ///
    /// The receive buffer is already reset when this returns.
    pub fn process_if_ready(&mut self) -> Option<LinkEvent> {
        let captured = self
            .slot
            .take_if_silent(self.clock.now_us(), self.timing.t3_5_us)?;
        promote(&captured)
    }

    /// Blocking half-duplex transmission of one frame.
    ///
    /// Receive mode and the receive interrupt are restored even when the
    /// serial write fails.
    pub fn write(&mut self, frame: &Frame) -> ModbusResult<()> {
        self.serial.set_rx_interrupt(false);
        self.slot.begin_transmit();
        while self.serial.is_readable() {
            if self.serial.read_byte().is_none() {
                break;
            }
        }

        self.clock.delay_us(self.timing.t3_5_us);

        self.set_drive(true);
        let result = self
            .serial
            .write_all(&frame.to_bytes())
            .and_then(|_| self.serial.flush());
        self.set_drive(false);

        self.slot.end_transmit();
        self.serial.set_rx_interrupt(true);

        if result.is_ok() {
            trace!(
                "TX {} bytes: addr={} FC={:02X}",
                frame.wire_len(),
                frame.address,
                frame.function_code
            );
        }
        result
    }

    fn set_drive(&mut self, drive: bool) {
        if let Some(de) = self.de_pin.as_mut() {
            de.set_level(drive);
        }
        if let Some(re) = self.re_pin.as_mut() {
            re.set_level(drive);
        }
    }
}
