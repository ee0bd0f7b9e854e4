//! Host-side simulation of the hardware capabilities
//!
//! Every handle is cheaply cloneable and shares its state, so a test can keep
//! one clone to inspect or drive the line while the stack owns another.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ModbusError, ModbusResult};
use crate::hal::{Clock, GpioBank, OutputPin, SerialPort};
use crate::stream::RxSlot;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Manually advanced microsecond clock
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_us(&self, us: u64) {
        self.now.fetch_add(us, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance_us(ms * 1_000);
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn delay_us(&mut self, us: u32) {
        self.advance_us(u64::from(us));
    }
}

#[derive(Debug, Default)]
struct SerialState {
    written: Vec<u8>,
    rx_fifo: VecDeque<u8>,
    rx_irq_enabled: bool,
    fail_writes: bool,
}

/// Serial port recording everything written to it
#[derive(Debug, Clone, Default)]
pub struct SimSerial {
    state: Arc<Mutex<SerialState>>,
}

impl SimSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the bytes written since the previous call
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.state).written)
    }

    /// Place bytes in the hardware receive FIFO (not seen by the interrupt)
    pub fn push_rx(&self, bytes: &[u8]) {
        lock(&self.state).rx_fifo.extend(bytes.iter().copied());
    }

    pub fn pending_rx(&self) -> usize {
        lock(&self.state).rx_fifo.len()
    }

    pub fn rx_interrupt_enabled(&self) -> bool {
        lock(&self.state).rx_irq_enabled
    }

    /// Make subsequent writes fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }
}

impl SerialPort for SimSerial {
    fn write_all(&mut self, bytes: &[u8]) -> ModbusResult<()> {
        let mut st = lock(&self.state);
        if st.fail_writes {
            return Err(ModbusError::io("simulated write failure"));
        }
        st.written.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> ModbusResult<()> {
        Ok(())
    }

    fn is_readable(&self) -> bool {
        !lock(&self.state).rx_fifo.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        lock(&self.state).rx_fifo.pop_front()
    }

    fn set_rx_interrupt(&mut self, enabled: bool) {
        lock(&self.state).rx_irq_enabled = enabled;
    }
}

/// Output pin recording every level it was driven to
#[derive(Debug, Clone, Default)]
pub struct SimPin {
    levels: Arc<Mutex<Vec<bool>>>,
}

impl SimPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level, `None` if never driven
    pub fn level(&self) -> Option<bool> {
        lock(&self.levels).last().copied()
    }

    pub fn history(&self) -> Vec<bool> {
        lock(&self.levels).clone()
    }
}

impl OutputPin for SimPin {
    fn set_high(&mut self) {
        lock(&self.levels).push(true);
    }

    fn set_low(&mut self) {
        lock(&self.levels).push(false);
    }
}

#[derive(Debug)]
struct GpioState {
    outputs: Vec<bool>,
    levels: Vec<Option<bool>>,
}

/// GPIO bank with a fixed number of pins
#[derive(Debug, Clone)]
pub struct SimGpio {
    state: Arc<Mutex<GpioState>>,
}

impl SimGpio {
    pub fn new(pin_count: u16) -> Self {
        Self {
            state: Arc::new(Mutex::new(GpioState {
                outputs: vec![false; pin_count as usize],
                levels: vec![None; pin_count as usize],
            })),
        }
    }

    /// Level last written to `pin`, `None` if never written
    pub fn level(&self, pin: u16) -> Option<bool> {
        lock(&self.state).levels.get(pin as usize).copied().flatten()
    }

    pub fn is_output(&self, pin: u16) -> bool {
        lock(&self.state)
            .outputs
            .get(pin as usize)
            .copied()
            .unwrap_or(false)
    }
}

impl GpioBank for SimGpio {
    fn pin_count(&self) -> u16 {
        lock(&self.state).levels.len() as u16
    }

    fn init_output(&mut self, pin: u16) {
        if let Some(out) = lock(&self.state).outputs.get_mut(pin as usize) {
            *out = true;
        }
    }

    fn write(&mut self, pin: u16, high: bool) {
        if let Some(level) = lock(&self.state).levels.get_mut(pin as usize) {
            *level = Some(high);
        }
    }
}

/// Feed bytes into a receive slot one character time apart, as a UART
/// interrupt would
pub fn deliver(slot: &RxSlot, clock: &SimClock, bytes: &[u8], char_time_us: u32) {
    for &byte in bytes {
        clock.advance_us(u64::from(char_time_us));
        slot.on_byte(byte, None, clock.now_us());
    }
}

/// Move everything `from` has transmitted onto the receive side of `to`.
///
/// Returns the number of bytes carried.
pub fn transfer(from: &SimSerial, to: &RxSlot, clock: &SimClock, char_time_us: u32) -> usize {
    let bytes = from.take_written();
    deliver(to, clock, &bytes, char_time_us);
    bytes.len()
}
