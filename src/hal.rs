//! Hardware capabilities consumed by the stack
//!
//! The link layer never touches registers directly. A board crate implements
//! these traits for its UART, timer and GPIO peripherals; [`crate::sim`]
//! implements them for host-side tests.

use crate::error::ModbusResult;

/// Byte-oriented half-duplex serial port
pub trait SerialPort {
    /// Blocking write of every byte
    fn write_all(&mut self, bytes: &[u8]) -> ModbusResult<()>;

    /// Block until the hardware reports transmission complete
    fn flush(&mut self) -> ModbusResult<()>;

    /// Non-blocking: is a received byte waiting in the hardware path?
    fn is_readable(&self) -> bool;

    /// Non-blocking read of one received byte
    fn read_byte(&mut self) -> Option<u8>;

    /// Enable or disable the per-byte receive interrupt
    fn set_rx_interrupt(&mut self, enabled: bool);
}

/// Monotonic microsecond clock
pub trait Clock {
    fn now_us(&self) -> u64;

    /// Busy-wait for at least `us` microseconds
    fn delay_us(&mut self, us: u32);
}

/// Digital output used for transceiver direction control
pub trait OutputPin {
    fn set_high(&mut self);
    fn set_low(&mut self);

    #[inline]
    fn set_level(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }
}

/// Bank of general-purpose outputs indexed by pin number, used for coil
/// mirroring
pub trait GpioBank {
    /// Number of addressable pins; pin numbers at or above this are ignored
    fn pin_count(&self) -> u16;

    /// Configure `pin` as a push-pull output
    fn init_output(&mut self, pin: u16);

    fn write(&mut self, pin: u16, high: bool);
}

/// Placeholder for an absent direction pin (auto-direction transceivers)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoPin;

impl OutputPin for NoPin {
    #[inline]
    fn set_high(&mut self) {}

    #[inline]
    fn set_low(&mut self) {}
}
