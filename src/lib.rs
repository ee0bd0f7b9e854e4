//! # Voltage RTU - Modbus RTU Master/Slave Stack for RS-485
//!
//! An interrupt-driven Modbus RTU stack for microcontrollers driving a
//! half-duplex RS-485 transceiver. One node is either a master issuing
//! requests or a slave answering them from a local register store.
//!
//! ## Features
//!
//! - **Silence-based framing**: T1.5 / T3.5 inter-character timing derived from the baud rate
//! - **Interrupt-safe receive path**: a static slot per UART, no allocation or logging in the ISR
//! - **Half-duplex transmit**: DE/RE direction control with local-echo suppression
//! - **Bounded memory**: frame payloads and the transmit queue are fixed-capacity
//! - **Diagnostics**: serial-line counters reported through function 0x08
//! - **GPIO mirroring**: slave coils can drive output pins directly
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Master | Slave |
//! |------|----------|--------|-------|
//! | 0x01 | Read Coils | ✅ | ✅ |
//! | 0x02 | Read Discrete Inputs | ✅ | ✅ |
//! | 0x03 | Read Holding Registers | ✅ | ✅ |
//! | 0x04 | Read Input Registers | ✅ | ✅ |
//! | 0x05 | Write Single Coil | ✅ | ✅ |
//! | 0x06 | Write Single Register | ✅ | ✅ |
//! | 0x08 | Diagnostics | ✅ | ✅ |
//! | 0x0F | Write Multiple Coils | ✅ | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ | ✅ |
//!
//! ## Quick Start
//!
//! The UART receive interrupt forwards each byte to [`on_uart_byte`]; the
//! main loop calls [`ModbusNode::pump`].
//!
//! ```rust,no_run
//! use voltage_rtu::sim::{SimClock, SimSerial};
//! use voltage_rtu::{ModbusNode, ModbusResult, ModbusStream, RtuConfig, RX_SLOTS};
//!
//! fn main() -> ModbusResult<()> {
//!     let config = RtuConfig::default();
//!     let stream = ModbusStream::new(SimSerial::new(), SimClock::new(), &RX_SLOTS[0], &config);
//!     let mut master = ModbusNode::master(stream, config)?;
//!
//!     master.send_read_holding_registers(1, 0, 10, |response| {
//!         match response.registers() {
//!             Ok(values) => println!("Read registers: {:?}", values),
//!             Err(e) => println!("Slave error: {}", e),
//!         }
//!     })?;
//!
//!     loop {
//!         master.pump()?;
//!     }
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus RTU protocol constants
pub mod constants;

/// Function codes, exception codes and diagnostic sub-functions
pub mod protocol;

/// CRC-16/MODBUS
pub mod checksum;

/// Frame model with bounded payload and request/response builders
pub mod frame;

/// Line settings and silence timing
pub mod config;

/// Hardware capabilities the stack runs on
pub mod hal;

// ============================================================================
// Link layer
// ============================================================================

/// Interrupt-fed receive slots and the half-duplex link
pub mod stream;

/// Serial-line diagnostic counters
pub mod counters;

/// Request/response transaction tracking
pub mod transaction;

/// Outbound queue, callbacks and counters shared by both roles
pub mod base;

/// Logging system for the library
pub mod logging;

// ============================================================================
// Roles
// ============================================================================

/// Slave data tables
pub mod store;

/// Master role state
pub mod master;

/// Slave role state and request handlers
pub mod slave;

/// A link plus its role
pub mod node;

/// In-memory serial, clock and GPIO for host builds and tests
#[cfg(feature = "std")]
pub mod sim;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Node API ===
pub use node::{ModbusNode, Role};
pub use master::MasterState;
pub use slave::SlaveState;
pub use store::RegisterStore;

// === Error handling ===
pub use error::{ModbusError, ModbusResult};

// === Core types ===
pub use frame::{Frame, FrameBuilder, Payload};
pub use protocol::{DiagnosticSubFunction, ExceptionCode, ModbusFunction, SlaveId};

// === Link ===
pub use base::{FrameCallback, ModbusBase};
pub use config::{BaudRate, Parity, RtuConfig, Timing};
pub use hal::{Clock, GpioBank, NoPin, OutputPin, SerialPort};
pub use stream::{on_uart_byte, LineError, LinkEvent, ModbusStream, RxSlot, RX_SLOTS};
pub use transaction::ResponseHandler;

// === Monitoring ===
pub use counters::DiagnosticCounters;

// === Protocol limits (commonly needed constants) ===
pub use constants::{
    BROADCAST_ADDRESS, MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS,
    MAX_WRITE_REGISTERS,
};

// === Logging ===
pub use logging::{CallbackLogger, LogCallback, LogLevel, LoggingMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Voltage RTU v{} - Modbus RTU master/slave stack for RS-485",
        VERSION
    )
}
