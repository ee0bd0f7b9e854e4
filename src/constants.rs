//! Modbus RTU protocol constants based on official specification
//!
//! These constants are derived from the Modbus over Serial Line specification:
//! - Maximum ADU size: 256 bytes (RS485 limit)
//! - Register/coil limits are calculated to fit within the PDU size constraint

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Maximum RTU ADU (Application Data Unit) size on a serial line.
/// Address(1) + PDU(253) + CRC(2) = 256 bytes
pub const MAX_ADU_SIZE: usize = 256;

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
/// RS485 ADU (256 bytes) - Slave Address (1 byte) - CRC (2 bytes) = 253 bytes
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum frame payload (PDU minus the function code byte)
pub const MAX_PAYLOAD_SIZE: usize = MAX_PDU_SIZE - 1;

/// Smallest viable RTU frame: address + function code + 2-byte CRC
pub const MIN_FRAME_SIZE: usize = 4;

/// Receive buffer capacity of the link layer
pub const RX_BUFFER_SIZE: usize = MAX_ADU_SIZE;

// ============================================================================
// Addressing
// ============================================================================

/// Broadcast address: requests only, never answered
pub const BROADCAST_ADDRESS: u8 = 0;

/// Lowest unicast slave address
pub const MIN_SLAVE_ADDRESS: u8 = 1;

/// Highest unicast slave address
pub const MAX_SLAVE_ADDRESS: u8 = 247;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// Function Code(1) + Byte Count(1) + N × 2 ≤ 253  →  N ≤ 125
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of registers for FC16 (Write Multiple Registers)
///
/// Function Code(1) + Address(2) + Quantity(2) + Byte Count(1) + N × 2 ≤ 253  →  N ≤ 123
pub const MAX_WRITE_REGISTERS: u16 = 123;

// ============================================================================
// Coil Operation Limits
// ============================================================================

/// Maximum number of coils for FC01/FC02 (Read Coils/Discrete Inputs)
pub const MAX_READ_COILS: u16 = 2000;

/// Maximum number of coils for FC15 (Write Multiple Coils), 0x7B0
pub const MAX_WRITE_COILS: u16 = 1968;

/// FC05 value for ON
pub const COIL_ON: u16 = 0xFF00;

/// FC05 value for OFF
pub const COIL_OFF: u16 = 0x0000;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Timing
// ============================================================================

/// Bits per RTU character: start + 8 data + parity/stop combination
pub const BITS_PER_CHAR: u32 = 11;

/// Above this baud rate the fixed inter-character/inter-frame timings apply
pub const FIXED_TIMING_BAUD_THRESHOLD: u32 = 19_200;

/// Fixed T1.5 for baud rates above 19200 (microseconds)
pub const FIXED_T1_5_US: u32 = 750;

/// Fixed T3.5 for baud rates above 19200 (microseconds)
pub const FIXED_T3_5_US: u32 = 1_750;

/// Default master response timeout (milliseconds)
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 5_000;

/// Default baud rate
pub const DEFAULT_BAUD_RATE: u32 = 19_200;

// ============================================================================
// Queues
// ============================================================================

/// Outbound frame queue depth
pub const TX_QUEUE_CAPACITY: usize = 8;

/// Number of hardware UARTs with a statically allocated receive slot
pub const UART_COUNT: usize = 2;
