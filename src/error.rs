//! Error types for the RTU stack
//!
//! Link-level faults (CRC mismatch, short frames, line noise, T1.5 violations)
//! never surface here; they are counted and reported through callbacks. This
//! type covers API misuse and capability failures.

use thiserror::Error;

use crate::protocol::ExceptionCode;

/// Result alias used throughout the crate
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Errors returned by the RTU stack
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModbusError {
    /// Slave address outside 1-247
    #[error("Invalid slave address: {address} (must be 1-247)")]
    InvalidSlaveAddress { address: u8 },

    /// Function code not supported by this stack
    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },

    /// Malformed request arguments or payload content
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Protocol violation while interpreting a frame
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Frame construction failed (payload overflow)
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Outbound queue cannot accept another frame
    #[error("Transmit queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Serial capability failure
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Exception response returned by a slave
    #[error("Modbus exception: function=0x{function:02X}, code={code}")]
    Exception { function: u8, code: ExceptionCode },

    /// Operation requires a different node role
    #[error("Operation requires {expected} role")]
    RoleMismatch { expected: &'static str },

    /// Data table has not been enabled on this slave
    #[error("{table} not enabled")]
    Disabled { table: &'static str },

    /// Application access outside a data table
    #[error("{table} address {address} out of range")]
    OutOfRange { table: &'static str, address: u16 },
}

impl ModbusError {
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModbusError::InvalidSlaveAddress { address: 250 };
        assert_eq!(err.to_string(), "Invalid slave address: 250 (must be 1-247)");

        let err = ModbusError::InvalidFunction { code: 0x2B };
        assert_eq!(err.to_string(), "Invalid function code: 0x2B");

        let err = ModbusError::QueueFull { capacity: 8 };
        assert_eq!(err.to_string(), "Transmit queue full (capacity 8)");
    }

    #[test]
    fn test_helper_constructors() {
        assert_eq!(
            ModbusError::invalid_data("bad"),
            ModbusError::InvalidData {
                message: "bad".to_string()
            }
        );
        assert!(matches!(ModbusError::io("tx"), ModbusError::Io { .. }));
        assert!(matches!(
            ModbusError::configuration("baud"),
            ModbusError::Configuration { .. }
        ));
    }
}
