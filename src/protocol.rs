//! Modbus protocol definitions: function codes, exception codes and
//! diagnostic sub-functions.

use core::fmt;

use crate::error::{ModbusError, ModbusResult};

/// Modbus slave address (0 = broadcast, 1-247 = unicast)
pub type SlaveId = u8;

/// Function codes implemented by this stack
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModbusFunction {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteSingleRegister = 0x06,
    Diagnostics = 0x08,
    WriteMultipleCoils = 0x0F,
    WriteMultipleRegisters = 0x10,
}

impl ModbusFunction {
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(code: u8) -> ModbusResult<Self> {
        match code {
            0x01 => Ok(Self::ReadCoils),
            0x02 => Ok(Self::ReadDiscreteInputs),
            0x03 => Ok(Self::ReadHoldingRegisters),
            0x04 => Ok(Self::ReadInputRegisters),
            0x05 => Ok(Self::WriteSingleCoil),
            0x06 => Ok(Self::WriteSingleRegister),
            0x08 => Ok(Self::Diagnostics),
            0x0F => Ok(Self::WriteMultipleCoils),
            0x10 => Ok(Self::WriteMultipleRegisters),
            _ => Err(ModbusError::InvalidFunction { code }),
        }
    }

    /// Human-readable name; exception bit is ignored
    pub fn description(code: u8) -> &'static str {
        match Self::from_u8(code & 0x7F) {
            Ok(Self::ReadCoils) => "Read Coils",
            Ok(Self::ReadDiscreteInputs) => "Read Discrete Inputs",
            Ok(Self::ReadHoldingRegisters) => "Read Holding Registers",
            Ok(Self::ReadInputRegisters) => "Read Input Registers",
            Ok(Self::WriteSingleCoil) => "Write Single Coil",
            Ok(Self::WriteSingleRegister) => "Write Single Register",
            Ok(Self::Diagnostics) => "Diagnostics",
            Ok(Self::WriteMultipleCoils) => "Write Multiple Coils",
            Ok(Self::WriteMultipleRegisters) => "Write Multiple Registers",
            Err(_) => "Unknown Function",
        }
    }
}

/// Exception codes carried in the single-byte payload of an exception response
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    SlaveDeviceFailure = 0x04,
    Acknowledge = 0x05,
    SlaveDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetFailed = 0x0B,
}

impl ExceptionCode {
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x04 => Some(Self::SlaveDeviceFailure),
            0x05 => Some(Self::Acknowledge),
            0x06 => Some(Self::SlaveDeviceBusy),
            0x08 => Some(Self::MemoryParityError),
            0x0A => Some(Self::GatewayPathUnavailable),
            0x0B => Some(Self::GatewayTargetFailed),
            _ => None,
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IllegalFunction => "Illegal Function",
            Self::IllegalDataAddress => "Illegal Data Address",
            Self::IllegalDataValue => "Illegal Data Value",
            Self::SlaveDeviceFailure => "Slave Device Failure",
            Self::Acknowledge => "Acknowledge",
            Self::SlaveDeviceBusy => "Slave Device Busy",
            Self::MemoryParityError => "Memory Parity Error",
            Self::GatewayPathUnavailable => "Gateway Path Unavailable",
            Self::GatewayTargetFailed => "Gateway Target Device Failed to Respond",
        };
        write!(f, "{} (0x{:02X})", name, self.to_u8())
    }
}

/// Sub-functions of Diagnostics (0x08) answered by the slave
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DiagnosticSubFunction {
    ReturnQueryData = 0x0000,
    BusMessageCount = 0x000B,
    BusCommunicationErrorCount = 0x000C,
    SlaveExceptionErrorCount = 0x000D,
    SlaveMessageCount = 0x000E,
    SlaveNoResponseCount = 0x000F,
    SlaveNakCount = 0x0010,
    SlaveBusyCount = 0x0011,
    BusCharacterOverrunCount = 0x0012,
}

impl DiagnosticSubFunction {
    #[inline]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            0x0000 => Some(Self::ReturnQueryData),
            0x000B => Some(Self::BusMessageCount),
            0x000C => Some(Self::BusCommunicationErrorCount),
            0x000D => Some(Self::SlaveExceptionErrorCount),
            0x000E => Some(Self::SlaveMessageCount),
            0x000F => Some(Self::SlaveNoResponseCount),
            0x0010 => Some(Self::SlaveNakCount),
            0x0011 => Some(Self::SlaveBusyCount),
            0x0012 => Some(Self::BusCharacterOverrunCount),
            _ => None,
        }
    }
}
