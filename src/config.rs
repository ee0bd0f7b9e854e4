//! # Link Configuration
//!
//! Serial line parameters and the RTU silence timings derived from them.
//!
//! ## Silence timing
//!
//! An RTU character is 11 bits on the wire. Below and at 19200 baud the
//! inter-character (T1.5) and inter-frame (T3.5) silences scale with the
//! character time; above 19200 baud fixed values of 750 µs and 1750 µs apply.

use std::time::Duration;

use crate::constants::{
    BITS_PER_CHAR, DEFAULT_BAUD_RATE, DEFAULT_RESPONSE_TIMEOUT_MS, FIXED_T1_5_US, FIXED_T3_5_US,
    FIXED_TIMING_BAUD_THRESHOLD, TX_QUEUE_CAPACITY,
};
use crate::error::{ModbusError, ModbusResult};

/// Standard serial baud rates
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaudRate {
    B1200,
    B2400,
    B4800,
    B9600,
    B14400,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    pub fn as_u32(self) -> u32 {
        match self {
            Self::B1200 => 1_200,
            Self::B2400 => 2_400,
            Self::B4800 => 4_800,
            Self::B9600 => 9_600,
            Self::B14400 => 14_400,
            Self::B19200 => 19_200,
            Self::B38400 => 38_400,
            Self::B57600 => 57_600,
            Self::B115200 => 115_200,
        }
    }
}

impl From<BaudRate> for u32 {
    fn from(baud: BaudRate) -> Self {
        baud.as_u32()
    }
}

/// Serial parity
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Parity {
    None,
    #[default]
    Even,
    Odd,
}

/// T1.5 / T3.5 silence intervals in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub t1_5_us: u32,
    pub t3_5_us: u32,
}

impl Timing {
    /// Derive silence timings for a baud rate.
    ///
    /// A zero baud rate yields the fixed high-speed values; [`RtuConfig::validate`]
    /// rejects it before it reaches a link.
    pub fn from_baud(baud: u32) -> Self {
        if baud == 0 || baud > FIXED_TIMING_BAUD_THRESHOLD {
            return Self {
                t1_5_us: FIXED_T1_5_US,
                t3_5_us: FIXED_T3_5_US,
            };
        }
        let char_time_us = BITS_PER_CHAR * 1_000_000 / baud;
        Self {
            t1_5_us: char_time_us * 3 / 2,
            t3_5_us: char_time_us * 7 / 2,
        }
    }

    /// Duration of one 11-bit character in microseconds
    pub fn char_time_us(baud: u32) -> u32 {
        if baud == 0 {
            return 0;
        }
        BITS_PER_CHAR * 1_000_000 / baud
    }
}

/// Configuration of an RTU node
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use voltage_rtu::{BaudRate, Parity, RtuConfig};
///
/// let config = RtuConfig::new()
///     .with_baud_rate(BaudRate::B9600)
///     .with_parity(Parity::None)
///     .with_response_timeout(Duration::from_millis(500));
///
/// assert_eq!(config.baud_rate, 9600);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtuConfig {
    /// Line speed in baud
    pub baud_rate: u32,
    pub parity: Parity,
    /// Default master response timeout
    pub response_timeout: Duration,
    /// Maximum entries in the base transaction table
    pub transaction_depth: usize,
}

impl Default for RtuConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            parity: Parity::default(),
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            transaction_depth: TX_QUEUE_CAPACITY,
        }
    }
}

impl RtuConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a standard baud rate.
    pub fn with_baud_rate(mut self, baud: BaudRate) -> Self {
        self.baud_rate = baud.as_u32();
        self
    }

    /// Set a non-standard baud rate.
    pub fn with_custom_baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_transaction_depth(mut self, depth: usize) -> Self {
        self.transaction_depth = depth;
        self
    }

    /// Silence timings for the configured baud rate
    pub fn timing(&self) -> Timing {
        Timing::from_baud(self.baud_rate)
    }

    pub fn validate(&self) -> ModbusResult<()> {
        if self.baud_rate == 0 {
            return Err(ModbusError::configuration("Baud rate must be non-zero"));
        }
        if self.transaction_depth == 0 {
            return Err(ModbusError::configuration(
                "Transaction depth must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RtuConfig::default();
        assert_eq!(config.baud_rate, 19_200);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.response_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RtuConfig::new()
            .with_baud_rate(BaudRate::B115200)
            .with_parity(Parity::Odd)
            .with_response_timeout(Duration::from_millis(100))
            .with_transaction_depth(2);
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.parity, Parity::Odd);
        assert_eq!(config.response_timeout, Duration::from_millis(100));
        assert_eq!(config.transaction_depth, 2);
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(RtuConfig::new().with_custom_baud_rate(0).validate().is_err());
        assert!(RtuConfig::new().with_transaction_depth(0).validate().is_err());
    }

    #[test]
    fn test_timing_per_character() {
        // 9600 baud: 11_000_000 / 9600 = 1145 µs per character
        let timing = Timing::from_baud(9_600);
        assert_eq!(Timing::char_time_us(9_600), 1_145);
        assert_eq!(timing.t1_5_us, 1_717);
        assert_eq!(timing.t3_5_us, 4_007);

        // 19200 is the last rate using the formula
        let timing = Timing::from_baud(19_200);
        assert_eq!(timing.t1_5_us, 858);
        assert_eq!(timing.t3_5_us, 2_002);
    }

    #[test]
    fn test_timing_fixed_above_19200() {
        for baud in [38_400, 57_600, 115_200] {
            let timing = Timing::from_baud(baud);
            assert_eq!(timing.t1_5_us, 750);
            assert_eq!(timing.t3_5_us, 1_750);
        }
    }

    #[test]
    fn test_baud_rate_conversion() {
        assert_eq!(u32::from(BaudRate::B1200), 1_200);
        assert_eq!(BaudRate::B14400.as_u32(), 14_400);
    }
}
