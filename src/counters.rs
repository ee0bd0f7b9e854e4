//! Modbus serial-line diagnostic counters
//!
//! Counters are 16-bit and wrap, matching the width reported over
//! Diagnostics (0x08).

use crate::protocol::DiagnosticSubFunction;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticCounters {
    /// Frames transmitted on the bus by this node
    pub bus_message: u16,
    /// CRC errors and under-length frames
    pub bus_communication_error: u16,
    /// Exception responses returned by this slave
    pub slave_exception_error: u16,
    /// Requests processed successfully by this slave
    pub slave_message: u16,
    /// Requests that produced no response (broadcasts, master timeouts)
    pub slave_no_response: u16,
    pub slave_nak: u16,
    pub slave_busy: u16,
    /// Characters lost to line errors or receive-buffer overrun
    pub bus_character_overrun: u16,
}

impl DiagnosticCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value reported for a diagnostic sub-function; `None` for the echo
    /// sub-function, which has no counter.
    pub fn get(&self, sub_function: DiagnosticSubFunction) -> Option<u16> {
        use DiagnosticSubFunction::*;
        match sub_function {
            ReturnQueryData => None,
            BusMessageCount => Some(self.bus_message),
            BusCommunicationErrorCount => Some(self.bus_communication_error),
            SlaveExceptionErrorCount => Some(self.slave_exception_error),
            SlaveMessageCount => Some(self.slave_message),
            SlaveNoResponseCount => Some(self.slave_no_response),
            SlaveNakCount => Some(self.slave_nak),
            SlaveBusyCount => Some(self.slave_busy),
            BusCharacterOverrunCount => Some(self.bus_character_overrun),
        }
    }

    #[inline]
    pub fn record_bus_message(&mut self) {
        self.bus_message = self.bus_message.wrapping_add(1);
    }

    #[inline]
    pub fn record_communication_error(&mut self) {
        self.bus_communication_error = self.bus_communication_error.wrapping_add(1);
    }

    #[inline]
    pub fn record_exception(&mut self) {
        self.slave_exception_error = self.slave_exception_error.wrapping_add(1);
    }

    #[inline]
    pub fn record_slave_message(&mut self) {
        self.slave_message = self.slave_message.wrapping_add(1);
    }

    #[inline]
    pub fn record_no_response(&mut self) {
        self.slave_no_response = self.slave_no_response.wrapping_add(1);
    }

    #[inline]
    pub fn record_nak(&mut self) {
        self.slave_nak = self.slave_nak.wrapping_add(1);
    }

    #[inline]
    pub fn record_busy(&mut self) {
        self.slave_busy = self.slave_busy.wrapping_add(1);
    }

    #[inline]
    pub fn record_overrun(&mut self, count: u16) {
        self.bus_character_overrun = self.bus_character_overrun.wrapping_add(count);
    }

    /// Copy the current values and zero every counter
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
