//! Request/response transaction tracking
//!
//! A transaction is keyed by slave address and function code. A response
//! matches when its function code equals the request's, or the request's
//! with the exception bit set.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::constants::EXCEPTION_FLAG;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::Frame;
use crate::protocol::SlaveId;

/// Called with the matching response frame. Never called on timeout.
pub type ResponseHandler = Box<dyn FnOnce(&Frame) + Send>;

/// An outstanding request awaiting its response
pub struct PendingRequest {
    pub address: SlaveId,
    pub function_code: u8,
    /// Clock reading when the request was submitted
    pub submitted_us: u64,
    pub timeout: Duration,
    /// Set once the request frame has gone out on the wire
    pub sent: bool,
    handler: ResponseHandler,
}

impl PendingRequest {
    pub fn new(
        request: &Frame,
        handler: ResponseHandler,
        submitted_us: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            address: request.address,
            function_code: request.function_code,
            submitted_us,
            timeout,
            sent: false,
            handler,
        }
    }

    /// Does `frame` answer this request (normal or exception reply)?
    #[inline]
    pub fn matches(&self, frame: &Frame) -> bool {
        frame.address == self.address
            && (frame.function_code == self.function_code
                || frame.function_code == self.function_code | EXCEPTION_FLAG)
    }

    /// Is `frame` the transmitted form of this request?
    #[inline]
    pub fn is_request(&self, frame: &Frame) -> bool {
        frame.address == self.address && frame.function_code == self.function_code
    }

    #[inline]
    pub fn elapsed_us(&self, now_us: u64) -> u64 {
        now_us.saturating_sub(self.submitted_us)
    }

    /// Strictly past the deadline
    #[inline]
    pub fn is_expired(&self, now_us: u64) -> bool {
        u128::from(self.elapsed_us(now_us)) > self.timeout.as_micros()
    }

    /// Consume the request, handing `response` to its handler
    pub fn complete(self, response: &Frame) {
        (self.handler)(response);
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("address", &self.address)
            .field("function_code", &format_args!("0x{:02X}", self.function_code))
            .field("submitted_us", &self.submitted_us)
            .field("timeout", &self.timeout)
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

/// FIFO of outstanding transactions ordered by submission time
#[derive(Debug)]
pub struct TransactionTable {
    entries: VecDeque<PendingRequest>,
    capacity: usize,
}

impl TransactionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, request: PendingRequest) -> ModbusResult<()> {
        if self.entries.len() >= self.capacity {
            return Err(ModbusError::QueueFull {
                capacity: self.capacity,
            });
        }
        self.entries.push_back(request);
        Ok(())
    }

    /// Mark the oldest unsent entry for this frame's address and function
    /// code as sent
    pub fn mark_sent(&mut self, transmitted: &Frame) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| !e.sent && e.is_request(transmitted))
        {
            entry.sent = true;
        }
    }

    /// Remove the most recently pushed entry
    pub fn pop_newest(&mut self) -> Option<PendingRequest> {
        self.entries.pop_back()
    }

    /// Remove and return the oldest entry answered by `response`
    pub fn take_match(&mut self, response: &Frame) -> Option<PendingRequest> {
        let pos = self.entries.iter().position(|e| e.matches(response))?;
        self.entries.remove(pos)
    }

    /// Drop expired entries from the head. Entries behind a live head are
    /// younger and therefore live too. Returns the number dropped.
    pub fn expire(&mut self, now_us: u64) -> usize {
        let mut expired = 0;
        while self
            .entries
            .front()
            .is_some_and(|head| head.is_expired(now_us))
        {
            self.entries.pop_front();
            expired += 1;
        }
        expired
    }
}
