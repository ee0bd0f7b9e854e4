//! Master role: one outstanding request at a time
//!
//! A new request replaces the pending one; the replaced handler is dropped
//! without being called. The link is held for the pending request from the
//! moment it is transmitted until its response arrives or it times out. A
//! request whose write fails is retired without waiting for the timeout.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::base::ModbusBase;
use crate::error::ModbusResult;
use crate::frame::Frame;
use crate::hal::{Clock, OutputPin, SerialPort};
use crate::transaction::{PendingRequest, ResponseHandler};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State owned by a node in the master role
#[derive(Debug, Default)]
pub struct MasterState {
    pending: Mutex<Option<PendingRequest>>,
}

impl MasterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_request_pending(&self) -> bool {
        lock(&self.pending).is_some()
    }

    /// Queue `request` on `base` and make it the pending request
    pub(crate) fn send_request<S, C, P>(
        &self,
        request: &Frame,
        handler: ResponseHandler,
        timeout: Duration,
        base: &ModbusBase<S, C, P>,
    ) -> ModbusResult<()>
    where
        S: SerialPort,
        C: Clock,
        P: OutputPin,
    {
        base.queue_write(request)?;
        let pending = PendingRequest::new(request, handler, base.now_us(), timeout);
        if let Some(replaced) = lock(&self.pending).replace(pending) {
            debug!(
                "Pending request addr={} FC={:02X} replaced before completion",
                replaced.address, replaced.function_code
            );
        }
        Ok(())
    }

    /// The link is free unless the pending request is already on the wire
    pub(crate) fn may_transmit(&self) -> bool {
        lock(&self.pending).as_ref().is_none_or(|p| !p.sent)
    }

    /// Record that `frame` went out; marks the pending request sent when
    /// `frame` is its request
    pub(crate) fn on_transmitted(&self, frame: &Frame) {
        if let Some(pending) = lock(&self.pending).as_mut() {
            if pending.is_request(frame) {
                pending.sent = true;
            }
        }
    }

    /// Retire the pending request if `frame`, its request, never made it
    /// onto the wire. Returns `true` when a request was dropped.
    pub(crate) fn on_transmit_failed(&self, frame: &Frame) -> bool {
        let mut pending = lock(&self.pending);
        if !pending
            .as_ref()
            .is_some_and(|p| !p.sent && p.is_request(frame))
        {
            return false;
        }
        if let Some(request) = pending.take() {
            debug!(
                "Request dropped after failed write: addr={} FC={:02X}",
                request.address, request.function_code
            );
        }
        true
    }

    /// Complete the pending request if `frame` answers it.
    ///
    /// The handler runs with the lock released, so it may issue the next
    /// request.
    pub(crate) fn on_frame(&self, frame: &Frame) -> bool {
        let matched = {
            let mut pending = lock(&self.pending);
            if pending.as_ref().is_some_and(|p| p.matches(frame)) {
                pending.take()
            } else {
                None
            }
        };
        match matched {
            Some(request) => {
                request.complete(frame);
                true
            }
            None => false,
        }
    }

    /// Drop the pending request once it was sent, its timeout has elapsed,
    /// and the line has been quiet for at least T3.5 (so a reply still being
    /// received is not cut off). Returns `true` when a request timed out.
    pub(crate) fn check_timeout(&self, now_us: u64, since_last_rx_us: u64, t3_5_us: u32) -> bool {
        let mut pending = lock(&self.pending);
        let expired = pending.as_ref().is_some_and(|p| {
            p.sent && p.is_expired(now_us) && since_last_rx_us >= u64::from(t3_5_us)
        });
        if !expired {
            return false;
        }
        if let Some(request) = pending.take() {
            debug!(
                "Request timeout: addr={} FC={:02X}",
                request.address, request.function_code
            );
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameBuilder;
    use crate::protocol::{ExceptionCode, ModbusFunction};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const T3_5: u32 = 2_002;

    fn arm(master: &MasterState, request: &Frame, submitted_us: u64, calls: &Arc<AtomicUsize>) {
        let seen = calls.clone();
        let pending = PendingRequest::new(
            request,
            Box::new(move |_: &Frame| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
            submitted_us,
            Duration::from_millis(100),
        );
        *lock(&master.pending) = Some(pending);
    }

    #[test]
    fn test_transmit_gate() {
        let master = MasterState::new();
        assert!(master.may_transmit());

        let calls = Arc::new(AtomicUsize::new(0));
        let request = FrameBuilder::read_holding_registers_request(1, 0, 1).unwrap();
        arm(&master, &request, 0, &calls);
        assert!(master.may_transmit());

        let unrelated = FrameBuilder::read_coils_request(1, 0, 1).unwrap();
        master.on_transmitted(&unrelated);
        assert!(master.may_transmit());

        master.on_transmitted(&request);
        assert!(!master.may_transmit());
        assert!(master.is_request_pending());
    }

    #[test]
    fn test_response_and_exception_match() {
        let master = MasterState::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let request = FrameBuilder::read_holding_registers_request(1, 0, 1).unwrap();

        arm(&master, &request, 0, &calls);
        let wrong_slave =
            FrameBuilder::read_registers_response(2, ModbusFunction::ReadHoldingRegisters, &[1])
                .unwrap();
        assert!(!master.on_frame(&wrong_slave));

        let exception =
            FrameBuilder::exception_response(1, 0x03, ExceptionCode::IllegalDataAddress).unwrap();
        assert!(master.on_frame(&exception));
        assert!(!master.is_request_pending());
        assert!(!master.on_frame(&exception));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_requires_sent_and_quiet_line() {
        let master = MasterState::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let request = FrameBuilder::read_input_registers_request(1, 0, 1).unwrap();
        arm(&master, &request, 0, &calls);

        // not yet on the wire
        assert!(!master.check_timeout(200_000, u64::MAX, T3_5));

        master.on_transmitted(&request);
        assert!(!master.check_timeout(100_000, u64::MAX, T3_5));
        // bytes still arriving
        assert!(!master.check_timeout(200_000, 1_000, T3_5));
        assert!(master.check_timeout(200_000, u64::from(T3_5), T3_5));

        assert!(!master.is_request_pending());
        assert!(master.may_transmit());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_write_retires_request() {
        let master = MasterState::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let request = FrameBuilder::read_coils_request(4, 0, 8).unwrap();
        arm(&master, &request, 0, &calls);

        let other = FrameBuilder::write_single_coil_request(4, 0, true).unwrap();
        assert!(!master.on_transmit_failed(&other));
        assert!(master.is_request_pending());

        assert!(master.on_transmit_failed(&request));
        assert!(!master.is_request_pending());
        assert!(master.may_transmit());
        assert!(!master.on_transmit_failed(&request));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_replaced_handler_is_dropped() {
        let master = MasterState::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let request = FrameBuilder::read_coils_request(3, 0, 1).unwrap();

        arm(&master, &request, 0, &first);
        arm(&master, &request, 10, &second);
        assert_eq!(Arc::strong_count(&first), 1);

        let response = FrameBuilder::read_coils_response(3, &[true]).unwrap();
        assert!(master.on_frame(&response));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
