//! # Base Layer
//!
//! Shared machinery under both node roles:
//!
//! - a FIFO outbound queue guarded by a lock; enqueueing copies the frame
//! - the diagnostic counters of this node
//! - the debug / error / message frame callbacks
//! - a generalized transaction table with head-only timeout expiry
//! - optional hex packet logging of every frame sent and received
//!
//! One [`ModbusBase::pump`] call polls the link once and transmits at most one
//! queued frame, which bounds the work done per main-loop iteration.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use heapless::Deque;
use tracing::{debug, warn};

use crate::config::RtuConfig;
use crate::constants::TX_QUEUE_CAPACITY;
use crate::counters::DiagnosticCounters;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::Frame;
use crate::hal::{Clock, NoPin, OutputPin, SerialPort};
use crate::logging::CallbackLogger;
use crate::stream::{LinkEvent, ModbusStream};
use crate::transaction::{PendingRequest, ResponseHandler, TransactionTable};

/// Frame observer installed by the application
pub type FrameCallback = Box<dyn FnMut(&Frame) + Send>;

type TxQueue = Deque<Frame, TX_QUEUE_CAPACITY>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ModbusBase<S, C, P = NoPin> {
    stream: ModbusStream<S, C, P>,
    config: RtuConfig,
    tx_queue: Mutex<TxQueue>,
    transactions: Mutex<TransactionTable>,
    counters: DiagnosticCounters,
    on_debug: Option<FrameCallback>,
    on_error: Option<FrameCallback>,
    on_message: Option<FrameCallback>,
    logger: CallbackLogger,
    packet_logging: bool,
}

impl<S, C, P> ModbusBase<S, C, P>
where
    S: SerialPort,
    C: Clock,
    P: OutputPin,
{
    pub fn new(stream: ModbusStream<S, C, P>, config: RtuConfig) -> Self {
        Self {
            stream,
            transactions: Mutex::new(TransactionTable::new(config.transaction_depth)),
            config,
            tx_queue: Mutex::new(Deque::new()),
            counters: DiagnosticCounters::default(),
            on_debug: None,
            on_error: None,
            on_message: None,
            logger: CallbackLogger::default(),
            packet_logging: false,
        }
    }

    #[inline]
    pub fn config(&self) -> &RtuConfig {
        &self.config
    }

    #[inline]
    pub fn stream(&self) -> &ModbusStream<S, C, P> {
        &self.stream
    }

    #[inline]
    pub fn stream_mut(&mut self) -> &mut ModbusStream<S, C, P> {
        &mut self.stream
    }

    #[inline]
    pub fn now_us(&self) -> u64 {
        self.stream.now_us()
    }

    // ===== Outbound queue =====

    /// Copy `frame` onto the outbound queue
    pub fn queue_write(&self, frame: &Frame) -> ModbusResult<()> {
        lock(&self.tx_queue)
            .push_back(frame.clone())
            .map_err(|_| ModbusError::QueueFull {
                capacity: TX_QUEUE_CAPACITY,
            })
    }

    pub fn queued_len(&self) -> usize {
        lock(&self.tx_queue).len()
    }

    /// Dequeue and transmit one frame. Returns the frame sent, if any.
    ///
    /// A failed write drops the frame and returns the serial error.
    pub fn transmit_next(&mut self) -> ModbusResult<Option<Frame>> {
        match self.transmit_one() {
            Some((frame, written)) => written.map(|()| Some(frame)),
            None => Ok(None),
        }
    }

    /// Dequeue and transmit one frame, handing the frame back together with
    /// the write result
    pub(crate) fn transmit_one(&mut self) -> Option<(Frame, ModbusResult<()>)> {
        let frame = lock(&self.tx_queue).pop_front()?;

        if self.packet_logging {
            self.logger
                .log_packet("send", &frame.to_bytes(), Some(frame.address));
        }

        if let Err(e) = self.stream.write(&frame) {
            warn!(
                "Transmit failed: addr={} FC={:02X}: {}",
                frame.address, frame.function_code, e
            );
            return Some((frame, Err(e)));
        }

        self.counters.record_bus_message();
        lock(&self.transactions).mark_sent(&frame);
        Some((frame, Ok(())))
    }

    // ===== Receive path =====

    /// Poll the link once.
    ///
    /// Line faults are folded into the overrun counter. A link error bumps
    /// the communication-error counter and reaches the error callback. A good
    /// frame reaches the debug callback and is returned.
    pub fn poll_link(&mut self) -> Option<Frame> {
        let faults = self.stream.take_line_faults();
        if faults > 0 {
            self.counters.record_overrun(faults);
        }

        match self.stream.process_if_ready()? {
            LinkEvent::Frame(frame) => {
                if self.packet_logging {
                    self.logger
                        .log_packet("recv", &frame.to_bytes(), Some(frame.address));
                }
                self.logger
                    .log_frame("recv", frame.address, frame.function_code, &frame.payload);
                if let Some(cb) = self.on_debug.as_mut() {
                    cb(&frame);
                }
                Some(frame)
            }
            LinkEvent::Error(frame) => {
                self.counters.record_communication_error();
                debug!(
                    "Link error: addr={} FC={:02X} len={}",
                    frame.address,
                    frame.function_code,
                    frame.payload.len()
                );
                if let Some(cb) = self.on_error.as_mut() {
                    cb(&frame);
                }
                None
            }
        }
    }

    // ===== Transactions =====

    /// Queue `request` and track its response in the transaction table
    pub fn submit_transaction(
        &self,
        request: &Frame,
        handler: ResponseHandler,
        timeout: Duration,
    ) -> ModbusResult<()> {
        let mut table = lock(&self.transactions);
        let pending = PendingRequest::new(request, handler, self.now_us(), timeout);
        table.push(pending)?;
        if let Err(e) = self.queue_write(request) {
            table.pop_newest();
            return Err(e);
        }
        Ok(())
    }

    /// Complete the oldest transaction answered by `response`.
    ///
    /// The handler runs after the table lock is released.
    pub fn dispatch_transaction(&self, response: &Frame) -> bool {
        let matched = lock(&self.transactions).take_match(response);
        match matched {
            Some(pending) => {
                pending.complete(response);
                true
            }
            None => false,
        }
    }

    /// Retire timed-out transactions; each counts as a no-response
    pub fn expire_transactions(&mut self) -> usize {
        let now = self.now_us();
        let expired = lock(&self.transactions).expire(now);
        for _ in 0..expired {
            self.counters.record_no_response();
        }
        if expired > 0 {
            debug!("{} transaction(s) timed out", expired);
        }
        expired
    }

    pub fn pending_transactions(&self) -> usize {
        lock(&self.transactions).len()
    }

    /// Poll, match, expire, transmit
    pub fn pump(&mut self) -> ModbusResult<()> {
        if let Some(frame) = self.poll_link() {
            if !self.dispatch_transaction(&frame) {
                debug!(
                    "Unsolicited frame: addr={} FC={:02X}",
                    frame.address, frame.function_code
                );
            }
        }
        self.expire_transactions();
        self.transmit_next()?;
        Ok(())
    }

    // ===== Callbacks and logging =====

    /// Called with every frame that passes the CRC check
    pub fn set_debug_callback(&mut self, callback: impl FnMut(&Frame) + Send + 'static) {
        self.on_debug = Some(Box::new(callback));
    }

    /// Called on CRC failure (parsed frame) or under-length capture (empty frame)
    pub fn set_error_callback(&mut self, callback: impl FnMut(&Frame) + Send + 'static) {
        self.on_error = Some(Box::new(callback));
    }

    /// Called with each request a slave processed successfully
    pub fn set_message_callback(&mut self, callback: impl FnMut(&Frame) + Send + 'static) {
        self.on_message = Some(Box::new(callback));
    }

    pub(crate) fn notify_message(&mut self, request: &Frame) {
        if let Some(cb) = self.on_message.as_mut() {
            cb(request);
        }
    }

    pub fn set_logger(&mut self, logger: CallbackLogger) {
        self.logger = logger;
    }

    pub fn logger(&self) -> &CallbackLogger {
        &self.logger
    }

    /// Log every frame sent and received as hex
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    // ===== Counters =====

    /// Snapshot of the diagnostic counters
    #[inline]
    pub fn counters(&self) -> DiagnosticCounters {
        self.counters
    }

    #[inline]
    pub fn counters_mut(&mut self) -> &mut DiagnosticCounters {
        &mut self.counters
    }

    /// Snapshot, then zero every counter
    pub fn take_counters(&mut self) -> DiagnosticCounters {
        self.counters.take()
    }

    pub fn reset_counters(&mut self) {
        self.counters.reset();
    }

    pub fn bus_message_count(&self) -> u16 {
        self.counters.bus_message
    }

    pub fn bus_communication_error_count(&self) -> u16 {
        self.counters.bus_communication_error
    }

    pub fn slave_exception_error_count(&self) -> u16 {
        self.counters.slave_exception_error
    }

    pub fn slave_message_count(&self) -> u16 {
        self.counters.slave_message
    }

    pub fn slave_no_response_count(&self) -> u16 {
        self.counters.slave_no_response
    }

    pub fn slave_nak_count(&self) -> u16 {
        self.counters.slave_nak
    }

    pub fn slave_busy_count(&self) -> u16 {
        self.counters.slave_busy
    }

    pub fn bus_character_overrun_count(&self) -> u16 {
        self.counters.bus_character_overrun
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::frame::FrameBuilder;
    use crate::protocol::ModbusFunction;
    use crate::sim::{deliver, SimClock, SimSerial};
    use crate::stream::{LineError, RxSlot};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const CHAR_US: u32 = 572;

    fn base() -> (ModbusBase<SimSerial, SimClock>, SimSerial, SimClock) {
        let serial = SimSerial::new();
        let clock = SimClock::new();
        let config = RtuConfig::default();
        let stream = ModbusStream::new(serial.clone(), clock.clone(), RxSlot::allocate(), &config);
        (ModbusBase::new(stream, config), serial, clock)
    }

    fn receive(base: &ModbusBase<SimSerial, SimClock>, clock: &SimClock, bytes: &[u8]) {
        deliver(base.stream().slot(), clock, bytes, CHAR_US);
        clock.advance_us(2_100);
    }

    #[test]
    fn test_queue_is_fifo_and_bounded() {
        let (mut base, serial, _) = base();
        for i in 0..TX_QUEUE_CAPACITY as u16 {
            let frame = FrameBuilder::write_single_register_request(1, i, i).unwrap();
            base.queue_write(&frame).unwrap();
        }
        let extra = FrameBuilder::write_single_register_request(1, 99, 0).unwrap();
        assert_eq!(
            base.queue_write(&extra),
            Err(ModbusError::QueueFull {
                capacity: TX_QUEUE_CAPACITY
            })
        );

        let first = base.transmit_next().unwrap().unwrap();
        assert_eq!(first.word(0), Some(0));
        assert_eq!(serial.take_written(), first.to_bytes().to_vec());
        assert_eq!(base.queued_len(), TX_QUEUE_CAPACITY - 1);
        assert_eq!(base.bus_message_count(), 1);
    }

    #[test]
    fn test_queue_copy_is_independent() {
        let (mut base, serial, _) = base();
        let mut frame = FrameBuilder::write_single_register_request(1, 5, 6).unwrap();
        base.queue_write(&frame).unwrap();
        let expected = frame.to_bytes().to_vec();
        frame.payload.clear();
        base.transmit_next().unwrap();
        assert_eq!(serial.take_written(), expected);
    }

    #[test]
    fn test_transmit_on_empty_queue() {
        let (mut base, serial, _) = base();
        assert_eq!(base.transmit_next().unwrap(), None);
        assert!(serial.take_written().is_empty());
        assert_eq!(base.bus_message_count(), 0);
    }

    #[test]
    fn test_failed_transmit_is_reported() {
        let (mut base, serial, _) = base();
        serial.set_fail_writes(true);
        let frame = FrameBuilder::write_single_register_request(1, 5, 6).unwrap();
        base.queue_write(&frame).unwrap();
        assert!(matches!(base.transmit_next(), Err(ModbusError::Io { .. })));
        assert_eq!(base.bus_message_count(), 0);
        assert_eq!(base.queued_len(), 0);
    }

    #[test]
    fn test_poll_link_callbacks() {
        let (mut base, _, clock) = base();
        let debug_calls = Arc::new(AtomicUsize::new(0));
        let error_calls = Arc::new(AtomicUsize::new(0));
        let d = debug_calls.clone();
        let e = error_calls.clone();
        base.set_debug_callback(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });
        base.set_error_callback(move |frame| {
            assert_eq!(*frame, Frame::empty());
            e.fetch_add(1, Ordering::SeqCst);
        });

        let frame = FrameBuilder::read_coils_request(3, 0, 4).unwrap();
        receive(&base, &clock, &frame.to_bytes());
        assert_eq!(base.poll_link(), Some(frame));

        receive(&base, &clock, &[0x03, 0x01]);
        assert_eq!(base.poll_link(), None);

        assert_eq!(debug_calls.load(Ordering::SeqCst), 1);
        assert_eq!(error_calls.load(Ordering::SeqCst), 1);
        assert_eq!(base.bus_communication_error_count(), 1);
    }

    #[test]
    fn test_line_faults_counted_as_overrun() {
        let (mut base, _, clock) = base();
        clock.advance_us(100);
        base.stream()
            .slot()
            .on_byte(0x00, Some(LineError::Overrun), clock.now_us());
        base.stream()
            .slot()
            .on_byte(0x00, Some(LineError::Framing), clock.now_us());
        assert_eq!(base.poll_link(), None);
        assert_eq!(base.bus_character_overrun_count(), 2);
    }

    #[test]
    fn test_transaction_round_trip() {
        let (mut base, serial, clock) = base();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();

        let request = FrameBuilder::read_input_registers_request(4, 0, 1).unwrap();
        base.submit_transaction(
            &request,
            Box::new(move |resp: &Frame| {
                assert_eq!(resp.registers().unwrap(), vec![7]);
                s.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(100),
        )
        .unwrap();

        base.pump().unwrap();
        assert_eq!(serial.take_written(), request.to_bytes().to_vec());

        let response =
            FrameBuilder::read_registers_response(4, ModbusFunction::ReadInputRegisters, &[7])
                .unwrap();
        receive(&base, &clock, &response.to_bytes());
        base.pump().unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(base.pending_transactions(), 0);
    }

    #[test]
    fn test_transaction_timeout() {
        let (mut base, _, clock) = base();
        let request = FrameBuilder::read_coils_request(4, 0, 1).unwrap();
        base.submit_transaction(
            &request,
            Box::new(|_: &Frame| panic!("handler must not run on timeout")),
            Duration::from_millis(10),
        )
        .unwrap();
        base.pump().unwrap();

        clock.advance_ms(5);
        assert_eq!(base.expire_transactions(), 0);
        clock.advance_ms(10);
        assert_eq!(base.expire_transactions(), 1);
        assert_eq!(base.slave_no_response_count(), 1);
    }

    #[test]
    fn test_counter_snapshot_and_reset() {
        let (mut base, _, _) = base();
        base.counters_mut().record_busy();
        base.counters_mut().record_nak();
        assert_eq!(base.slave_busy_count(), 1);
        assert_eq!(base.slave_nak_count(), 1);

        let snapshot = base.take_counters();
        assert_eq!(snapshot.slave_busy, 1);
        assert_eq!(base.counters(), DiagnosticCounters::default());

        base.counters_mut().record_exception();
        base.reset_counters();
        assert_eq!(base.slave_exception_error_count(), 0);
        assert_eq!(base.slave_message_count(), 0);
    }
}
