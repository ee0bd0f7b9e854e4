#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use voltage_rtu::stream::promote;
use voltage_rtu::{LineError, RxSlot, Timing};

#[derive(Debug, Arbitrary)]
struct Char {
    byte: u8,
    /// Microseconds since the previous character
    gap_us: u16,
    error: bool,
}

fuzz_target!(|chars: Vec<Char>| {
    let slot = RxSlot::new();
    slot.configure(Timing::from_baud(19_200));

    let mut now = 0u64;
    for c in &chars {
        now += u64::from(c.gap_us);
        let error = c.error.then_some(LineError::Framing);
        slot.on_byte(c.byte, error, now);
        assert!(slot.buffered_len() <= voltage_rtu::constants::RX_BUFFER_SIZE);
    }

    let raw: Vec<u8> = chars.iter().map(|c| c.byte).collect();
    let _ = promote(&raw);
});
