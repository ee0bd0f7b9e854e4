#![no_main]

use libfuzzer_sys::fuzz_target;
use voltage_rtu::{DiagnosticCounters, Frame, SlaveState};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let Ok(request) = Frame::new(1, data[1], &data[2..]) else {
        return;
    };

    let mut slave = match SlaveState::new(1) {
        Ok(slave) => slave,
        Err(_) => return,
    };
    slave.enable_holding_registers(64);
    slave.enable_input_registers(16);
    slave.enable_coils((0..100).map(|a| (a, data[0] & 1 == 0)).collect(), false);
    slave.enable_discrete_inputs((0..16).map(|a| (a, true)).collect());

    if let Some(Ok(response)) = slave.handle_request(&request, &DiagnosticCounters::default()) {
        assert_eq!(response.address, 1);
        assert!(!response.is_exception());
    }
});
