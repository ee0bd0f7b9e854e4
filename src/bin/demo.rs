//! Voltage RTU Demo
//!
//! Runs a master and a slave over a simulated RS-485 line and walks through
//! the supported function codes, printing every frame on the wire.
//!
//! Usage: cargo run --bin demo [baud_rate]
//! Example: cargo run --bin demo 9600

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use voltage_rtu::sim::{transfer, SimClock, SimGpio, SimSerial};
use voltage_rtu::{
    CallbackLogger, DiagnosticSubFunction, Frame, LogLevel, ModbusNode, ModbusResult,
    ModbusStream, RtuConfig, RxSlot, Timing,
};

const SLAVE_ADDRESS: u8 = 2;

type Node = ModbusNode<SimSerial, SimClock>;

struct Line {
    clock: SimClock,
    char_us: u32,
    silence_us: u64,
    master: Node,
    master_serial: SimSerial,
    slave: Node,
    slave_serial: SimSerial,
}

impl Line {
    /// Pump both ends until the master's request has completed
    fn run(&mut self) -> ModbusResult<()> {
        for _ in 0..8 {
            self.master.pump()?;
            transfer(
                &self.master_serial,
                self.slave.base().stream().slot(),
                &self.clock,
                self.char_us,
            );
            self.clock.advance_us(self.silence_us);
            self.slave.pump()?;
            transfer(
                &self.slave_serial,
                self.master.base().stream().slot(),
                &self.clock,
                self.char_us,
            );
            self.clock.advance_us(self.silence_us);
            self.master.pump()?;
            if !self.master.is_request_pending() {
                break;
            }
        }
        Ok(())
    }
}

fn printer(prefix: &'static str) -> CallbackLogger {
    CallbackLogger::new(
        Arc::new(move |level: LogLevel, line: &str| println!("  {:<6} [{}] {}", prefix, level, line)),
        LogLevel::Info,
    )
}

fn describe(label: &'static str) -> impl FnOnce(&Frame) + Send + 'static {
    move |response: &Frame| match response.check_exception() {
        Ok(()) => println!("  ✅ {}: payload {:02X?}", label, response.payload.as_slice()),
        Err(e) => println!("  ❌ {}: {}", label, e),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let baud = std::env::args()
        .nth(1)
        .map(|s| s.parse::<u32>())
        .transpose()?
        .unwrap_or(19_200);

    println!("🚀 {}", voltage_rtu::info());
    println!("=============================");

    let config = RtuConfig::default().with_custom_baud_rate(baud);
    config.validate()?;
    let timing = config.timing();
    println!(
        "Line: {} baud, T1.5={}us, T3.5={}us\n",
        baud, timing.t1_5_us, timing.t3_5_us
    );

    let clock = SimClock::new();
    let master_serial = SimSerial::new();
    let slave_serial = SimSerial::new();
    let gpio = SimGpio::new(30);

    let mut master = ModbusNode::master(
        ModbusStream::new(master_serial.clone(), clock.clone(), RxSlot::allocate(), &config),
        config,
    )?;
    master.base_mut().set_logger(printer("master"));
    master.base_mut().set_packet_logging(true);

    let mut slave = ModbusNode::slave(
        SLAVE_ADDRESS,
        ModbusStream::new(slave_serial.clone(), clock.clone(), RxSlot::allocate(), &config),
        config,
    )?;
    slave.base_mut().set_logger(printer("slave"));
    slave.base_mut().set_packet_logging(true);

    let messages = Arc::new(Mutex::new(0u32));
    let seen = messages.clone();
    slave.base_mut().set_message_callback(move |_: &Frame| {
        if let Ok(mut n) = seen.lock() {
            *n += 1;
        }
    });

    if let Some(state) = slave.slave_mut() {
        state.set_gpio(gpio.clone());
        state.enable_holding_registers(10);
        state.enable_input_registers(4);
        state.enable_coils((0..30).map(|a| (a, false)).collect::<BTreeMap<_, _>>(), true);
        state.enable_discrete_inputs([(0, true), (1, false)].into_iter().collect());
        state.store_mut().set_holding_register(0, 42)?;
        state.store_mut().set_input_register(1, 1234)?;
    }

    let mut line = Line {
        clock,
        char_us: Timing::char_time_us(baud),
        silence_us: u64::from(timing.t3_5_us) + 100,
        master,
        master_serial,
        slave,
        slave_serial,
    };

    println!("📖 Read holding register 0");
    line.master
        .send_read_single_holding_register(SLAVE_ADDRESS, 0, describe("FC03"))?;
    line.run()?;

    println!("\n📖 Read input registers 0..2");
    line.master
        .send_read_input_registers(SLAVE_ADDRESS, 0, 2, describe("FC04"))?;
    line.run()?;

    println!("\n✍️  Write coil 28 = ON (mirrored to GPIO 28)");
    line.master
        .send_write_single_coil(SLAVE_ADDRESS, 28, true, describe("FC05"))?;
    line.run()?;
    println!("  GPIO 28 level: {:?}", gpio.level(28));

    println!("\n✍️  Write registers 1..4");
    line.master.send_write_multiple_registers(
        SLAVE_ADDRESS,
        1,
        &[0x0102, 0x0304, 0x0506],
        describe("FC16"),
    )?;
    line.run()?;

    println!("\n⚠️  Read zero registers (illegal data value)");
    line.master
        .send_read_holding_registers(SLAVE_ADDRESS, 0, 0, describe("FC03"))?;
    line.run()?;

    println!("\n🩺 Diagnostics: slave message count");
    line.master.send_diagnostic_request(
        SLAVE_ADDRESS,
        DiagnosticSubFunction::SlaveMessageCount.to_u16(),
        0,
        describe("FC08"),
    )?;
    line.run()?;

    println!("\n⏱  Request to absent slave 9");
    line.master
        .send_read_coils(9, 0, 8, describe("FC01"))?;
    for _ in 0..3 {
        line.clock.advance_ms(2_000);
        line.run()?;
    }

    println!("\n📊 Counters");
    println!("  master: {:?}", line.master.base().counters());
    println!("  slave:  {:?}", line.slave.base().counters());
    if let Ok(n) = messages.lock() {
        println!("  slave message callback fired {} time(s)", *n);
    }

    Ok(())
}
