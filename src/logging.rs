//! Packet and event logging
//!
//! By default log lines go to `tracing`. An application without a tracing
//! subscriber (a bare MCU console, a UI pane) can install a callback instead.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::protocol::{ModbusFunction, SlaveId};

/// Severity of a log line
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        };
        f.write_str(s)
    }
}

/// Receives every log line at or above the logger's level
pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Where log lines end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingMode {
    Disabled,
    /// Emit through `tracing` macros
    #[default]
    Tracing,
    /// Hand to the installed callback
    Callback,
}

/// Logger shared by the link and role layers
#[derive(Clone, Default)]
pub struct CallbackLogger {
    callback: Option<LogCallback>,
    level: LogLevel,
    mode: LoggingMode,
}

impl fmt::Debug for CallbackLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackLogger")
            .field("level", &self.level)
            .field("mode", &self.mode)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl CallbackLogger {
    /// Route log lines at or above `level` to `callback`
    pub fn new(callback: LogCallback, level: LogLevel) -> Self {
        Self {
            callback: Some(callback),
            level,
            mode: LoggingMode::Callback,
        }
    }

    pub fn disabled() -> Self {
        Self {
            callback: None,
            level: LogLevel::Error,
            mode: LoggingMode::Disabled,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn mode(&self) -> LoggingMode {
        self.mode
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if level > self.level {
            return;
        }
        match self.mode {
            LoggingMode::Disabled => {}
            LoggingMode::Tracing => match level {
                LogLevel::Error => error!("{}", message),
                LogLevel::Warn => warn!("{}", message),
                LogLevel::Info => info!("{}", message),
                LogLevel::Debug => debug!("{}", message),
                LogLevel::Trace => trace!("{}", message),
            },
            LoggingMode::Callback => {
                if let Some(cb) = &self.callback {
                    cb(level, message);
                }
            }
        }
    }

    /// Log a raw frame as hex, e.g. `[MODBUS-RTU] send slave:1 01 03 00 00 00 0A C5 CD`
    pub fn log_packet(&self, direction: &str, data: &[u8], slave_id: Option<SlaveId>) {
        if LogLevel::Info > self.level || self.mode == LoggingMode::Disabled {
            return;
        }
        let hex = format_hex_packet(data);
        let line = match slave_id {
            Some(id) => format!("[MODBUS-RTU] {} slave:{} {}", direction, id, hex),
            None => format!("[MODBUS-RTU] {} {}", direction, hex),
        };
        self.log(LogLevel::Info, &line);
    }

    /// Log the decoded header of a frame
    pub fn log_frame(&self, direction: &str, slave_id: SlaveId, function_code: u8, payload: &[u8]) {
        if LogLevel::Debug > self.level || self.mode == LoggingMode::Disabled {
            return;
        }
        self.log(
            LogLevel::Debug,
            &format!(
                "{} slave={} fc=0x{:02X} ({}) payload_len={}",
                direction,
                slave_id,
                function_code,
                ModbusFunction::description(function_code),
                payload.len()
            ),
        );
    }
}

/// Format raw bytes as space-separated upper-case hex
pub fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
