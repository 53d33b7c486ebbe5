//! Log record payload sent from the device to the host

use crate::errors::ErrorCode;
use crate::opcodes::OpCode;
use crate::wire::{CommandHeader, WireReader, WireWriter, LOG_RECORD_SIZE};
use core::fmt;
use heapless::String;

/// Bytes reserved for the message, NUL terminator included
pub const LOG_MESSAGE_BYTES: usize = 128;
/// Bytes reserved for the source file name, NUL terminator included
pub const LOG_FILE_NAME_BYTES: usize = 40;

const MESSAGE_CAPACITY: usize = LOG_MESSAGE_BYTES - 1;
const FILE_NAME_CAPACITY: usize = LOG_FILE_NAME_BYTES - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Severity {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Fatal = 4,
}

impl Severity {
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Severity::Debug),
            1 => Some(Severity::Info),
            2 => Some(Severity::Warning),
            3 => Some(Severity::Error),
            4 => Some(Severity::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// Subsystem that emitted a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleId(pub u8);

impl ModuleId {
    pub const CEF_INFRASTRUCTURE: ModuleId = ModuleId(0);
    pub const CEF_DEBUG_COMMANDS: ModuleId = ModuleId(1);

    pub const fn name(self) -> &'static str {
        match self.0 {
            0 => "CefInfrastructure",
            1 => "CefDebugCommands",
            _ => "Unknown",
        }
    }
}

/// One log entry as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub header: CommandHeader,
    pub variables: [u64; 3],
    /// Nanoseconds
    pub timestamp: u64,
    pub message: String<MESSAGE_CAPACITY>,
    pub file_name: String<FILE_NAME_CAPACITY>,
    pub line: u32,
    /// Rolling counter; gaps tell the host that records were discarded
    pub sequence: u16,
    pub module: ModuleId,
    pub severity: Severity,
}

impl LogRecord {
    pub fn new(severity: Severity, module: ModuleId) -> Self {
        Self {
            header: CommandHeader::new(OpCode::NONE, 0, LOG_RECORD_SIZE as u32),
            variables: [0; 3],
            timestamp: 0,
            message: String::new(),
            file_name: String::new(),
            line: 0,
            sequence: 0,
            module,
            severity,
        }
    }

    /// Replace the message, truncated to the field capacity
    pub fn set_message(&mut self, message: &str) {
        copy_truncated(&mut self.message, message);
    }

    /// Replace the file name, truncated to the field capacity
    pub fn set_file_name(&mut self, file_name: &str) {
        copy_truncated(&mut self.file_name, file_name);
    }

    pub fn encode(&self, out: &mut [u8]) -> Result<usize, ErrorCode> {
        let mut writer = WireWriter::new(out);
        self.header.write(&mut writer)?;
        for value in self.variables {
            writer.put_u64(value)?;
        }
        writer.put_u64(self.timestamp)?;
        writer.put_fixed_str(&self.message, LOG_MESSAGE_BYTES)?;
        writer.put_fixed_str(&self.file_name, LOG_FILE_NAME_BYTES)?;
        writer.put_u32(self.line)?;
        writer.put_u16(self.sequence)?;
        writer.put_u8(self.module.0)?;
        writer.put_u8(self.severity as u8)?;
        Ok(writer.position())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ErrorCode> {
        let mut reader = WireReader::new(bytes);
        let header = CommandHeader::read(&mut reader)?;
        let variables = [reader.get_u64()?, reader.get_u64()?, reader.get_u64()?];
        let timestamp = reader.get_u64()?;
        let message_bytes = reader.get_array::<LOG_MESSAGE_BYTES>()?;
        let file_bytes = reader.get_array::<LOG_FILE_NAME_BYTES>()?;
        let line = reader.get_u32()?;
        let sequence = reader.get_u16()?;
        let module = ModuleId(reader.get_u8()?);
        let severity = Severity::from_u8(reader.get_u8()?).ok_or(ErrorCode::IllegalCommandState)?;

        let mut record = Self {
            header,
            variables,
            timestamp,
            message: String::new(),
            file_name: String::new(),
            line,
            sequence,
            module,
            severity,
        };
        record.set_message(fixed_field_str(&message_bytes));
        record.set_file_name(fixed_field_str(&file_bytes));
        Ok(record)
    }
}

fn copy_truncated<const N: usize>(dst: &mut String<N>, src: &str) {
    dst.clear();
    for ch in src.chars() {
        if dst.push(ch).is_err() {
            break;
        }
    }
}

/// Text of a NUL terminated fixed field; invalid UTF-8 is cut at the first
/// bad byte.
fn fixed_field_str(bytes: &[u8]) -> &str {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    match core::str::from_utf8(&bytes[..len]) {
        Ok(text) => text,
        Err(err) => core::str::from_utf8(&bytes[..err.valid_up_to()]).unwrap_or_default(),
    }
}
