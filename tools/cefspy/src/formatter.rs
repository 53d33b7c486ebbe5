//! Packet Formatter
//!
//! Renders decoded packets for display

use crate::decoder::{CefPacket, DecodeError};
use cef_core::ping::PingResponse;
use cef_core::{CommandHeader, LogRecord, OpCode, PacketType, Severity};
use chrono::{DateTime, Local};
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct LogLine<'a> {
    received: String,
    timestamp_ns: u64,
    sequence: u16,
    severity: String,
    module: &'a str,
    message: &'a str,
    file: &'a str,
    line: u32,
    variables: [u64; 3],
}

#[derive(Serialize)]
struct ResponseLine {
    received: String,
    opcode: String,
    sequence_number: u16,
    error_code: u32,
    num_bytes: u32,
}

pub struct LogFormatter {
    json_format: bool,
    last_sequence: Option<u16>,
    lost_records: u64,
}

impl LogFormatter {
    pub fn new(json_format: bool) -> Self {
        Self {
            json_format,
            last_sequence: None,
            lost_records: 0,
        }
    }

    /// Log records the device discarded, as told by sequence gaps
    pub fn lost_records(&self) -> u64 {
        self.lost_records
    }

    pub fn format_packet(&mut self, packet: &CefPacket) -> Vec<String> {
        self.format_packet_at(packet, Local::now())
    }

    /// Render `packet` as received at `received`. A sequence gap in the log
    /// stream produces an extra line ahead of the record.
    pub fn format_packet_at(&mut self, packet: &CefPacket, received: DateTime<Local>) -> Vec<String> {
        match packet.packet_type() {
            PacketType::LoggingData => match packet.log_record() {
                Ok(record) => self.format_log(&record, received),
                Err(error) => vec![self.format_error(&error)],
            },
            PacketType::CommandResponse | PacketType::CommandRequest => match packet.command_header() {
                Ok(header) => vec![self.format_command(packet, &header, received)],
                Err(error) => vec![self.format_error(&error)],
            },
            PacketType::Invalid => vec![self.format_error(&DecodeError::UnexpectedType(PacketType::Invalid))],
        }
    }

    pub fn format_error(&self, error: &DecodeError) -> String {
        if self.json_format {
            return serde_json::json!({ "error": error.to_string() }).to_string();
        }
        format!("decode error: {}", error).bright_red().bold().to_string()
    }

    fn format_log(&mut self, record: &LogRecord, received: DateTime<Local>) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(lost) = self.track_sequence(record.sequence) {
            lines.push(if self.json_format {
                serde_json::json!({ "lost_records": lost, "resumed_at": record.sequence }).to_string()
            } else {
                format!("... {} log record(s) lost", lost).yellow().to_string()
            });
        }

        if self.json_format {
            let line = LogLine {
                received: received.to_rfc3339(),
                timestamp_ns: record.timestamp,
                sequence: record.sequence,
                severity: record.severity.to_string(),
                module: record.module.name(),
                message: &record.message,
                file: &record.file_name,
                line: record.line,
                variables: record.variables,
            };
            lines.push(serde_json::to_string(&line).unwrap_or_default());
            return lines;
        }

        let severity = format!("{:5}", record.severity.to_string());
        let severity = match record.severity {
            Severity::Debug => severity.dimmed(),
            Severity::Info => severity.bright_green(),
            Severity::Warning => severity.bright_yellow(),
            Severity::Error => severity.bright_red(),
            Severity::Fatal => severity.bright_red().bold(),
        };
        let [v1, v2, v3] = record.variables;
        lines.push(format!(
            "{} [{:>10}.{:09}] {} {:18} {} ({:#x}, {:#x}, {:#x}) {}:{}",
            received.format("%H:%M:%S%.3f").to_string().dimmed(),
            record.timestamp / 1_000_000_000,
            record.timestamp % 1_000_000_000,
            severity,
            record.module.name(),
            record.message.as_str().bright_white(),
            v1,
            v2,
            v3,
            record.file_name,
            record.line
        ));
        lines
    }

    fn format_command(&self, packet: &CefPacket, header: &CommandHeader, received: DateTime<Local>) -> String {
        if self.json_format {
            let line = ResponseLine {
                received: received.to_rfc3339(),
                opcode: header.opcode.to_string(),
                sequence_number: header.sequence_number,
                error_code: header.error_code,
                num_bytes: header.num_bytes,
            };
            return serde_json::to_string(&line).unwrap_or_default();
        }

        let error = match header.error() {
            Some(code) if code.is_ok() => "ok".bright_green().to_string(),
            Some(code) => code.to_string().bright_red().to_string(),
            None => format!("unknown error {}", header.error_code).bright_red().to_string(),
        };
        let mut text = format!(
            "{} {} {} seq={} {}",
            received.format("%H:%M:%S%.3f").to_string().dimmed(),
            packet.packet_type().to_string().bright_cyan(),
            header.opcode,
            header.sequence_number,
            error
        );
        if packet.packet_type() == PacketType::CommandResponse && header.opcode == OpCode::PING {
            if let Ok((_, ping)) = PingResponse::decode(&packet.payload) {
                text.push_str(&format!(
                    " u8={:#04x} u16={:#06x} u32={:#010x} u64={:#018x} test={:#x}",
                    ping.u8_value, ping.u16_value, ping.u32_value, ping.u64_value, ping.test_value
                ));
            }
        }
        text
    }

    fn track_sequence(&mut self, sequence: u16) -> Option<u64> {
        let previous = self.last_sequence.replace(sequence)?;
        let lost = u64::from(sequence.wrapping_sub(previous).wrapping_sub(1));
        if lost == 0 {
            return None;
        }
        self.lost_records += lost;
        Some(lost)
    }
}
