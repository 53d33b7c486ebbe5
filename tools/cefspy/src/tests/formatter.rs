use cef_core::ping::{PingRequest, PingResponse, PING_RESPONSE_SIZE};
use cef_core::wire::LOG_RECORD_SIZE;
use cef_core::{CommandHeader, ErrorCode, LogRecord, ModuleId, OpCode, PacketType, Severity};
use chrono::{Local, TimeZone};

use crate::{build_packet, LogFormatter, PacketDecoder};

fn log_packet(sequence: u16, severity: Severity) -> crate::CefPacket {
    let mut record = LogRecord::new(severity, ModuleId::CEF_DEBUG_COMMANDS);
    record.sequence = sequence;
    record.timestamp = 29_720_638_091;
    record.variables = [0xCAFE, 1, 0];
    record.line = 42;
    record.set_message("Ping!");
    record.set_file_name("ping.rs");
    let mut payload = [0u8; LOG_RECORD_SIZE];
    let len = record.encode(&mut payload).unwrap();
    decode_one(&build_packet(PacketType::LoggingData, &payload[..len]))
}

fn decode_one(bytes: &[u8]) -> crate::CefPacket {
    PacketDecoder::new().push_bytes(bytes).remove(0).unwrap()
}

fn received() -> chrono::DateTime<Local> {
    Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap()
}

#[test]
fn formats_log_record_as_text() {
    colored::control::set_override(false);
    let mut formatter = LogFormatter::new(false);
    let lines = formatter.format_packet_at(&log_packet(0, Severity::Info), received());

    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert!(line.starts_with("12:30:15.000"));
    assert!(line.contains("[        29.720638091]"));
    assert!(line.contains("INFO"));
    assert!(line.contains("CefDebugCommands"));
    assert!(line.contains("Ping! (0xcafe, 0x1, 0x0) ping.rs:42"));
}

#[test]
fn formats_log_record_as_json() {
    let mut formatter = LogFormatter::new(true);
    let lines = formatter.format_packet_at(&log_packet(7, Severity::Warning), received());

    let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(value["severity"], "WARN");
    assert_eq!(value["sequence"], 7);
    assert_eq!(value["message"], "Ping!");
    assert_eq!(value["module"], "CefDebugCommands");
    assert_eq!(value["variables"][0], 0xCAFE);
    assert_eq!(value["timestamp_ns"], 29_720_638_091u64);
}

#[test]
fn reports_log_sequence_gaps() {
    colored::control::set_override(false);
    let mut formatter = LogFormatter::new(false);
    assert_eq!(formatter.format_packet_at(&log_packet(4, Severity::Info), received()).len(), 1);
    assert_eq!(formatter.format_packet_at(&log_packet(5, Severity::Info), received()).len(), 1);

    let lines = formatter.format_packet_at(&log_packet(9, Severity::Info), received());
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("3 log record(s) lost"));
    assert_eq!(formatter.lost_records(), 3);
}

#[test]
fn sequence_wraps_without_gap() {
    let mut formatter = LogFormatter::new(true);
    formatter.format_packet_at(&log_packet(u16::MAX, Severity::Debug), received());
    let lines = formatter.format_packet_at(&log_packet(0, Severity::Debug), received());
    assert_eq!(lines.len(), 1);
    assert_eq!(formatter.lost_records(), 0);
}

#[test]
fn formats_ping_response() {
    colored::control::set_override(false);
    let request = PingRequest::new(42, 0xCAFE, 1);
    let mut header = CommandHeader::new(OpCode::PING, 42, PING_RESPONSE_SIZE as u32);
    header.error_code = ErrorCode::PingValuesMismatch.to_wire();
    let mut payload = [0u8; PING_RESPONSE_SIZE];
    PingResponse::answering(&request).encode(&header, &mut payload).unwrap();
    let packet = decode_one(&build_packet(PacketType::CommandResponse, &payload));

    let mut formatter = LogFormatter::new(false);
    let line = formatter.format_packet_at(&packet, received()).remove(0);
    assert!(line.contains("response Ping(0x0001) seq=42"));
    assert!(line.contains("(8)"));
    assert!(line.contains("u8=0xa4"));
    assert!(line.contains("test=0xcafe"));
}

#[test]
fn formats_rejected_request_as_json() {
    let mut header = CommandHeader::new(OpCode::new(0x77), 5, 16);
    header.error_code = ErrorCode::ProxyCommandNotAllocatable.to_wire();
    let mut payload = [0u8; 16];
    header
        .write(&mut cef_core::wire::WireWriter::new(&mut payload))
        .unwrap();
    let packet = decode_one(&build_packet(PacketType::CommandResponse, &payload));

    let mut formatter = LogFormatter::new(true);
    let line = formatter.format_packet_at(&packet, received()).remove(0);
    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["error_code"], 17);
    assert_eq!(value["sequence_number"], 5);
    assert_eq!(value["opcode"], "Unknown(0x0077)");
}
