use cef_core::wire::{FRAMING_SIGNATURE, MAX_PAYLOAD_SIZE, PACKET_HEADER_SIZE};
use cef_core::{CommandHeader, ErrorCode, LogRecord, PacketHeader, PacketType};
use thiserror::Error;

/// A verified packet lifted off the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CefPacket {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

impl CefPacket {
    pub fn packet_type(&self) -> PacketType {
        self.header.packet_type
    }

    /// Command header at the front of request and response payloads.
    pub fn command_header(&self) -> Result<CommandHeader, DecodeError> {
        CommandHeader::peek(&self.payload).map_err(DecodeError::Payload)
    }

    /// Decode the payload of a log packet.
    pub fn log_record(&self) -> Result<LogRecord, DecodeError> {
        if self.packet_type() != PacketType::LoggingData {
            return Err(DecodeError::UnexpectedType(self.packet_type()));
        }
        LogRecord::decode(&self.payload).map_err(DecodeError::Payload)
    }
}

/// Errors produced while lifting packets off the stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("header checksum mismatch at stream offset {offset}")]
    HeaderChecksum { offset: u64 },
    #[error("payload checksum mismatch: expected {expected:#010x}, found {found:#010x}")]
    PayloadChecksum { expected: u32, found: u32 },
    #[error("declared payload of {0} bytes exceeds the {max} byte limit", max = MAX_PAYLOAD_SIZE)]
    Oversized(usize),
    #[error("unexpected {0} packet")]
    UnexpectedType(PacketType),
    #[error("malformed payload: {0}")]
    Payload(ErrorCode),
}

/// Incremental decoder that accepts arbitrary byte chunks.
///
/// Bytes ahead of a framing signature are dropped. A header that fails its
/// checksum costs one byte, and the scan resumes at the next signature. A
/// payload that fails its checksum costs the whole packet the header
/// described.
#[derive(Debug, Default)]
pub struct PacketDecoder {
    buffer: Vec<u8>,
    consumed: u64,
    skipped: u64,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears any partial packet.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Bytes dropped while hunting for a signature.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// Feeds raw bytes into the decoder and returns every packet, good or
    /// bad, completed by them.
    pub fn push_bytes(&mut self, input: &[u8]) -> Vec<Result<CefPacket, DecodeError>> {
        self.buffer.extend_from_slice(input);
        let mut packets = Vec::new();

        loop {
            match find_signature(&self.buffer) {
                Some(start) => self.discard(start, true),
                None => {
                    let keep = partial_signature_len(&self.buffer);
                    self.discard(self.buffer.len() - keep, true);
                    break;
                }
            }

            let Some(raw_header) = self.buffer.get(..PACKET_HEADER_SIZE) else {
                break;
            };
            let mut raw = [0u8; PACKET_HEADER_SIZE];
            raw.copy_from_slice(raw_header);

            let header = match PacketHeader::parse(&raw) {
                Ok(header) => header,
                Err(_) => {
                    packets.push(Err(DecodeError::HeaderChecksum { offset: self.consumed }));
                    self.discard(1, false);
                    continue;
                }
            };
            if header.payload_len() > MAX_PAYLOAD_SIZE {
                packets.push(Err(DecodeError::Oversized(header.payload_len())));
                self.discard(1, false);
                continue;
            }
            if self.buffer.len() < header.packet_len() {
                break;
            }

            let payload = self.buffer[PACKET_HEADER_SIZE..header.packet_len()].to_vec();
            let result = match header.verify_payload(&payload) {
                Ok(()) => Ok(CefPacket { header, payload }),
                Err(_) => Err(DecodeError::PayloadChecksum {
                    expected: header.payload_checksum,
                    found: cef_core::wire::checksum(&payload),
                }),
            };
            packets.push(result);
            self.discard(header.packet_len(), false);
        }

        packets
    }

    fn discard(&mut self, count: usize, noise: bool) {
        self.buffer.drain(..count);
        self.consumed += count as u64;
        if noise {
            self.skipped += count as u64;
        }
    }
}

fn find_signature(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(FRAMING_SIGNATURE.len())
        .position(|window| window == FRAMING_SIGNATURE)
}

/// Length of the longest tail of `bytes` that could still grow into a signature
fn partial_signature_len(bytes: &[u8]) -> usize {
    (1..FRAMING_SIGNATURE.len())
        .rev()
        .find(|&len| bytes.len() >= len && bytes[bytes.len() - len..] == FRAMING_SIGNATURE[..len])
        .unwrap_or(0)
}
