//! Debug port wire contract.
//!
//! Every packet on the link is a 16 byte [`PacketHeader`] followed by
//! `payload_size` bytes of payload. Command requests, command responses and
//! log records all start their payload with a 16 byte [`CommandHeader`].
//!
//! All multi-byte fields are little-endian. The framing signature is a byte
//! array and the checksums are plain byte sums, so neither depends on the
//! byte order of the machine computing them.

use crate::errors::ErrorCode;
use crate::opcodes::OpCode;
use core::fmt;

/// Marker that opens every packet ("CEFS")
pub const FRAMING_SIGNATURE: [u8; 4] = [0x43, 0x45, 0x46, 0x53];

pub const PACKET_HEADER_SIZE: usize = 16;
pub const COMMAND_HEADER_SIZE: usize = 16;

/// Largest command body carried after the command header
pub const MAX_COMMAND_BODY: usize = 512;
/// Largest command request/response payload
pub const COMMAND_PAYLOAD_MAX: usize = COMMAND_HEADER_SIZE + MAX_COMMAND_BODY;
/// Encoded size of a log record payload
pub const LOG_RECORD_SIZE: usize = 224;
/// Largest payload the transport will accept or emit
pub const MAX_PAYLOAD_SIZE: usize = const_max(COMMAND_PAYLOAD_MAX, LOG_RECORD_SIZE);
/// Largest packet on the wire
pub const MAX_PACKET_SIZE: usize = PACKET_HEADER_SIZE + MAX_PAYLOAD_SIZE;

const SIGNATURE_RANGE: core::ops::Range<usize> = 0..4;
const HEADER_CHECKSUM_RANGE: core::ops::Range<usize> = 4..6;
const PAYLOAD_CHECKSUM_RANGE: core::ops::Range<usize> = 6..10;
const PAYLOAD_SIZE_RANGE: core::ops::Range<usize> = 10..14;
const PACKET_TYPE_OFFSET: usize = 14;
const RESERVED_OFFSET: usize = 15;

const fn const_max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

/// Unsigned 32-bit sum of the raw bytes, no carry folding
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |sum, &byte| sum.wrapping_add(u32::from(byte)))
}

/// Kind of payload carried by a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    CommandRequest = 0,
    CommandResponse = 1,
    LoggingData = 2,
    Invalid = 0xFF,
}

impl PacketType {
    /// Unknown values map to `Invalid`
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PacketType::CommandRequest,
            1 => PacketType::CommandResponse,
            2 => PacketType::LoggingData,
            _ => PacketType::Invalid,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::CommandRequest => "request",
            PacketType::CommandResponse => "response",
            PacketType::LoggingData => "log",
            PacketType::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// Transport header preceding every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub header_checksum: u16,
    pub payload_checksum: u32,
    pub payload_size: u32,
    pub packet_type: PacketType,
    pub reserved: u8,
}

impl PacketHeader {
    /// Build a complete header for `payload`.
    ///
    /// The payload checksum is filled first; the header checksum is computed
    /// last over the encoded header with its own field zeroed.
    pub fn for_payload(packet_type: PacketType, payload: &[u8]) -> Self {
        let mut header = Self {
            header_checksum: 0,
            payload_checksum: checksum(payload),
            payload_size: payload.len() as u32,
            packet_type,
            reserved: 0,
        };
        header.header_checksum = Self::compute_header_checksum(&header.encode());
        header
    }

    /// Serialise the header including the framing signature
    pub fn encode(&self) -> [u8; PACKET_HEADER_SIZE] {
        let mut bytes = [0u8; PACKET_HEADER_SIZE];
        bytes[SIGNATURE_RANGE].copy_from_slice(&FRAMING_SIGNATURE);
        bytes[HEADER_CHECKSUM_RANGE].copy_from_slice(&self.header_checksum.to_le_bytes());
        bytes[PAYLOAD_CHECKSUM_RANGE].copy_from_slice(&self.payload_checksum.to_le_bytes());
        bytes[PAYLOAD_SIZE_RANGE].copy_from_slice(&self.payload_size.to_le_bytes());
        bytes[PACKET_TYPE_OFFSET] = self.packet_type.as_u8();
        bytes[RESERVED_OFFSET] = self.reserved;
        bytes
    }

    /// Header checksum over `bytes` with the checksum field treated as zero
    pub fn compute_header_checksum(bytes: &[u8; PACKET_HEADER_SIZE]) -> u16 {
        let covered = checksum(&bytes[..HEADER_CHECKSUM_RANGE.start])
            .wrapping_add(checksum(&bytes[HEADER_CHECKSUM_RANGE.end..]));
        covered as u16
    }

    /// Decode the fields without validating anything
    pub fn decode(bytes: &[u8; PACKET_HEADER_SIZE]) -> Self {
        Self {
            header_checksum: u16::from_le_bytes([bytes[4], bytes[5]]),
            payload_checksum: u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
            payload_size: u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]),
            packet_type: PacketType::from_u8(bytes[PACKET_TYPE_OFFSET]),
            reserved: bytes[RESERVED_OFFSET],
        }
    }

    /// Decode and validate a received header.
    ///
    /// A wrong framing signature is reported as a header checksum failure:
    /// the signature is part of the covered range.
    pub fn parse(bytes: &[u8; PACKET_HEADER_SIZE]) -> Result<Self, ErrorCode> {
        if bytes[SIGNATURE_RANGE] != FRAMING_SIGNATURE {
            return Err(ErrorCode::HeaderChecksumMismatch);
        }
        let header = Self::decode(bytes);
        if header.header_checksum != Self::compute_header_checksum(bytes) {
            return Err(ErrorCode::HeaderChecksumMismatch);
        }
        Ok(header)
    }

    /// Check `payload` against the declared size and checksum
    pub fn verify_payload(&self, payload: &[u8]) -> Result<(), ErrorCode> {
        if payload.len() != self.payload_len() || checksum(payload) != self.payload_checksum {
            return Err(ErrorCode::PayloadChecksumMismatch);
        }
        Ok(())
    }

    pub const fn payload_len(&self) -> usize {
        self.payload_size as usize
    }

    /// Header plus payload
    pub const fn packet_len(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload_len()
    }
}

/// Sequential little-endian writer over a byte slice
pub struct WireWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), ErrorCode> {
        let end = self.pos + bytes.len();
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(ErrorCode::BufferNotBigEnoughForPayload)?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), ErrorCode> {
        self.put_bytes(&[value])
    }

    pub fn put_u16(&mut self, value: u16) -> Result<(), ErrorCode> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<(), ErrorCode> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_u64(&mut self, value: u64) -> Result<(), ErrorCode> {
        self.put_bytes(&value.to_le_bytes())
    }

    /// Write `text` into a fixed `width` field, truncated so the field always
    /// ends with a NUL byte, and zero filled.
    pub fn put_fixed_str(&mut self, text: &str, width: usize) -> Result<(), ErrorCode> {
        let take = text.len().min(width.saturating_sub(1));
        let end = self.pos + width;
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(ErrorCode::BufferNotBigEnoughForPayload)?;
        dst.fill(0);
        dst[..take].copy_from_slice(&text.as_bytes()[..take]);
        self.pos = end;
        Ok(())
    }

    /// Number of bytes written so far
    pub fn position(&self) -> usize {
        self.pos
    }
}

/// Sequential little-endian reader over a byte slice
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], ErrorCode> {
        let end = self.pos + N;
        let src = self
            .buf
            .get(self.pos..end)
            .ok_or(ErrorCode::NumBytesMismatch)?;
        let mut out = [0u8; N];
        out.copy_from_slice(src);
        self.pos = end;
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, ErrorCode> {
        Ok(self.get_array::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, ErrorCode> {
        Ok(u16::from_le_bytes(self.get_array()?))
    }

    pub fn get_u32(&mut self) -> Result<u32, ErrorCode> {
        Ok(u32::from_le_bytes(self.get_array()?))
    }

    pub fn get_u64(&mut self) -> Result<u64, ErrorCode> {
        Ok(u64::from_le_bytes(self.get_array()?))
    }

    pub fn skip(&mut self, count: usize) -> Result<(), ErrorCode> {
        if self.remaining() < count {
            return Err(ErrorCode::NumBytesMismatch);
        }
        self.pos += count;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Header opening every command request, command response and log record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub opcode: OpCode,
    /// Host generated; passed through unchanged from request to response
    pub sequence_number: u16,
    pub error_code: u32,
    /// Size of the whole command structure, header included
    pub num_bytes: u32,
    pub padding: u32,
}

impl CommandHeader {
    pub const fn new(opcode: OpCode, sequence_number: u16, num_bytes: u32) -> Self {
        Self {
            opcode,
            sequence_number,
            error_code: ErrorCode::Ok.to_wire(),
            num_bytes,
            padding: 0,
        }
    }

    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ErrorCode> {
        Ok(Self {
            opcode: OpCode::new(reader.get_u16()?),
            sequence_number: reader.get_u16()?,
            error_code: reader.get_u32()?,
            num_bytes: reader.get_u32()?,
            padding: reader.get_u32()?,
        })
    }

    pub fn write(&self, writer: &mut WireWriter<'_>) -> Result<(), ErrorCode> {
        writer.put_u16(self.opcode.raw())?;
        writer.put_u16(self.sequence_number)?;
        writer.put_u32(self.error_code)?;
        writer.put_u32(self.num_bytes)?;
        writer.put_u32(self.padding)
    }

    /// Read the header at the start of `payload`
    pub fn peek(payload: &[u8]) -> Result<Self, ErrorCode> {
        Self::read(&mut WireReader::new(payload))
    }

    /// Decoded error field; unknown values yield `None`
    pub fn error(&self) -> Option<ErrorCode> {
        ErrorCode::from_wire(self.error_code)
    }
}
