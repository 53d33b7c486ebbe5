//! Ping command contract shared with the host.
//!
//! The ping command doubles as a protocol checkout: the request carries
//! known values of every integer width so byte order and structure packing
//! mistakes on either side show up as a mismatch.

use crate::errors::ErrorCode;
use crate::opcodes::OpCode;
use crate::wire::{CommandHeader, WireReader, WireWriter, COMMAND_HEADER_SIZE};

pub const PING_U8_EXPECTED: u8 = 0xA3;
pub const PING_U16_EXPECTED: u16 = 0x93A3;
pub const PING_U32_EXPECTED: u32 = 0x2084_61A3;
pub const PING_U64_EXPECTED: u64 = 0x9362_1799_5202_A373;

/// Encoded size of [`PingRequest`], header included
pub const PING_REQUEST_SIZE: usize = COMMAND_HEADER_SIZE + 32;
/// Encoded size of [`PingResponse`], header included
pub const PING_RESPONSE_SIZE: usize = COMMAND_HEADER_SIZE + 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequest {
    pub header: CommandHeader,
    pub u8_value: u8,
    pub u16_value: u16,
    pub test_value: u32,
    pub u32_value: u32,
    pub offset_to_add: u64,
    pub u64_value: u64,
}

impl PingRequest {
    /// A request carrying the expected checkout values
    pub const fn new(sequence_number: u16, test_value: u32, offset_to_add: u64) -> Self {
        Self {
            header: CommandHeader::new(OpCode::PING, sequence_number, PING_REQUEST_SIZE as u32),
            u8_value: PING_U8_EXPECTED,
            u16_value: PING_U16_EXPECTED,
            test_value,
            u32_value: PING_U32_EXPECTED,
            offset_to_add,
            u64_value: PING_U64_EXPECTED,
        }
    }

    pub const fn has_expected_values(&self) -> bool {
        self.u8_value == PING_U8_EXPECTED
            && self.u16_value == PING_U16_EXPECTED
            && self.u32_value == PING_U32_EXPECTED
            && self.u64_value == PING_U64_EXPECTED
    }

    pub fn encode(&self, out: &mut [u8]) -> Result<usize, ErrorCode> {
        let mut writer = WireWriter::new(out);
        self.header.write(&mut writer)?;
        writer.put_u8(self.u8_value)?;
        writer.put_u8(0)?;
        writer.put_u16(self.u16_value)?;
        writer.put_u32(self.test_value)?;
        writer.put_u32(self.u32_value)?;
        writer.put_u32(0)?;
        writer.put_u64(self.offset_to_add)?;
        writer.put_u64(self.u64_value)?;
        Ok(writer.position())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ErrorCode> {
        let mut reader = WireReader::new(bytes);
        let header = CommandHeader::read(&mut reader)?;
        let u8_value = reader.get_u8()?;
        reader.skip(1)?;
        let u16_value = reader.get_u16()?;
        let test_value = reader.get_u32()?;
        let u32_value = reader.get_u32()?;
        reader.skip(4)?;
        let offset_to_add = reader.get_u64()?;
        let u64_value = reader.get_u64()?;
        Ok(Self {
            header,
            u8_value,
            u16_value,
            test_value,
            u32_value,
            offset_to_add,
            u64_value,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingResponse {
    pub u8_value: u8,
    pub u16_value: u16,
    pub test_value: u32,
    pub u32_value: u32,
    pub u64_value: u64,
}

impl PingResponse {
    /// Response the device produces for `request`: every value plus the
    /// requested offset, wrapping at its own width.
    pub fn answering(request: &PingRequest) -> Self {
        let offset = request.offset_to_add;
        Self {
            u8_value: request.u8_value.wrapping_add(offset as u8),
            u16_value: request.u16_value.wrapping_add(offset as u16),
            test_value: request.test_value,
            u32_value: request.u32_value.wrapping_add(offset as u32),
            u64_value: request.u64_value.wrapping_add(offset),
        }
    }

    /// Encode after `header`, which the caller has already populated
    pub fn encode(&self, header: &CommandHeader, out: &mut [u8]) -> Result<usize, ErrorCode> {
        let mut writer = WireWriter::new(out);
        header.write(&mut writer)?;
        writer.put_u8(self.u8_value)?;
        writer.put_u8(0)?;
        writer.put_u16(self.u16_value)?;
        writer.put_u32(self.test_value)?;
        writer.put_u32(self.u32_value)?;
        writer.put_u32(0)?;
        writer.put_u64(self.u64_value)?;
        Ok(writer.position())
    }

    pub fn decode(bytes: &[u8]) -> Result<(CommandHeader, Self), ErrorCode> {
        let mut reader = WireReader::new(bytes);
        let header = CommandHeader::read(&mut reader)?;
        let u8_value = reader.get_u8()?;
        reader.skip(1)?;
        let u16_value = reader.get_u16()?;
        let test_value = reader.get_u32()?;
        let u32_value = reader.get_u32()?;
        reader.skip(4)?;
        let u64_value = reader.get_u64()?;
        Ok((
            header,
            Self {
                u8_value,
                u16_value,
                test_value,
                u32_value,
                u64_value,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_encoding_size_and_layout() {
        let request = PingRequest::new(7, 0xDEAD_BEEF, 1);
        let mut bytes = [0u8; 64];
        assert_eq!(request.encode(&mut bytes).unwrap(), PING_REQUEST_SIZE);
        assert_eq!(bytes[16], PING_U8_EXPECTED);
        assert_eq!(&bytes[20..24], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(PingRequest::decode(&bytes[..PING_REQUEST_SIZE]).unwrap(), request);
    }

    #[test]
    fn test_response_adds_offset_with_wrapping() {
        let request = PingRequest::new(1, 5, 0x100);
        let response = PingResponse::answering(&request);
        assert_eq!(response.u8_value, PING_U8_EXPECTED);
        assert_eq!(response.u16_value, PING_U16_EXPECTED.wrapping_add(0x100));
        assert_eq!(response.u32_value, PING_U32_EXPECTED + 0x100);
        assert_eq!(response.u64_value, PING_U64_EXPECTED.wrapping_add(0x100));
        assert_eq!(response.test_value, 5);
    }

    #[test]
    fn test_short_request_is_rejected() {
        let bytes = [0u8; PING_REQUEST_SIZE - 1];
        assert_eq!(PingRequest::decode(&bytes), Err(ErrorCode::NumBytesMismatch));
    }
}
