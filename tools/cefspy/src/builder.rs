use cef_core::ping::{PingRequest, PING_REQUEST_SIZE};
use cef_core::wire::PACKET_HEADER_SIZE;
use cef_core::{ErrorCode, PacketHeader, PacketType};

/// Frame `payload` as one packet: header, then payload.
pub fn build_packet(packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
    let header = PacketHeader::for_payload(packet_type, payload);
    let mut packet = Vec::with_capacity(PACKET_HEADER_SIZE + payload.len());
    packet.extend_from_slice(&header.encode());
    packet.extend_from_slice(payload);
    packet
}

/// Builds ping requests for the device.
#[derive(Debug, Clone, Copy)]
pub struct PingRequestBuilder {
    sequence_number: u16,
    test_value: u32,
    offset: u64,
}

impl Default for PingRequestBuilder {
    fn default() -> Self {
        Self {
            sequence_number: 1,
            test_value: 0,
            offset: 0,
        }
    }
}

impl PingRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequence_number(mut self, sequence_number: u16) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    /// Value the device echoes back unchanged.
    pub fn test_value(mut self, test_value: u32) -> Self {
        self.test_value = test_value;
        self
    }

    /// Value the device adds to every expected field.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn request(&self) -> PingRequest {
        PingRequest::new(self.sequence_number, self.test_value, self.offset)
    }

    pub fn payload(&self) -> Result<Vec<u8>, ErrorCode> {
        let mut payload = vec![0u8; PING_REQUEST_SIZE];
        let len = self.request().encode(&mut payload)?;
        payload.truncate(len);
        Ok(payload)
    }

    /// The complete request packet.
    pub fn build(&self) -> Result<Vec<u8>, ErrorCode> {
        Ok(build_packet(PacketType::CommandRequest, &self.payload()?))
    }
}
