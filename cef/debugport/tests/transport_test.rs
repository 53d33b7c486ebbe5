//! Transport and router behaviour over the loopback driver

use cef_cmd::Execute;
use cef_core::wire::{PacketHeader, PacketType, PACKET_HEADER_SIZE};
use cef_core::{ErrorCode, LogRecord};
use cef_debugport::{
    BufferState, DebugPortDriver, DriverError, LoopbackDriver, PacketRouter, RouterBuffers, Severity,
    TransportConfig, TransportLayer,
};

fn packet(packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
    let mut bytes = PacketHeader::for_payload(packet_type, payload).encode().to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

fn request(payload: &[u8]) -> Vec<u8> {
    packet(PacketType::CommandRequest, payload)
}

fn setup(config: TransportConfig) -> (TransportLayer, RouterBuffers<4>, LoopbackDriver) {
    (
        TransportLayer::new(config),
        RouterBuffers::new(config.discard_percent, None),
        LoopbackDriver::new(),
    )
}

/// Split captured traffic into (header, payload) pairs
fn split_packets(mut bytes: &[u8]) -> Vec<(PacketHeader, Vec<u8>)> {
    let mut packets = Vec::new();
    while bytes.len() >= PACKET_HEADER_SIZE {
        let mut raw = [0u8; PACKET_HEADER_SIZE];
        raw.copy_from_slice(&bytes[..PACKET_HEADER_SIZE]);
        let header = PacketHeader::parse(&raw).unwrap();
        let payload = bytes[PACKET_HEADER_SIZE..header.packet_len()].to_vec();
        header.verify_payload(&payload).unwrap();
        packets.push((header, payload));
        bytes = &bytes[header.packet_len()..];
    }
    packets
}

#[test]
fn test_valid_request_reaches_processing() {
    let (mut transport, mut buffers, mut driver) = setup(TransportConfig::default());
    transport.receive(&mut buffers, &mut driver).unwrap();
    assert_eq!(buffers.state(), BufferState::Receiving);

    let payload: Vec<u8> = (0..48).collect();
    let bytes = request(&payload);
    assert_eq!(driver.feed(&bytes), PACKET_HEADER_SIZE);
    transport.receive(&mut buffers, &mut driver).unwrap();
    assert_eq!(driver.feed(&bytes[PACKET_HEADER_SIZE..]), 48);
    transport.receive(&mut buffers, &mut driver).unwrap();

    assert_eq!(buffers.state(), BufferState::Received);
    let ticket = buffers.checkout_processing().unwrap();
    assert_eq!(buffers.processing_buffer(&ticket).unwrap().as_slice(), &payload[..]);
    assert!(!driver.is_receiving());
}

#[test]
fn test_header_bit_flip_never_reaches_processing() {
    let (mut transport, mut buffers, mut driver) = setup(TransportConfig::default());
    transport.receive(&mut buffers, &mut driver).unwrap();

    let mut bytes = request(&[7; 20]);
    bytes[9] ^= 0x04;
    driver.feed(&bytes[..PACKET_HEADER_SIZE]);
    transport.receive(&mut buffers, &mut driver).unwrap();

    assert_eq!(buffers.state(), BufferState::Available);
    assert!(buffers.checkout_processing().is_none());
    assert_eq!(buffers.errors().first(), Some(ErrorCode::HeaderChecksumMismatch));
    let logged = buffers.pending_logs().next().unwrap();
    assert_eq!(logged.severity, Severity::Error);
    assert_eq!(logged.variables[0], 22);
}

#[test]
fn test_payload_bit_flip_is_rejected() {
    let (mut transport, mut buffers, mut driver) = setup(TransportConfig::default());
    transport.receive(&mut buffers, &mut driver).unwrap();

    let mut bytes = request(&[1, 2, 3, 4]);
    bytes[PACKET_HEADER_SIZE + 2] ^= 0x80;
    let taken = driver.feed(&bytes);
    transport.receive(&mut buffers, &mut driver).unwrap();
    driver.feed(&bytes[taken..]);
    transport.receive(&mut buffers, &mut driver).unwrap();

    assert_eq!(buffers.state(), BufferState::Available);
    assert_eq!(buffers.errors().first(), Some(ErrorCode::PayloadChecksumMismatch));
}

#[test]
fn test_oversized_payload_is_rejected() {
    let (mut transport, mut buffers, mut driver) = setup(TransportConfig::default());
    transport.receive(&mut buffers, &mut driver).unwrap();

    let bytes = request(&[0; 600]);
    driver.feed(&bytes[..PACKET_HEADER_SIZE]);
    transport.receive(&mut buffers, &mut driver).unwrap();

    assert_eq!(buffers.state(), BufferState::Available);
    assert_eq!(buffers.errors().first(), Some(ErrorCode::BufferNotBigEnoughForPayload));
}

#[test]
fn test_receiver_resynchronises_after_noise() {
    let (mut transport, mut buffers, mut driver) = setup(TransportConfig::default());
    transport.receive(&mut buffers, &mut driver).unwrap();

    let mut bytes = vec![0x00, b'C', b'E', 0x13, 0xFF, b'C'];
    bytes.extend(request(&[9; 8]));
    let taken = driver.feed(&bytes);
    assert_eq!(taken, 6 + PACKET_HEADER_SIZE);
    transport.receive(&mut buffers, &mut driver).unwrap();
    driver.feed(&bytes[taken..]);
    transport.receive(&mut buffers, &mut driver).unwrap();

    assert_eq!(buffers.state(), BufferState::Received);
    assert_eq!(buffers.errors().count(), 0);
}

#[test]
fn test_receive_timeout() {
    let config = TransportConfig {
        receive_timeout_polls: 3,
        ..TransportConfig::default()
    };
    let (mut transport, mut buffers, mut driver) = setup(config);
    transport.receive(&mut buffers, &mut driver).unwrap();

    let bytes = request(&[5; 32]);
    driver.feed(&bytes[..PACKET_HEADER_SIZE]);
    transport.receive(&mut buffers, &mut driver).unwrap();
    driver.feed(&bytes[PACKET_HEADER_SIZE..PACKET_HEADER_SIZE + 10]);
    transport.receive(&mut buffers, &mut driver).unwrap();
    assert_eq!(buffers.state(), BufferState::Receiving);

    transport.receive(&mut buffers, &mut driver).unwrap();
    assert_eq!(buffers.state(), BufferState::Available);
    assert_eq!(buffers.errors().first(), Some(ErrorCode::ReceiveTimeout));
}

#[test]
fn test_response_is_framed_and_sent() {
    let (mut transport, mut buffers, mut driver) = setup(TransportConfig::default());
    let rx = buffers.checkout_receive().unwrap();
    buffers.checkin_receive(rx, ErrorCode::Ok).unwrap();
    let work = buffers.checkout_processing().unwrap();
    buffers.processing_buffer_mut(&work).unwrap().fill_from(&[0xAB; 40]).unwrap();
    buffers.checkin_processing(work).unwrap();

    transport.transmit(&mut buffers, &mut driver).unwrap();
    assert_eq!(driver.sent().len(), PACKET_HEADER_SIZE);
    assert_eq!(buffers.state(), BufferState::Transmitting);

    driver.complete_send();
    transport.transmit(&mut buffers, &mut driver).unwrap();
    driver.complete_send();
    transport.transmit(&mut buffers, &mut driver).unwrap();
    assert_eq!(buffers.state(), BufferState::Available);

    let packets = split_packets(driver.sent());
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].0.packet_type, PacketType::CommandResponse);
    assert_eq!(packets[0].1, vec![0xAB; 40]);
}

#[test]
fn test_transmit_timeout_returns_the_buffer() {
    let config = TransportConfig {
        transmit_timeout_polls: 3,
        ..TransportConfig::default()
    };
    let (mut transport, mut buffers, mut driver) = setup(config);
    let rx = buffers.checkout_receive().unwrap();
    buffers.checkin_receive(rx, ErrorCode::Ok).unwrap();
    let work = buffers.checkout_processing().unwrap();
    buffers.checkin_processing(work).unwrap();

    for _ in 0..2 {
        transport.transmit(&mut buffers, &mut driver).unwrap();
    }
    assert_eq!(buffers.state(), BufferState::Transmitting);
    transport.transmit(&mut buffers, &mut driver).unwrap();

    assert_eq!(buffers.state(), BufferState::Available);
    assert_eq!(buffers.errors().first(), Some(ErrorCode::TransmitTimeout));
}

#[test]
fn test_router_round_trip_with_logs() {
    let mut router: PacketRouter<(), LoopbackDriver, 4> =
        PacketRouter::new(LoopbackDriver::new().with_auto_complete(), TransportConfig::default(), None);
    router.execute(None, &mut ()).unwrap();
    let bytes = request(&[3; 24]);
    router.driver_mut().feed(&bytes[..PACKET_HEADER_SIZE]);
    router.execute(None, &mut ()).unwrap();
    router.driver_mut().feed(&bytes[PACKET_HEADER_SIZE..]);
    router.execute(None, &mut ()).unwrap();

    cef_debugport::cef_info!(router, cef_debugport::ModuleId::CEF_DEBUG_COMMANDS, "handled", 24).unwrap();
    let buffers = router.buffers_mut();
    let work = buffers.checkout_processing().unwrap();
    buffers.processing_buffer_mut(&work).unwrap().fill_from(&[4; 16]).unwrap();
    buffers.checkin_processing(work).unwrap();

    router.execute(None, &mut ()).unwrap();
    router.execute(None, &mut ()).unwrap();

    let packets = split_packets(router.driver().sent());
    let types: Vec<PacketType> = packets.iter().map(|(h, _)| h.packet_type).collect();
    assert_eq!(types, vec![PacketType::CommandResponse, PacketType::LoggingData]);
    assert_eq!(router.buffers().pending_log_count(), 0);
}

#[test]
fn test_driver_error_aborts_the_packet() {
    let mut router: PacketRouter<(), LoopbackDriver, 4> =
        PacketRouter::new(LoopbackDriver::new().with_auto_complete(), TransportConfig::default(), None);
    router.execute(None, &mut ()).unwrap();
    router.driver_mut().feed(b"CEFS\x01\x02");
    router.driver().raise_error(DriverError::Noise);
    router.execute(None, &mut ()).unwrap();

    assert_eq!(router.buffers().errors().first(), Some(ErrorCode::DebugPortNoise));
    assert_eq!(router.buffers().state(), BufferState::Available);
    let packets = split_packets(router.driver().sent());
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].0.packet_type, PacketType::LoggingData);
    let logged = LogRecord::decode(&packets[0].1).unwrap();
    assert_eq!(logged.variables[0], 13);

    // the next pass arms a fresh transfer
    router.execute(None, &mut ()).unwrap();
    assert!(router.driver().is_receiving());
    assert_eq!(router.driver().current_bytes_received(), 0);
}
