//! Packet framing over the byte-stream driver.
//!
//! Two independent state machines: the receiver assembles and validates
//! incoming packets into the router's command buffer, the transmitter
//! frames whatever payload the router hands out. Both advance as far as
//! they can on each call and never block.

use crate::buffers::{ReceiveTicket, RouterBuffers, TransmitTicket};
use crate::driver::DebugPortDriver;
use cef_core::wire::{PacketHeader, PacketType, MAX_PAYLOAD_SIZE, PACKET_HEADER_SIZE};
use cef_core::{CefResult, ErrorCode, ModuleId, Severity};

/// Transport tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Polls a send may stay busy before it is abandoned; 0 waits forever
    pub transmit_timeout_polls: u32,
    /// Polls a packet payload may take to arrive; 0 waits forever
    pub receive_timeout_polls: u32,
    /// Share of the log pool evicted when logging runs out of space
    pub discard_percent: u8,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            transmit_timeout_polls: 10_000,
            receive_timeout_polls: 10_000,
            discard_percent: 33,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveState {
    WaitForBuffer,
    WaitForHeader,
    WaitForPayload,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitState {
    WaitForBuffer,
    GenerateHeader,
    SendHeader,
    WaitHeaderSent,
    SendPayload,
    WaitPayloadSent,
    Finished,
}

struct Receiver {
    state: ReceiveState,
    ticket: Option<ReceiveTicket>,
    header: Option<PacketHeader>,
    status: ErrorCode,
    polls: u32,
}

struct Transmitter {
    state: TransmitState,
    ticket: Option<TransmitTicket>,
    staging: [u8; MAX_PAYLOAD_SIZE],
    payload_len: usize,
    packet_type: PacketType,
    header: [u8; PACKET_HEADER_SIZE],
    polls: u32,
}

pub struct TransportLayer {
    config: TransportConfig,
    rx: Receiver,
    tx: Transmitter,
}

impl TransportLayer {
    pub const fn new(config: TransportConfig) -> Self {
        Self {
            config,
            rx: Receiver {
                state: ReceiveState::WaitForBuffer,
                ticket: None,
                header: None,
                status: ErrorCode::Ok,
                polls: 0,
            },
            tx: Transmitter {
                state: TransmitState::WaitForBuffer,
                ticket: None,
                staging: [0; MAX_PAYLOAD_SIZE],
                payload_len: 0,
                packet_type: PacketType::Invalid,
                header: [0; PACKET_HEADER_SIZE],
                polls: 0,
            },
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn receive_state(&self) -> ReceiveState {
        self.rx.state
    }

    pub fn transmit_state(&self) -> TransmitState {
        self.tx.state
    }

    /// Advance the receive state machine as far as the driver allows
    pub fn receive<D, const L: usize>(
        &mut self,
        buffers: &mut RouterBuffers<L>,
        driver: &mut D,
    ) -> CefResult<()>
    where
        D: DebugPortDriver + ?Sized,
    {
        loop {
            match self.rx.state {
                ReceiveState::WaitForBuffer => {
                    let Some(ticket) = buffers.checkout_receive() else {
                        return Ok(());
                    };
                    self.rx.ticket = Some(ticket);
                    self.rx.header = None;
                    self.rx.status = ErrorCode::Ok;
                    self.rx.polls = 0;
                    driver.start_receive(PACKET_HEADER_SIZE);
                    self.rx.state = ReceiveState::WaitForHeader;
                }
                ReceiveState::WaitForHeader => {
                    if driver.current_bytes_received() < PACKET_HEADER_SIZE {
                        return Ok(());
                    }
                    let mut bytes = [0u8; PACKET_HEADER_SIZE];
                    bytes.copy_from_slice(&driver.received()[..PACKET_HEADER_SIZE]);
                    match PacketHeader::parse(&bytes) {
                        Err(code) => {
                            log::warn!("dropping packet: {}", code);
                            self.rx.status = code;
                            self.rx.state = ReceiveState::Finished;
                        }
                        Ok(header) if header.payload_len() > MAX_PAYLOAD_SIZE => {
                            log::warn!("dropping packet: payload of {} bytes", header.payload_len());
                            self.rx.status = ErrorCode::BufferNotBigEnoughForPayload;
                            self.rx.state = ReceiveState::Finished;
                        }
                        Ok(header) => {
                            driver.edit_receive_expected_length(header.packet_len());
                            self.rx.header = Some(header);
                            self.rx.polls = 0;
                            self.rx.state = ReceiveState::WaitForPayload;
                        }
                    }
                }
                ReceiveState::WaitForPayload => {
                    let expected = self.rx.header.map_or(PACKET_HEADER_SIZE, |h| h.packet_len());
                    if driver.current_bytes_received() >= expected {
                        self.rx.state = ReceiveState::Finished;
                        continue;
                    }
                    self.rx.polls = self.rx.polls.saturating_add(1);
                    let limit = self.config.receive_timeout_polls;
                    if limit != 0 && self.rx.polls >= limit {
                        log::warn!("payload did not arrive within {} polls", limit);
                        self.rx.status = ErrorCode::ReceiveTimeout;
                        self.rx.state = ReceiveState::Finished;
                        continue;
                    }
                    return Ok(());
                }
                ReceiveState::Finished => {
                    self.finish_receive(buffers, driver)?;
                    self.rx.state = ReceiveState::WaitForBuffer;
                    return Ok(());
                }
            }
        }
    }

    fn finish_receive<D, const L: usize>(
        &mut self,
        buffers: &mut RouterBuffers<L>,
        driver: &mut D,
    ) -> CefResult<()>
    where
        D: DebugPortDriver + ?Sized,
    {
        let Some(ticket) = self.rx.ticket.take() else {
            return Ok(());
        };
        if self.rx.status.is_ok() {
            if let Some(header) = self.rx.header {
                let received = driver.received();
                let payload = received
                    .get(PACKET_HEADER_SIZE..header.packet_len())
                    .unwrap_or_default();
                match header.verify_payload(payload) {
                    Err(code) => self.rx.status = code,
                    Ok(()) => {
                        if let Err(code) = buffers.receive_buffer(&ticket)?.fill_from(payload) {
                            self.rx.status = code;
                        }
                    }
                }
            }
        }
        driver.stop_receive();
        buffers.checkin_receive(ticket, self.rx.status)
    }

    /// Abandon the packet being received after a driver error.
    ///
    /// The buffer is checked in with `code` on the next receive pass. With
    /// no packet in progress the error is recorded directly.
    pub fn abort_receive<D, const L: usize>(
        &mut self,
        code: ErrorCode,
        buffers: &mut RouterBuffers<L>,
        driver: &mut D,
    ) -> CefResult<()>
    where
        D: DebugPortDriver + ?Sized,
    {
        driver.stop_receive();
        if self.rx.ticket.is_some() {
            self.rx.status = code;
            self.rx.state = ReceiveState::Finished;
            return Ok(());
        }
        buffers.record_error(code);
        buffers.emit(
            Severity::Error,
            ModuleId::CEF_INFRASTRUCTURE,
            "debug port error",
            file!(),
            line!(),
            [u64::from(code.as_u16()), 0, 0],
        )
    }

    /// Advance the transmit state machine as far as the driver allows
    pub fn transmit<D, const L: usize>(
        &mut self,
        buffers: &mut RouterBuffers<L>,
        driver: &mut D,
    ) -> CefResult<()>
    where
        D: DebugPortDriver + ?Sized,
    {
        loop {
            match self.tx.state {
                TransmitState::WaitForBuffer => {
                    let Some(ticket) = buffers.checkout_transmit()? else {
                        return Ok(());
                    };
                    match buffers.transmit_payload(&ticket, &mut self.tx.staging) {
                        Ok((packet_type, len)) => {
                            self.tx.packet_type = packet_type;
                            self.tx.payload_len = len;
                            self.tx.state = TransmitState::GenerateHeader;
                        }
                        Err(code) => {
                            buffers.record_error(code);
                            self.tx.state = TransmitState::Finished;
                        }
                    }
                    self.tx.ticket = Some(ticket);
                }
                TransmitState::GenerateHeader => {
                    let payload = &self.tx.staging[..self.tx.payload_len];
                    self.tx.header = PacketHeader::for_payload(self.tx.packet_type, payload).encode();
                    self.tx.state = TransmitState::SendHeader;
                }
                TransmitState::SendHeader => {
                    match driver.send(&self.tx.header) {
                        Ok(()) => {
                            self.tx.polls = 0;
                            self.tx.state = TransmitState::WaitHeaderSent;
                        }
                        Err(nb::Error::WouldBlock) => return Ok(()),
                        Err(nb::Error::Other(error)) => {
                            buffers.record_error(error.code());
                            self.tx.state = TransmitState::Finished;
                        }
                    }
                }
                TransmitState::WaitHeaderSent => {
                    if self.send_still_busy(buffers, driver) {
                        return Ok(());
                    }
                    if self.tx.state == TransmitState::WaitHeaderSent {
                        self.tx.state = TransmitState::SendPayload;
                    }
                }
                TransmitState::SendPayload => {
                    if self.tx.payload_len == 0 {
                        self.tx.state = TransmitState::Finished;
                        continue;
                    }
                    match driver.send(&self.tx.staging[..self.tx.payload_len]) {
                        Ok(()) => {
                            self.tx.polls = 0;
                            self.tx.state = TransmitState::WaitPayloadSent;
                        }
                        Err(nb::Error::WouldBlock) => return Ok(()),
                        Err(nb::Error::Other(error)) => {
                            buffers.record_error(error.code());
                            self.tx.state = TransmitState::Finished;
                        }
                    }
                }
                TransmitState::WaitPayloadSent => {
                    if self.send_still_busy(buffers, driver) {
                        return Ok(());
                    }
                    self.tx.state = TransmitState::Finished;
                }
                TransmitState::Finished => {
                    if let Some(ticket) = self.tx.ticket.take() {
                        buffers.checkin_transmit(ticket)?;
                    }
                    self.tx.state = TransmitState::WaitForBuffer;
                    return Ok(());
                }
            }
        }
    }

    /// Poll the driver's busy flag. On timeout the transfer is abandoned
    /// and the machine moves to `Finished`.
    fn send_still_busy<D, const L: usize>(&mut self, buffers: &mut RouterBuffers<L>, driver: &D) -> bool
    where
        D: DebugPortDriver + ?Sized,
    {
        if !driver.send_in_progress() {
            return false;
        }
        self.tx.polls = self.tx.polls.saturating_add(1);
        let limit = self.config.transmit_timeout_polls;
        if limit != 0 && self.tx.polls >= limit {
            log::warn!("send still busy after {} polls", limit);
            buffers.record_error(ErrorCode::TransmitTimeout);
            self.tx.state = TransmitState::Finished;
            return false;
        }
        true
    }
}
