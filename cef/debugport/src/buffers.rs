//! Ownership hand-off of the debug port buffers.
//!
//! One command packet buffer moves through the receiver, the command
//! processor and the transmitter; log records come from their own pool
//! and wait in a queue of their own. Each role checks a buffer out,
//! receiving a ticket, and later checks it back in with that ticket.
//! Checkout fails closed when the buffer is not in the state the role
//! expects. Checkin in the wrong state is fatal.

use crate::buffer::CefBuffer;
use cef_core::log_record::LogRecord;
use cef_core::wire::{PacketType, MAX_PAYLOAD_SIZE};
use cef_core::{CefResult, ErrorCode, FatalError, ModuleId, Severity, SystemErrorRegister};
use cef_mem::{MemoryPool, PoolId, RingQueue, SlotHandle};
use core::fmt;
use core::mem::size_of;

/// Pool id of the log record pool
pub const LOG_POOL_ID: PoolId = PoolId(0x80);

const SYNTHETIC_CLOCK_START_NS: u64 = 29_720_638_091;
const SYNTHETIC_CLOCK_STEP_NS: u64 = 139_124_163;

pub type CommandBuffer = CefBuffer<MAX_PAYLOAD_SIZE>;

/// State of the command packet buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferState {
    Available,
    Receiving,
    Received,
    OwnedByProcessing,
    ReadyToTransmit,
    Transmitting,
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferState::Available => "available",
            BufferState::Receiving => "receiving",
            BufferState::Received => "received",
            BufferState::OwnedByProcessing => "owned by processing",
            BufferState::ReadyToTransmit => "ready to transmit",
            BufferState::Transmitting => "transmitting",
        };
        f.write_str(name)
    }
}

/// Right of the receiver to fill the command buffer
#[derive(Debug)]
pub struct ReceiveTicket {
    _private: (),
}

/// Right of the command processor to read the request and write the response
#[derive(Debug)]
pub struct ProcessingTicket {
    _private: (),
}

/// What the transmitter is sending
#[derive(Debug)]
pub enum TransmitTicket {
    CommandResponse,
    Log(SlotHandle<LogRecord>),
}

/// Source of log timestamps in nanoseconds
#[derive(Debug, Clone, Copy)]
enum LogClock {
    Function(fn() -> u64),
    Synthetic { next_ns: u64 },
}

impl LogClock {
    fn now(&mut self) -> u64 {
        match self {
            LogClock::Function(clock) => clock(),
            LogClock::Synthetic { next_ns } => {
                let now = *next_ns;
                *next_ns = next_ns.wrapping_add(SYNTHETIC_CLOCK_STEP_NS);
                now
            }
        }
    }
}

/// Buffers arbitrated by the packet router; `L` is the log pool capacity
pub struct RouterBuffers<const L: usize> {
    command: CommandBuffer,
    state: BufferState,
    transmit_outstanding: bool,
    logs: MemoryPool<LogRecord, L>,
    pending_logs: RingQueue<SlotHandle<LogRecord>, L>,
    errors: SystemErrorRegister,
    log_sequence: u16,
    clock: LogClock,
    discard_percent: u8,
}

impl<const L: usize> RouterBuffers<L> {
    pub fn new(discard_percent: u8, clock: Option<fn() -> u64>) -> Self {
        let clock = match clock {
            Some(clock) => LogClock::Function(clock),
            None => LogClock::Synthetic {
                next_ns: SYNTHETIC_CLOCK_START_NS,
            },
        };
        Self {
            command: CefBuffer::new(),
            state: BufferState::Available,
            transmit_outstanding: false,
            logs: MemoryPool::new(LOG_POOL_ID),
            pending_logs: RingQueue::new(),
            errors: SystemErrorRegister::new(),
            log_sequence: 0,
            clock,
            discard_percent: discard_percent.min(100),
        }
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    fn expect_state(&self, expected: BufferState, message: &'static str) -> CefResult<()> {
        if self.state != expected {
            log::error!("command buffer is {} instead of {}", self.state, expected);
            return Err(FatalError::new(ErrorCode::BufferOwnershipViolation, message));
        }
        Ok(())
    }

    // ---- receiver ----

    pub fn checkout_receive(&mut self) -> Option<ReceiveTicket> {
        if self.state != BufferState::Available {
            return None;
        }
        self.command.clear();
        self.state = BufferState::Receiving;
        Some(ReceiveTicket { _private: () })
    }

    pub fn receive_buffer(&mut self, _ticket: &ReceiveTicket) -> CefResult<&mut CommandBuffer> {
        self.expect_state(BufferState::Receiving, "receive buffer used outside receiving")?;
        Ok(&mut self.command)
    }

    /// Return the receive buffer.
    ///
    /// A failed fetch is recorded, logged, and makes the buffer available
    /// again so it never reaches command processing.
    pub fn checkin_receive(&mut self, ticket: ReceiveTicket, status: ErrorCode) -> CefResult<()> {
        let ReceiveTicket { .. } = ticket;
        self.expect_state(BufferState::Receiving, "receive checkin outside receiving")?;
        if status.is_ok() {
            self.state = BufferState::Received;
            return Ok(());
        }
        log::warn!("packet fetch failed: {}", status);
        self.command.clear();
        self.state = BufferState::Available;
        self.errors.record(status);
        self.emit(
            Severity::Error,
            ModuleId::CEF_INFRASTRUCTURE,
            "packet fetch failed",
            file!(),
            line!(),
            [u64::from(status.as_u16()), 0, 0],
        )
    }

    // ---- command processor ----

    pub fn checkout_processing(&mut self) -> Option<ProcessingTicket> {
        if self.state != BufferState::Received {
            return None;
        }
        self.state = BufferState::OwnedByProcessing;
        Some(ProcessingTicket { _private: () })
    }

    pub fn processing_buffer(&self, _ticket: &ProcessingTicket) -> CefResult<&CommandBuffer> {
        self.expect_state(BufferState::OwnedByProcessing, "processing buffer used outside processing")?;
        Ok(&self.command)
    }

    pub fn processing_buffer_mut(&mut self, _ticket: &ProcessingTicket) -> CefResult<&mut CommandBuffer> {
        self.expect_state(BufferState::OwnedByProcessing, "processing buffer used outside processing")?;
        Ok(&mut self.command)
    }

    /// Hand the response in the buffer over to the transmitter
    pub fn checkin_processing(&mut self, ticket: ProcessingTicket) -> CefResult<()> {
        let ProcessingTicket { .. } = ticket;
        self.expect_state(BufferState::OwnedByProcessing, "processing checkin outside processing")?;
        self.state = BufferState::ReadyToTransmit;
        Ok(())
    }

    // ---- transmitter ----

    /// Next payload to send: a command response before any pending log.
    ///
    /// Fatal when the previous transmit ticket has not been returned.
    pub fn checkout_transmit(&mut self) -> CefResult<Option<TransmitTicket>> {
        if self.transmit_outstanding {
            return Err(FatalError::new(
                ErrorCode::BufferOwnershipViolation,
                "second transmit checkout",
            ));
        }
        let ticket = if self.state == BufferState::ReadyToTransmit {
            self.state = BufferState::Transmitting;
            Some(TransmitTicket::CommandResponse)
        } else {
            self.pending_logs.get().map(TransmitTicket::Log)
        };
        self.transmit_outstanding = ticket.is_some();
        Ok(ticket)
    }

    /// Copy or encode the payload behind `ticket` into `out`
    pub fn transmit_payload(
        &self,
        ticket: &TransmitTicket,
        out: &mut [u8],
    ) -> Result<(PacketType, usize), ErrorCode> {
        match ticket {
            TransmitTicket::CommandResponse => {
                let payload = self.command.as_slice();
                let dst = out
                    .get_mut(..payload.len())
                    .ok_or(ErrorCode::BufferNotBigEnoughForPayload)?;
                dst.copy_from_slice(payload);
                Ok((PacketType::CommandResponse, payload.len()))
            }
            TransmitTicket::Log(handle) => {
                let record = self.logs.get(*handle).ok_or(ErrorCode::PointerIsNullptr)?;
                let len = record.encode(out)?;
                Ok((PacketType::LoggingData, len))
            }
        }
    }

    pub fn checkin_transmit(&mut self, ticket: TransmitTicket) -> CefResult<()> {
        match ticket {
            TransmitTicket::CommandResponse => {
                self.expect_state(BufferState::Transmitting, "transmit checkin outside transmitting")?;
                self.command.clear();
                self.state = BufferState::Available;
            }
            TransmitTicket::Log(handle) => {
                self.logs.free(handle)?;
            }
        }
        self.transmit_outstanding = false;
        Ok(())
    }

    // ---- log producers ----

    /// Take a blank log record from the log pool
    pub fn checkout_log(&mut self) -> Option<SlotHandle<LogRecord>> {
        let blank = LogRecord::new(Severity::Debug, ModuleId::CEF_INFRASTRUCTURE);
        self.logs.allocate(size_of::<LogRecord>(), blank)
    }

    pub fn log_record_mut(&mut self, handle: SlotHandle<LogRecord>) -> Option<&mut LogRecord> {
        self.logs.get_mut(handle)
    }

    /// Queue a filled log record for transmission
    pub fn checkin_log(&mut self, handle: SlotHandle<LogRecord>) -> CefResult<()> {
        if !self.logs.is_live(handle) {
            return Err(FatalError::new(ErrorCode::ForeignPoolHandle, "log record not checked out"));
        }
        self.pending_logs.put(handle).map_err(|_| {
            FatalError::new(ErrorCode::PoolAccountingBroken, "pending log queue overflow")
        })
    }

    /// Evict the oldest queued log records back to the pool.
    ///
    /// Evicts `capacity * discard_percent / 100` records, or every queued
    /// record if fewer are waiting. Returns the number evicted.
    pub fn discard_older_logs(&mut self) -> CefResult<usize> {
        let quota = L * usize::from(self.discard_percent) / 100;
        let count = quota.min(self.pending_logs.len());
        for _ in 0..count {
            let Some(handle) = self.pending_logs.get() else {
                break;
            };
            self.logs.free(handle)?;
        }
        if count > 0 {
            log::debug!("discarded {} queued log records", count);
        }
        Ok(count)
    }

    /// Record a log entry for the host.
    ///
    /// When the log pool is exhausted the oldest queued records are
    /// discarded and the allocation retried once; if that fails too the
    /// entry is dropped and `UnableToCreateLoggingSpace` recorded.
    pub fn emit(
        &mut self,
        severity: Severity,
        module: ModuleId,
        message: &str,
        file: &str,
        line: u32,
        variables: [u64; 3],
    ) -> CefResult<()> {
        let handle = match self.checkout_log() {
            Some(handle) => handle,
            None => {
                self.discard_older_logs()?;
                match self.checkout_log() {
                    Some(handle) => handle,
                    None => {
                        log::warn!("log dropped: {}", message);
                        self.errors.record(ErrorCode::UnableToCreateLoggingSpace);
                        return Ok(());
                    }
                }
            }
        };

        let timestamp = self.clock.now();
        let sequence = self.log_sequence;
        self.log_sequence = self.log_sequence.wrapping_add(1);

        let record = self
            .logs
            .get_mut(handle)
            .ok_or_else(|| FatalError::new(ErrorCode::PoolAccountingBroken, "fresh log slot not live"))?;
        record.severity = severity;
        record.module = module;
        record.variables = variables;
        record.timestamp = timestamp;
        record.set_message(message);
        record.set_file_name(base_name(file));
        record.line = line;
        record.sequence = sequence;

        self.checkin_log(handle)
    }

    // ---- error register ----

    pub fn record_error(&mut self, code: ErrorCode) {
        self.errors.record(code);
    }

    pub fn errors(&self) -> &SystemErrorRegister {
        &self.errors
    }

    pub fn pending_log_count(&self) -> usize {
        self.pending_logs.len()
    }

    pub fn log_pool_available(&self) -> usize {
        self.logs.available()
    }

    /// Queued log records, oldest first
    pub fn pending_logs(&self) -> impl Iterator<Item = &LogRecord> {
        self.pending_logs.iter().filter_map(|handle| self.logs.get(*handle))
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffers() -> RouterBuffers<10> {
        RouterBuffers::new(33, None)
    }

    fn fill_logs(buffers: &mut RouterBuffers<10>, count: usize) {
        for n in 0..count {
            buffers
                .emit(Severity::Info, ModuleId::CEF_INFRASTRUCTURE, "entry", file!(), line!(), [n as u64, 0, 0])
                .unwrap();
        }
    }

    #[test]
    fn test_command_buffer_cycle() {
        let mut buffers = buffers();

        let rx = buffers.checkout_receive().unwrap();
        assert!(buffers.checkout_receive().is_none());
        assert!(buffers.checkout_processing().is_none());
        buffers.receive_buffer(&rx).unwrap().fill_from(&[1, 2, 3]).unwrap();
        buffers.checkin_receive(rx, ErrorCode::Ok).unwrap();
        assert_eq!(buffers.state(), BufferState::Received);

        let work = buffers.checkout_processing().unwrap();
        assert_eq!(buffers.processing_buffer(&work).unwrap().as_slice(), &[1, 2, 3]);
        buffers.checkin_processing(work).unwrap();

        let tx = buffers.checkout_transmit().unwrap().unwrap();
        assert!(matches!(tx, TransmitTicket::CommandResponse));
        assert_eq!(buffers.state(), BufferState::Transmitting);
        buffers.checkin_transmit(tx).unwrap();
        assert_eq!(buffers.state(), BufferState::Available);
    }

    #[test]
    fn test_failed_fetch_never_reaches_processing() {
        let mut buffers = buffers();
        let rx = buffers.checkout_receive().unwrap();
        buffers.checkin_receive(rx, ErrorCode::HeaderChecksumMismatch).unwrap();

        assert_eq!(buffers.state(), BufferState::Available);
        assert!(buffers.checkout_processing().is_none());
        assert_eq!(buffers.errors().first(), Some(ErrorCode::HeaderChecksumMismatch));
        let logged = buffers.pending_logs().next().unwrap();
        assert_eq!(logged.severity, Severity::Error);
        assert_eq!(logged.variables[0], 22);
    }

    #[test]
    fn test_checkin_in_wrong_state_is_fatal() {
        let mut buffers = buffers();
        let rx = buffers.checkout_receive().unwrap();
        buffers.checkin_receive(rx, ErrorCode::Ok).unwrap();

        let forged = ReceiveTicket { _private: () };
        let err = buffers.checkin_receive(forged, ErrorCode::Ok).unwrap_err();
        assert_eq!(err.code, ErrorCode::BufferOwnershipViolation);
    }

    #[test]
    fn test_response_goes_before_logs() {
        let mut buffers = buffers();
        fill_logs(&mut buffers, 2);

        let rx = buffers.checkout_receive().unwrap();
        buffers.checkin_receive(rx, ErrorCode::Ok).unwrap();
        let work = buffers.checkout_processing().unwrap();
        buffers.checkin_processing(work).unwrap();

        let tx = buffers.checkout_transmit().unwrap().unwrap();
        assert!(matches!(tx, TransmitTicket::CommandResponse));
        assert_eq!(
            buffers.checkout_transmit().unwrap_err().code,
            ErrorCode::BufferOwnershipViolation
        );
        buffers.checkin_transmit(tx).unwrap();

        let tx = buffers.checkout_transmit().unwrap().unwrap();
        assert!(matches!(tx, TransmitTicket::Log(_)));
        buffers.checkin_transmit(tx).unwrap();
        assert_eq!(buffers.pending_log_count(), 1);
        assert_eq!(buffers.log_pool_available(), 9);
    }

    #[test]
    fn test_discard_evicts_a_third_oldest_first() {
        let mut buffers = buffers();
        fill_logs(&mut buffers, 9);

        assert_eq!(buffers.discard_older_logs().unwrap(), 3);
        assert_eq!(buffers.pending_log_count(), 6);
        let first = buffers.pending_logs().next().unwrap();
        assert_eq!(first.variables[0], 3);
    }

    #[test]
    fn test_full_log_pool_keeps_newest() {
        let mut buffers = buffers();
        fill_logs(&mut buffers, 11);

        // the eleventh entry evicted the three oldest
        assert_eq!(buffers.pending_log_count(), 8);
        let sequences: std::vec::Vec<u16> = buffers.pending_logs().map(|r| r.sequence).collect();
        assert_eq!(sequences, (3..11).collect::<std::vec::Vec<u16>>());
        assert_eq!(buffers.errors().first(), None);
    }

    #[test]
    fn test_logging_space_failure_is_recorded() {
        let mut buffers: RouterBuffers<3> = RouterBuffers::new(0, None);
        for _ in 0..4 {
            buffers
                .emit(Severity::Warning, ModuleId::CEF_DEBUG_COMMANDS, "w", "a/b.rs", 1, [0; 3])
                .unwrap();
        }
        assert_eq!(buffers.pending_log_count(), 3);
        assert_eq!(buffers.errors().first(), Some(ErrorCode::UnableToCreateLoggingSpace));
    }

    #[test]
    fn test_synthetic_clock_and_file_name() {
        let mut buffers = buffers();
        fill_logs(&mut buffers, 2);
        let records: std::vec::Vec<&LogRecord> = buffers.pending_logs().collect();
        assert_eq!(records[0].timestamp, SYNTHETIC_CLOCK_START_NS);
        assert_eq!(records[1].timestamp, SYNTHETIC_CLOCK_START_NS + SYNTHETIC_CLOCK_STEP_NS);
        assert_eq!(records[0].file_name.as_str(), "buffers.rs");
    }
}
