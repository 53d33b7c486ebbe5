//! Byte-stream driver interface of the debug port.
//!
//! The driver runs its transfers from interrupt context. Exactly one send
//! and one receive transfer are outstanding at a time, which keeps the
//! interrupt side and the polling side in a single-producer/single-consumer
//! relationship. Errors detected by the interrupt side are latched in an
//! [`ErrorLatch`] and drained by the packet router on its next pass.

use cef_core::wire::FRAMING_SIGNATURE;
use cef_core::ErrorCode;
use core::cell::Cell;
use core::fmt;
use critical_section::Mutex;

/// Line errors reported by the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    Parity,
    Noise,
    Frame,
    Overrun,
    Unknown,
}

impl DriverError {
    pub const fn code(self) -> ErrorCode {
        match self {
            DriverError::Parity => ErrorCode::DebugPortParity,
            DriverError::Noise => ErrorCode::DebugPortNoise,
            DriverError::Frame => ErrorCode::DebugPortFrame,
            DriverError::Overrun => ErrorCode::DebugPortOverrun,
            DriverError::Unknown => ErrorCode::DebugPortUnknown,
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Parity => write!(f, "parity error"),
            DriverError::Noise => write!(f, "noise error"),
            DriverError::Frame => write!(f, "framing error"),
            DriverError::Overrun => write!(f, "overrun error"),
            DriverError::Unknown => write!(f, "unknown error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DriverError {}

/// Interrupt-safe slot holding the oldest unreported driver error
pub struct ErrorLatch {
    pending: Mutex<Cell<Option<DriverError>>>,
}

impl ErrorLatch {
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(Cell::new(None)),
        }
    }

    /// Called from the error interrupt. Keeps the first error until it
    /// has been taken.
    pub fn raise(&self, error: DriverError) {
        critical_section::with(|cs| {
            let pending = self.pending.borrow(cs);
            if pending.get().is_none() {
                pending.set(Some(error));
            }
        });
    }

    pub fn take(&self) -> Option<DriverError> {
        critical_section::with(|cs| self.pending.borrow(cs).take())
    }
}

impl Default for ErrorLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Operations the transport needs from the byte-stream driver
pub trait DebugPortDriver {
    /// Start sending `bytes`. `WouldBlock` while a previous send is still
    /// in flight.
    fn send(&mut self, bytes: &[u8]) -> nb::Result<(), DriverError>;

    fn send_in_progress(&self) -> bool;

    /// Arm a receive transfer of at most `max_len` bytes
    fn start_receive(&mut self, max_len: usize);

    /// Change the length the current receive transfer waits for
    fn edit_receive_expected_length(&mut self, len: usize);

    /// Abort the current receive transfer
    fn stop_receive(&mut self);

    fn current_bytes_received(&self) -> usize;

    /// Bytes of the current receive transfer
    fn received(&self) -> &[u8];

    /// Oldest driver error not yet reported
    fn take_error(&mut self) -> Option<DriverError>;
}

/// Tracks how much of the framing signature the receive side holds.
///
/// Every byte that does not continue the signature drops what was held so
/// the receiver resynchronises on the next signature after noise or loss.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramingSignatureMatcher {
    matched: usize,
}

impl FramingSignatureMatcher {
    pub const fn new() -> Self {
        Self { matched: 0 }
    }

    /// Feed one byte; returns the number of signature bytes now held
    pub fn accept(&mut self, byte: u8) -> usize {
        if self.is_complete() {
            return self.matched;
        }
        self.matched = if byte == FRAMING_SIGNATURE[self.matched] {
            self.matched + 1
        } else if byte == FRAMING_SIGNATURE[0] {
            1
        } else {
            0
        };
        self.matched
    }

    pub const fn is_complete(&self) -> bool {
        self.matched == FRAMING_SIGNATURE.len()
    }

    pub fn reset(&mut self) {
        self.matched = 0;
    }
}
