//! In-memory driver for host builds and tests.
//!
//! `feed`/`feed_byte` play the receive interrupt, `complete_send` plays
//! the transmit-complete interrupt and `raise_error` the error interrupt.

use crate::driver::{DebugPortDriver, DriverError, ErrorLatch, FramingSignatureMatcher};
use cef_core::wire::{FRAMING_SIGNATURE, MAX_PACKET_SIZE};
use heapless::Vec;

/// Bytes of sent traffic kept for inspection
pub const LOOPBACK_SENT_CAPACITY: usize = 4 * MAX_PACKET_SIZE;

pub struct LoopbackDriver {
    rx: [u8; MAX_PACKET_SIZE],
    rx_len: usize,
    rx_expected: usize,
    rx_armed: bool,
    matcher: FramingSignatureMatcher,
    sent: Vec<u8, LOOPBACK_SENT_CAPACITY>,
    send_busy: bool,
    auto_complete: bool,
    errors: ErrorLatch,
}

impl LoopbackDriver {
    pub const fn new() -> Self {
        Self {
            rx: [0; MAX_PACKET_SIZE],
            rx_len: 0,
            rx_expected: 0,
            rx_armed: false,
            matcher: FramingSignatureMatcher::new(),
            sent: Vec::new(),
            send_busy: false,
            auto_complete: false,
            errors: ErrorLatch::new(),
        }
    }

    /// Finish every send immediately
    pub fn with_auto_complete(mut self) -> Self {
        self.auto_complete = true;
        self
    }

    /// Deliver one received byte; `false` if no transfer wanted it
    pub fn feed_byte(&mut self, byte: u8) -> bool {
        if !self.rx_armed || self.rx_len >= self.rx_expected {
            return false;
        }
        if self.rx_len < FRAMING_SIGNATURE.len() {
            let held = self.matcher.accept(byte);
            self.rx[..held].copy_from_slice(&FRAMING_SIGNATURE[..held]);
            self.rx_len = held;
        } else {
            self.rx[self.rx_len] = byte;
            self.rx_len += 1;
        }
        true
    }

    /// Deliver bytes; returns how many were taken
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        bytes.iter().take_while(|&&b| self.feed_byte(b)).count()
    }

    /// Signal that the transfer started by the last `send` has finished
    pub fn complete_send(&mut self) {
        self.send_busy = false;
    }

    pub fn raise_error(&self, error: DriverError) {
        self.errors.raise(error);
    }

    /// Everything sent so far
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    pub fn is_receiving(&self) -> bool {
        self.rx_armed
    }
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugPortDriver for LoopbackDriver {
    fn send(&mut self, bytes: &[u8]) -> nb::Result<(), DriverError> {
        if self.send_busy {
            return Err(nb::Error::WouldBlock);
        }
        self.sent
            .extend_from_slice(bytes)
            .map_err(|_| nb::Error::Other(DriverError::Overrun))?;
        self.send_busy = !self.auto_complete;
        Ok(())
    }

    fn send_in_progress(&self) -> bool {
        self.send_busy
    }

    fn start_receive(&mut self, max_len: usize) {
        self.rx_len = 0;
        self.rx_expected = max_len.min(MAX_PACKET_SIZE);
        self.rx_armed = true;
        self.matcher.reset();
    }

    fn edit_receive_expected_length(&mut self, len: usize) {
        self.rx_expected = len.min(MAX_PACKET_SIZE);
    }

    fn stop_receive(&mut self) {
        self.rx_armed = false;
        self.rx_len = 0;
        self.matcher.reset();
    }

    fn current_bytes_received(&self) -> usize {
        self.rx_len
    }

    fn received(&self) -> &[u8] {
        &self.rx[..self.rx_len]
    }

    fn take_error(&mut self) -> Option<DriverError> {
        self.errors.take()
    }
}
