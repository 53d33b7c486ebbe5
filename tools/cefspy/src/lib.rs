//! Host-side utilities for the CEF debug port.
//!
//! The device frames command responses and log records as packets on a
//! serial link. This crate lifts those packets off a raw byte stream,
//! renders them for a terminal or as JSON, and builds request packets to
//! send back.

mod builder;
mod decoder;
mod formatter;

pub use builder::{build_packet, PingRequestBuilder};
pub use decoder::{CefPacket, DecodeError, PacketDecoder};
pub use formatter::LogFormatter;

#[cfg(test)]
mod tests;
