#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]

//! # CEF Debug Port
//!
//! Moves command requests, command responses and log records between the
//! device and the host over a byte-stream link. The [`PacketRouter`]
//! command owns the buffers and runs the [`TransportLayer`] state machines
//! on top of a [`DebugPortDriver`].

#[macro_use]
mod macros;

pub mod buffer;
pub mod buffers;
pub mod driver;
pub mod loopback;
pub mod router;
pub mod transport;

pub use buffer::CefBuffer;
pub use buffers::{
    BufferState, CommandBuffer, ProcessingTicket, ReceiveTicket, RouterBuffers, TransmitTicket, LOG_POOL_ID,
};
pub use cef_core::{ModuleId, Severity};
pub use driver::{DebugPortDriver, DriverError, ErrorLatch, FramingSignatureMatcher};
pub use loopback::LoopbackDriver;
pub use router::{PacketRouter, EXECUTE_TRANSPORT_FUNCTIONS};
pub use transport::{ReceiveState, TransmitState, TransportConfig, TransportLayer};
