#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]

//! # CEF Core
//!
//! Shared vocabulary of the CEF command framework: the error taxonomy, the
//! command opcodes and state markers, and the debug port wire contract used
//! by both the device runtime and the host tooling.

pub mod errors;
pub mod log_record;
pub mod opcodes;
pub mod ping;
pub mod wire;

pub use errors::*;
pub use log_record::{LogRecord, ModuleId, Severity};
pub use opcodes::*;
pub use wire::{CommandHeader, PacketHeader, PacketType};

/// CEF framework version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
