#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]

//! # CEF Commands
//!
//! The command abstraction of the CEF framework: the shared command state,
//! the step contract, typed command handles, pools of commands and the
//! opcode driven command generator.

pub mod command;
pub mod generator;
pub mod handle;
pub mod pool;

pub use command::{export_base, import_base, Command, CommandCore, Execute, Initiator, WireCommand};
pub use generator::{CommandGenerator, CommandTable};
pub use handle::{CommandHandle, SingletonId};
pub use pool::{CommandArena, CommandPool};
