//! Command abstraction.
//!
//! A command is a bounded unit of cooperatively scheduled work. Every step
//! either finishes the command or yields; no step may block. Concrete
//! commands embed a [`CommandCore`] and expose it through [`Command`], and
//! implement their state machine in [`Execute::execute`].

use crate::handle::CommandHandle;
use cef_core::wire::{CommandHeader, COMMAND_HEADER_SIZE};
use cef_core::{CefResult, CommandState, ErrorCode, FatalError, OpCode};
use cef_mem::PoolId;
use core::fmt;

/// Who asked for the command, which decides where its sequence number
/// comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Initiator {
    /// Created on the device; rolling local sequence number
    Local,
    /// Requested by the host; its sequence number is echoed back
    Host,
}

/// State shared by every command
pub struct CommandCore<C> {
    opcode: OpCode,
    pub state: CommandState,
    pub error_code: ErrorCode,
    pub sequence_number: u16,
    pub initiator: Initiator,
    /// Command waiting for this one to finish
    pub parent: Option<CommandHandle<C>>,
    pool: Option<PoolId>,
}

impl<C> CommandCore<C> {
    pub const fn new(opcode: OpCode) -> Self {
        Self {
            opcode,
            state: CommandState::ENTRY,
            error_code: ErrorCode::Ok,
            sequence_number: 0,
            initiator: Initiator::Local,
            parent: None,
            pool: None,
        }
    }

    pub const fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Pool the command was allocated from, `None` for singletons
    pub const fn pool(&self) -> Option<PoolId> {
        self.pool
    }

    /// Set by the owning command pool at allocation
    pub(crate) fn stamp_pool(&mut self, pool: PoolId) {
        self.pool = Some(pool);
    }
}

impl<C> fmt::Debug for CommandCore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandCore")
            .field("opcode", &self.opcode)
            .field("state", &self.state)
            .field("error_code", &self.error_code)
            .field("sequence_number", &self.sequence_number)
            .field("initiator", &self.initiator)
            .field("parent", &self.parent)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Access to the shared command state.
///
/// `C` is the command family stored in the pools; parents are referenced
/// through `CommandHandle<C>`.
pub trait Command<C> {
    fn core(&self) -> &CommandCore<C>;

    fn core_mut(&mut self) -> &mut CommandCore<C>;

    fn opcode(&self) -> OpCode {
        self.core().opcode()
    }

    fn state(&self) -> CommandState {
        self.core().state
    }

    fn set_state(&mut self, state: CommandState) {
        self.core_mut().state = state;
    }

    fn error_code(&self) -> ErrorCode {
        self.core().error_code
    }

    fn set_error_code(&mut self, code: ErrorCode) {
        self.core_mut().error_code = code;
    }

    fn sequence_number(&self) -> u16 {
        self.core().sequence_number
    }

    fn parent(&self) -> Option<CommandHandle<C>> {
        self.core().parent
    }

    fn set_parent(&mut self, parent: Option<CommandHandle<C>>) {
        self.core_mut().parent = parent;
    }

    fn pool(&self) -> Option<PoolId> {
        self.core().pool()
    }

    fn is_complete(&self) -> bool {
        self.state() == CommandState::COMPLETE
    }
}

/// The re-entrant step of a command.
///
/// `E` is the environment the command needs while stepping. Returns
/// `Ok(true)` once the command has finished, `Ok(false)` to yield.
pub trait Execute<C, E>: Command<C> {
    fn execute(&mut self, child: Option<CommandHandle<C>>, env: &mut E) -> CefResult<bool>;

    /// Reject a continuation the command is not waiting for.
    ///
    /// The default accepts none at all. Commands that spawn children
    /// override it.
    fn validate_child_response(&self, child: Option<CommandHandle<C>>) -> CefResult<()> {
        match child {
            None => Ok(()),
            Some(_) => Err(FatalError::new(
                ErrorCode::UnexpectedChildResponse,
                "child response delivered to a command without children",
            )),
        }
    }
}

/// Translation between the wire layout and a command's fields
pub trait WireCommand {
    /// Validate and load a request payload (command header included)
    fn import_request(&mut self, payload: &[u8]) -> Result<(), ErrorCode>;

    /// Write the response payload; returns the number of bytes written
    fn export_response(&self, out: &mut [u8]) -> Result<usize, ErrorCode>;
}

/// Read and validate the command header of `payload`.
///
/// Checks, in order, that the opcode is the command's own, that the
/// declared size equals `expected_size`, and that exactly that many bytes
/// were received.
pub fn import_base<C>(
    core: &CommandCore<C>,
    payload: &[u8],
    expected_size: usize,
) -> Result<CommandHeader, ErrorCode> {
    if payload.len() < COMMAND_HEADER_SIZE {
        return Err(ErrorCode::NumBytesMismatch);
    }
    let header = CommandHeader::peek(payload)?;
    if header.opcode != core.opcode() {
        return Err(ErrorCode::OpCodeMismatch);
    }
    if header.num_bytes as usize != expected_size {
        return Err(ErrorCode::NumBytesMismatch);
    }
    if payload.len() != expected_size {
        return Err(ErrorCode::NumBytesMismatch);
    }
    Ok(header)
}

/// Response header for a command: opcode, echoed sequence number, the
/// command's error code and the response size.
pub fn export_base<C>(core: &CommandCore<C>, response_size: usize) -> CommandHeader {
    let mut header = CommandHeader::new(core.opcode(), core.sequence_number, response_size as u32);
    header.error_code = core.error_code.to_wire();
    header
}
