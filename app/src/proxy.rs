//! The command proxy.
//!
//! A singleton that turns host requests into pooled commands. It takes
//! the received request from the router, allocates the command registered
//! for its opcode, runs it as a child and writes the child's response back
//! into the same buffer for transmission. Requests that cannot be served
//! are answered with a bare header carrying the error code.

use crate::commands::{AppCommand, AppPools};
use crate::config::LOG_POOL_SLOTS;
use cef_cmd::{Command, CommandCore, CommandGenerator, CommandHandle, Execute, Initiator, SingletonId, WireCommand};
use cef_core::wire::{CommandHeader, WireWriter, COMMAND_HEADER_SIZE};
use cef_core::{CefResult, CommandState, ErrorCode, FatalError, ModuleId, OpCode};
use cef_debugport::{cef_warn, ProcessingTicket, RouterBuffers};
use cef_exec::Spawn;

pub const GET_CEF_COMMAND_REQUEST: CommandState = CommandState::derived(0);
pub const PROCESS_COMMAND: CommandState = CommandState::derived(1);
pub const IMPORT_CEF_COMMAND: CommandState = CommandState::derived(2);
pub const SCHEDULE_COMMAND: CommandState = CommandState::derived(3);
pub const WAIT_FOR_CHILD_RESPONSE: CommandState = CommandState::derived(4);
pub const SEND_AND_RELEASE_RESOURCES: CommandState = CommandState::derived(5);
pub const REPORT_ERROR: CommandState = CommandState::derived(6);

/// What the proxy works with while it steps
pub struct ProxyEnv<'a> {
    pub generator: &'a mut CommandGenerator<AppPools, AppCommand>,
    pub buffers: &'a mut RouterBuffers<LOG_POOL_SLOTS>,
    pub ready: &'a mut dyn Spawn<AppCommand>,
}

pub struct CommandProxy {
    core: CommandCore<AppCommand>,
    id: SingletonId,
    ticket: Option<ProcessingTicket>,
    request: Option<CommandHeader>,
    child: Option<CommandHandle<AppCommand>>,
}

impl CommandProxy {
    pub const fn new(id: SingletonId) -> Self {
        Self {
            core: CommandCore::new(OpCode::CEF_COMMAND_PROXY),
            id,
            ticket: None,
            request: None,
            child: None,
        }
    }

    pub fn handle(&self) -> CommandHandle<AppCommand> {
        CommandHandle::Singleton(self.id)
    }

    /// Child command currently owned by the proxy
    pub fn child(&self) -> Option<CommandHandle<AppCommand>> {
        self.child
    }

    fn report(&mut self, code: ErrorCode) {
        self.set_error_code(code);
        self.set_state(REPORT_ERROR);
    }

    fn ticket(&self) -> CefResult<&ProcessingTicket> {
        self.ticket
            .as_ref()
            .ok_or_else(|| FatalError::new(ErrorCode::BufferOwnershipViolation, "proxy holds no request"))
    }

    fn child_handle(&self) -> CefResult<CommandHandle<AppCommand>> {
        self.child
            .ok_or_else(|| FatalError::new(ErrorCode::PointerIsNullptr, "proxy holds no child"))
    }

    fn child_command<'g>(
        &self,
        generator: &'g mut CommandGenerator<AppPools, AppCommand>,
    ) -> CefResult<&'g mut AppCommand> {
        let handle = self.child_handle()?;
        generator
            .get_mut(handle)
            .ok_or_else(|| FatalError::new(ErrorCode::ForeignPoolHandle, "proxy child is not live"))
    }

    /// Hand the buffer to the transmitter and wait for the next request
    fn finish_request(&mut self, env: &mut ProxyEnv<'_>) -> CefResult<()> {
        if let Some(ticket) = self.ticket.take() {
            env.buffers.checkin_processing(ticket)?;
        }
        self.request = None;
        self.set_error_code(ErrorCode::Ok);
        self.set_state(GET_CEF_COMMAND_REQUEST);
        Ok(())
    }
}

impl Command<AppCommand> for CommandProxy {
    fn core(&self) -> &CommandCore<AppCommand> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CommandCore<AppCommand> {
        &mut self.core
    }
}

impl<'a> Execute<AppCommand, ProxyEnv<'a>> for CommandProxy {
    fn execute(&mut self, child: Option<CommandHandle<AppCommand>>, env: &mut ProxyEnv<'a>) -> CefResult<bool> {
        self.validate_child_response(child)?;
        loop {
            match self.state() {
                CommandState::ENTRY => self.set_state(GET_CEF_COMMAND_REQUEST),
                GET_CEF_COMMAND_REQUEST => {
                    let Some(ticket) = env.buffers.checkout_processing() else {
                        return Ok(false);
                    };
                    self.ticket = Some(ticket);
                    self.set_state(PROCESS_COMMAND);
                }
                PROCESS_COMMAND => {
                    let header = CommandHeader::peek(env.buffers.processing_buffer(self.ticket()?)?.as_slice());
                    let header = match header {
                        Ok(header) => header,
                        Err(_) => {
                            self.report(ErrorCode::NumBytesMismatch);
                            continue;
                        }
                    };
                    self.request = Some(header);
                    if !env.generator.is_registered(header.opcode) {
                        log::warn!("no command registered for {}", header.opcode);
                        self.report(ErrorCode::ProxyCommandNotAllocatable);
                        continue;
                    }
                    match env.generator.allocate(header.opcode) {
                        Some(handle) => {
                            self.child = Some(handle);
                            self.set_state(IMPORT_CEF_COMMAND);
                        }
                        // pool exhausted: try again on the next pass
                        None => return Ok(false),
                    }
                }
                IMPORT_CEF_COMMAND => {
                    let ticket = self.ticket()?;
                    let payload = env.buffers.processing_buffer(ticket)?.as_slice();
                    let command = self.child_command(env.generator)?;
                    match command.import_request(payload) {
                        Ok(()) => {
                            let sequence_number = self.request.map_or(0, |h| h.sequence_number);
                            let core = command.core_mut();
                            core.sequence_number = sequence_number;
                            core.initiator = Initiator::Host;
                            core.parent = Some(self.handle());
                            self.set_state(SCHEDULE_COMMAND);
                        }
                        Err(code) => {
                            log::warn!("request import failed: {}", code);
                            let handle = self.child_handle()?;
                            env.generator.free(handle)?;
                            self.child = None;
                            self.report(code);
                        }
                    }
                }
                SCHEDULE_COMMAND => {
                    env.ready.add_command(self.child_handle()?)?;
                    self.set_state(WAIT_FOR_CHILD_RESPONSE);
                    return Ok(false);
                }
                WAIT_FOR_CHILD_RESPONSE => {
                    if child.is_none() {
                        return Ok(false);
                    }
                    self.set_state(SEND_AND_RELEASE_RESOURCES);
                }
                SEND_AND_RELEASE_RESOURCES => {
                    let handle = self.child_handle()?;
                    let exported = {
                        let ticket = self.ticket()?;
                        let command = env
                            .generator
                            .get(handle)
                            .ok_or_else(|| FatalError::new(ErrorCode::ForeignPoolHandle, "proxy child is not live"))?;
                        let buffer = env.buffers.processing_buffer_mut(ticket)?;
                        command
                            .export_response(buffer.storage_mut())
                            .and_then(|len| buffer.set_valid_bytes(len))
                    };
                    env.generator.free(handle)?;
                    self.child = None;
                    match exported {
                        Ok(()) => self.finish_request(env)?,
                        Err(code) => self.report(code),
                    }
                }
                REPORT_ERROR => {
                    let code = self.error_code();
                    let request = self.request.unwrap_or(CommandHeader::new(OpCode::INVALID, 0, 0));
                    let mut response =
                        CommandHeader::new(request.opcode, request.sequence_number, COMMAND_HEADER_SIZE as u32);
                    response.error_code = code.to_wire();

                    let buffer = env.buffers.processing_buffer_mut(self.ticket()?)?;
                    let mut writer = WireWriter::new(buffer.storage_mut());
                    let written = response.write(&mut writer);
                    let written = written.and_then(|()| buffer.set_valid_bytes(COMMAND_HEADER_SIZE));
                    if let Err(inner) = written {
                        log::error!("error response for {} not written: {}", code, inner);
                    }
                    cef_warn!(
                        env.buffers,
                        ModuleId::CEF_INFRASTRUCTURE,
                        "request rejected",
                        code.as_u16(),
                        request.opcode.raw()
                    )?;
                    self.finish_request(env)?;
                }
                state => {
                    log::error!("command proxy in state {}", state);
                    return Err(FatalError::new(ErrorCode::IllegalCommandState, "command proxy in unknown state"));
                }
            }
        }
    }

    fn validate_child_response(&self, child: Option<CommandHandle<AppCommand>>) -> CefResult<()> {
        match child {
            None => Ok(()),
            Some(handle) if self.state() == WAIT_FOR_CHILD_RESPONSE && self.child == Some(handle) => Ok(()),
            Some(handle) => {
                log::error!("command proxy got continuation from {:?}", handle);
                Err(FatalError::new(
                    ErrorCode::UnexpectedChildResponse,
                    "command proxy continued by a command it does not wait for",
                ))
            }
        }
    }
}
