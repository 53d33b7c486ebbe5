//! The ping command: a connectivity and byte-order checkout

use crate::commands::{AppCommand, CommandEnv};
use cef_cmd::{export_base, import_base, Command, CommandCore, CommandHandle, Execute, WireCommand};
use cef_core::ping::{PingRequest, PingResponse, PING_REQUEST_SIZE, PING_RESPONSE_SIZE};
use cef_core::{CefResult, CommandState, ErrorCode, FatalError, ModuleId};
use cef_debugport::cef_info;

pub const CHECK_REQUEST: CommandState = CommandState::derived(0);
pub const GENERATE_RESPONSE: CommandState = CommandState::derived(1);

pub struct CommandPing {
    core: CommandCore<AppCommand>,
    request: PingRequest,
    response: PingResponse,
}

impl CommandPing {
    pub fn new(core: CommandCore<AppCommand>) -> Self {
        Self {
            core,
            request: PingRequest::new(0, 0, 0),
            response: PingResponse::default(),
        }
    }

    pub fn request(&self) -> &PingRequest {
        &self.request
    }

    pub fn response(&self) -> &PingResponse {
        &self.response
    }
}

impl Command<AppCommand> for CommandPing {
    fn core(&self) -> &CommandCore<AppCommand> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CommandCore<AppCommand> {
        &mut self.core
    }
}

impl<'a> Execute<AppCommand, CommandEnv<'a>> for CommandPing {
    fn execute(&mut self, child: Option<CommandHandle<AppCommand>>, env: &mut CommandEnv<'a>) -> CefResult<bool> {
        self.validate_child_response(child)?;
        loop {
            match self.state() {
                CommandState::ENTRY => {
                    cef_info!(
                        env.log,
                        ModuleId::CEF_DEBUG_COMMANDS,
                        "Ping!",
                        self.request.test_value,
                        self.request.offset_to_add
                    )?;
                    self.set_state(CHECK_REQUEST);
                }
                CHECK_REQUEST => {
                    if !self.request.has_expected_values() {
                        log::warn!("ping {} carried unexpected values", self.sequence_number());
                        self.set_error_code(ErrorCode::PingValuesMismatch);
                    }
                    // a mismatch still gets a response
                    self.set_state(GENERATE_RESPONSE);
                }
                GENERATE_RESPONSE => {
                    self.response = PingResponse::answering(&self.request);
                    self.set_state(CommandState::COMPLETE);
                }
                CommandState::COMPLETE => return Ok(true),
                state => {
                    log::error!("ping in state {}", state);
                    return Err(FatalError::new(ErrorCode::IllegalCommandState, "ping in unknown state"));
                }
            }
        }
    }
}

impl WireCommand for CommandPing {
    fn import_request(&mut self, payload: &[u8]) -> Result<(), ErrorCode> {
        import_base(&self.core, payload, PING_REQUEST_SIZE)?;
        self.request = PingRequest::decode(payload)?;
        Ok(())
    }

    fn export_response(&self, out: &mut [u8]) -> Result<usize, ErrorCode> {
        let header = export_base(&self.core, PING_RESPONSE_SIZE);
        self.response.encode(&header, out)
    }
}
