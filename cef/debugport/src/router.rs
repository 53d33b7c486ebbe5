//! The packet router command.
//!
//! A singleton that never finishes: every step drains driver errors, runs
//! the receive machine and runs the transmit machine, then yields. It owns
//! the debug port buffers, so command processing and logging reach them
//! through the router.

use crate::buffers::RouterBuffers;
use crate::driver::DebugPortDriver;
use crate::transport::{TransportConfig, TransportLayer};
use cef_cmd::{Command, CommandCore, CommandHandle, Execute};
use cef_core::{CefResult, CommandState, ErrorCode, FatalError, ModuleId, OpCode, Severity};

/// The router's only working state
pub const EXECUTE_TRANSPORT_FUNCTIONS: CommandState = CommandState::derived(0);

pub struct PacketRouter<C, D, const L: usize> {
    core: CommandCore<C>,
    buffers: RouterBuffers<L>,
    transport: TransportLayer,
    driver: D,
    fatal_error_handling: bool,
    execute_active: bool,
}

impl<C, D: DebugPortDriver, const L: usize> PacketRouter<C, D, L> {
    pub fn new(driver: D, config: TransportConfig, log_clock: Option<fn() -> u64>) -> Self {
        Self {
            core: CommandCore::new(OpCode::DEBUG_PORT_ROUTER),
            buffers: RouterBuffers::new(config.discard_percent, log_clock),
            transport: TransportLayer::new(config),
            driver,
            fatal_error_handling: false,
            execute_active: false,
        }
    }

    pub fn buffers(&self) -> &RouterBuffers<L> {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut RouterBuffers<L> {
        &mut self.buffers
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn transport(&self) -> &TransportLayer {
        &self.transport
    }

    pub fn is_fatal_error_handling(&self) -> bool {
        self.fatal_error_handling
    }

    /// Record a log entry for the host
    pub fn emit(
        &mut self,
        severity: Severity,
        module: ModuleId,
        message: &str,
        file: &str,
        line: u32,
        variables: [u64; 3],
    ) -> CefResult<()> {
        self.buffers.emit(severity, module, message, file, line, variables)
    }

    pub fn record_error(&mut self, code: ErrorCode) {
        self.buffers.record_error(code);
    }

    /// Flush queued log records after a fatal error.
    ///
    /// Reception stops for good. Does nothing while the fatal error was
    /// raised from inside the router's own step, since its state is then
    /// unknown.
    pub fn fatal_error_handling_loop(&mut self) -> CefResult<()> {
        if !self.fatal_error_handling {
            log::error!("packet router entering fatal error handling");
            self.fatal_error_handling = true;
        }
        if self.execute_active {
            return Ok(());
        }
        self.service()
    }

    fn service(&mut self) -> CefResult<()> {
        while let Some(error) = self.driver.take_error() {
            log::warn!("debug port driver reported {}", error);
            self.transport
                .abort_receive(error.code(), &mut self.buffers, &mut self.driver)?;
        }
        if !self.fatal_error_handling {
            self.transport.receive(&mut self.buffers, &mut self.driver)?;
        }
        self.transport.transmit(&mut self.buffers, &mut self.driver)
    }
}

impl<C, D, const L: usize> Command<C> for PacketRouter<C, D, L> {
    fn core(&self) -> &CommandCore<C> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CommandCore<C> {
        &mut self.core
    }
}

impl<C, D: DebugPortDriver, const L: usize> Execute<C, ()> for PacketRouter<C, D, L> {
    fn execute(&mut self, child: Option<CommandHandle<C>>, _env: &mut ()) -> CefResult<bool> {
        self.validate_child_response(child)?;
        self.execute_active = true;
        match self.state() {
            CommandState::ENTRY => {
                self.set_state(EXECUTE_TRANSPORT_FUNCTIONS);
                self.service()?;
            }
            EXECUTE_TRANSPORT_FUNCTIONS => self.service()?,
            state => {
                log::error!("packet router in state {}", state);
                return Err(FatalError::new(
                    ErrorCode::IllegalCommandState,
                    "packet router left its service state",
                ));
            }
        }
        self.execute_active = false;
        Ok(false)
    }
}
