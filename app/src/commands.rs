//! The application's family of pooled commands.
//!
//! Every pooled command is one variant of [`AppCommand`]; dispatch is a
//! `match`, so adding a command means adding a variant, an opcode arm in
//! [`AppPools`] and nothing else.

use crate::config::{DEBUG_POOL_SLOTS, LOG_POOL_SLOTS};
use crate::ping::CommandPing;
use cef_cmd::{Command, CommandArena, CommandCore, CommandHandle, CommandPool, CommandTable, Execute, WireCommand};
use cef_core::{CefResult, ErrorCode, OpCode};
use cef_debugport::RouterBuffers;
use cef_mem::PoolId;
use core::mem::size_of;

/// Pool holding the debug commands
pub const DEBUG_POOL_ID: PoolId = PoolId(0);

/// What a pooled command may touch while it steps
pub struct CommandEnv<'a> {
    /// Log channel towards the host
    pub log: &'a mut RouterBuffers<LOG_POOL_SLOTS>,
}

pub enum AppCommand {
    Ping(CommandPing),
}

impl Command<AppCommand> for AppCommand {
    fn core(&self) -> &CommandCore<AppCommand> {
        match self {
            AppCommand::Ping(ping) => ping.core(),
        }
    }

    fn core_mut(&mut self) -> &mut CommandCore<AppCommand> {
        match self {
            AppCommand::Ping(ping) => ping.core_mut(),
        }
    }
}

impl<'a> Execute<AppCommand, CommandEnv<'a>> for AppCommand {
    fn execute(&mut self, child: Option<CommandHandle<AppCommand>>, env: &mut CommandEnv<'a>) -> CefResult<bool> {
        match self {
            AppCommand::Ping(ping) => ping.execute(child, env),
        }
    }
}

impl WireCommand for AppCommand {
    fn import_request(&mut self, payload: &[u8]) -> Result<(), ErrorCode> {
        match self {
            AppCommand::Ping(ping) => ping.import_request(payload),
        }
    }

    fn export_response(&self, out: &mut [u8]) -> Result<usize, ErrorCode> {
        match self {
            AppCommand::Ping(ping) => ping.export_response(out),
        }
    }
}

/// Opcode to pool registry of the application
pub struct AppPools {
    debug: CommandPool<AppCommand, DEBUG_POOL_SLOTS>,
}

impl AppPools {
    pub fn new() -> Self {
        Self {
            debug: CommandPool::new(DEBUG_POOL_ID),
        }
    }
}

impl Default for AppPools {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTable<AppCommand> for AppPools {
    fn pool_for(&self, opcode: OpCode) -> Option<PoolId> {
        match opcode {
            OpCode::PING => Some(DEBUG_POOL_ID),
            _ => None,
        }
    }

    fn arena(&self, id: PoolId) -> Option<&dyn CommandArena<AppCommand>> {
        match id {
            DEBUG_POOL_ID => Some(&self.debug),
            _ => None,
        }
    }

    fn arena_mut(&mut self, id: PoolId) -> Option<&mut dyn CommandArena<AppCommand>> {
        match id {
            DEBUG_POOL_ID => Some(&mut self.debug),
            _ => None,
        }
    }

    fn construct(&self, opcode: OpCode, core: CommandCore<AppCommand>) -> Option<(AppCommand, usize)> {
        match opcode {
            OpCode::PING => Some((AppCommand::Ping(CommandPing::new(core)), size_of::<CommandPing>())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cef_cmd::CommandGenerator;

    #[test]
    fn test_only_ping_is_registered() {
        let generator: CommandGenerator<AppPools, AppCommand> = CommandGenerator::new(AppPools::new());
        assert!(generator.is_registered(OpCode::PING));
        assert!(!generator.is_registered(OpCode::DEBUG_PORT_ROUTER));
        assert!(!generator.is_registered(OpCode::new(0x77)));
    }

    #[test]
    fn test_debug_pool_holds_one_command() {
        let mut generator: CommandGenerator<AppPools, AppCommand> = CommandGenerator::new(AppPools::new());
        let ping = generator.allocate(OpCode::PING).unwrap();
        assert_eq!(ping.pool(), Some(DEBUG_POOL_ID));
        assert!(generator.allocate(OpCode::PING).is_none());
        generator.free(ping).unwrap();
        assert!(generator.allocate(OpCode::PING).is_some());
    }
}
