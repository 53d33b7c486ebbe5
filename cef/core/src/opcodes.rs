//! Command opcodes and command progress markers

use core::fmt;

/// Command type tag carried in every command header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpCode(pub u16);

impl OpCode {
    /// Used by log records, which are not commands
    pub const NONE: OpCode = OpCode(0);
    pub const PING: OpCode = OpCode(1);
    pub const DEBUG_PORT_ROUTER: OpCode = OpCode(2);
    pub const CEF_COMMAND_PROXY: OpCode = OpCode(3);
    pub const INVALID: OpCode = OpCode(0xFFFF);

    pub const fn new(raw: u16) -> Self {
        OpCode(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Human readable name for the opcodes known to the framework
    pub const fn name(self) -> &'static str {
        match self.0 {
            0 => "None",
            1 => "Ping",
            2 => "DebugPortRouter",
            3 => "CefCommandProxy",
            0xFFFF => "Invalid",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#06x})", self.name(), self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for OpCode {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "OpCode({=u16:#x})", self.0);
    }
}

/// Progress marker of a command's state machine.
///
/// `ENTRY` and `COMPLETE` are shared by every command. Command specific
/// states are declared with [`CommandState::derived`] and always compare
/// greater or equal to `FIRST_DERIVED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandState(pub u16);

impl CommandState {
    /// First state of every command: validate and initialise
    pub const ENTRY: CommandState = CommandState(0);
    /// Last state of every command: error code and response are final
    pub const COMPLETE: CommandState = CommandState(1);
    /// First command specific state
    pub const FIRST_DERIVED: CommandState = CommandState(2);
    pub const INVALID: CommandState = CommandState(0xFFFF);

    /// The `n`th command specific state
    pub const fn derived(n: u16) -> Self {
        CommandState(Self::FIRST_DERIVED.0 + n)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn is_derived(self) -> bool {
        self.0 >= Self::FIRST_DERIVED.0 && self.0 != Self::INVALID.0
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CommandState::ENTRY => write!(f, "Entry"),
            CommandState::COMPLETE => write!(f, "Complete"),
            CommandState::INVALID => write!(f, "Invalid"),
            CommandState(n) => write!(f, "Derived({})", n - Self::FIRST_DERIVED.0),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CommandState {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "CommandState({=u16})", self.0);
    }
}
