//! Error taxonomy shared by the device and the host tooling.
//!
//! Two severities exist. Recoverable conditions travel as an [`ErrorCode`]
//! (stored in a command, reported in a response header, or recorded in the
//! [`SystemErrorRegister`]). Broken internal invariants travel as a
//! [`FatalError`] and end normal operation.

use core::fmt;
use core::panic::Location;

/// Result type for operations whose only failure mode is fatal
pub type CefResult<T> = Result<T, FatalError>;

/// Wire-visible error codes.
///
/// The numeric values are part of the host contract: they travel in the
/// 32-bit error field of every command header, so existing values must never
/// be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Ok = 0,
    LogFatalReturn = 1,
    PointerIsNullptr = 2,
    IllegalCommandState = 7,
    PingValuesMismatch = 8,
    OpCodeMismatch = 9,
    NumBytesMismatch = 10,
    DebugPortNone = 11,
    DebugPortParity = 12,
    DebugPortNoise = 13,
    DebugPortFrame = 14,
    DebugPortOverrun = 15,
    DebugPortUnknown = 16,
    ProxyCommandNotAllocatable = 17,
    BufferValidBytesExceedsBufferSize = 18,
    UnableToCreateLoggingSpace = 19,
    LoggingCalledRecursively = 20,
    TraceFatalEncountered = 21,
    HeaderChecksumMismatch = 22,
    PayloadChecksumMismatch = 23,
    BufferNotBigEnoughForPayload = 24,
    TransmitTimeout = 25,
    ReceiveTimeout = 26,
    UnexpectedChildResponse = 27,
    ForeignPoolHandle = 28,
    PoolAccountingBroken = 29,
    ExecutorQueueOverflow = 30,
    BufferOwnershipViolation = 31,
    CommandNotPoolAllocated = 32,
    UnknownSingleton = 33,
}

impl ErrorCode {
    /// Decode a raw error code; unknown values yield `None`.
    pub const fn from_u16(raw: u16) -> Option<Self> {
        use ErrorCode::*;
        Some(match raw {
            0 => Ok,
            1 => LogFatalReturn,
            2 => PointerIsNullptr,
            7 => IllegalCommandState,
            8 => PingValuesMismatch,
            9 => OpCodeMismatch,
            10 => NumBytesMismatch,
            11 => DebugPortNone,
            12 => DebugPortParity,
            13 => DebugPortNoise,
            14 => DebugPortFrame,
            15 => DebugPortOverrun,
            16 => DebugPortUnknown,
            17 => ProxyCommandNotAllocatable,
            18 => BufferValidBytesExceedsBufferSize,
            19 => UnableToCreateLoggingSpace,
            20 => LoggingCalledRecursively,
            21 => TraceFatalEncountered,
            22 => HeaderChecksumMismatch,
            23 => PayloadChecksumMismatch,
            24 => BufferNotBigEnoughForPayload,
            25 => TransmitTimeout,
            26 => ReceiveTimeout,
            27 => UnexpectedChildResponse,
            28 => ForeignPoolHandle,
            29 => PoolAccountingBroken,
            30 => ExecutorQueueOverflow,
            31 => BufferOwnershipViolation,
            32 => CommandNotPoolAllocated,
            33 => UnknownSingleton,
            _ => return None,
        })
    }

    /// Decode the 32-bit header representation.
    pub fn from_wire(raw: u32) -> Option<Self> {
        u16::try_from(raw).ok().and_then(Self::from_u16)
    }

    /// Raw numeric value
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Value as carried in a command header
    pub const fn to_wire(self) -> u32 {
        self as u32
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, ErrorCode::Ok)
    }

    fn description(self) -> &'static str {
        use ErrorCode::*;
        match self {
            Ok => "no error",
            LogFatalReturn => "returned after a fatal log",
            PointerIsNullptr => "null argument",
            IllegalCommandState => "command reached an illegal state",
            PingValuesMismatch => "ping request values do not match the expected values",
            OpCodeMismatch => "command opcode does not match the command",
            NumBytesMismatch => "command byte count does not match the command structure",
            DebugPortNone => "debug port reported no error",
            DebugPortParity => "debug port parity error",
            DebugPortNoise => "debug port noise error",
            DebugPortFrame => "debug port framing error",
            DebugPortOverrun => "debug port overrun error",
            DebugPortUnknown => "debug port unknown error",
            ProxyCommandNotAllocatable => "requested command cannot be allocated",
            BufferValidBytesExceedsBufferSize => "valid bytes exceed buffer size",
            UnableToCreateLoggingSpace => "unable to create logging space",
            LoggingCalledRecursively => "logging called recursively",
            TraceFatalEncountered => "fatal error encountered",
            HeaderChecksumMismatch => "packet header checksum mismatch",
            PayloadChecksumMismatch => "packet payload checksum mismatch",
            BufferNotBigEnoughForPayload => "buffer not big enough for payload",
            TransmitTimeout => "transmit did not complete in time",
            ReceiveTimeout => "receive did not complete in time",
            UnexpectedChildResponse => "unexpected child response",
            ForeignPoolHandle => "handle does not belong to this pool",
            PoolAccountingBroken => "pool free list accounting is broken",
            ExecutorQueueOverflow => "command executor queue overflow",
            BufferOwnershipViolation => "buffer returned in the wrong state",
            CommandNotPoolAllocated => "command was not allocated from a pool",
            UnknownSingleton => "unknown singleton command",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u16())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ErrorCode {}

#[cfg(feature = "defmt")]
impl defmt::Format for ErrorCode {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "ErrorCode({=u16})", self.as_u16());
    }
}

/// An internal invariant was violated.
///
/// Carries the code, a static description and the source location that
/// detected the violation so the fatal log record can point at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalError {
    pub code: ErrorCode,
    pub message: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl FatalError {
    #[track_caller]
    pub fn new(code: ErrorCode, message: &'static str) -> Self {
        let location = Location::caller();
        Self {
            code,
            message,
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal: {} [{}] at {}:{}", self.message, self.code, self.file, self.line)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FatalError {}

#[cfg(feature = "defmt")]
impl defmt::Format for FatalError {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "FatalError{{ code: {}, msg: {=str}, line: {=u32} }}",
            self.code,
            self.message,
            self.line
        );
    }
}

/// System-wide error register.
///
/// The first recorded code is sticky: errors raised while unwinding from
/// the original failure never hide it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemErrorRegister {
    first: Option<ErrorCode>,
    latest: Option<ErrorCode>,
    count: u32,
}

impl SystemErrorRegister {
    pub const fn new() -> Self {
        Self {
            first: None,
            latest: None,
            count: 0,
        }
    }

    /// Record an error code. `ErrorCode::Ok` is ignored.
    pub fn record(&mut self, code: ErrorCode) {
        if code.is_ok() {
            return;
        }
        if self.first.is_none() {
            self.first = Some(code);
        }
        self.latest = Some(code);
        self.count = self.count.saturating_add(1);
    }

    /// First error code observed by the system
    pub const fn first(&self) -> Option<ErrorCode> {
        self.first
    }

    pub const fn latest(&self) -> Option<ErrorCode> {
        self.latest
    }

    pub const fn count(&self) -> u32 {
        self.count
    }
}
