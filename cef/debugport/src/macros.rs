//! Log channel macros
//!
//! Each macro captures the call site and records the entry through the
//! `emit` method of its target, a `PacketRouter` or `RouterBuffers`. Up to
//! three integer variables travel with the message.

// ============================================================================
// Generic
// ============================================================================

/// Record a log entry with an explicit severity
#[macro_export]
macro_rules! cef_log {
    ($target:expr, $severity:expr, $module:expr, $msg:expr) => {
        $crate::cef_log!($target, $severity, $module, $msg, 0, 0, 0)
    };
    ($target:expr, $severity:expr, $module:expr, $msg:expr, $v1:expr) => {
        $crate::cef_log!($target, $severity, $module, $msg, $v1, 0, 0)
    };
    ($target:expr, $severity:expr, $module:expr, $msg:expr, $v1:expr, $v2:expr) => {
        $crate::cef_log!($target, $severity, $module, $msg, $v1, $v2, 0)
    };
    ($target:expr, $severity:expr, $module:expr, $msg:expr, $v1:expr, $v2:expr, $v3:expr) => {
        $target.emit(
            $severity,
            $module,
            $msg,
            file!(),
            line!(),
            [$v1 as u64, $v2 as u64, $v3 as u64],
        )
    };
}

// ============================================================================
// Severity shorthands
// ============================================================================

#[macro_export]
macro_rules! cef_debug {
    ($target:expr, $module:expr, $msg:expr $(, $var:expr)* $(,)?) => {
        $crate::cef_log!($target, $crate::Severity::Debug, $module, $msg $(, $var)*)
    };
}

#[macro_export]
macro_rules! cef_info {
    ($target:expr, $module:expr, $msg:expr $(, $var:expr)* $(,)?) => {
        $crate::cef_log!($target, $crate::Severity::Info, $module, $msg $(, $var)*)
    };
}

#[macro_export]
macro_rules! cef_warn {
    ($target:expr, $module:expr, $msg:expr $(, $var:expr)* $(,)?) => {
        $crate::cef_log!($target, $crate::Severity::Warning, $module, $msg $(, $var)*)
    };
}

#[macro_export]
macro_rules! cef_error {
    ($target:expr, $module:expr, $msg:expr $(, $var:expr)* $(,)?) => {
        $crate::cef_log!($target, $crate::Severity::Error, $module, $msg $(, $var)*)
    };
}
