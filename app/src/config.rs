//! System sizing and run-time configuration

use cef_debugport::TransportConfig;

/// Slots of the debug command pool
pub const DEBUG_POOL_SLOTS: usize = 1;
/// Log records that can wait for transmission
pub const LOG_POOL_SLOTS: usize = 10;
/// Router and command proxy
pub const SINGLETON_COUNT: usize = 2;
/// Every live command fits in the ready queue with a margin of two
pub const EXECUTOR_QUEUE_DEPTH: usize = DEBUG_POOL_SLOTS + SINGLETON_COUNT + 2;

/// Run-time configuration of the CEF system
#[derive(Debug, Clone, Copy)]
pub struct SystemConfig {
    /// Command steps per executor slice
    pub steps_per_slice: u32,
    pub transport: TransportConfig,
    /// Nanosecond clock for log timestamps; synthetic when absent
    pub log_clock: Option<fn() -> u64>,
    /// Called when a slice found nothing to run
    pub idle_callback: Option<fn()>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            steps_per_slice: 4,
            transport: TransportConfig::default(),
            log_clock: None,
            idle_callback: None,
        }
    }
}

impl SystemConfig {
    pub fn builder() -> SystemConfigBuilder {
        SystemConfigBuilder::default()
    }
}

/// Builder for [`SystemConfig`]
#[derive(Debug, Clone, Default)]
pub struct SystemConfigBuilder {
    config: SystemConfig,
}

impl SystemConfigBuilder {
    /// Sets the number of command steps per slice (at least one).
    pub fn steps_per_slice(mut self, steps: u32) -> Self {
        self.config.steps_per_slice = steps.max(1);
        self
    }

    /// Sets the transmit timeout in polls; 0 disables it.
    pub fn transmit_timeout_polls(mut self, polls: u32) -> Self {
        self.config.transport.transmit_timeout_polls = polls;
        self
    }

    /// Sets the receive timeout in polls; 0 disables it.
    pub fn receive_timeout_polls(mut self, polls: u32) -> Self {
        self.config.transport.receive_timeout_polls = polls;
        self
    }

    /// Sets the share of the log pool evicted when logging runs out of space.
    pub fn discard_percent(mut self, percent: u8) -> Self {
        self.config.transport.discard_percent = percent.min(100);
        self
    }

    /// Sets the log timestamp clock.
    pub fn log_clock(mut self, clock: fn() -> u64) -> Self {
        self.config.log_clock = Some(clock);
        self
    }

    /// Sets the idle callback function.
    pub fn idle_callback(mut self, callback: fn()) -> Self {
        self.config.idle_callback = Some(callback);
        self
    }

    pub fn build(self) -> SystemConfig {
        self.config
    }
}
