#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]

//! # CEF Application
//!
//! Wires the framework into a running system: the application's command
//! family and pools, the command proxy that serves host requests, and the
//! [`App`] context holding the executor, the packet router and the main
//! loop.

pub mod commands;
pub mod config;
pub mod ping;
pub mod proxy;
pub mod system;

pub use commands::{AppCommand, AppPools, CommandEnv, DEBUG_POOL_ID};
pub use config::{
    SystemConfig, SystemConfigBuilder, DEBUG_POOL_SLOTS, EXECUTOR_QUEUE_DEPTH, LOG_POOL_SLOTS, SINGLETON_COUNT,
};
pub use ping::CommandPing;
pub use proxy::{CommandProxy, ProxyEnv};
pub use system::{App, CefSystem, Generator, Router, PROXY_ID, ROUTER_ID};
