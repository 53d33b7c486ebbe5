//! The application context.
//!
//! [`CefSystem`] owns every command that can run: the command generator
//! with its pools, the packet router and the command proxy. [`App`] adds
//! the executor and the main loop, and takes the system into fatal error
//! handling when any step reports a [`FatalError`].

use crate::commands::{AppCommand, AppPools, CommandEnv};
use crate::config::{SystemConfig, EXECUTOR_QUEUE_DEPTH, LOG_POOL_SLOTS};
use crate::proxy::{CommandProxy, ProxyEnv};
use cef_cmd::{Command, CommandGenerator, CommandHandle, Execute, SingletonId};
use cef_core::{CefResult, ErrorCode, FatalError, ModuleId, Severity};
use cef_debugport::{DebugPortDriver, PacketRouter};
use cef_exec::{CommandExecutor, CommandSpace, Spawn};

pub const ROUTER_ID: SingletonId = SingletonId(0);
pub const PROXY_ID: SingletonId = SingletonId(1);

pub type Router<D> = PacketRouter<AppCommand, D, LOG_POOL_SLOTS>;
pub type Generator = CommandGenerator<AppPools, AppCommand>;

/// Every live command of the application
pub struct CefSystem<D: DebugPortDriver> {
    generator: Generator,
    router: Router<D>,
    proxy: CommandProxy,
}

impl<D: DebugPortDriver> CefSystem<D> {
    pub fn new(driver: D, config: &SystemConfig) -> Self {
        Self {
            generator: CommandGenerator::new(AppPools::new()),
            router: PacketRouter::new(driver, config.transport, config.log_clock),
            proxy: CommandProxy::new(PROXY_ID),
        }
    }

    pub fn router(&self) -> &Router<D> {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router<D> {
        &mut self.router
    }

    pub fn proxy(&self) -> &CommandProxy {
        &self.proxy
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn generator_mut(&mut self) -> &mut Generator {
        &mut self.generator
    }
}

impl<D: DebugPortDriver> CommandSpace<AppCommand> for CefSystem<D> {
    fn execute(
        &mut self,
        handle: CommandHandle<AppCommand>,
        child: Option<CommandHandle<AppCommand>>,
        ready: &mut dyn Spawn<AppCommand>,
    ) -> CefResult<bool> {
        match handle {
            CommandHandle::Singleton(ROUTER_ID) => self.router.execute(child, &mut ()),
            CommandHandle::Singleton(PROXY_ID) => {
                let mut env = ProxyEnv {
                    generator: &mut self.generator,
                    buffers: self.router.buffers_mut(),
                    ready,
                };
                self.proxy.execute(child, &mut env)
            }
            CommandHandle::Singleton(id) => {
                log::error!("no singleton {}", id.0);
                Err(FatalError::new(ErrorCode::UnknownSingleton, "unknown singleton"))
            }
            CommandHandle::Pooled(_) => {
                let command = self
                    .generator
                    .get_mut(handle)
                    .ok_or_else(|| FatalError::new(ErrorCode::ForeignPoolHandle, "stale command handle"))?;
                let mut env = CommandEnv {
                    log: self.router.buffers_mut(),
                };
                command.execute(child, &mut env)
            }
        }
    }

    fn parent_of(&self, handle: CommandHandle<AppCommand>) -> CefResult<Option<CommandHandle<AppCommand>>> {
        match handle {
            CommandHandle::Singleton(ROUTER_ID) => Ok(self.router.parent()),
            CommandHandle::Singleton(PROXY_ID) => Ok(self.proxy.parent()),
            CommandHandle::Singleton(_) => Err(FatalError::new(ErrorCode::UnknownSingleton, "unknown singleton")),
            CommandHandle::Pooled(_) => self
                .generator
                .get(handle)
                .map(|command| command.parent())
                .ok_or_else(|| FatalError::new(ErrorCode::ForeignPoolHandle, "stale command handle")),
        }
    }

    fn release(&mut self, handle: CommandHandle<AppCommand>) -> CefResult<()> {
        self.generator.free(handle)
    }
}

/// The executor and the system it runs
pub struct App<D: DebugPortDriver> {
    executor: CommandExecutor<AppCommand, EXECUTOR_QUEUE_DEPTH>,
    system: CefSystem<D>,
    config: SystemConfig,
    fatal: Option<FatalError>,
}

impl<D: DebugPortDriver> App<D> {
    /// Build the system and queue both singletons
    pub fn new(driver: D, config: SystemConfig) -> CefResult<Self> {
        let mut executor = CommandExecutor::new();
        executor.add_command(CommandHandle::Singleton(ROUTER_ID))?;
        executor.add_command(CommandHandle::Singleton(PROXY_ID))?;
        log::info!("CEF {} started", cef_core::VERSION);
        Ok(Self {
            executor,
            system: CefSystem::new(driver, &config),
            config,
            fatal: None,
        })
    }

    /// Run one executor slice, or one flush pass once a fatal error
    /// occurred. Returns the number of command steps executed.
    pub fn poll(&mut self) -> u32 {
        if self.fatal.is_some() {
            if let Err(error) = self.system.router.fatal_error_handling_loop() {
                log::error!("fatal flush failed: {}", error);
            }
            return 0;
        }
        match self.executor.run_slice(&mut self.system, self.config.steps_per_slice) {
            Ok(steps) => steps,
            Err(error) => {
                self.enter_fatal(error);
                0
            }
        }
    }

    /// The main loop
    pub fn run(&mut self) -> ! {
        loop {
            if self.poll() == 0 {
                self.on_idle();
            }
        }
    }

    fn on_idle(&self) {
        if let Some(callback) = self.config.idle_callback {
            callback();
            return;
        }
        #[cfg(target_arch = "arm")]
        {
            cortex_m::asm::wfi();
        }
    }

    fn enter_fatal(&mut self, error: FatalError) {
        log::error!("{}", error);
        let router = &mut self.system.router;
        router.record_error(error.code);
        let logged = router.emit(
            Severity::Fatal,
            ModuleId::CEF_INFRASTRUCTURE,
            error.message,
            error.file,
            error.line,
            [u64::from(error.code.as_u16()), 0, 0],
        );
        if let Err(inner) = logged {
            log::error!("fatal log record lost: {}", inner);
        }
        router.record_error(ErrorCode::TraceFatalEncountered);
        self.fatal = Some(error);
    }

    /// The fatal error that stopped command execution
    pub fn fatal_error(&self) -> Option<&FatalError> {
        self.fatal.as_ref()
    }

    pub fn system(&self) -> &CefSystem<D> {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut CefSystem<D> {
        &mut self.system
    }

    pub fn executor(&self) -> &CommandExecutor<AppCommand, EXECUTOR_QUEUE_DEPTH> {
        &self.executor
    }

    /// Queue a locally created command
    pub fn spawn(&mut self, handle: CommandHandle<AppCommand>) -> CefResult<()> {
        self.executor.add_command(handle)
    }
}
