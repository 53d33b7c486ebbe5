#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]

//! # CEF Command Executor
//!
//! The cooperative scheduler of the CEF framework. Commands are stepped
//! round-robin in bounded slices; a finished child drives its parent
//! forward in the same slice, and finished pooled commands go back to
//! their pool.

use cef_cmd::CommandHandle;
use cef_core::{CefResult, ErrorCode, FatalError};
use cef_mem::RingQueue;

/// Where newly runnable commands are handed to the executor
pub trait Spawn<C> {
    /// Queue `handle` for execution. A full queue is a sizing defect and
    /// therefore fatal.
    fn add_command(&mut self, handle: CommandHandle<C>) -> CefResult<()>;
}

/// The set of live commands the executor steps.
///
/// Implemented by the application context, which resolves a handle to the
/// concrete command and the environment it runs in.
pub trait CommandSpace<C> {
    /// Step the command behind `handle` once; `Ok(true)` when it finished
    fn execute(
        &mut self,
        handle: CommandHandle<C>,
        child: Option<CommandHandle<C>>,
        ready: &mut dyn Spawn<C>,
    ) -> CefResult<bool>;

    /// Parent waiting for `handle` to finish
    fn parent_of(&self, handle: CommandHandle<C>) -> CefResult<Option<CommandHandle<C>>>;

    /// Return a finished pooled command to its pool
    fn release(&mut self, handle: CommandHandle<C>) -> CefResult<()>;
}

/// Bounded FIFO of runnable commands
pub struct ReadyQueue<C, const N: usize> {
    queue: RingQueue<CommandHandle<C>, N>,
}

impl<C, const N: usize> ReadyQueue<C, N> {
    pub const fn new() -> Self {
        Self {
            queue: RingQueue::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, handle: &CommandHandle<C>) -> bool {
        self.queue.contains(handle)
    }

    fn next(&mut self) -> Option<CommandHandle<C>> {
        self.queue.get()
    }

    fn remove(&mut self, handle: &CommandHandle<C>) -> bool {
        self.queue.remove(handle)
    }
}

impl<C, const N: usize> Spawn<C> for ReadyQueue<C, N> {
    fn add_command(&mut self, handle: CommandHandle<C>) -> CefResult<()> {
        self.queue.put(handle).map_err(|_| {
            log::error!("executor queue overflow ({} entries)", N);
            FatalError::new(ErrorCode::ExecutorQueueOverflow, "executor queue overflow")
        })
    }
}

impl<C, const N: usize> Default for ReadyQueue<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Executor state carried between slices
enum ExecutorState<C> {
    GetNextCommand,
    /// Run `handle`, handing it `child` as the finished child
    ExecuteCommand {
        handle: CommandHandle<C>,
        child: Option<CommandHandle<C>>,
    },
}

/// Round-robin command scheduler.
///
/// `N` is the depth of the ready queue. It must cover every command that
/// can be live at once: all pool slots, all singletons, plus a margin.
pub struct CommandExecutor<C, const N: usize> {
    ready: ReadyQueue<C, N>,
    state: ExecutorState<C>,
}

impl<C, const N: usize> CommandExecutor<C, N> {
    pub const fn new() -> Self {
        Self {
            ready: ReadyQueue::new(),
            state: ExecutorState::GetNextCommand,
        }
    }

    /// Queue a new command or a singleton
    pub fn add_command(&mut self, handle: CommandHandle<C>) -> CefResult<()> {
        self.ready.add_command(handle)
    }

    /// Execute at most `max_steps` command steps.
    ///
    /// Returns the number of steps executed. Stops early when no command is
    /// ready. A parent continued by a finished child in the last step of a
    /// slice runs first in the next slice.
    pub fn run_slice<S>(&mut self, space: &mut S, max_steps: u32) -> CefResult<u32>
    where
        S: CommandSpace<C> + ?Sized,
    {
        let mut steps = 0;
        while steps < max_steps {
            let (handle, child) = match core::mem::replace(&mut self.state, ExecutorState::GetNextCommand) {
                ExecutorState::ExecuteCommand { handle, child } => (handle, child),
                ExecutorState::GetNextCommand => match self.ready.next() {
                    Some(handle) => (handle, None),
                    None => break,
                },
            };

            let finished = space.execute(handle, child, &mut self.ready)?;
            steps += 1;

            if !finished {
                self.ready.add_command(handle)?;
                continue;
            }

            match space.parent_of(handle)? {
                Some(parent) => {
                    // the parent resumes now, not from its queued position
                    self.ready.remove(&parent);
                    self.state = ExecutorState::ExecuteCommand {
                        handle: parent,
                        child: Some(handle),
                    };
                }
                None if handle.is_singleton() => {
                    log::debug!("singleton {:?} finished", handle);
                }
                None => space.release(handle)?,
            }
        }
        Ok(steps)
    }

    /// Commands waiting in the ready queue
    pub fn queued(&self) -> usize {
        self.ready.len()
    }

    /// True while a parent continuation is pending for the next slice
    pub fn has_pending_continuation(&self) -> bool {
        matches!(self.state, ExecutorState::ExecuteCommand { .. })
    }

    pub fn is_queued(&self, handle: &CommandHandle<C>) -> bool {
        self.ready.contains(handle)
    }
}

impl<C, const N: usize> Default for CommandExecutor<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cef_cmd::SingletonId;

    /// Singletons 0..4 that finish after the number of yields in `yields`
    struct Countdown {
        yields: [u32; 4],
        executed: [u32; 4],
    }

    impl CommandSpace<()> for Countdown {
        fn execute(
            &mut self,
            handle: CommandHandle<()>,
            _child: Option<CommandHandle<()>>,
            _ready: &mut dyn Spawn<()>,
        ) -> CefResult<bool> {
            let CommandHandle::Singleton(SingletonId(id)) = handle else {
                return Err(FatalError::new(ErrorCode::UnknownSingleton, "pooled"));
            };
            let id = usize::from(id);
            self.executed[id] += 1;
            if self.yields[id] == 0 {
                return Ok(true);
            }
            self.yields[id] -= 1;
            Ok(false)
        }

        fn parent_of(&self, _handle: CommandHandle<()>) -> CefResult<Option<CommandHandle<()>>> {
            Ok(None)
        }

        fn release(&mut self, _handle: CommandHandle<()>) -> CefResult<()> {
            Err(FatalError::new(ErrorCode::CommandNotPoolAllocated, "singleton released"))
        }
    }

    fn singleton(id: u8) -> CommandHandle<()> {
        CommandHandle::Singleton(SingletonId(id))
    }

    #[test]
    fn test_empty_executor_does_nothing() {
        let mut executor: CommandExecutor<(), 4> = CommandExecutor::new();
        let mut space = Countdown {
            yields: [0; 4],
            executed: [0; 4],
        };
        assert_eq!(executor.run_slice(&mut space, 10).unwrap(), 0);
    }

    #[test]
    fn test_round_robin_order() {
        let mut executor: CommandExecutor<(), 4> = CommandExecutor::new();
        let mut space = Countdown {
            yields: [5, 5, 0, 0],
            executed: [0; 4],
        };
        executor.add_command(singleton(0)).unwrap();
        executor.add_command(singleton(1)).unwrap();

        assert_eq!(executor.run_slice(&mut space, 3).unwrap(), 3);
        assert_eq!(space.executed[..2], [2, 1]);
        assert_eq!(executor.queued(), 2);
    }

    #[test]
    fn test_finished_singleton_leaves_the_queue() {
        let mut executor: CommandExecutor<(), 4> = CommandExecutor::new();
        let mut space = Countdown {
            yields: [1, 0, 0, 0],
            executed: [0; 4],
        };
        executor.add_command(singleton(0)).unwrap();
        assert_eq!(executor.run_slice(&mut space, 10).unwrap(), 2);
        assert_eq!(executor.queued(), 0);
    }

    #[test]
    fn test_queue_overflow_is_fatal() {
        let mut executor: CommandExecutor<(), 2> = CommandExecutor::new();
        executor.add_command(singleton(0)).unwrap();
        executor.add_command(singleton(1)).unwrap();
        let err = executor.add_command(singleton(2)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ExecutorQueueOverflow);
    }
}
