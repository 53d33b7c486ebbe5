//! Executor behaviour against a small command family backed by real pools

use cef_cmd::{
    Command, CommandArena, CommandCore, CommandGenerator, CommandHandle, CommandPool, CommandTable,
    Execute, SingletonId,
};
use cef_core::{CefResult, CommandState, ErrorCode, FatalError, OpCode};
use cef_exec::{CommandExecutor, CommandSpace, Spawn};
use cef_mem::PoolId;

const WORK: OpCode = OpCode(0x20);
const WORK_POOL: PoolId = PoolId(0);
const PARENT: CommandHandle<Work> = CommandHandle::Singleton(SingletonId(0));

/// Pooled command that yields `remaining` times before finishing
struct Work {
    core: CommandCore<Work>,
    remaining: u32,
}

impl Command<Work> for Work {
    fn core(&self) -> &CommandCore<Work> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CommandCore<Work> {
        &mut self.core
    }
}

impl Execute<Work, ()> for Work {
    fn execute(&mut self, child: Option<CommandHandle<Work>>, _env: &mut ()) -> CefResult<bool> {
        self.validate_child_response(child)?;
        if self.remaining == 0 {
            self.set_state(CommandState::COMPLETE);
            return Ok(true);
        }
        self.remaining -= 1;
        Ok(false)
    }
}

struct Pools {
    work: CommandPool<Work, 2>,
}

impl CommandTable<Work> for Pools {
    fn pool_for(&self, opcode: OpCode) -> Option<PoolId> {
        (opcode == WORK).then_some(WORK_POOL)
    }

    fn arena(&self, id: PoolId) -> Option<&dyn CommandArena<Work>> {
        (id == WORK_POOL).then_some(&self.work as &dyn CommandArena<Work>)
    }

    fn arena_mut(&mut self, id: PoolId) -> Option<&mut dyn CommandArena<Work>> {
        if id == WORK_POOL {
            Some(&mut self.work)
        } else {
            None
        }
    }

    fn construct(&self, opcode: OpCode, core: CommandCore<Work>) -> Option<(Work, usize)> {
        (opcode == WORK).then(|| {
            let work = Work { core, remaining: 0 };
            (work, core::mem::size_of::<Work>())
        })
    }
}

/// Singleton parent that spawns one child and waits for it
#[derive(Default)]
struct Parent {
    child: Option<CommandHandle<Work>>,
    child_yields: u32,
    continuations: u32,
    done: bool,
}

struct System {
    generator: CommandGenerator<Pools, Work>,
    parent: Parent,
    released: Vec<CommandHandle<Work>>,
}

impl System {
    fn new() -> Self {
        Self {
            generator: CommandGenerator::new(Pools {
                work: CommandPool::new(WORK_POOL),
            }),
            parent: Parent::default(),
            released: Vec::new(),
        }
    }

    fn spawn_work(&mut self, yields: u32) -> CommandHandle<Work> {
        let handle = self.generator.allocate(WORK).unwrap();
        self.generator.get_mut(handle).unwrap().remaining = yields;
        handle
    }

    fn step_parent(
        &mut self,
        child: Option<CommandHandle<Work>>,
        ready: &mut dyn Spawn<Work>,
    ) -> CefResult<bool> {
        match (self.parent.child, child) {
            (None, None) => {
                let handle = self.spawn_work(self.parent.child_yields);
                self.generator
                    .get_mut(handle)
                    .unwrap()
                    .set_parent(Some(PARENT));
                ready.add_command(handle)?;
                self.parent.child = Some(handle);
                Ok(false)
            }
            (Some(_), None) => Ok(false),
            (Some(waiting), Some(arrived)) if waiting == arrived => {
                self.parent.continuations += 1;
                self.generator.free(arrived)?;
                self.parent.child = None;
                self.parent.done = true;
                Ok(true)
            }
            (_, Some(_)) => Err(FatalError::new(
                ErrorCode::UnexpectedChildResponse,
                "unsolicited child",
            )),
        }
    }
}

impl CommandSpace<Work> for System {
    fn execute(
        &mut self,
        handle: CommandHandle<Work>,
        child: Option<CommandHandle<Work>>,
        ready: &mut dyn Spawn<Work>,
    ) -> CefResult<bool> {
        match handle {
            CommandHandle::Singleton(SingletonId(0)) => self.step_parent(child, ready),
            CommandHandle::Singleton(_) => Err(FatalError::new(ErrorCode::UnknownSingleton, "unknown")),
            CommandHandle::Pooled(_) => self
                .generator
                .get_mut(handle)
                .ok_or_else(|| FatalError::new(ErrorCode::ForeignPoolHandle, "stale"))?
                .execute(child, &mut ()),
        }
    }

    fn parent_of(&self, handle: CommandHandle<Work>) -> CefResult<Option<CommandHandle<Work>>> {
        match handle {
            CommandHandle::Singleton(_) => Ok(None),
            CommandHandle::Pooled(_) => self
                .generator
                .get(handle)
                .map(|work| work.parent())
                .ok_or_else(|| FatalError::new(ErrorCode::ForeignPoolHandle, "stale")),
        }
    }

    fn release(&mut self, handle: CommandHandle<Work>) -> CefResult<()> {
        self.released.push(handle);
        self.generator.free(handle)
    }
}

#[test]
fn test_command_with_m_yields_takes_m_plus_one_steps() {
    for yields in 0..5u32 {
        let mut system = System::new();
        let mut executor: CommandExecutor<Work, 4> = CommandExecutor::new();
        let handle = system.spawn_work(yields);
        executor.add_command(handle).unwrap();

        let steps = executor.run_slice(&mut system, 100).unwrap();
        assert_eq!(steps, yields + 1);
        assert_eq!(system.released, vec![handle]);
        assert!(system.generator.get(handle).is_none());
    }
}

#[test]
fn test_slice_never_exceeds_step_budget() {
    let mut system = System::new();
    let mut executor: CommandExecutor<Work, 4> = CommandExecutor::new();
    let first = system.spawn_work(10);
    let second = system.spawn_work(10);
    executor.add_command(first).unwrap();
    executor.add_command(second).unwrap();

    for budget in [0u32, 1, 3, 7] {
        assert_eq!(executor.run_slice(&mut system, budget).unwrap(), budget);
    }
    // 22 steps in total, 11 already spent
    assert_eq!(executor.run_slice(&mut system, 100).unwrap(), 11);
    assert_eq!(system.released.len(), 2);
}

#[test]
fn test_parent_gets_exactly_one_continuation() {
    let mut system = System::new();
    system.parent.child_yields = 2;
    let mut executor: CommandExecutor<Work, 4> = CommandExecutor::new();
    executor.add_command(PARENT).unwrap();

    // P spawns C, C yields, P polls, C yields, P polls, C finishes, P resumes
    let steps = executor.run_slice(&mut system, 100).unwrap();
    assert_eq!(system.parent.continuations, 1);
    assert!(system.parent.done);
    assert!(system.released.is_empty());
    assert_eq!(executor.queued(), 0);
    assert_eq!(steps, 7);
    assert_eq!(system.generator.table().work.available(), 2);
}

#[test]
fn test_continuation_crosses_slice_boundary() {
    let mut system = System::new();
    let mut executor: CommandExecutor<Work, 4> = CommandExecutor::new();
    executor.add_command(PARENT).unwrap();

    // step 1: parent spawns the child; step 2: child finishes
    assert_eq!(executor.run_slice(&mut system, 2).unwrap(), 2);
    assert!(executor.has_pending_continuation());
    assert!(!executor.is_queued(&PARENT));

    assert_eq!(executor.run_slice(&mut system, 1).unwrap(), 1);
    assert_eq!(system.parent.continuations, 1);
    assert!(!executor.has_pending_continuation());
}

#[test]
fn test_unsolicited_child_response_is_fatal() {
    let mut system = System::new();
    let stray = system.spawn_work(0);
    let mut ready = cef_exec::ReadyQueue::<Work, 4>::new();

    let err = system
        .execute(PARENT, Some(stray), &mut ready)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::UnexpectedChildResponse);

    let err = system
        .generator
        .get_mut(stray)
        .unwrap()
        .execute(Some(PARENT), &mut ())
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::UnexpectedChildResponse);
    assert!(ready.is_empty());
}
