// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod transition;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::transition::{
    block,
    exit,
    unblock,
    yield_now,
};
pub(crate) use self::transition::{
    running,
    suspend_as,
};

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::{
        fail::Fail,
        scheduler::{
            hart::Dispatch,
            local,
            node::Sched,
        },
    },
    substrate::{
        self,
        Continuation,
        Stack,
    },
};
use ::parking_lot::{
    Mutex,
    MutexGuard,
};
use ::std::{
    fmt,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

static NEXT_FIBER_ID: AtomicUsize = AtomicUsize::new(0);

//======================================================================================================================
// Structures
//======================================================================================================================

/// Lifecycle of a fiber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FiberState {
    /// Created or reinitialized and not yet run.
    Init,
    Running,
    /// Gave up its hart and may run again at any time.
    Yielded,
    /// Waiting for someone to unblock it.
    Blocked,
    /// Unblocked and waiting for its scheduler to run it.
    Runnable,
    /// Finished. Only reinitialization brings it back.
    Exited,
}

struct FiberInner {
    id: usize,
    state: FiberState,
    /// Scheduler that receives this fiber's context callbacks.
    sched: Option<Sched>,
    /// Saved execution state, present whenever the fiber can be dispatched.
    resume: Option<Continuation<Dispatch>>,
}

struct FiberCore {
    stack: Option<Stack>,
    inner: Mutex<FiberInner>,
}

/// A user-level execution context. Cloning yields another handle to the same fiber.
#[derive(Clone)]
pub struct Fiber(Arc<FiberCore>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Fiber {
    /// Creates a fiber that runs `routine` on `stack` once its scheduler dispatches it. The fiber is owned by the
    /// current scheduler.
    pub fn create<F>(stack: Stack, routine: F) -> Result<Self, Fail>
    where
        F: FnOnce() + Send + 'static,
    {
        let sched: Sched = Self::creator("create");
        let fiber: Fiber = Self(Arc::new(FiberCore {
            stack: Some(stack),
            inner: Mutex::new(FiberInner {
                id: next_id(),
                state: FiberState::Init,
                sched: Some(sched),
                resume: None,
            }),
        }));
        fiber.set_entry(routine)?;
        trace!("create(): fiber={}", fiber.id());
        Ok(fiber)
    }

    /// Fiber with no stack of its own. Used as the identity of executions that did not start as fibers.
    pub(crate) fn detached(sched: Option<Sched>) -> Self {
        Self(Arc::new(FiberCore {
            stack: None,
            inner: Mutex::new(FiberInner {
                id: next_id(),
                state: FiberState::Init,
                sched,
                resume: None,
            }),
        }))
    }

    /// Fiber that stands for the calling thread, which is already running.
    pub(crate) fn adopted(sched: Sched) -> Self {
        let fiber: Fiber = Self::detached(Some(sched));
        fiber.lock().state = FiberState::Running;
        fiber
    }

    /// Resets a finished or never-run fiber to run `routine`, under a fresh id and owned by the current scheduler.
    pub fn reinit<F>(&self, routine: F) -> Result<(), Fail>
    where
        F: FnOnce() + Send + 'static,
    {
        self.reset("reinit", true);
        self.set_entry(routine)
    }

    /// Like [Fiber::reinit], but keeps the fiber's id.
    pub fn recycle<F>(&self, routine: F) -> Result<(), Fail>
    where
        F: FnOnce() + Send + 'static,
    {
        self.reset("recycle", false);
        self.set_entry(routine)
    }

    /// Hands this fiber's context callbacks to `sched`.
    pub fn reassociate(&self, sched: &Sched) {
        self.lock().sched = Some(sched.clone());
        if Fiber::current().as_ref() == Some(self) {
            local::set_current_sched(Some(sched.clone()));
        }
    }

    /// Releases the fiber's saved state. A suspended routine is torn down without running further.
    pub fn destroy(&self) {
        let mut inner: MutexGuard<FiberInner> = self.lock();
        if inner.state == FiberState::Running {
            fatal!("destroy(): fiber {} is running", inner.id);
        }
        trace!("destroy(): fiber={}", inner.id);
        inner.resume = None;
        inner.state = FiberState::Exited;
    }

    /// Fiber running on the calling thread.
    pub fn current() -> Option<Fiber> {
        local::current_fiber()
    }

    pub fn id(&self) -> usize {
        self.lock().id
    }

    pub fn state(&self) -> FiberState {
        self.lock().state
    }

    /// Scheduler that owns this fiber.
    pub fn scheduler(&self) -> Option<Sched> {
        self.lock().sched.clone()
    }

    pub fn stack(&self) -> Option<Stack> {
        self.0.stack
    }

    pub(crate) fn owner(&self) -> Sched {
        let inner: MutexGuard<FiberInner> = self.lock();
        match inner.sched.as_ref() {
            Some(sched) => sched.clone(),
            None => fatal!("owner(): fiber {} has no scheduler", inner.id),
        }
    }

    /// Marks the fiber as running and takes its saved state.
    pub(crate) fn start_running(&self) -> Continuation<Dispatch> {
        let mut inner: MutexGuard<FiberInner> = self.lock();
        match inner.state {
            FiberState::Init | FiberState::Yielded | FiberState::Runnable => (),
            state => fatal!("start_running(): cannot run fiber {} in state {:?}", inner.id, state),
        }
        match inner.resume.take() {
            Some(resume) => {
                inner.state = FiberState::Running;
                resume
            },
            None => fatal!("start_running(): fiber {} has no saved state", inner.id),
        }
    }

    /// Saves the state of a fiber that just gave up its hart.
    pub(crate) fn suspend(&self, resume: Option<Continuation<Dispatch>>, state: FiberState) {
        let mut inner: MutexGuard<FiberInner> = self.lock();
        if inner.state != FiberState::Running {
            fatal!("suspend(): fiber {} suspended in state {:?}", inner.id, inner.state);
        }
        inner.resume = resume;
        inner.state = state;
    }

    /// Gives a detached identity the execution that just took it on.
    pub(crate) fn adopt(&self, resume: Option<Continuation<Dispatch>>) {
        let mut inner: MutexGuard<FiberInner> = self.lock();
        if inner.state != FiberState::Init || inner.resume.is_some() {
            fatal!("adopt(): fiber {} is in use (state={:?})", inner.id, inner.state);
        }
        if resume.is_none() {
            fatal!("adopt(): fiber {} received no execution", inner.id);
        }
        inner.resume = resume;
    }

    /// Drops the identity of an execution that moves on under another identity.
    pub(crate) fn detach_execution(&self) {
        let mut inner: MutexGuard<FiberInner> = self.lock();
        inner.state = FiberState::Init;
        inner.resume = None;
        inner.sched = None;
    }

    pub(crate) fn finish(&self) {
        let mut inner: MutexGuard<FiberInner> = self.lock();
        if inner.state != FiberState::Running {
            fatal!("finish(): fiber {} exited in state {:?}", inner.id, inner.state);
        }
        inner.state = FiberState::Exited;
        inner.resume = None;
    }

    /// Moves a blocked fiber to [FiberState::Runnable]. Returns false if the fiber was not blocked but can already
    /// run.
    pub(crate) fn wake(&self) -> bool {
        let mut inner: MutexGuard<FiberInner> = self.lock();
        match inner.state {
            FiberState::Blocked => {
                inner.state = FiberState::Runnable;
                true
            },
            FiberState::Yielded | FiberState::Runnable => false,
            state => fatal!("wake(): cannot unblock fiber {} in state {:?}", inner.id, state),
        }
    }

    fn creator(op: &str) -> Sched {
        match local::current_sched() {
            Some(sched) => sched,
            None => fatal!("{}(): no current scheduler", op),
        }
    }

    fn reset(&self, op: &str, renumber: bool) {
        let sched: Sched = Self::creator(op);
        let mut inner: MutexGuard<FiberInner> = self.lock();
        match inner.state {
            FiberState::Init | FiberState::Exited => (),
            state => fatal!("{}(): fiber {} is in state {:?}", op, inner.id, state),
        }
        if renumber {
            inner.id = next_id();
        }
        inner.state = FiberState::Init;
        inner.sched = Some(sched);
        inner.resume = None;
    }

    fn set_entry<F>(&self, routine: F) -> Result<(), Fail>
    where
        F: FnOnce() + Send + 'static,
    {
        let stack: Stack = match self.0.stack {
            Some(stack) => stack,
            None => {
                let cause: String = format!("fiber {} has no stack", self.id());
                error!("set_entry(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        let name: String = format!("fiber-{}", self.id());
        let resume: Continuation<Dispatch> =
            substrate::spawn_state(name, &stack, move |dispatch: Dispatch| transition::run(dispatch, routine))?;
        self.lock().resume = Some(resume);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, FiberInner> {
        self.0.inner.lock()
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn next_id() -> usize {
    NEXT_FIBER_ID.fetch_add(1, Ordering::Relaxed)
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl PartialEq for Fiber {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Fiber {}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner: MutexGuard<FiberInner> = self.lock();
        f.debug_struct("Fiber")
            .field("id", &inner.id)
            .field("state", &inner.state)
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
