// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fiber::Fiber,
    scheduler::{
        callbacks::Scheduler,
        local,
    },
};
use ::parking_lot::{
    Mutex,
    MutexGuard,
};
use ::std::{
    any::Any,
    fmt,
    sync::{
        atomic::{
            AtomicIsize,
            Ordering,
        },
        Arc,
        Weak,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

struct SchedNode {
    name: String,
    ops: Arc<dyn Scheduler>,
    /// Harts currently running on behalf of this node. A hart granted to a child is counted by the child instead.
    harts: AtomicIsize,
    parent: Mutex<Option<Sched>>,
    /// Identity taken by the fiber that enters this node.
    main_fiber: Fiber,
    /// Identity the entering fiber resumes as once it exits this node.
    parent_fiber: Mutex<Option<Fiber>>,
    user_data: Mutex<Option<Box<dyn Any + Send>>>,
    base: bool,
}

/// A node of the scheduler hierarchy. Cloning yields another handle to the same node.
#[derive(Clone)]
pub struct Sched(Arc<SchedNode>);

/// Non-owning handle to a scheduler node.
#[derive(Clone)]
pub(crate) struct WeakSched(Weak<SchedNode>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Sched {
    /// Creates a detached scheduler node driven by `ops`. The node joins the hierarchy when a fiber enters it.
    pub fn new<S: Scheduler + 'static>(name: &str, ops: Arc<S>) -> Self {
        Self::build(name, ops, false)
    }

    pub(crate) fn new_base(ops: Arc<dyn Scheduler>) -> Self {
        Self::build("base", ops, true)
    }

    fn build(name: &str, ops: Arc<dyn Scheduler>, base: bool) -> Self {
        Self(Arc::new(SchedNode {
            name: name.to_string(),
            ops,
            harts: AtomicIsize::new(0),
            parent: Mutex::new(None),
            main_fiber: Fiber::detached(None),
            parent_fiber: Mutex::new(None),
            user_data: Mutex::new(None),
            base,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Number of harts this node currently owns.
    pub fn harts(&self) -> isize {
        self.0.harts.load(Ordering::Acquire)
    }

    pub fn parent(&self) -> Option<Sched> {
        self.0.parent.lock().clone()
    }

    /// Returns true if this is the base scheduler of a runtime.
    pub fn is_base(&self) -> bool {
        self.0.base
    }

    /// Identity under which the entering fiber runs while this node is entered.
    pub fn main_fiber(&self) -> Fiber {
        self.0.main_fiber.clone()
    }

    /// Attaches scheduler-private data to this node, replacing any previous data.
    pub fn set_user_data<T: Any + Send>(&self, data: T) {
        *self.0.user_data.lock() = Some(Box::new(data));
    }

    /// Runs `f` on the private data of this node, if it holds data of type `T`.
    pub fn with_user_data<T: Any + Send, R, F: FnOnce(Option<&mut T>) -> R>(&self, f: F) -> R {
        let mut user_data: MutexGuard<Option<Box<dyn Any + Send>>> = self.0.user_data.lock();
        f(user_data.as_mut().and_then(|data| data.downcast_mut::<T>()))
    }

    /// Detaches the private data of this node, if it is of type `T`.
    pub fn take_user_data<T: Any + Send>(&self) -> Option<T> {
        let mut user_data: MutexGuard<Option<Box<dyn Any + Send>>> = self.0.user_data.lock();
        match user_data.take() {
            Some(data) => match data.downcast::<T>() {
                Ok(data) => Some(*data),
                Err(data) => {
                    *user_data = Some(data);
                    None
                },
            },
            None => None,
        }
    }

    pub(crate) fn ops(&self) -> &Arc<dyn Scheduler> {
        &self.0.ops
    }

    pub(crate) fn downgrade(&self) -> WeakSched {
        WeakSched(Arc::downgrade(&self.0))
    }

    /// Counts a hart that just started running on behalf of this node.
    pub(crate) fn join_hart(&self) {
        self.0.harts.fetch_add(1, Ordering::AcqRel);
    }

    /// Stops counting a hart that leaves this node.
    pub(crate) fn leave_hart(&self) {
        let previous: isize = self.0.harts.fetch_sub(1, Ordering::AcqRel);
        if previous <= 0 {
            fatal!("leave_hart(): hart count of {:?} dropped below zero", self);
        }
    }

    pub(crate) fn attach_to(&self, parent: &Sched) {
        *self.0.parent.lock() = Some(parent.clone());
    }

    pub(crate) fn detach_from_parent(&self) {
        *self.0.parent.lock() = None;
    }

    pub(crate) fn set_parent_fiber(&self, fiber: Fiber) {
        *self.0.parent_fiber.lock() = Some(fiber);
    }

    pub(crate) fn take_parent_fiber(&self) -> Option<Fiber> {
        self.0.parent_fiber.lock().take()
    }
}

impl WeakSched {
    pub(crate) fn upgrade(&self) -> Option<Sched> {
        self.0.upgrade().map(Sched)
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Scheduler of the calling fiber or hart.
pub fn current() -> Option<Sched> {
    local::current_sched()
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl PartialEq for Sched {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Sched {}

impl fmt::Debug for Sched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sched")
            .field("name", &self.0.name)
            .field("harts", &self.harts())
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
