// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fiber::Fiber,
    scheduler::{
        broker::HartBroker,
        callbacks::Scheduler,
        hart::{
            Hart,
            Transfer,
        },
        node::Sched,
    },
};
use ::parking_lot::{
    Mutex,
    MutexGuard,
};
use ::std::sync::Arc;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Scheduler at the root of every hierarchy. It hosts at most one child (the root scheduler), hands it every hart the
/// broker provides, and parks harts with the broker whenever the root gives them back.
pub struct BaseScheduler {
    root: Mutex<Option<Sched>>,
    broker: Arc<dyn HartBroker>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl BaseScheduler {
    pub fn new(broker: Arc<dyn HartBroker>) -> Self {
        Self {
            root: Mutex::new(None),
            broker,
        }
    }

    /// The scheduler currently entered beneath the base scheduler.
    pub fn root(&self) -> Option<Sched> {
        self.root.lock().clone()
    }

    /// Parks `hart` with the broker, re-entering once it is granted again.
    fn park(&self, hart: &mut Hart) -> Transfer {
        let base: Sched = hart.current();
        base.leave_hart();
        if self.broker.yield_hart(hart.id()) {
            base.join_hart();
            hart.reenter()
        } else {
            debug!("park(): hart {} retires", hart.id());
            Transfer::retire()
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Scheduler for BaseScheduler {
    fn hart_request(&self, child: &Sched, k: isize) -> isize {
        if self.root().as_ref() != Some(child) {
            fatal!("hart_request(): {:?} is not the root scheduler", child);
        }
        if k <= 0 {
            return 0;
        }
        self.broker.request_harts(k as usize) as isize
    }

    fn hart_enter(&self, hart: &mut Hart) -> Transfer {
        // The root may only leave once this hart is accounted to it, or once the hart is on its way to the broker.
        let root: MutexGuard<Option<Sched>> = self.root.lock();
        let child: Option<Sched> = root.clone();
        match child {
            Some(child) => hart.grant_with(&child, move || drop(root)),
            None => {
                drop(root);
                self.park(hart)
            },
        }
    }

    fn hart_return(&self, hart: &mut Hart, _child: Sched) -> Transfer {
        self.park(hart)
    }

    fn child_enter(&self, _hart: &mut Hart, child: &Sched) {
        let mut root: MutexGuard<Option<Sched>> = self.root.lock();
        if let Some(root) = root.as_ref() {
            fatal!("child_enter(): base scheduler already hosts {:?}", root);
        }
        *root = Some(child.clone());
        info!("child_enter(): {:?} is the root scheduler", child);
    }

    fn child_exit(&self, _hart: &mut Hart, child: &Sched) {
        let mut root: MutexGuard<Option<Sched>> = self.root.lock();
        if root.as_ref() != Some(child) {
            fatal!("child_exit(): {:?} is not the root scheduler", child);
        }
        *root = None;
        info!("child_exit(): {:?} left the base scheduler", child);
    }

    fn context_block(&self, hart: &mut Hart, fiber: Fiber) {
        fatal!("context_block(): base fiber {} may not block (hart={})", fiber.id(), hart.id())
    }

    fn context_unblock(&self, fiber: Fiber) {
        fatal!("context_unblock(): base fiber {} may not block", fiber.id())
    }

    fn context_yield(&self, hart: &mut Hart, fiber: Fiber) {
        hart.run_next(fiber);
    }

    fn context_exit(&self, hart: &mut Hart, fiber: Fiber) {
        fatal!("context_exit(): base fiber {} may not exit (hart={})", fiber.id(), hart.id())
    }
}
