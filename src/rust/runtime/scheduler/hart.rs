// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::{
        fiber::{
            Fiber,
            FiberState,
        },
        scheduler::{
            local,
            node::Sched,
        },
    },
    substrate::Continuation,
};
use ::crossbeam_channel::{
    self,
    Receiver,
    Sender,
};
use ::std::{
    panic::{
        self,
        AssertUnwindSafe,
    },
    process,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Why a fiber handed its hart back.
pub(crate) enum Reason {
    Yield,
    /// The hook runs on the hart once the fiber's state is saved.
    Block(Box<dyn FnOnce(&Fiber) + Send>),
    Exit,
    /// The fiber, now running as the main fiber of `child`, takes its hart from `parent` to `child`.
    Enter { parent: Sched, child: Sched },
    /// The fiber, now running as the saved identity of `child`'s entrant, takes its hart back to `parent`.
    Leave { parent: Sched, child: Sched },
}

/// Messages delivered to a hart's privileged context.
pub(crate) enum Event {
    Suspended {
        fiber: Fiber,
        resume: Option<Continuation<Dispatch>>,
        reason: Reason,
    },
    Retire,
}

/// Handed to a fiber when a hart runs it.
pub(crate) struct Dispatch {
    pub hart: HartToken,
    pub fiber: Fiber,
}

/// Lets a running fiber reach the hart it runs on.
#[derive(Clone)]
pub(crate) struct HartToken {
    id: usize,
    events: Sender<Event>,
}

enum Action {
    Enter,
    Return(Sched),
    Run(Fiber),
    Wait,
    Retire,
}

/// Where a hart goes once a scheduler callback is done with it.
#[must_use = "a hart does nothing until the transfer is returned to the runtime"]
pub struct Transfer(Action);

/// A hardware thread as seen from inside a scheduler callback.
pub struct Hart {
    id: usize,
    events: Receiver<Event>,
    token: HartToken,
    /// Fiber to run once the pending callback returns.
    next: Option<Fiber>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl HartToken {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn send(&self, event: Event) {
        if self.events.send(event).is_err() {
            fatal!("send(): hart {} is gone", self.id);
        }
    }
}

impl Transfer {
    pub(crate) fn enter() -> Self {
        Self(Action::Enter)
    }

    pub(crate) fn wait() -> Self {
        Self(Action::Wait)
    }

    pub(crate) fn retire() -> Self {
        Self(Action::Retire)
    }
}

impl Hart {
    pub(crate) fn new(id: usize) -> Self {
        let (tx, rx): (Sender<Event>, Receiver<Event>) = crossbeam_channel::unbounded();
        Self {
            id,
            events: rx,
            token: HartToken { id, events: tx },
            next: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn token(&self) -> HartToken {
        self.token.clone()
    }

    /// Scheduler that currently owns this hart.
    pub fn current(&self) -> Sched {
        match local::current_sched() {
            Some(sched) => sched,
            None => fatal!("current(): hart {} has no scheduler", self.id),
        }
    }

    /// Hands this hart to `child`, which must be a child of the current scheduler.
    pub fn grant(&mut self, child: &Sched) -> Transfer {
        self.grant_with(child, || {})
    }

    /// Like [Hart::grant], but calls `unlock` once the hart is accounted to `child` and before `child` sees it. This
    /// lets the parent keep its own state locked across the handoff.
    pub fn grant_with<U: FnOnce()>(&mut self, child: &Sched, unlock: U) -> Transfer {
        let parent: Sched = self.current();
        if child.is_base() {
            fatal!("grant(): cannot grant hart {} to the base scheduler", self.id);
        }
        if child.parent().as_ref() != Some(&parent) {
            fatal!("grant(): {:?} is not a child of {:?}", child, parent);
        }
        trace!("grant(): hart={}, parent={:?}, child={:?}", self.id, parent, child);
        parent.leave_hart();
        child.join_hart();
        local::set_current_sched(Some(child.clone()));
        unlock();
        Transfer(Action::Enter)
    }

    /// Gives this hart back to the parent of the current scheduler.
    pub fn yield_hart(&mut self) -> Transfer {
        let child: Sched = self.current();
        let parent: Sched = match child.parent() {
            Some(parent) => parent,
            None => fatal!("yield_hart(): {:?} has no parent to yield hart {} to", child, self.id),
        };
        trace!("yield_hart(): hart={}, parent={:?}, child={:?}", self.id, parent, child);
        child.leave_hart();
        parent.join_hart();
        local::set_current_sched(Some(parent));
        Transfer(Action::Return(child))
    }

    /// Runs `fiber` on this hart. The fiber must be in the [FiberState::Init], [FiberState::Yielded] or
    /// [FiberState::Runnable] state.
    pub fn run(&mut self, fiber: Fiber) -> Transfer {
        Transfer(Action::Run(fiber))
    }

    /// Re-enters the current scheduler through its `hart_enter` callback.
    pub fn reenter(&mut self) -> Transfer {
        Transfer(Action::Enter)
    }

    /// Runs `fiber` as soon as the pending callback returns. Only callbacks that return no [Transfer] may use it.
    pub fn run_next(&mut self, fiber: Fiber) {
        if let Some(pending) = self.next.replace(fiber) {
            fatal!("run_next(): hart {} already resumes fiber {}", self.id, pending.id());
        }
    }

    /// Starts `fiber` on this hart's thread and hands the hart over to it.
    fn dispatch(&mut self, fiber: Fiber) {
        let resume: Continuation<Dispatch> = fiber.start_running();
        trace!("dispatch(): hart={}, fiber={}", self.id, fiber.id());
        local::set_current_sched(fiber.scheduler());
        resume.resume(Dispatch {
            hart: self.token.clone(),
            fiber,
        });
    }

    /// Waits until the running fiber gives the hart back and works out what the hart does next.
    fn wait(&mut self) -> Transfer {
        match self.events.recv() {
            Ok(Event::Suspended { fiber, resume, reason }) => {
                self.handle(fiber, resume, reason);
                match self.next.take() {
                    Some(fiber) => Transfer(Action::Run(fiber)),
                    None => Transfer(Action::Enter),
                }
            },
            Ok(Event::Retire) | Err(_) => Transfer(Action::Retire),
        }
    }

    fn handle(&mut self, fiber: Fiber, resume: Option<Continuation<Dispatch>>, reason: Reason) {
        match reason {
            Reason::Yield => {
                trace!("handle(): hart={}, fiber={} yielded", self.id, fiber.id());
                fiber.suspend(resume, FiberState::Yielded);
                let owner: Sched = fiber.owner();
                local::set_current_sched(Some(owner.clone()));
                owner.ops().context_yield(self, fiber);
            },
            Reason::Block(hook) => {
                trace!("handle(): hart={}, fiber={} blocked", self.id, fiber.id());
                fiber.suspend(resume, FiberState::Blocked);
                hook(&fiber);
                let owner: Sched = fiber.owner();
                local::set_current_sched(Some(owner.clone()));
                owner.ops().context_block(self, fiber);
            },
            Reason::Exit => {
                trace!("handle(): hart={}, fiber={} exited", self.id, fiber.id());
                fiber.finish();
                let owner: Sched = fiber.owner();
                local::set_current_sched(Some(owner.clone()));
                owner.ops().context_exit(self, fiber);
            },
            Reason::Enter { parent, child } => {
                debug!("handle(): hart={}, {:?} enters {:?}", self.id, child, parent);
                fiber.adopt(resume);
                parent.leave_hart();
                child.join_hart();
                fiber.reassociate(&child);
                parent.ops().child_enter(self, &child);
                local::set_current_sched(Some(child));
                self.run_next(fiber);
            },
            Reason::Leave { parent, child } => {
                debug!("handle(): hart={}, {:?} leaves {:?}", self.id, child, parent);
                fiber.adopt(resume);
                parent.ops().child_exit(self, &child);
                child.leave_hart();
                parent.join_hart();
                fiber.reassociate(&parent);
                local::set_current_sched(Some(parent));
                self.run_next(fiber);
            },
        }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Drives a hart's privileged context on the calling thread until the hart retires. `sched` is the scheduler that
/// owns the hart when it starts.
pub(crate) fn run_hart(hart: Hart, sched: Sched, first: Transfer) {
    local::enter_vcore(sched);
    // A scheduler that panics here leaves the hierarchy half-updated.
    if panic::catch_unwind(AssertUnwindSafe(move || drive(hart, first))).is_err() {
        error!("run_hart(): privileged context panicked");
        process::abort();
    }
    local::leave_vcore();
}

fn drive(mut hart: Hart, first: Transfer) {
    let mut transfer: Transfer = first;
    loop {
        transfer = match transfer.0 {
            Action::Enter => {
                let sched: Sched = hart.current();
                sched.ops().hart_enter(&mut hart)
            },
            Action::Return(child) => {
                let sched: Sched = hart.current();
                sched.ops().hart_return(&mut hart, child)
            },
            Action::Run(fiber) => {
                hart.dispatch(fiber);
                hart.wait()
            },
            Action::Wait => hart.wait(),
            Action::Retire => break,
        };
    }
    debug!("drive(): hart {} retired", hart.id);
}
