// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Per-thread execution context: which hart, fiber and scheduler the calling OS thread is currently acting for.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fiber::Fiber,
    scheduler::{
        hart::{
            Dispatch,
            HartToken,
        },
        node::Sched,
    },
};
use ::std::{
    cell::RefCell,
    mem,
};

//======================================================================================================================
// Structures
//======================================================================================================================

#[derive(Default)]
struct Local {
    /// Hart the running fiber was dispatched on.
    hart: Option<HartToken>,
    /// Running fiber.
    fiber: Option<Fiber>,
    /// Current scheduler.
    sched: Option<Sched>,
    /// Whether this thread carries a hart's privileged context.
    vcore: bool,
    /// Whether this thread was created to back a fiber.
    spawned: bool,
}

thread_local! {
    static LOCAL: RefCell<Local> = RefCell::new(Local::default());
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

pub fn current_sched() -> Option<Sched> {
    LOCAL.with(|local| local.borrow().sched.clone())
}

/// Replaces the current scheduler, returning the previous one.
pub fn set_current_sched(sched: Option<Sched>) -> Option<Sched> {
    LOCAL.with(|local| mem::replace(&mut local.borrow_mut().sched, sched))
}

pub fn current_fiber() -> Option<Fiber> {
    LOCAL.with(|local| local.borrow().fiber.clone())
}

pub fn in_vcore_context() -> bool {
    LOCAL.with(|local| local.borrow().vcore)
}

/// Returns true if this thread currently acts for a hart, either as a fiber or as a privileged context.
pub fn is_attached() -> bool {
    LOCAL.with(|local| {
        let local = local.borrow();
        local.vcore || local.hart.is_some()
    })
}

pub fn is_spawned() -> bool {
    LOCAL.with(|local| local.borrow().spawned)
}

pub fn mark_spawned() {
    LOCAL.with(|local| local.borrow_mut().spawned = true);
}

/// Makes this thread the running fiber of the hart it was dispatched on.
pub fn install(dispatch: Dispatch) {
    let sched: Option<Sched> = dispatch.fiber.scheduler();
    LOCAL.with(|local| {
        let mut local = local.borrow_mut();
        local.hart = Some(dispatch.hart);
        local.fiber = Some(dispatch.fiber);
        local.sched = sched;
    })
}

/// Releases the hart this thread runs on, returning it together with the running fiber.
pub fn detach() -> Option<(HartToken, Fiber)> {
    LOCAL.with(|local| {
        let mut local = local.borrow_mut();
        let hart: Option<HartToken> = local.hart.take();
        let fiber: Option<Fiber> = local.fiber.take();
        local.sched = None;
        match (hart, fiber) {
            (Some(hart), Some(fiber)) => Some((hart, fiber)),
            _ => None,
        }
    })
}

/// Turns this thread into the privileged context of a hart.
pub fn enter_vcore(sched: Sched) {
    LOCAL.with(|local| {
        let mut local = local.borrow_mut();
        local.vcore = true;
        local.sched = Some(sched);
    })
}

pub fn leave_vcore() {
    LOCAL.with(|local| *local.borrow_mut() = Local::default())
}
