// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::{
        fiber::Fiber,
        scheduler::{
            hart::{
                Dispatch,
                Event,
                HartToken,
                Reason,
            },
            local,
            node::Sched,
        },
    },
    substrate::{
        self,
        Continuation,
        Suspension,
    },
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Gives the hart back to the current fiber's scheduler. The fiber stays runnable and continues once its scheduler
/// runs it again.
pub fn yield_now() {
    let (hart, fiber): (HartToken, Fiber) = running("yield_now");
    suspend_as(hart, fiber, Reason::Yield);
}

/// Blocks the current fiber. Once its state is saved, `hook` runs on the hart with the blocked fiber, and is the place
/// to publish the fiber to whoever will unblock it.
pub fn block<H>(hook: H)
where
    H: FnOnce(&Fiber) + Send + 'static,
{
    let (hart, fiber): (HartToken, Fiber) = running("block");
    suspend_as(hart, fiber, Reason::Block(Box::new(hook)));
}

/// Makes a blocked fiber runnable and tells its scheduler. Unblocking a fiber that has not finished blocking yet, or
/// that is already runnable, does nothing.
pub fn unblock(fiber: &Fiber) {
    if fiber.wake() {
        let owner: Sched = fiber.owner();
        trace!("unblock(): fiber={}, owner={:?}", fiber.id(), owner);
        owner.ops().context_unblock(fiber.clone());
    }
}

/// Finishes the current fiber, as if its routine had returned.
pub fn exit() -> ! {
    if !local::is_spawned() {
        fatal!("exit(): the thread that started the runtime cannot exit as a fiber");
    }
    let (hart, fiber): (HartToken, Fiber) = running("exit");
    hart.send(Event::Suspended {
        fiber,
        resume: None,
        reason: Reason::Exit,
    });
    substrate::discard_current()
}

/// Entry point of every fiber created with a routine.
pub(super) fn run<F: FnOnce()>(dispatch: Dispatch, routine: F) {
    local::install(dispatch);
    local::mark_spawned();
    routine();
    let (hart, fiber): (HartToken, Fiber) = running("exit");
    hart.send(Event::Suspended {
        fiber,
        resume: None,
        reason: Reason::Exit,
    });
}

/// Releases the calling thread's hart, returning it together with the fiber that was running.
pub(crate) fn running(op: &str) -> (HartToken, Fiber) {
    if local::in_vcore_context() {
        fatal!("{}(): called from a hart's privileged context", op);
    }
    match local::detach() {
        Some(running) => running,
        None => fatal!("{}(): not running as a fiber", op),
    }
}

/// Hands `hart` back to its privileged context for `reason`, and suspends the calling thread as `fiber` until a hart
/// dispatches that fiber again.
pub(crate) fn suspend_as(hart: HartToken, fiber: Fiber, reason: Reason) {
    let (resume, suspension): (Continuation<Dispatch>, Suspension<Dispatch>) = substrate::pair();
    hart.send(Event::Suspended {
        fiber,
        resume: Some(resume),
        reason,
    });
    match suspension.wait() {
        Some(dispatch) => local::install(dispatch),
        None if local::is_spawned() => substrate::discard_current(),
        None => fatal!("suspend_as(): the thread that started the runtime was discarded"),
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
