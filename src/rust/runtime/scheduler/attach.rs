// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fiber::{
        self,
        Fiber,
    },
    scheduler::{
        hart::{
            HartToken,
            Reason,
        },
        local,
        node::Sched,
    },
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Registers `child` beneath the current scheduler and moves the calling fiber, together with its hart, into it. The
/// caller continues as the main fiber of `child` until it calls [exit].
pub fn enter(child: &Sched) {
    if local::in_vcore_context() {
        fatal!("enter(): called from a hart's privileged context");
    }
    let parent: Sched = match local::current_sched() {
        Some(parent) => parent,
        None => fatal!("enter(): no current scheduler"),
    };
    if child.is_base() {
        fatal!("enter(): cannot enter the base scheduler");
    }
    if let Some(owner) = child.parent() {
        fatal!("enter(): {:?} is already entered beneath {:?}", child, owner);
    }
    if child.harts() != 0 {
        fatal!("enter(): {:?} still owns harts", child);
    }

    let (hart, caller): (HartToken, Fiber) = fiber::running("enter");
    debug!("enter(): parent={:?}, child={:?}, hart={}", parent, child, hart.id());
    child.attach_to(&parent);
    caller.detach_execution();
    child.set_parent_fiber(caller);
    fiber::suspend_as(
        hart,
        child.main_fiber(),
        Reason::Enter {
            parent,
            child: child.clone(),
        },
    );
}

/// Unregisters the current scheduler from its parent. The caller continues as the fiber that entered it, and returns
/// only once every hart has left the exited scheduler.
pub fn exit() {
    if local::in_vcore_context() {
        fatal!("exit(): called from a hart's privileged context");
    }
    let child: Sched = match local::current_sched() {
        Some(child) => child,
        None => fatal!("exit(): no current scheduler"),
    };
    let parent: Sched = match child.parent() {
        Some(parent) => parent,
        None => fatal!("exit(): {:?} has no parent", child),
    };
    let resume_as: Fiber = match child.take_parent_fiber() {
        Some(fiber) => fiber,
        None => fatal!("exit(): {:?} was not entered", child),
    };

    let (hart, current): (HartToken, Fiber) = fiber::running("exit");
    debug!("exit(): parent={:?}, child={:?}, hart={}", parent, child, hart.id());
    current.detach_execution();
    fiber::suspend_as(
        hart,
        resume_as,
        Reason::Leave {
            parent,
            child: child.clone(),
        },
    );

    // Harts still granted to the child find nothing to do and yield back up.
    loop {
        let harts: isize = child.harts();
        if harts == 0 {
            break;
        }
        if harts < 0 {
            fatal!("exit(): {:?} owns a negative number of harts", child);
        }
        fiber::yield_now();
    }
    child.detach_from_parent();
    debug!("exit(): {:?} is detached", child);
}
