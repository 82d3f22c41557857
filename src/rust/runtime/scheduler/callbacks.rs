// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fiber::Fiber,
    scheduler::{
        hart::{
            Hart,
            Transfer,
        },
        node::Sched,
    },
};

//======================================================================================================================
// Traits
//======================================================================================================================

/// Callbacks through which the runtime drives a scheduler.
///
/// Hart callbacks (`hart_enter`, `hart_return`, `child_enter`, `child_exit`, and the `context_*` callbacks other than
/// `context_unblock`) run in the privileged context of the hart that triggered them and receive that [Hart]. The
/// callbacks that return a [Transfer] never give control back to the hart that called them: the returned transfer says
/// where the hart goes next.
///
/// A scheduler that never acts as a parent may leave the parent-side callbacks at their defaults, which treat any
/// call as a fatal contract violation. The same holds for the blocking callbacks of schedulers whose fibers never
/// block.
pub trait Scheduler: Send + Sync {
    /// A child is asking for `k` more harts. Returns how many harts were granted, or a negative value if the request
    /// was refused. Runs on the requesting child's fiber with the current scheduler set to this one.
    fn hart_request(&self, child: &Sched, k: isize) -> isize {
        fatal!("hart_request(): {:?} is not expected to have children (k={})", child, k)
    }

    /// A hart has been handed to this scheduler. Must pick what to do with it: run a fiber, grant it to a child, or
    /// yield it back to the parent.
    fn hart_enter(&self, hart: &mut Hart) -> Transfer;

    /// `child` gave a hart back to this scheduler.
    fn hart_return(&self, hart: &mut Hart, child: Sched) -> Transfer {
        fatal!("hart_return(): {:?} is not expected to have children (hart={})", child, hart.id())
    }

    /// `child` registered itself beneath this scheduler.
    fn child_enter(&self, hart: &mut Hart, child: &Sched) {
        fatal!("child_enter(): {:?} is not expected to have children (hart={})", child, hart.id())
    }

    /// `child` unregistered itself from this scheduler.
    fn child_exit(&self, hart: &mut Hart, child: &Sched) {
        fatal!("child_exit(): {:?} is not expected to have children (hart={})", child, hart.id())
    }

    /// `fiber` blocked. It stays unrunnable until someone calls [crate::unblock] on it.
    fn context_block(&self, hart: &mut Hart, fiber: Fiber) {
        fatal!("context_block(): fiber {} may not block (hart={})", fiber.id(), hart.id())
    }

    /// `fiber` became runnable again. Runs on whatever thread called [crate::unblock].
    fn context_unblock(&self, fiber: Fiber) {
        fatal!("context_unblock(): fiber {} may not block", fiber.id())
    }

    /// `fiber` yielded and is runnable.
    fn context_yield(&self, hart: &mut Hart, fiber: Fiber);

    /// `fiber` finished. It will not run again unless reinitialized.
    fn context_exit(&self, hart: &mut Hart, fiber: Fiber);
}
