// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod attach;
pub mod base;
pub mod broker;
pub mod callbacks;
pub mod hart;
pub(crate) mod local;
pub mod node;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::callbacks::Scheduler;

//======================================================================================================================
// Imports
//======================================================================================================================

use self::node::Sched;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Asks the parent of the current scheduler for `k` more harts on its behalf. Returns the parent's answer: how many
/// harts were granted, or a negative value if the request was refused.
pub fn hart_request(k: isize) -> isize {
    let child: Sched = match local::current_sched() {
        Some(child) => child,
        None => fatal!("hart_request(): no current scheduler"),
    };
    let parent: Sched = match child.parent() {
        Some(parent) => parent,
        None => fatal!("hart_request(): {:?} has no parent", child),
    };
    trace!("hart_request(): child={:?}, k={}", child, k);

    // The parent's callback runs on behalf of the parent.
    local::set_current_sched(Some(parent.clone()));
    let granted: isize = parent.ops().hart_request(&child, k);
    local::set_current_sched(Some(child));
    granted
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
