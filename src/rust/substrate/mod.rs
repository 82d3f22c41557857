// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Thread-backed execution substrate.
//!
//! Every execution state (a fiber's stack and registers, or a hart's privileged context) is carried by an OS thread
//! that only runs while it holds its hart. Saving a state parks its thread on a [Suspension]; resuming it moves a value
//! through the matching [Continuation]. The scheduling core never sees threads, only these handles.

mod continuation;
mod stack;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    continuation::{
        pair,
        Continuation,
        Suspension,
    },
    stack::Stack,
};

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::{
    panic::{
        self,
        AssertUnwindSafe,
    },
    process,
    thread,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Unwind payload used to tear down an execution state whose saved state was discarded.
pub struct Discarded;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Creates a new execution state on `stack`. The state stays dormant until the returned continuation is resumed, at
/// which point `entry` runs with the resumed value. Dropping the continuation before that releases the state without
/// running `entry`.
pub fn spawn_state<T, F>(name: String, stack: &Stack, entry: F) -> Result<Continuation<T>, Fail>
where
    T: Send + 'static,
    F: FnOnce(T) + Send + 'static,
{
    let (resume, suspension): (Continuation<T>, Suspension<T>) = pair();
    let builder: thread::Builder = thread::Builder::new().name(name).stack_size(stack.size());
    let spawned = builder.spawn(move || {
        let first: T = match suspension.wait() {
            Some(value) => value,
            None => return,
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || entry(first))) {
            // Nothing can resume whoever was waiting on this state, so carrying on would hang.
            if !payload.is::<Discarded>() {
                error!("spawn_state(): execution state panicked");
                process::abort();
            }
        }
    });

    match spawned {
        // The state owns itself from now on; it ends when its entry returns or its continuation is dropped.
        Ok(_) => Ok(resume),
        Err(e) => {
            let cause: String = format!("cannot create execution state ({})", e);
            error!("spawn_state(): {}", cause);
            Err(Fail::new(libc::ENOMEM, &cause))
        },
    }
}

/// Tears down the calling execution state. Only valid on a state created by [spawn_state].
pub fn discard_current() -> ! {
    panic::resume_unwind(Box::new(Discarded))
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
