// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    futex::BlockingQueue,
};
use ::std::sync::atomic::{
    AtomicI32,
    Ordering,
};

//======================================================================================================================
// Constants
//======================================================================================================================

const UNLOCKED: i32 = 0;
const LOCKED: i32 = 1;
/// Locked, and somebody may be waiting.
const CONTENDED: i32 = 2;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Mutex for fibers. Contended lockers block on the futex word instead of spinning, so their harts stay free to run
/// other fibers.
pub struct Mutex {
    state: AtomicI32,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Mutex {
    pub const fn new() -> Self {
        Self {
            state: AtomicI32::new(UNLOCKED),
        }
    }

    /// Acquire this lock, blocking the calling fiber while somebody else holds it.
    pub fn lock(&self) {
        let mut state: i32 = match self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => return,
            Err(state) => state,
        };
        if state != CONTENDED {
            state = self.state.swap(CONTENDED, Ordering::Acquire);
        }
        while state != UNLOCKED {
            BlockingQueue::global().wait(&self.state, CONTENDED);
            state = self.state.swap(CONTENDED, Ordering::Acquire);
        }
    }

    /// Try to acquire this lock. Return [true] if successful.
    pub fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release this lock, waking one waiter if there may be any.
    pub fn unlock(&self) -> Result<(), Fail> {
        match self.state.swap(UNLOCKED, Ordering::Release) {
            UNLOCKED => {
                let cause: &str = "mutex was not locked";
                error!("unlock(): {}", cause);
                Err(Fail::new(libc::EPERM, cause))
            },
            LOCKED => Ok(()),
            _ => {
                BlockingQueue::global().wake(&self.state, 1);
                Ok(())
            },
        }
    }

    /// Returns true if somebody holds this lock.
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != UNLOCKED
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Tests
//======================================================================================================================
