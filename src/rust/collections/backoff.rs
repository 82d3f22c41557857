// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    hint,
    thread,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Busy-wait helper for short windows. Spins with a CPU relax hint and, once the spin budget is spent, starts yielding
/// the underlying OS thread so that an oversubscribed machine still makes progress.
pub struct Backoff {
    spins: usize,
    limit: usize,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Backoff {
    pub fn new(limit: usize) -> Self {
        Self {
            spins: 0,
            limit: limit.max(1),
        }
    }

    /// Waits a little.
    pub fn snooze(&mut self) {
        if self.spins < self.limit {
            self.spins += 1;
            hint::spin_loop();
        } else {
            thread::yield_now();
        }
    }

    /// Returns true once the spin budget is spent.
    pub fn is_yielding(&self) -> bool {
        self.spins >= self.limit
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
