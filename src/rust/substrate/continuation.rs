// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::crossbeam_channel::{
    self,
    Receiver,
    Sender,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Resumes a suspended execution state. Resuming consumes the continuation, so a saved state can be resumed at most
/// once.
pub struct Continuation<T> {
    tx: Sender<T>,
}

/// The suspended side of a [Continuation].
pub struct Suspension<T> {
    rx: Receiver<T>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Creates a linked continuation and suspension.
pub fn pair<T>() -> (Continuation<T>, Suspension<T>) {
    let (tx, rx): (Sender<T>, Receiver<T>) = crossbeam_channel::bounded(1);
    (Continuation { tx }, Suspension { rx })
}

impl<T> Continuation<T> {
    /// Resumes the suspended state, handing it `value`. Resuming a state that was already torn down is a no-op.
    pub fn resume(self, value: T) {
        if self.tx.send(value).is_err() {
            warn!("resume(): suspended state is gone");
        }
    }
}

impl<T> Suspension<T> {
    /// Blocks until the state is resumed. Returns `None` if the continuation was dropped instead, meaning that the
    /// saved state was discarded and must not continue.
    pub fn wait(self) -> Option<T> {
        self.rx.recv().ok()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
