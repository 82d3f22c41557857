// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    limits,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Stack of an execution state. The memory is reserved when a state is created on it and released when that state
/// ends, so one [Stack] can back any number of successive states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stack {
    size: usize,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Stack {
    /// Describes a stack of `size` bytes.
    pub fn new(size: usize) -> Result<Self, Fail> {
        if size < limits::STACK_SIZE_MIN {
            let cause: String = format!(
                "stack too small (size={:?}, min={:?})",
                size,
                limits::STACK_SIZE_MIN
            );
            error!("new(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for Stack {
    fn default() -> Self {
        Self {
            size: limits::STACK_SIZE_DEFAULT,
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
