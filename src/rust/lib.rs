// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![deny(clippy::all)]

#[macro_use]
extern crate log;

//======================================================================================================================
// Macros
//======================================================================================================================

/// Reports a violated runtime contract. These are logic bugs in a scheduler or in the application, so the runtime
/// cannot continue: the diagnostic is logged and the calling thread panics.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => ({
        let cause: String = format!($($arg)+);
        ::log::error!("fatal: {}", cause);
        panic!("{}", cause)
    });
}

/// Ensures that two expressions are equal, or bails out of the enclosing `anyhow::Result` function.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => {{
        match (&$left, &$right) {
            (left, right) => {
                if !(*left == *right) {
                    ::anyhow::bail!(
                        "ensure failed: `(left == right)` left: `{:?}`, right: `{:?}` ({}:{})",
                        left,
                        right,
                        file!(),
                        line!()
                    );
                }
            },
        }
    }};
}

/// Ensures that two expressions are not equal, or bails out of the enclosing `anyhow::Result` function.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr) => {{
        match (&$left, &$right) {
            (left, right) => {
                if *left == *right {
                    ::anyhow::bail!(
                        "ensure failed: `(left != right)` left: `{:?}`, right: `{:?}` ({}:{})",
                        left,
                        right,
                        file!(),
                        line!()
                    );
                }
            },
        }
    }};
}

//======================================================================================================================
// Modules
//======================================================================================================================

pub mod collections;
pub mod runtime;
pub mod substrate;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::runtime::{
    config::Config,
    fail::Fail,
    fiber::{
        block,
        exit,
        unblock,
        yield_now,
        Fiber,
        FiberState,
    },
    futex::{
        futex,
        BlockingQueue,
        FutexOp,
    },
    mutex::Mutex,
    scheduler::{
        attach::{
            enter,
            exit as sched_exit,
        },
        hart::{
            Hart,
            Transfer,
        },
        hart_request,
        node::{
            current,
            Sched,
        },
        Scheduler,
    },
    Runtime,
};
pub use self::substrate::Stack;
