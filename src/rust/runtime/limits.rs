// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

/// Smallest stack we hand to a fiber.
pub const STACK_SIZE_MIN: usize = 16 * 1024;

/// Default fiber stack size.
pub const STACK_SIZE_DEFAULT: usize = 256 * 1024;

/// Default number of spins before a busy-wait starts yielding its OS thread.
pub const SPIN_LIMIT_DEFAULT: usize = 128;

/// Upper bound on the number of harts a single runtime will ever hand out.
pub const MAX_HARTS_LIMIT: usize = 1024;

/// Stack size of the threads that run a hart's privileged context.
pub const HART_STACK_SIZE: usize = 128 * 1024;
