// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod backoff;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::backoff::Backoff;
