// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::time::Duration;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Number of yield iterations an idle worker spins through before parking.
pub const WORKER_SPIN_ITERATIONS: usize = 64;

/// Upper bound on a single park. Workers re-check queues and the drain condition when it elapses.
pub const WORKER_PARK_TIMEOUT: Duration = Duration::from_millis(1);

/// Upper bound on a single wait for a task result while joining with no work available to help with.
pub const JOIN_WAIT_TIMEOUT: Duration = Duration::from_millis(1);

/// Number of times a steal attempt is retried when victims report contention.
pub const MAX_STEAL_RETRIES: usize = 4;

/// Maximum fork depth of `recursive_cutoff`. Deeper ranges are processed sequentially.
pub const MAX_SPLIT_DEPTH: usize = 48;

/// Sequential cutoff used when neither the caller nor the configuration provides one.
pub const DEFAULT_CUTOFF: usize = 64;

/// Cache line size assumed when the configuration does not provide a hint.
pub const DEFAULT_CACHE_LINE_SIZE: usize = 64;
