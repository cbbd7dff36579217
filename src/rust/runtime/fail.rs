// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::libc::{
    c_int,
    ECANCELED,
    EINVAL,
    EIO,
    ENOENT,
    ESHUTDOWN,
};
use ::std::{
    any::Any,
    error,
    fmt,
    io,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Failure
#[derive(Clone)]
pub struct Fail {
    /// Error code.
    pub errno: c_int,
    /// Cause.
    pub cause: String,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

/// Associated Functions for Failures
impl Fail {
    /// Creates a new Failure
    pub fn new(errno: i32, cause: &str) -> Self {
        Self {
            errno,
            cause: cause.to_string(),
        }
    }

    /// Creates a failure that carries the payload of a panicked task body.
    pub fn task_panicked(payload: &(dyn Any + Send)) -> Self {
        let message: &str = if let Some(message) = payload.downcast_ref::<&str>() {
            message
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.as_str()
        } else {
            "opaque panic payload"
        };
        Self {
            errno: ECANCELED,
            cause: format!("task body panicked: {}", message),
        }
    }

    /// Creates a failure naming one node on a dependency cycle.
    pub fn graph_cycle(node_id: u64) -> Self {
        Self {
            errno: EINVAL,
            cause: format!("dependency cycle involving node {}", node_id),
        }
    }

    /// Creates a failure naming a predecessor that was never added to the graph.
    pub fn unknown_node(node_id: u64) -> Self {
        Self {
            errno: ENOENT,
            cause: format!("unknown predecessor node {}", node_id),
        }
    }

    /// Creates the failure returned by submissions that race or follow a shutdown.
    pub fn pool_shutdown() -> Self {
        Self {
            errno: ESHUTDOWN,
            cause: "worker pool is shutting down".to_string(),
        }
    }

    /// Creates the failure reported when a task result has already been retrieved.
    pub fn result_taken(task_id: u64) -> Self {
        Self {
            errno: ENOENT,
            cause: format!("result of task {} already taken", task_id),
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Display Trait Implementation for Failures
impl fmt::Display for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)
    }
}

/// Debug trait Implementation for Failures
impl fmt::Debug for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)
    }
}

/// Error Trait Implementation for Failures
impl error::Error for Fail {}

/// Conversion Trait Implementation for Fail
impl From<io::Error> for Fail {
    fn from(_: io::Error) -> Self {
        Self {
            errno: EIO,
            cause: "I/O error".to_string(),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
