// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::flexi_logger::{
    Logger,
    LoggerHandle,
};
use ::std::sync::OnceLock;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Log specification applied when the environment does not provide one.
const DEFAULT_LOG_SPEC: &str = "info";

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// Handle of the global logger. Held for the lifetime of the process, otherwise the logger shuts down.
static LOGGER: OnceLock<Option<LoggerHandle>> = OnceLock::new();

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Initializes logging features. This function is idempotent and safe to call from multiple threads.
pub fn initialize() {
    let _ = LOGGER.get_or_init(|| match Logger::try_with_env_or_str(DEFAULT_LOG_SPEC) {
        Ok(logger) => logger.start().ok(),
        Err(_) => None,
    });
}
