// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Modules
//======================================================================================================================

pub mod config;
pub mod context;
pub mod fail;
pub mod graph;
pub mod limits;
pub mod logging;
pub mod scheduler;
