// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Keeps a per-index threshold lookup table in sync with the indexes actually
//! reporting usage, and publishes usage-versus-threshold gauges.

pub mod config;
pub mod dry_run;
pub mod error;
pub mod evaluate;
pub mod lookup;
pub mod pipeline;
pub mod publisher;
pub mod query;
pub mod reconcile;
pub mod table;
pub mod transport;

pub use config::{Config, Region};
pub use error::{FailurePolicy, MonitorError};
pub use pipeline::{build_transport, Monitor, RunReport};
