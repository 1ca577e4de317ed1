//! # MSH Runtime Library
//!
//! The gateway process: configuration, storage backends, the HTTP transport
//! and the [`GatewayRuntime`] that wires the subsystems together. The
//! `msh-runtime` binary is a thin shell around it.

#![allow(clippy::type_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod config;
pub mod runtime;

pub use config::{ConfigError, GatewayConfig, StorageBackend};
pub use runtime::GatewayRuntime;
