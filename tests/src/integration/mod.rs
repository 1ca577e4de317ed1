//! # Integration Flows
//!
//! Each test builds one or two complete gateways from the subsystem
//! services, with in-memory or file-backed stores and a transport that
//! never leaves the process.

#[cfg(test)]
mod gateway;

#[cfg(test)]
mod delivery;

#[cfg(test)]
mod split_and_join;
