//! # Domain Layer
//!
//! Envelope records, key layout and errors. No I/O.

pub mod config;
pub mod entities;
pub mod errors;
pub mod keys;
