//! # Domain Layer
//!
//! Pure message-store logic: records, transition rules, key layout.

pub mod config;
pub mod entities;
pub mod errors;
pub mod keys;
