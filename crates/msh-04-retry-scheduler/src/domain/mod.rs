//! # Domain Layer
//!
//! Retry decisions, dispatch outcomes and submission shapes. No I/O.

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod retry;
pub mod submission;
