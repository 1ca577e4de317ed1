//! # Domain Layer

pub mod errors;
pub mod leg;
pub mod pmode;
pub mod snapshot;
