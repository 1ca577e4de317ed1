//! # Domain Layer
//!
//! Group/fragment records, the MIME codec and the fragment-file helpers.

pub mod config;
pub mod entities;
pub mod errors;
pub mod files;
pub mod keys;
pub mod mime;
