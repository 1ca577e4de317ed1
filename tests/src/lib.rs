//! # MSH Gateway Test Suite
//!
//! Cross-subsystem tests that wire real subsystem services together.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks of the hot paths
//! └── src/integration/  # Flows spanning store, legs, fragments,
//!                       # scheduler and non-repudiation
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p msh-tests
//!
//! # By flow
//! cargo test -p msh-tests integration::delivery::
//! cargo test -p msh-tests integration::split_and_join::
//!
//! # Benchmarks
//! cargo bench -p msh-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
