//! Core domain models and collaborator contracts for Fieldbook.
//!
//! Storage and transport live in sibling crates; this crate only knows about
//! records, their sync lifecycle and the capabilities the engine consumes.

pub mod customers;
pub mod errors;
pub mod sync;
pub mod utils;

pub use errors::{Error, Result};
