//! chainstore common - shared types and utilities
//!
//! This crate provides the id newtypes and error definitions used
//! across the chainstore engine.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{BlockId, RecordId};
