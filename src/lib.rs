//! SDK source generation for SWML.
//!
//! A JSON Schema describing the instruction model is escaped for each target
//! language's reserved words, handed to an external code generator, and the
//! generated source is rewritten so the authored property names come back.
pub mod cli;
pub mod config;
pub mod error;
pub mod path_de;
pub mod pipeline;
pub mod rewrite;
pub mod schema;
pub mod service;

pub use error::{Error, Result};
