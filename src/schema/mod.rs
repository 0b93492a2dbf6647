//! Metric schemas
//!
//! This module holds the table of metrics whose semantics are fixed, and the
//! lookup helpers the projector uses to give them priority over inferred ones.

mod catalog;

pub use catalog::*;
