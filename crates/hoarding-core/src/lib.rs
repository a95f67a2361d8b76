//! Core types and trait definitions for the Hoarding ad pipeline.
//!
//! No HTTP or database code lives here; the SQLite backend and the server
//! both build on these types.

pub mod ad;
pub mod consent;
pub mod error;
pub mod impression;
pub mod store;

pub use error::{Error, Result};
