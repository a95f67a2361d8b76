//! Error types for `hoarding-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown position: {0:?}")]
  UnknownPosition(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
