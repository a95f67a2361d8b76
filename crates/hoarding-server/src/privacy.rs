//! One-way hashing of requester addresses.
//!
//! Digests are SHA-256 over the address text, hex-encoded. With no salt the
//! output matches a plain `sha256(ip)`; a configured salt is prepended to
//! the input so digests cannot be looked up in a precomputed IPv4 table.

use std::fmt;

use sha2::{Digest, Sha256};

#[derive(Clone, Default)]
pub struct IpHasher {
  salt: Option<Vec<u8>>,
}

impl IpHasher {
  pub fn new(salt: Option<String>) -> Self {
    Self { salt: salt.filter(|s| !s.is_empty()).map(String::into_bytes) }
  }

  /// Hex SHA-256 of `raw_ip` (salted if configured). Deterministic.
  pub fn hash(&self, raw_ip: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(salt) = &self.salt {
      hasher.update(salt);
    }
    hasher.update(raw_ip.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Debug for IpHasher {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("IpHasher")
      .field("salted", &self.salt.is_some())
      .finish()
  }
}
