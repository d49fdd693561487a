//! Request fingerprints

use serde::{Deserialize, Serialize};
use std::fmt;

const FINGERPRINT_DOMAIN: &[u8] = b"examforge:request:v1";

/// Deterministic key over (normalized company, year, question count)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_parts(normalized_company: &str, year: u16, question_count: u32) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(FINGERPRINT_DOMAIN);
        // Length prefix keeps field boundaries unambiguous
        hasher.update(&(normalized_company.len() as u64).to_be_bytes());
        hasher.update(normalized_company.as_bytes());
        hasher.update(&year.to_be_bytes());
        hasher.update(&question_count.to_be_bytes());
        Fingerprint(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}
