//! Session token.
//!
//! A random token generated once per runtime. The backlog is not persisted,
//! so a client holding a cursor from a previous process must reload; the
//! token lets the runtime detect that.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new 8-hex-digit token from the OS random source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 4];
        if let Err(error) = getrandom::fill(&mut bytes) {
            tracing::warn!(%error, "OS random source unavailable, deriving session from clock");
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.subsec_nanos() ^ (elapsed.as_secs() as u32))
                .unwrap_or(0);
            bytes = nanos.to_le_bytes();
        }

        Self(bytes.iter().map(|byte| format!("{:02x}", byte)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_eight_hex_digits() {
        let session = SessionId::generate();
        assert_eq!(session.as_str().len(), 8);
        assert!(session.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_differ_between_runtimes() {
        // 32 random bits; a collision across a handful of draws would point
        // at a broken random source.
        let tokens: std::collections::HashSet<_> =
            (0..8).map(|_| SessionId::generate()).collect();
        assert!(tokens.len() > 1);
    }
}
