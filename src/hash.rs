//! Commit-hash utilities: the content-addressed identifier for engine
//! commits, and the SHA-1 predicate used to validate caller-supplied source
//! commit ids. The predicate is strictly lowercase.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Length in hex characters of a SHA-1 commit id.
pub const SHA1_HEX_LEN: usize = 40;
/// Shortest commit prefix accepted by the commit-info query.
pub const MIN_COMMIT_PREFIX_LEN: usize = 7;

/// A 20-byte SHA-1 commit hash, content-addressing one engine commit (the
/// post-batch FS snapshot plus its metadata). Computed as a function of the
/// post-batch snapshot, never as a diff against the prior commit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitHash([u8; 20]);

impl CommitHash {
    /// Hash arbitrary bytes (the canonical tree encoding) into a commit id.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha1::digest(data);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(digest.as_ref());
        CommitHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// The first two hex chars, used as the `commits/<h2>/...` shard directory.
    pub fn shard(&self) -> String {
        self.to_string()[..2].to_string()
    }

    /// The remaining 38 hex chars, used as the `commits/.../<h38>` leaf directory.
    pub fn rest(&self) -> String {
        self.to_string()[2..].to_string()
    }
}

impl Display for CommitHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for CommitHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommitHash({self})")
    }
}

impl FromStr for CommitHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_valid_sha1(s) {
            return Err(format!("\"{s}\" is not a valid lowercase SHA-1 hex string"));
        }
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(CommitHash(out))
    }
}

/// True iff `s` is exactly 40 lowercase hex characters.
///
/// Uppercase hex is rejected on purpose: a source commit id with uppercase
/// letters is treated as absent rather than normalized.
pub fn is_valid_sha1(s: &str) -> bool {
    s.len() == SHA1_HEX_LEN && s.bytes().all(is_lower_hex_digit)
}

/// True iff `s` is a syntactically acceptable commit-hash *prefix* for the
/// commit-info query: lowercase hex, between [`MIN_COMMIT_PREFIX_LEN`] and
/// [`SHA1_HEX_LEN`] characters inclusive.
pub fn is_valid_sha1_prefix(s: &str) -> bool {
    (MIN_COMMIT_PREFIX_LEN..=SHA1_HEX_LEN).contains(&s.len()) && s.bytes().all(is_lower_hex_digit)
}

fn is_lower_hex_digit(b: u8) -> bool {
    b.is_ascii_digit() || (b'a'..=b'f').contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_sha1_accepts_lowercase_forty_hex() {
        assert!(is_valid_sha1("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"));
    }

    #[test]
    fn valid_sha1_rejects_uppercase() {
        assert!(!is_valid_sha1("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"));
    }

    #[test]
    fn valid_sha1_rejects_nonsense() {
        assert!(!is_valid_sha1("nonsense"));
    }

    #[test]
    fn valid_sha1_rejects_wrong_length() {
        assert!(!is_valid_sha1("aaaa"));
    }

    #[test]
    fn shard_and_rest_roundtrip() {
        let hash = CommitHash::from_str("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        assert_eq!(hash.shard(), "aa");
        assert_eq!(hash.rest().len(), 38);
        assert_eq!(format!("{}{}", hash.shard(), hash.rest()), hash.to_string());
    }

    #[test]
    fn prefix_validation_enforces_length_window() {
        assert!(!is_valid_sha1_prefix("abcdef"));
        assert!(is_valid_sha1_prefix("abcdef1"));
        assert!(is_valid_sha1_prefix(&"a".repeat(40)));
        assert!(!is_valid_sha1_prefix(&"a".repeat(41)));
    }

    #[test]
    fn of_is_deterministic() {
        let a = CommitHash::of(b"hello");
        let b = CommitHash::of(b"hello");
        assert_eq!(a, b);
    }
}
