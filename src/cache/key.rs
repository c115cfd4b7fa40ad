//! Cache key derivation.
//!
//! A key is `tenant:query_hash:acl_hash` with an optional `:context_hash`
//! suffix. Hashes are truncated hex SHA-256 digests:
//!
//! | part    | input                                   | hex chars |
//! |---------|-----------------------------------------|-----------|
//! | query   | query trimmed and lowercased            | 32        |
//! | acl     | ACL deduplicated, sorted, length-prefixed | 16      |
//! | context | context string as given                 | 8         |
//!
//! The tenant id is kept in clear so tenant-wide scans can match on it
//! without a second lookup.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

const QUERY_HASH_LEN: usize = 32;
const ACL_HASH_LEN: usize = 16;
const CONTEXT_HASH_LEN: usize = 8;

fn digest(input: &str, len: usize) -> String {
    let mut hex = hex::encode(Sha256::digest(input.as_bytes()));
    hex.truncate(len);
    hex
}

/// Hash of the normalised query. Case and surrounding whitespace are ignored.
pub fn hash_query(query: &str) -> String {
    digest(&query.trim().to_lowercase(), QUERY_HASH_LEN)
}

/// Hash of the ACL as a set. Order and duplicates are ignored.
pub fn hash_acl<S: AsRef<str>>(acl: &[S]) -> String {
    let unique: BTreeSet<&str> = acl.iter().map(AsRef::as_ref).collect();
    let mut hasher = Sha256::new();
    // length prefix keeps token boundaries unambiguous
    for token in unique {
        hasher.update((token.len() as u64).to_le_bytes());
        hasher.update(token.as_bytes());
    }
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(ACL_HASH_LEN);
    hex
}

pub fn hash_context(context: &str) -> String {
    digest(context, CONTEXT_HASH_LEN)
}

/// Full cache key. An empty context is treated as no context.
pub fn cache_key<S: AsRef<str>>(
    query: &str,
    tenant_id: &str,
    acl: &[S],
    context: Option<&str>,
) -> String {
    let mut key = format!("{tenant_id}:{}:{}", hash_query(query), hash_acl(acl));
    if let Some(ctx) = context.filter(|c| !c.is_empty()) {
        key.push(':');
        key.push_str(&hash_context(ctx));
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let key = cache_key("hello", "acme", &["PUBLIC"], None);
        let parts: Vec<&str> = key.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "acme");
        assert_eq!(parts[1].len(), 32);
        assert_eq!(parts[2].len(), 16);

        let with_ctx = cache_key("hello", "acme", &["PUBLIC"], Some("chat-42"));
        let last = with_ctx.rsplit(':').next().unwrap();
        assert_eq!(last.len(), 8);
    }

    #[test]
    fn query_normalised() {
        assert_eq!(hash_query("Test Query"), hash_query("  test query\n"));
        assert_ne!(hash_query("test query"), hash_query("test  query"));
    }

    #[test]
    fn acl_is_a_set() {
        assert_eq!(
            hash_acl(&["group:eng", "PUBLIC", "user:1"]),
            hash_acl(&["user:1", "PUBLIC", "group:eng", "PUBLIC"])
        );
        assert_ne!(hash_acl(&["PUBLIC"]), hash_acl(&["PUBLIC", "user:1"]));
    }

    #[test]
    fn acl_token_boundaries_matter() {
        assert_ne!(
            hash_acl(&["group:eng", "group:finance"]),
            hash_acl(&["group:eng|group:finance"])
        );
        assert_ne!(hash_acl(&["a", "b"]), hash_acl(&["ab"]));
        assert_ne!(hash_acl(&["a", "b"]), hash_acl(&["a|b"]));
        assert_ne!(hash_acl::<&str>(&[]), hash_acl(&[""]));
    }

    #[test]
    fn empty_context_ignored() {
        assert_eq!(
            cache_key("q", "t", &["a"], Some("")),
            cache_key("q", "t", &["a"], None)
        );
        assert_ne!(
            cache_key("q", "t", &["a"], Some("x")),
            cache_key("q", "t", &["a"], None)
        );
    }

    #[test]
    fn known_digest() {
        // sha256("") prefix
        assert_eq!(hash_context(""), "e3b0c442");
    }
}
