use sha2::{Digest, Sha256};

/// Fingerprint of a raw response body.
///
/// Hashes the exact bytes, not a normalized form: the fetch handler uses this to
/// skip parsing when an origin re-serves identical content, and any byte change
/// (even whitespace) must go through the parser and entry diff.
pub fn body_hash(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}
