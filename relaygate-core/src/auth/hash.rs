//! Secret verification for configured credentials.
//!
//! A configured secret is either stored as-is or as a hash, so that the
//! deployment environment does not need to hold the plain value.
//!
//! Supported formats:
//! - bcrypt (`$2y$`, `$2a$`, `$2b$`)
//! - SHA1 (`{SHA}` + base64 digest)
//! - Plain text (fallback)

use base64::{Engine, engine::general_purpose::STANDARD};
use sha1::{Digest, Sha1};

/// Verifies a presented secret against a stored value.
/// Detects the stored format from its prefix.
pub fn verify(presented: &str, stored: &str) -> bool {
    if is_bcrypt(stored) {
        bcrypt::verify(presented, stored).unwrap_or(false)
    } else if stored.starts_with("{SHA}") {
        verify_sha1(presented, stored)
    } else {
        constant_time_eq(presented.as_bytes(), stored.as_bytes())
    }
}

/// Returns true if the stored value is a hash rather than a plain secret.
pub fn is_hashed(stored: &str) -> bool {
    is_bcrypt(stored) || stored.starts_with("{SHA}")
}

fn is_bcrypt(stored: &str) -> bool {
    stored.starts_with("$2y$") || stored.starts_with("$2a$") || stored.starts_with("$2b$")
}

/// Constant-time byte comparison to prevent timing attacks.
/// Does not leak length information through timing.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len_eq = a.len() == b.len();
    let max_len = a.len().max(b.len());
    let mut result = 0u8;

    for i in 0..max_len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        result |= x ^ y;
    }

    len_eq && result == 0
}

fn verify_sha1(presented: &str, stored: &str) -> bool {
    let Some(encoded) = stored.strip_prefix("{SHA}") else {
        return false;
    };

    let Ok(stored_digest) = STANDARD.decode(encoded) else {
        return false;
    };

    let computed_digest = Sha1::digest(presented.as_bytes());
    constant_time_eq(computed_digest.as_slice(), &stored_digest)
}
