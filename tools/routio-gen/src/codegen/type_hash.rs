// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Content digest for type identity.
//!
//! The digest appears on the wire as the channel type tag, so the choice
//! is fixed: MD5, full 16 bytes, rendered as 32 lowercase hex characters.
//! Deterministic and stable across platforms; collision resistance at 128
//! bits is all the tag needs (identity, not security).

use md5::{Digest, Md5};

/// Digest a type's content string into its 32-character hex tag.
#[must_use]
pub fn type_digest(content: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(32);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::type_digest;

    #[test]
    fn test_digest_reproducible() {
        let name = "vision.Frame";
        assert_eq!(type_digest(name), type_digest(name));
    }

    #[test]
    fn test_digest_shape() {
        let tag = type_digest("Point");
        assert_eq!(tag.len(), 32);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_digest_known_vector() {
        // MD5 of the empty string.
        assert_eq!(type_digest(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_digest_distinguishes_content() {
        assert_ne!(type_digest("Point"), type_digest("Pose"));
        assert_ne!(type_digest("ColorREDGREEN"), type_digest("ColorGREENRED"));
    }
}
