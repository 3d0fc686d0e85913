//! Content signatures over document-generation inputs using blake3.
//!
//! A signature hashes everything that can change the generated document:
//! project identity, report path and bytes, theme colors, and template
//! selection. Equal inputs always produce equal signatures; any single
//! differing input changes the signature. Signatures are recomputed on every
//! resolution attempt and never persisted.

use std::fmt;

/// A 256-bit content signature (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentSignature([u8; 32]);

impl ContentSignature {
    /// Create a new ContentSignature from raw bytes.
    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string (for debugging/display).
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display first 16 chars of hex for brevity
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Incremental signature builder.
///
/// Fields are length-prefixed so adjacent values cannot collide by
/// concatenation (`"ab" + "c"` vs `"a" + "bc"`).
pub struct SignatureHasher {
    hasher: blake3::Hasher,
}

impl SignatureHasher {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
        }
    }

    /// Add a text field.
    pub fn field(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes())
    }

    /// Add a raw byte field.
    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.hasher.update(&(value.len() as u64).to_le_bytes());
        self.hasher.update(value);
        self
    }

    pub fn finish(&self) -> ContentSignature {
        ContentSignature::new(*self.hasher.finalize().as_bytes())
    }
}

impl Default for SignatureHasher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(fields: &[&str], bytes: &[u8]) -> ContentSignature {
        let mut hasher = SignatureHasher::new();
        for field in fields {
            hasher.field(field);
        }
        hasher.bytes(bytes);
        hasher.finish()
    }

    #[test]
    fn test_identical_inputs_identical_signature() {
        let a = sig(&["proj", "/root", "bubble.html"], b"<testsuite/>");
        let b = sig(&["proj", "/root", "bubble.html"], b"<testsuite/>");
        assert_eq!(a, b);
    }

    #[test]
    fn test_any_single_input_changes_signature() {
        let base = sig(&["proj", "/root", "bubble.html"], b"<testsuite/>");

        let other_field = sig(&["proj", "/root", "bubble-test.html"], b"<testsuite/>");
        assert_ne!(base, other_field);

        let other_bytes = sig(&["proj", "/root", "bubble.html"], b"<testsuite name='x'/>");
        assert_ne!(base, other_bytes);
    }

    #[test]
    fn test_length_prefix_prevents_concatenation_collisions() {
        let a = sig(&["ab", "c"], b"");
        let b = sig(&["a", "bc"], b"");
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_is_short_hex() {
        let signature = ContentSignature::new([0xab; 32]);
        assert_eq!(format!("{}", signature), "abababababababab");
    }
}
