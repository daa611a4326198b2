use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fmt;

/// blake3 digest of an asset's raw bytes, base64 encoded (44 chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(BASE64.encode(blake3::hash(bytes).as_bytes()))
    }

    /// Accepts a previously encoded hash; rejects anything that is not
    /// non-empty, padded base64.
    pub fn parse(encoded: &str) -> Option<Self> {
        if encoded.is_empty() {
            return None;
        }
        BASE64.decode(encoded).ok()?;
        Some(Self(encoded.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_content_sensitive() {
        let a = ContentHash::of(b"body { color: red; }");
        assert_eq!(a, ContentHash::of(b"body { color: red; }"));
        assert_ne!(a, ContentHash::of(b"body { color: blue; }"));
        assert_eq!(a.as_str().len(), 44);
    }

    #[test]
    fn test_parse() {
        let h = ContentHash::of(b"x");
        assert_eq!(ContentHash::parse(h.as_str()), Some(h));
        assert_eq!(ContentHash::parse(""), None);
        assert_eq!(ContentHash::parse("not base64!"), None);
    }
}
