//! Minimal key/value metadata access.
//!
//! Product containers own their metadata trees; geocoding code only needs to
//! look up scalar attributes by name.

use std::collections::HashMap;

/// Read-only access to scalar metadata attributes.
pub trait MetadataAccessor {
    /// Raw attribute value, if present.
    fn get_str(&self, key: &str) -> Option<&str>;

    /// Attribute parsed as a float.
    fn get_f64(&self, key: &str) -> Option<f64> {
        self.get_str(key).and_then(|v| v.trim().parse().ok())
    }

    /// Attribute parsed as an unsigned integer.
    fn get_usize(&self, key: &str) -> Option<usize> {
        self.get_str(key).and_then(|v| v.trim().parse().ok())
    }
}

impl MetadataAccessor for HashMap<String, String> {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_map_accessor() {
        let mut attrs = HashMap::new();
        attrs.insert("epsilon".to_string(), " 0.5 ".to_string());
        attrs.insert("samples".to_string(), "12".to_string());
        attrs.insert("bad".to_string(), "x".to_string());

        assert_eq!(attrs.get_f64("epsilon"), Some(0.5));
        assert_eq!(attrs.get_usize("samples"), Some(12));
        assert_eq!(attrs.get_f64("bad"), None);
        assert_eq!(attrs.get_str("missing"), None);
    }
}
