//! Type identifier digest.
//!
//! A type's on-wire identity is a 32-hex-character string: a 16-byte XOR
//! fold of a canonical textual form. Built-in types fold their bare name;
//! user types fold the type name followed by `<field-type><field-name>`
//! for every field in declaration order, so two independent compilations
//! of the same description agree byte-for-byte.

use std::fmt::Write;

/// Fold arbitrary text into a 32-hex-character identifier.
pub fn digest(content: &str) -> String {
    let mut hash = [0u8; 16];
    for (i, byte) in content.bytes().enumerate() {
        hash[i % 16] ^= byte;
    }

    let mut out = String::with_capacity(32);
    for byte in hash {
        // Writing to a String cannot fail.
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Canonical form of a user type: name, then each field's type and name in
/// declaration order.
pub fn canonical_form(name: &str, fields: &[(String, String)]) -> String {
    let mut content = String::from(name);
    for (field_type, field_name) in fields {
        content.push_str(field_type);
        content.push_str(field_name);
    }
    content
}

/// Digest of a user type from its name and ordered (type, name) fields.
pub fn type_digest(name: &str, fields: &[(String, String)]) -> String {
    digest(&canonical_form(name, fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_32_hex_chars() {
        let id = digest("int32");
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(digest("tensor"), digest("tensor"));
        assert_ne!(digest("int32"), digest("int64"));
    }

    #[test]
    fn test_empty_content_digest() {
        assert_eq!(digest(""), "0".repeat(32));
    }

    #[test]
    fn test_known_fold_value() {
        // "ab" folds to 0x61, 0x62 in the first two lanes.
        let id = digest("ab");
        assert!(id.starts_with("6162"));
        assert!(id.ends_with(&"0".repeat(28)));
    }

    #[test]
    fn test_fold_wraps_past_sixteen_bytes() {
        // Byte 17 lands back in lane 0.
        let id = digest("aaaaaaaaaaaaaaaaa"); // 17 × 'a'
        assert!(id.starts_with("00"), "lane 0 should cancel: {id}");
    }

    #[test]
    fn test_type_digest_depends_on_field_order() {
        let ab = [
            ("int32".to_string(), "a".to_string()),
            ("float32".to_string(), "b".to_string()),
        ];
        let ba = [ab[1].clone(), ab[0].clone()];

        assert_ne!(type_digest("M", &ab), type_digest("M", &ba));
    }

    #[test]
    fn test_canonical_form_layout() {
        let fields = [
            ("int32".to_string(), "a".to_string()),
            ("float".to_string(), "b".to_string()),
        ];
        assert_eq!(canonical_form("M", &fields), "Mint32afloatb");
    }
}
