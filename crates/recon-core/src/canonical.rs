use crate::document::{Document, CHECKSUM_EXCLUDED_KEYS};
use crate::metadata::format_number;

/// Render a `Document` as canonical JSON, excluding the given metadata keys.
///
/// Canonicalisation rule (spec §9): sort keys lexicographically, render
/// numbers without trailing zeros, encode strings as-is, then digest the
/// resulting byte stream. `BTreeMap` already iterates in lexicographic key
/// order, so this falls out of a straightforward manual serializer rather
/// than a generic `serde_json::Value` walk (which would re-introduce
/// insertion-order or float-formatting ambiguity).
pub fn canonical_json_excluding(doc: &Document, excluded_keys: &[&str]) -> String {
    let mut out = String::from("{");
    out.push_str("\"metadata\":{");
    let mut first = true;
    for (key, value) in &doc.metadata {
        if excluded_keys.contains(&key.as_str()) {
            continue;
        }
        if !first {
            out.push(',');
        }
        first = false;
        push_json_string(&mut out, key);
        out.push(':');
        push_metadata_value(&mut out, value);
    }
    out.push('}');
    out.push_str(",\"page_content\":");
    push_json_string(&mut out, &doc.page_content);
    out.push('}');
    out
}

/// The checksum's canonical payload: `document minus {chunk_id, checksum,
/// last_seen_at, item_id, id}` (spec §3 invariant).
pub fn canonical_json_for_checksum(doc: &Document) -> String {
    canonical_json_excluding(doc, CHECKSUM_EXCLUDED_KEYS)
}

fn push_metadata_value(out: &mut String, value: &crate::metadata::MetadataValue) {
    use crate::metadata::MetadataValue;
    match value {
        MetadataValue::String(s) => push_json_string(out, s),
        MetadataValue::Int(i) => out.push_str(&i.to_string()),
        MetadataValue::Float(f) => out.push_str(&format_number(*f)),
        MetadataValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        MetadataValue::Null => out.push_str("null"),
    }
}

fn push_json_string(out: &mut String, value: &str) {
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// `H`: a collision-resistant digest of at least 256 bits (spec §4.3). Blake3
/// is the teacher's own content-hash choice (`indexing-core::hash_content`).
pub fn digest(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

/// `checksum = H(canonical_json(document excluding metadata keys {...}))`.
pub fn compute_checksum(doc: &Document) -> String {
    digest(&canonical_json_for_checksum(doc))
}

/// `item_id = H(concat(stringified primary fields))`. An empty primary-field
/// list yields `H("")`, which callers should log as a configuration warning
/// (spec §3) but must not treat as fatal.
pub fn compute_item_id(values: &[String]) -> String {
    digest(&values.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::metadata::MetadataMap;

    fn doc(page_content: &str, metadata: MetadataMap) -> Document {
        Document::new(page_content, metadata)
    }

    #[test]
    fn given_identical_documents_when_hashing_then_checksum_is_stable() {
        let mut metadata = MetadataMap::new();
        metadata.insert("source".into(), "crawler".into());
        let a = doc("hello world", metadata.clone());
        let b = doc("hello world", metadata);
        assert_eq!(compute_checksum(&a), compute_checksum(&b));
    }

    #[test]
    fn given_different_page_content_when_hashing_then_checksum_changes() {
        let metadata = MetadataMap::new();
        let a = doc("hello world", metadata.clone());
        let b = doc("goodbye world", metadata);
        assert_ne!(compute_checksum(&a), compute_checksum(&b));
    }

    #[test]
    fn given_only_excluded_keys_change_when_hashing_then_checksum_is_unchanged() {
        let mut a_meta = MetadataMap::new();
        a_meta.insert("chunk_id".into(), "id-a".into());
        a_meta.insert("last_seen_at".into(), crate::metadata::MetadataValue::Int(1));
        a_meta.insert("item_id".into(), "item-a".into());

        let mut b_meta = MetadataMap::new();
        b_meta.insert("chunk_id".into(), "id-b".into());
        b_meta.insert("last_seen_at".into(), crate::metadata::MetadataValue::Int(2));
        b_meta.insert("item_id".into(), "item-b".into());

        let a = doc("same text", a_meta);
        let b = doc("same text", b_meta);
        assert_eq!(compute_checksum(&a), compute_checksum(&b));
    }

    #[test]
    fn given_non_excluded_metadata_changes_when_hashing_then_checksum_changes() {
        let mut a_meta = MetadataMap::new();
        a_meta.insert("title".into(), "Alpha".into());
        let mut b_meta = MetadataMap::new();
        b_meta.insert("title".into(), "Beta".into());

        let a = doc("same text", a_meta);
        let b = doc("same text", b_meta);
        assert_ne!(compute_checksum(&a), compute_checksum(&b));
    }

    #[test]
    fn given_same_primary_fields_when_computing_item_id_then_result_is_deterministic() {
        let values = vec!["https://example.com".to_string(), "Title".to_string()];
        assert_eq!(compute_item_id(&values), compute_item_id(&values));
    }

    #[test]
    fn given_empty_primary_fields_when_computing_item_id_then_result_is_the_empty_hash() {
        assert_eq!(compute_item_id(&[]), digest(""));
    }

    #[test]
    fn numbers_render_without_trailing_zeros() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(1.50), "1.5");
    }
}
