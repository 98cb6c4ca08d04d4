//! Per-version attribute record stored in the metadata document.
//!
//! On-disk field names are historical (`range`, `thumb`) and kept for
//! compatibility with existing `<name>_data.json` files. Fields that older
//! documents lack fall back to defaults on load (`publish = false`), and keys
//! this crate does not know about are carried through untouched in `extra`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default)]
    pub publish: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_frame: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_frame: Option<i64>,

    /// Human-readable range, e.g. `1001-1010` or `[1-6], missing 4`.
    #[serde(rename = "range", default, skip_serializing_if = "Option::is_none")]
    pub range_display: Option<String>,

    /// Encoded thumbnail image bytes (base64 in the document).
    #[serde(
        rename = "thumb",
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_thumb",
        deserialize_with = "deserialize_thumb"
    )]
    pub thumbnail: Option<Vec<u8>>,

    /// Set once a legacy comment file has been imported.
    #[serde(default, skip_serializing_if = "is_false")]
    pub comment_imported: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl VersionAttrs {
    pub fn with_comment(comment: Option<String>) -> Self {
        Self {
            comment: comment.filter(|c| !c.is_empty()),
            ..Self::default()
        }
    }

    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Frame span recorded for this version, if both ends are known.
    pub fn frame_range(&self) -> Option<(i64, i64)> {
        match (self.first_frame, self.last_frame) {
            (Some(first), Some(last)) => Some((first, last)),
            _ => None,
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn serialize_thumb<S: Serializer>(thumb: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match thumb {
        Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
        None => s.serialize_none(),
    }
}

// Undecodable thumbnails are dropped rather than failing the whole document;
// the cache regenerates them on next load.
fn deserialize_thumb<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.and_then(|s| match STANDARD.decode(s.as_bytes()) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log::warn!("Discarding undecodable thumbnail: {}", e);
            None
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_document_defaults_publish() {
        let attrs: VersionAttrs = serde_json::from_str(r#"{"comment": "first pass"}"#).unwrap();
        assert_eq!(attrs.comment.as_deref(), Some("first pass"));
        assert!(!attrs.publish);
        assert!(attrs.thumbnail.is_none());
    }

    #[test]
    fn test_field_names_on_disk() {
        let attrs = VersionAttrs {
            comment: Some("c".into()),
            publish: true,
            first_frame: Some(1001),
            last_frame: Some(1010),
            range_display: Some("1001-1010".into()),
            thumbnail: Some(vec![0xff, 0xd8, 0xff]),
            ..VersionAttrs::default()
        };
        let value = serde_json::to_value(&attrs).unwrap();
        assert_eq!(value["range"], "1001-1010");
        assert_eq!(value["thumb"], "/9j/");
        assert_eq!(value["publish"], true);
        assert!(value.get("comment_imported").is_none());
    }

    #[test]
    fn test_unknown_fields_survive() {
        let json = r#"{"publish": false, "reviewer": "anna"}"#;
        let attrs: VersionAttrs = serde_json::from_str(json).unwrap();
        assert_eq!(attrs.extra["reviewer"], "anna");
        let back = serde_json::to_value(&attrs).unwrap();
        assert_eq!(back["reviewer"], "anna");
    }

    #[test]
    fn test_bad_thumbnail_is_dropped() {
        let attrs: VersionAttrs = serde_json::from_str(r#"{"thumb": "***"}"#).unwrap();
        assert!(!attrs.has_thumbnail());
    }

    #[test]
    fn test_empty_comment_is_none() {
        assert!(VersionAttrs::with_comment(Some(String::new())).comment.is_none());
    }
}
