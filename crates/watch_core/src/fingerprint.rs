use std::collections::HashSet;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

use crate::classify::find_element_with_most_direct_text;
use crate::dom::Document;
use crate::error::{ExtractError, FingerprintError};
use crate::links::get_internal_links;
use crate::sanitize::{remove_external_links, sanitize};

pub const DEFAULT_CONTENT_RATIO: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSettings {
    /// Share of the page text the densest node must hold for the page to be
    /// treated as content rather than as a link index.
    pub content_ratio: f64,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            content_ratio: DEFAULT_CONTENT_RATIO,
        }
    }
}

/// The comparable summary of what matters on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fingerprint {
    /// Full text of the node holding the most direct text.
    Text { text: String, length: usize },
    /// Same-origin link values, in extraction order with duplicates.
    LinkSet { links: Vec<String>, length: usize },
}

/// How a fingerprint is (re-)derived from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    TextDensity,
    LinkSet,
}

impl Strategy {
    /// Re-runs this strategy alone, without reclassifying the page.
    pub fn extract(self, base_url: &Url, document: &Document) -> Result<Fingerprint, ExtractError> {
        match self {
            Strategy::TextDensity => {
                let (text, length) = densest_text(base_url, document)?;
                Ok(Fingerprint::Text { text, length })
            }
            Strategy::LinkSet => {
                let (links, length) = internal_link_set(base_url, document);
                Ok(Fingerprint::LinkSet { links, length })
            }
        }
    }
}

impl Fingerprint {
    pub fn strategy(&self) -> Strategy {
        match self {
            Fingerprint::Text { .. } => Strategy::TextDensity,
            Fingerprint::LinkSet { .. } => Strategy::LinkSet,
        }
    }

    pub fn length(&self) -> usize {
        match self {
            Fingerprint::Text { length, .. } | Fingerprint::LinkSet { length, .. } => *length,
        }
    }

    /// Compares a stored fingerprint with a fresh one of the same kind.
    ///
    /// Text must match exactly. Link sets match when they hold the same
    /// distinct links, whatever the order or repetition.
    pub fn same_content(&self, current: &Fingerprint) -> Result<bool, FingerprintError> {
        match (self, current) {
            (Fingerprint::Text { text: stored, .. }, Fingerprint::Text { text: fresh, .. }) => {
                Ok(stored == fresh)
            }
            (
                Fingerprint::LinkSet { links: stored, .. },
                Fingerprint::LinkSet { links: fresh, .. },
            ) => {
                let stored: HashSet<&String> = stored.iter().collect();
                let fresh: HashSet<&String> = fresh.iter().collect();
                Ok(stored == fresh)
            }
            _ => Err(FingerprintError::VariantMismatch {
                stored: self.strategy(),
                current: current.strategy(),
            }),
        }
    }

    /// Raw payload without its tag: a string or an array of strings.
    pub fn raw_value(&self) -> Value {
        match self {
            Fingerprint::Text { text, .. } => Value::String(text.clone()),
            Fingerprint::LinkSet { links, .. } => {
                Value::Array(links.iter().cloned().map(Value::String).collect())
            }
        }
    }

    /// Short hex digest of the payload, for log lines.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Fingerprint::Text { text, .. } => {
                hasher.update(b"text\0");
                hasher.update(text.as_bytes());
            }
            Fingerprint::LinkSet { links, .. } => {
                hasher.update(b"links\0");
                for link in links {
                    hasher.update(link.as_bytes());
                    hasher.update(b"\0");
                }
            }
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(8);
        for byte in digest.iter().take(4) {
            let _ = write!(&mut hex, "{byte:02x}");
        }
        hex
    }
}

/// Decides between content and link-index treatment and fingerprints the page.
///
/// The densest node is measured on a sanitized copy; its direct-text length is
/// compared against the total text of the untouched document.
pub fn apply_extraction(
    base_url: &Url,
    document: &Document,
    settings: &ExtractionSettings,
) -> Result<Fingerprint, ExtractError> {
    let total_length = document.full_text().chars().count();
    let (text, length) = densest_text(base_url, document)?;
    if is_content_dominant(length, total_length, settings.content_ratio) {
        Ok(Fingerprint::Text { text, length })
    } else {
        Strategy::LinkSet.extract(base_url, document)
    }
}

/// `>=`: a page exactly at the ratio counts as content.
pub fn is_content_dominant(max_text_length: usize, total_length: usize, ratio: f64) -> bool {
    max_text_length as f64 >= ratio * total_length as f64
}

fn densest_text(base_url: &Url, document: &Document) -> Result<(String, usize), ExtractError> {
    let mut cleaned = document.clone();
    sanitize(&mut cleaned, base_url);
    find_element_with_most_direct_text(&cleaned)
}

// Only off-origin subtrees are pruned here, so first classification and
// later re-scans see the same links.
fn internal_link_set(base_url: &Url, document: &Document) -> (Vec<String>, usize) {
    let mut pruned = document.clone();
    remove_external_links(&mut pruned, base_url);
    get_internal_links(base_url, &pruned)
}

/// Shape-based comparison of raw stored payloads.
///
/// Arrays compare as sets of their members, strings compare exactly, any
/// other stored shape is rejected.
pub fn comparer(previous: &Value, current: &Value) -> Result<bool, FingerprintError> {
    match previous {
        Value::Array(stored) => match current {
            Value::Array(fresh) => Ok(member_set(stored) == member_set(fresh)),
            _ => Ok(false),
        },
        Value::String(stored) => Ok(current.as_str() == Some(stored.as_str())),
        other => Err(unsupported(other)),
    }
}

/// Picks the extraction strategy matching a raw stored payload's shape.
pub fn quick_extract(previous: &Value) -> Result<Strategy, FingerprintError> {
    match previous {
        Value::Array(_) => Ok(Strategy::LinkSet),
        Value::String(_) => Ok(Strategy::TextDensity),
        other => Err(unsupported(other)),
    }
}

fn member_set(values: &[Value]) -> HashSet<String> {
    values.iter().map(Value::to_string).collect()
}

fn unsupported(value: &Value) -> FingerprintError {
    let shape = match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    FingerprintError::UnsupportedFingerprintType { shape }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("https://site.com/").unwrap()
    }

    #[test]
    fn ratio_boundary_is_inclusive() {
        assert!(is_content_dominant(3, 10, 0.3));
        assert!(!is_content_dominant(3, 11, 0.3));
        assert!(is_content_dominant(0, 0, 0.3));
    }

    #[test]
    fn page_exactly_at_ratio_is_content() {
        // 3 of 10 characters live in the densest node
        let doc = Document::parse_body(
            "<body><div>abc</div><div>de</div><div>fg</div><div>hi</div><div>j</div></body>",
        );
        let fingerprint = apply_extraction(&base(), &doc, &ExtractionSettings::default()).unwrap();
        assert_eq!(
            fingerprint,
            Fingerprint::Text {
                text: "abc".into(),
                length: 3
            }
        );
    }

    #[test]
    fn page_below_ratio_is_link_set() {
        let doc = Document::parse_body(
            r#"<body><div>abc</div><div>de</div><div>fg</div><div>hi</div><a href="/j">jk</a></body>"#,
        );
        let fingerprint = apply_extraction(&base(), &doc, &ExtractionSettings::default()).unwrap();
        assert_eq!(
            fingerprint,
            Fingerprint::LinkSet {
                links: vec!["/j".into()],
                length: 1
            }
        );
    }

    #[test]
    fn script_text_counts_toward_total_only() {
        let doc = Document::parse_body(
            r#"<body><div>short</div><script>aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa</script><a href="/x">x</a></body>"#,
        );
        let fingerprint = apply_extraction(&base(), &doc, &ExtractionSettings::default()).unwrap();
        assert_eq!(fingerprint.strategy(), Strategy::LinkSet);
    }

    #[test]
    fn ratio_is_configurable() {
        let doc = Document::parse_body(
            r#"<body><div>abc</div><div>de</div><div>fg</div><div>hi</div><a href="/j">jk</a></body>"#,
        );
        let lenient = ExtractionSettings { content_ratio: 0.2 };
        let fingerprint = apply_extraction(&base(), &doc, &lenient).unwrap();
        assert_eq!(fingerprint.strategy(), Strategy::TextDensity);
    }

    #[test]
    fn empty_document_cannot_be_classified() {
        assert_eq!(
            apply_extraction(&base(), &Document::new(), &ExtractionSettings::default()),
            Err(ExtractError::NoElementsFound)
        );
    }

    #[test]
    fn strategy_follows_variant() {
        let text = Fingerprint::Text {
            text: "t".into(),
            length: 1,
        };
        let links = Fingerprint::LinkSet {
            links: vec![],
            length: 0,
        };
        assert_eq!(text.strategy(), Strategy::TextDensity);
        assert_eq!(links.strategy(), Strategy::LinkSet);
    }

    #[test]
    fn rescan_reuses_link_strategy_even_when_page_became_prose() {
        let doc = Document::parse_body(
            r#"<body><div>a very long article body that would classify as content</div><a href="/a">a</a></body>"#,
        );
        let fingerprint = Strategy::LinkSet.extract(&base(), &doc).unwrap();
        assert_eq!(
            fingerprint,
            Fingerprint::LinkSet {
                links: vec!["/a".into()],
                length: 1
            }
        );
    }

    #[test]
    fn link_sets_compare_as_sets() {
        let stored = Fingerprint::LinkSet {
            links: vec!["a".into(), "b".into(), "a".into()],
            length: 3,
        };
        let fresh = Fingerprint::LinkSet {
            links: vec!["b".into(), "a".into()],
            length: 2,
        };
        assert_eq!(stored.same_content(&fresh), Ok(true));

        let grown = Fingerprint::LinkSet {
            links: vec!["b".into(), "a".into(), "c".into()],
            length: 3,
        };
        assert_eq!(stored.same_content(&grown), Ok(false));
    }

    #[test]
    fn text_compares_exactly() {
        let stored = Fingerprint::Text {
            text: "x".into(),
            length: 1,
        };
        let padded = Fingerprint::Text {
            text: "x ".into(),
            length: 1,
        };
        assert_eq!(stored.same_content(&stored.clone()), Ok(true));
        assert_eq!(stored.same_content(&padded), Ok(false));
    }

    #[test]
    fn mixed_variants_do_not_compare() {
        let text = Fingerprint::Text {
            text: "x".into(),
            length: 1,
        };
        let links = Fingerprint::LinkSet {
            links: vec!["x".into()],
            length: 1,
        };
        assert_eq!(
            text.same_content(&links),
            Err(FingerprintError::VariantMismatch {
                stored: Strategy::TextDensity,
                current: Strategy::LinkSet
            })
        );
    }

    #[test]
    fn comparer_follows_value_shape() {
        assert_eq!(comparer(&json!(["a", "b", "a"]), &json!(["b", "a"])), Ok(true));
        assert_eq!(comparer(&json!(["a"]), &json!(["a", "c"])), Ok(false));
        assert_eq!(comparer(&json!("x"), &json!("x")), Ok(true));
        assert_eq!(comparer(&json!("x"), &json!("y")), Ok(false));
        assert_eq!(
            comparer(&json!(123), &json!(123)),
            Err(FingerprintError::UnsupportedFingerprintType { shape: "number" })
        );
    }

    #[test]
    fn quick_extract_follows_value_shape() {
        assert_eq!(quick_extract(&json!(["a"])), Ok(Strategy::LinkSet));
        assert_eq!(quick_extract(&json!("text")), Ok(Strategy::TextDensity));
        assert_eq!(
            quick_extract(&json!(1.0)),
            Err(FingerprintError::UnsupportedFingerprintType { shape: "number" })
        );
    }

    #[test]
    fn raw_value_round_trips_through_shape_dispatch() {
        let links = Fingerprint::LinkSet {
            links: vec!["/a".into()],
            length: 1,
        };
        assert_eq!(quick_extract(&links.raw_value()), Ok(Strategy::LinkSet));
        assert_eq!(comparer(&links.raw_value(), &json!(["/a", "/a"])), Ok(true));
    }

    #[test]
    fn digest_is_stable_and_variant_aware() {
        let text = Fingerprint::Text {
            text: "a".into(),
            length: 1,
        };
        let links = Fingerprint::LinkSet {
            links: vec!["a".into()],
            length: 1,
        };
        assert_eq!(text.digest(), text.clone().digest());
        assert_eq!(text.digest().len(), 8);
        assert_ne!(text.digest(), links.digest());
    }
}
