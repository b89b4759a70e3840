use url::Url;

use crate::dom::Document;
use crate::sanitize::{is_external_link, LINK_ATTRS};

/// Collects same-origin `href`/`src` values in document order.
///
/// Values are returned raw (unresolved) and duplicates are kept; the count is
/// the length of that sequence, not the number of distinct links.
pub fn get_internal_links(base_url: &Url, document: &Document) -> (Vec<String>, usize) {
    let mut links = Vec::new();
    for id in document.descendants() {
        let node = document.node(id);
        for attr in LINK_ATTRS {
            if let Some(link) = node.attr(attr) {
                if !is_external_link(link, base_url) {
                    links.push(link.to_string());
                }
            }
        }
    }
    let count = links.len();
    (links, count)
}
