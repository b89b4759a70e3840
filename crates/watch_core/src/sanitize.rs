use url::Url;

use crate::dom::{Document, Node, Rewrite};

/// Attributes that reference another resource.
pub(crate) const LINK_ATTRS: [&str; 2] = ["href", "src"];

/// True when `link`, resolved against `base_url`, lands on a different
/// scheme or authority. Links that cannot be resolved count as external.
pub fn is_external_link(link: &str, base_url: &Url) -> bool {
    match base_url.join(link) {
        Ok(resolved) => !same_origin(&resolved, base_url),
        Err(_) => true,
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.username() == b.username()
        && a.password() == b.password()
        && a.host_str() == b.host_str()
        && a.port() == b.port()
}

fn has_external_reference(node: &Node, base_url: &Url) -> bool {
    LINK_ATTRS
        .iter()
        .filter_map(|attr| node.attr(attr))
        .any(|link| is_external_link(link, base_url))
}

/// Drops every element (with its subtree) that points off-origin.
pub fn remove_external_links(document: &mut Document, base_url: &Url) {
    document.rewrite(&|node| {
        if has_external_reference(node, base_url) {
            Rewrite::Remove
        } else {
            Rewrite::Keep
        }
    });
}

/// Replaces every `tag` element by its own content.
pub fn unwrap_tag(document: &mut Document, tag: &str) {
    document.rewrite(&|node| {
        if node.tag().eq_ignore_ascii_case(tag) {
            Rewrite::Unwrap
        } else {
            Rewrite::Keep
        }
    });
}

/// Drops every `tag` element together with its subtree.
pub fn remove_tag(document: &mut Document, tag: &str) {
    document.rewrite(&|node| {
        if node.tag().eq_ignore_ascii_case(tag) {
            Rewrite::Remove
        } else {
            Rewrite::Keep
        }
    });
}

/// Prepares a document for text-density analysis: external references go,
/// paragraphs are flattened into their parents, scripts and styles go.
pub fn sanitize(document: &mut Document, base_url: &Url) {
    remove_external_links(document, base_url);
    unwrap_tag(document, "p");
    remove_tag(document, "script");
    remove_tag(document, "style");
}
