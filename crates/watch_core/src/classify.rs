use crate::dom::{Document, NodeId};
use crate::error::ExtractError;

/// Locates the node owning the most direct text and reports its full text.
///
/// Every reachable node, root included, is measured by the character length
/// of its trimmed direct text; the first node reaching the maximum wins. The
/// returned text covers the winner's whole subtree while the returned length
/// is its direct-text length.
pub fn find_element_with_most_direct_text(
    document: &Document,
) -> Result<(String, usize), ExtractError> {
    let mut best: Option<(NodeId, usize)> = None;
    for id in document.descendants() {
        let length = document.node(id).direct_text().trim().chars().count();
        match best {
            Some((_, max)) if length <= max => {}
            _ => best = Some((id, length)),
        }
    }
    let (winner, length) = best.ok_or(ExtractError::NoElementsFound)?;
    Ok((document.text(winner), length))
}
