//! Text collection over parsed markup

use scraper::{ElementRef, Selector};
use std::collections::HashSet;

/// Collects the visible text of an element
///
/// Every text node is trimmed, empty nodes are dropped and the rest are joined
/// with `separator`. Text inside any descendant matched by one of `strip` is
/// left out, as if that subtree had been removed from the document.
pub fn element_text(element: ElementRef<'_>, separator: &str, strip: &[Selector]) -> String {
    let stripped: HashSet<_> = strip
        .iter()
        .flat_map(|selector| element.select(selector))
        .map(|e| e.id())
        .collect();

    let mut pieces = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        if !stripped.is_empty() && node.ancestors().any(|a| stripped.contains(&a.id())) {
            continue;
        }

        let piece = text.trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
    }

    pieces.join(separator)
}
