//! Hierarchical outlines from flat capture lists.
//!
//! Captures arrive in document order and are well-nested (two spans are either
//! disjoint or one contains the other). A single containment-stack pass turns
//! them into a forest stored in an arena; a second pass materializes
//! [`Symbol`]s, absorbing each node's `<label>.name` child as its display name.
//!
//! Well-nestedness is a precondition of the query mechanism and is not
//! enforced here: overlapping input still terminates but yields an
//! unspecified tree (the first offending capture is logged).

use serde::Serialize;

use crate::kind::{classify, SymbolKind, NAME_SUFFIX};
use crate::languages::QueryKind;
use crate::syntax::{Capture, ParsedDocument, Span};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Full span of the construct.
    pub range: Span,
    /// Span of the identifying name (the construct itself when unnamed).
    pub selection_range: Span,
    pub children: Vec<Symbol>,
}

impl Symbol {
    /// Pre-order walk over this symbol and its descendants.
    pub fn walk(&self) -> Vec<&Symbol> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(s) = stack.pop() {
            out.push(s);
            stack.extend(s.children.iter().rev());
        }
        out
    }
}

/// Arena node: a capture index plus child node indices.
#[derive(Debug)]
struct OutlineNode {
    capture: usize,
    children: Vec<usize>,
}

/// Containment forest over a borrowed capture list.
#[derive(Debug)]
pub struct OutlineForest<'c> {
    captures: &'c [Capture],
    nodes: Vec<OutlineNode>,
    roots: Vec<usize>,
}

impl<'c> OutlineForest<'c> {
    /// Containment-stack construction, one linear pass.
    pub fn build(captures: &'c [Capture]) -> Self {
        let mut nodes: Vec<OutlineNode> = Vec::with_capacity(captures.len());
        let mut roots: Vec<usize> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        let mut reported_overlap = false;

        for (idx, cap) in captures.iter().enumerate() {
            while let Some(&top) = stack.last() {
                let top_span = &captures[nodes[top].capture].span;
                if top_span.contains(&cap.span) {
                    break;
                }
                if !reported_overlap && top_span.partially_overlaps(&cap.span) {
                    reported_overlap = true;
                    crate::debug_log!(
                        "[symdex] capture `{}` at {:?} overlaps `{}` without nesting; outline is best-effort",
                        cap.label,
                        cap.span,
                        captures[nodes[top].capture].label
                    );
                }
                stack.pop();
            }

            let node = nodes.len();
            nodes.push(OutlineNode {
                capture: idx,
                children: Vec::new(),
            });

            match stack.last() {
                Some(&parent) => nodes[parent].children.push(node),
                None => roots.push(node),
            }
            stack.push(node);
        }

        Self {
            captures,
            nodes,
            roots,
        }
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    pub fn into_symbols(self) -> Vec<Symbol> {
        self.roots.iter().map(|&r| self.materialize(r)).collect()
    }

    fn materialize(&self, node: usize) -> Symbol {
        let n = &self.nodes[node];
        let cap = &self.captures[n.capture];
        let name_label = format!("{}{}", cap.label, NAME_SUFFIX);

        let name_child = n
            .children
            .iter()
            .copied()
            .find(|&c| self.captures[self.nodes[c].capture].label == name_label);

        let (name, selection_range) = match name_child {
            Some(c) => {
                let nc = &self.captures[self.nodes[c].capture];
                (nc.text.clone(), nc.span)
            }
            None => (cap.text.clone(), cap.span),
        };

        let children = n
            .children
            .iter()
            .copied()
            .filter(|&c| Some(c) != name_child)
            .map(|c| self.materialize(c))
            .collect();

        Symbol {
            name,
            kind: classify(&cap.label),
            range: cap.span,
            selection_range,
            children,
        }
    }
}

/// Build the symbol forest for an ordered, well-nested capture list.
pub fn build_outline(captures: &[Capture]) -> Vec<Symbol> {
    OutlineForest::build(captures).into_symbols()
}

/// Outline of a parsed document; `None` when its language has no outline query.
pub fn outline_of(doc: &ParsedDocument<'_>) -> Option<Vec<Symbol>> {
    let captures = doc.captures(QueryKind::Outline)?;
    Some(build_outline(&captures))
}

/// Parse `text` and build its outline; `None` for unsupported languages.
pub fn document_outline(language_id: &str, text: &str) -> Option<Vec<Symbol>> {
    let doc = ParsedDocument::parse(language_id, text)?;
    outline_of(&doc)
}
