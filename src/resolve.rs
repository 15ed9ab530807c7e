//! Per-position queries: references, completion, definitions, highlights.
//!
//! All of these parse the requesting document fresh and combine it with the
//! cross-file index. Only `find_references` forces the index up to date;
//! the others read whatever snapshot is current.

use serde::Serialize;
use std::collections::HashMap;

use crate::index::{IndexEntry, Location, SymbolIndex};
use crate::kind::SymbolKind;
use crate::languages::QueryKind;
use crate::outline::outline_of;
use crate::syntax::{ParsedDocument, Position, Span};

/// Find every location referring to the identifier under `pos`.
///
/// When the cursor sits on an entry of known kind, results are narrowed to
/// entries of that kind plus usages whose kind is unknown. Definitions are
/// returned only with `include_declaration`.
pub fn find_references(
    index: &SymbolIndex,
    doc: &ParsedDocument<'_>,
    uri: &str,
    pos: Position,
    include_declaration: bool,
) -> Vec<Location> {
    let Some((ident, _)) = doc.identifier_at(pos) else {
        return Vec::new();
    };

    index.update();
    let snap = index.snapshot();
    select_references(
        snap.usages(&ident),
        snap.definitions(&ident),
        uri,
        pos,
        include_declaration,
    )
}

/// Kind tie-break over already gathered entries.
pub fn select_references(
    usages: &[IndexEntry],
    definitions: &[IndexEntry],
    uri: &str,
    pos: Position,
    include_declaration: bool,
) -> Vec<Location> {
    if usages.is_empty() && definitions.is_empty() {
        return Vec::new();
    }

    // Buckets in discovery order; `None` is the unknown-kind bucket.
    let mut buckets: Vec<(Option<SymbolKind>, Vec<Location>)> = Vec::new();
    let mut push = |kind: Option<SymbolKind>, loc: &Location| match buckets.iter_mut().find(|(k, _)| *k == kind) {
        Some((_, locs)) => locs.push(loc.clone()),
        None => buckets.push((kind, vec![loc.clone()])),
    };
    for u in usages {
        push(u.kind, &u.location);
    }
    if include_declaration {
        for d in definitions {
            push(d.kind, &d.location);
        }
    }

    let at_cursor = |e: &&IndexEntry| e.location.uri == uri && e.location.span.contains_position(pos);
    let this_kind = usages
        .iter()
        .find(at_cursor)
        .or_else(|| definitions.iter().find(at_cursor))
        .and_then(|e| e.kind);

    match this_kind {
        // Nothing known under the cursor: everything sharing the text.
        None => buckets.into_iter().flat_map(|(_, locs)| locs).collect(),
        Some(kind) => {
            let mut out = Vec::new();
            for wanted in [Some(kind), None] {
                if let Some((_, locs)) = buckets.iter_mut().find(|(k, _)| *k == wanted) {
                    out.append(locs);
                }
            }
            out
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionCandidate {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SymbolKind>,
}

/// Identifier completions for `pos`.
///
/// Local identifiers come first without a kind; every name defined anywhere
/// in the index then overwrites them with its first definition's kind. The
/// word being typed is not offered back to itself.
pub fn complete(index: &SymbolIndex, doc: &ParsedDocument<'_>, pos: Position) -> HashMap<String, CompletionCandidate> {
    let mut out: HashMap<String, CompletionCandidate> = HashMap::new();

    for cap in doc.captures(QueryKind::Identifiers).unwrap_or_default() {
        if cap.span.contains_position(pos) {
            continue;
        }
        out.entry(cap.text.clone()).or_insert_with(|| CompletionCandidate {
            label: cap.text,
            kind: None,
        });
    }

    let snap = index.snapshot();
    for (name, kind) in snap.definition_names() {
        out.insert(
            name.to_string(),
            CompletionCandidate {
                label: name.to_string(),
                kind: Some(kind),
            },
        );
    }
    out
}

/// Definitions of the identifier under `pos`: the document's own outline
/// first, otherwise whatever the index currently knows.
pub fn find_definitions(index: &SymbolIndex, doc: &ParsedDocument<'_>, uri: &str, pos: Position) -> Vec<Location> {
    let Some((ident, _)) = doc.identifier_at(pos) else {
        return Vec::new();
    };

    let local: Vec<Location> = outline_of(doc)
        .unwrap_or_default()
        .iter()
        .flat_map(|root| root.walk())
        .filter(|s| s.name == ident)
        .map(|s| Location {
            uri: uri.to_string(),
            span: s.selection_range,
        })
        .collect();
    if !local.is_empty() {
        return local;
    }

    index
        .lookup_definitions(&ident)
        .into_iter()
        .map(|e| e.location)
        .collect()
}

/// Occurrences of the identifier under `pos` within the same document.
pub fn document_highlights(doc: &ParsedDocument<'_>, pos: Position) -> Vec<Span> {
    let Some((ident, _)) = doc.identifier_at(pos) else {
        return Vec::new();
    };
    let mut spans: Vec<Span> = doc
        .captures(QueryKind::Identifiers)
        .unwrap_or_default()
        .into_iter()
        .filter(|c| c.text == ident)
        .map(|c| c.span)
        .collect();
    spans.dedup();
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_cache::FileCache;
    use std::sync::Arc;

    fn entry(name: &str, kind: Option<SymbolKind>, uri: &str, line: u32, col: u32) -> IndexEntry {
        IndexEntry {
            name: name.into(),
            kind,
            location: Location {
                uri: uri.into(),
                span: Span::new(Position::new(line, col), Position::new(line, col + name.len() as u32)),
            },
        }
    }

    fn index_with(docs: &[(&str, &str, &str)]) -> SymbolIndex {
        let idx = SymbolIndex::new(Arc::new(FileCache::new()));
        for (uri, lang, text) in docs {
            idx.on_document_text(uri, lang, Arc::from(*text));
        }
        idx.update();
        idx
    }

    #[test]
    fn kind_tie_break_excludes_unrelated_kinds() {
        let def = entry("foo", Some(SymbolKind::Function), "file:///a", 0, 4);
        let call = entry("foo", Some(SymbolKind::Function), "file:///b", 3, 0);
        let var = entry("foo", Some(SymbolKind::Variable), "file:///c", 1, 0);
        let unknown = entry("foo", None, "file:///d", 2, 2);
        let usages = vec![var.clone(), call.clone(), unknown.clone()];
        let definitions = vec![def.clone()];

        let got = select_references(&usages, &definitions, "file:///b", Position::new(3, 1), false);
        assert_eq!(got, vec![call.location.clone(), unknown.location.clone()]);

        let got = select_references(&usages, &definitions, "file:///b", Position::new(3, 1), true);
        assert_eq!(got, vec![call.location, def.location, unknown.location]);
    }

    #[test]
    fn no_kind_at_cursor_returns_everything_in_discovery_order() {
        let a = entry("x", Some(SymbolKind::Variable), "file:///a", 0, 0);
        let b = entry("x", None, "file:///a", 1, 0);
        let c = entry("x", Some(SymbolKind::Function), "file:///a", 2, 0);
        let got = select_references(&[a.clone(), b.clone(), c.clone()], &[], "file:///z", Position::new(0, 0), false);
        assert_eq!(got, vec![a.location, b.location, c.location]);
    }

    #[test]
    fn definition_at_cursor_sets_kind_even_when_not_returned() {
        let def = entry("run", Some(SymbolKind::Method), "file:///a", 5, 8);
        let same = entry("run", Some(SymbolKind::Method), "file:///b", 1, 0);
        let other = entry("run", Some(SymbolKind::Function), "file:///c", 1, 0);
        let got = select_references(&[same.clone(), other], &[def], "file:///a", Position::new(5, 9), false);
        assert_eq!(got, vec![same.location]);
    }

    #[test]
    fn empty_when_nothing_known() {
        assert!(select_references(&[], &[], "file:///a", Position::new(0, 0), true).is_empty());
    }

    #[test]
    fn references_force_update() {
        let idx = index_with(&[]);
        idx.on_document_text("file:///lib.py", "python", Arc::from("def greet():\n    pass\n"));
        let text = "greet()\n";
        idx.on_document_text("file:///main.py", "python", Arc::from(text));
        let doc = ParsedDocument::parse("python", text).unwrap();

        let refs = find_references(&idx, &doc, "file:///main.py", Position::new(0, 2), true);
        let uris: Vec<&str> = refs.iter().map(|l| l.uri.as_str()).collect();
        assert_eq!(uris, vec!["file:///main.py", "file:///lib.py"]);
    }

    #[cfg(feature = "lang-go")]
    #[test]
    fn qualified_go_calls_match_package_functions() {
        let def_src = "package m\n\nfunc Helper() {}\n";
        let call_src = "package n\n\nfunc run() {\n\tm.Helper()\n}\n";
        let idx = index_with(&[("file:///m.go", "go", def_src), ("file:///n.go", "go", call_src)]);

        let doc = ParsedDocument::parse("go", def_src).unwrap();
        let refs = find_references(&idx, &doc, "file:///m.go", Position::new(2, 7), true);
        let got: Vec<(&str, Position)> = refs.iter().map(|l| (l.uri.as_str(), l.span.start)).collect();
        assert_eq!(
            got,
            vec![("file:///m.go", Position::new(2, 5)), ("file:///n.go", Position::new(3, 3))]
        );

        let doc = ParsedDocument::parse("go", call_src).unwrap();
        let refs = find_references(&idx, &doc, "file:///n.go", Position::new(3, 4), true);
        let uris: Vec<&str> = refs.iter().map(|l| l.uri.as_str()).collect();
        assert_eq!(uris, vec!["file:///n.go", "file:///m.go"]);
    }

    #[test]
    fn qualified_typescript_calls_stay_kindless() {
        let slice = crate::index::index_text("file:///a.ts", "typescript", "util.helper();\nrun();\n");
        let kind_of = |name: &str| slice.usages.iter().find(|u| u.name == name).map(|u| u.kind);
        assert_eq!(kind_of("helper"), Some(None));
        assert_eq!(kind_of("run"), Some(Some(SymbolKind::Function)));
    }

    #[test]
    fn references_on_whitespace_are_empty() {
        let idx = index_with(&[]);
        let doc = ParsedDocument::parse("python", "x = 1\n\n\n").unwrap();
        assert!(find_references(&idx, &doc, "file:///m.py", Position::new(2, 0), true).is_empty());
    }

    #[test]
    fn completion_prefers_index_kinds_and_skips_current_word() {
        let idx = index_with(&[("file:///lib.py", "python", "class Widget:\n    pass\n")]);
        let text = "local_value = 1\nWidget\nwid";
        let doc = ParsedDocument::parse("python", text).unwrap();
        let items = complete(&idx, &doc, Position::new(2, 3));

        assert_eq!(items["local_value"].kind, None);
        assert_eq!(items["Widget"].kind, Some(SymbolKind::Class));
        assert!(!items.contains_key("wid"));
    }

    #[test]
    fn completion_does_not_force_update() {
        let idx = index_with(&[]);
        idx.on_document_text("file:///late.py", "python", Arc::from("def late():\n    pass\n"));
        let doc = ParsedDocument::parse("python", "x = 1\n").unwrap();
        assert!(!complete(&idx, &doc, Position::new(0, 0)).contains_key("late"));
    }

    #[test]
    fn definitions_prefer_the_local_outline() {
        let idx = index_with(&[("file:///other.py", "python", "def helper():\n    pass\n")]);
        let text = "def helper():\n    pass\n\nhelper()\n";
        let doc = ParsedDocument::parse("python", text).unwrap();

        let defs = find_definitions(&idx, &doc, "file:///here.py", Position::new(3, 1));
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].uri, "file:///here.py");
        assert_eq!(defs[0].span.start, Position::new(0, 4));

        let doc = ParsedDocument::parse("python", "helper()\n").unwrap();
        let defs = find_definitions(&idx, &doc, "file:///there.py", Position::new(0, 1));
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].uri, "file:///other.py");
    }

    #[test]
    fn highlights_stay_in_document() {
        let text = "count = 0\ncount = count + 1\nother = 2\n";
        let doc = ParsedDocument::parse("python", text).unwrap();
        let spans = document_highlights(&doc, Position::new(1, 10));
        let lines: Vec<u32> = spans.iter().map(|s| s.start.line).collect();
        assert_eq!(lines, vec![0, 1, 1]);
    }
}
