use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tree_sitter::{Node, Parser, Point, QueryCursor, StreamingIterator, Tree};

use crate::languages::{registry, Grammar, QueryKind};

/// A (line, column) pair. Both are 0-based; columns count bytes, as tree-sitter does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

impl From<Point> for Position {
    fn from(p: Point) -> Self {
        Self {
            line: p.row as u32,
            character: p.column as u32,
        }
    }
}

impl From<Position> for Point {
    fn from(p: Position) -> Self {
        Point {
            row: p.line as usize,
            column: p.character as usize,
        }
    }
}

/// Half-open range of positions within one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Non-strict containment.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Inclusive on both ends so a cursor placed right after a word still hits it.
    pub fn contains_position(&self, p: Position) -> bool {
        self.start <= p && p <= self.end
    }

    /// True when the spans intersect without either containing the other.
    pub fn partially_overlaps(&self, other: &Span) -> bool {
        let intersects = self.start < other.end && other.start < self.end;
        intersects && !self.contains(other) && !other.contains(self)
    }

    fn of(node: Node) -> Self {
        Self {
            start: node.start_position().into(),
            end: node.end_position().into(),
        }
    }
}

/// One labeled match produced by running a query over a parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capture {
    pub label: String,
    pub span: Span,
    pub text: String,
}

impl Capture {
    pub fn new(label: impl Into<String>, span: Span, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            span,
            text: text.into(),
        }
    }
}

/// A document parsed with its language's grammar.
///
/// Trees are rebuilt from scratch for every request; nothing here is cached.
pub struct ParsedDocument<'a> {
    grammar: &'static Grammar,
    tree: Tree,
    text: &'a str,
}

impl<'a> ParsedDocument<'a> {
    /// Returns `None` for unknown languages or when the parser produced no tree.
    pub fn parse(language_id: &str, text: &'a str) -> Option<Self> {
        let grammar = registry().grammar(language_id)?;

        let mut parser = Parser::new();
        if parser.set_language(grammar.language()).is_err() {
            crate::debug_log!("[symdex] grammar for {language_id} rejected by parser");
            return None;
        }
        let tree = parser.parse(text, None)?;

        Some(Self { grammar, tree, text })
    }

    /// Run one of the language's queries and return its captures in document order:
    /// ascending start, and the longer span first when two captures start together.
    /// Identical `(label, span)` pairs reported by several patterns are kept once.
    ///
    /// `None` means the language registers no usable query of that kind.
    pub fn captures(&self, kind: QueryKind) -> Option<Vec<Capture>> {
        let query = self.grammar.query(kind)?;
        let source = self.text.as_bytes();
        let names = query.capture_names();

        let mut cursor = QueryCursor::new();
        let mut seen: HashSet<(usize, usize, u32)> = HashSet::new();
        let mut out: Vec<Capture> = Vec::new();

        let mut matches = cursor.matches(query, self.tree.root_node(), source);
        while let Some(m) = matches.next() {
            for cap in m.captures {
                let node = cap.node;
                if !seen.insert((node.start_byte(), node.end_byte(), cap.index)) {
                    continue;
                }
                let label = names[cap.index as usize];
                out.push(Capture::new(label, Span::of(node), node_text(source, node)));
            }
        }

        out.sort_by(|a, b| {
            a.span
                .start
                .cmp(&b.span.start)
                .then_with(|| b.span.end.cmp(&a.span.end))
        });
        Some(out)
    }

    /// Text of the smallest named leaf under `pos`.
    ///
    /// When the cursor sits just after a word (so the token to its right wins),
    /// the position one column to the left is tried as well.
    pub fn identifier_at(&self, pos: Position) -> Option<(String, Span)> {
        self.leaf_at(pos).or_else(|| {
            if pos.character == 0 {
                return None;
            }
            self.leaf_at(Position::new(pos.line, pos.character - 1))
        })
    }

    fn leaf_at(&self, pos: Position) -> Option<(String, Span)> {
        let p: Point = pos.into();
        let node = self.tree.root_node().descendant_for_point_range(p, p)?;
        if !node.is_named() || node.child_count() > 0 {
            return None;
        }
        let text = node_text(self.text.as_bytes(), node);
        if text.trim().is_empty() {
            return None;
        }
        Some((text.to_string(), Span::of(node)))
    }
}

fn node_text<'a>(source: &'a [u8], node: Node) -> &'a str {
    std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(l0: u32, c0: u32, l1: u32, c1: u32) -> Span {
        Span::new(Position::new(l0, c0), Position::new(l1, c1))
    }

    #[test]
    fn span_containment_is_non_strict() {
        let outer = span(0, 0, 4, 1);
        assert!(outer.contains(&outer));
        assert!(outer.contains(&span(1, 4, 1, 9)));
        assert!(!span(1, 4, 1, 9).contains(&outer));
        assert!(outer.contains_position(Position::new(4, 1)));
        assert!(!outer.contains_position(Position::new(4, 2)));
    }

    #[test]
    fn partial_overlap_detection() {
        assert!(span(0, 0, 0, 10).partially_overlaps(&span(0, 5, 0, 15)));
        assert!(!span(0, 0, 0, 10).partially_overlaps(&span(0, 2, 0, 4)));
        assert!(!span(0, 0, 0, 10).partially_overlaps(&span(0, 10, 0, 12)));
    }

    #[test]
    fn rust_outline_captures_are_in_document_order() {
        let src = "struct Foo {\n    bar: u32,\n}\n\nfn baz() {}\n";
        let doc = ParsedDocument::parse("rust", src).unwrap();
        let caps = doc.captures(QueryKind::Outline).unwrap();
        let labels: Vec<&str> = caps.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "definition.struct",
                "definition.struct.name",
                "definition.field",
                "definition.field.name",
                "definition.function",
                "definition.function.name",
            ]
        );
        assert_eq!(caps[1].text, "Foo");
        assert_eq!(caps[5].text, "baz");
    }

    #[test]
    fn identifier_under_cursor() {
        let src = "def greet(name):\n    return name\n";
        let doc = ParsedDocument::parse("python", src).unwrap();
        let (text, sp) = doc.identifier_at(Position::new(0, 6)).unwrap();
        assert_eq!(text, "greet");
        assert_eq!(sp, span(0, 4, 0, 9));

        // Right after the word, before `(`.
        let (text, _) = doc.identifier_at(Position::new(0, 9)).unwrap();
        assert_eq!(text, "greet");
    }

    #[test]
    fn unknown_language_is_absent() {
        assert!(ParsedDocument::parse("brainfuck", "+++").is_none());
    }
}
