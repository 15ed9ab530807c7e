use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SymbolKind {
    File,
    Module,
    Namespace,
    Package,
    Class,
    Method,
    Property,
    Field,
    Constructor,
    Enum,
    Interface,
    Function,
    Variable,
    Constant,
    String,
    Number,
    Boolean,
    Array,
    Object,
    Key,
    Null,
    EnumMember,
    Struct,
    Event,
    Operator,
    TypeParameter,
}

/// Label kind word → symbol kind. Labels are matched lowercase; anything
/// missing from this table classifies as [`SymbolKind::Variable`].
const KIND_TABLE: &[(&str, SymbolKind)] = &[
    ("file", SymbolKind::File),
    ("module", SymbolKind::Module),
    ("namespace", SymbolKind::Namespace),
    ("package", SymbolKind::Package),
    ("class", SymbolKind::Class),
    ("method", SymbolKind::Method),
    ("property", SymbolKind::Property),
    ("field", SymbolKind::Field),
    ("constructor", SymbolKind::Constructor),
    ("enum", SymbolKind::Enum),
    ("interface", SymbolKind::Interface),
    ("function", SymbolKind::Function),
    ("variable", SymbolKind::Variable),
    ("constant", SymbolKind::Constant),
    ("string", SymbolKind::String),
    ("number", SymbolKind::Number),
    ("boolean", SymbolKind::Boolean),
    ("array", SymbolKind::Array),
    ("object", SymbolKind::Object),
    ("key", SymbolKind::Key),
    ("null", SymbolKind::Null),
    ("enummember", SymbolKind::EnumMember),
    ("struct", SymbolKind::Struct),
    ("event", SymbolKind::Event),
    ("operator", SymbolKind::Operator),
    ("typeparameter", SymbolKind::TypeParameter),
];

/// Label prefixes that carry no kind information.
const ROLE_PREFIXES: &[&str] = &["definition.", "usage."];

pub const NAME_SUFFIX: &str = ".name";

impl SymbolKind {
    /// Numeric code used on the wire (`SymbolKind` / `CompletionItemKind` tables
    /// of editor protocols start at 1 for `File`).
    pub fn code(self) -> u32 {
        match self {
            SymbolKind::File => 1,
            SymbolKind::Module => 2,
            SymbolKind::Namespace => 3,
            SymbolKind::Package => 4,
            SymbolKind::Class => 5,
            SymbolKind::Method => 6,
            SymbolKind::Property => 7,
            SymbolKind::Field => 8,
            SymbolKind::Constructor => 9,
            SymbolKind::Enum => 10,
            SymbolKind::Interface => 11,
            SymbolKind::Function => 12,
            SymbolKind::Variable => 13,
            SymbolKind::Constant => 14,
            SymbolKind::String => 15,
            SymbolKind::Number => 16,
            SymbolKind::Boolean => 17,
            SymbolKind::Array => 18,
            SymbolKind::Object => 19,
            SymbolKind::Key => 20,
            SymbolKind::Null => 21,
            SymbolKind::EnumMember => 22,
            SymbolKind::Struct => 23,
            SymbolKind::Event => 24,
            SymbolKind::Operator => 25,
            SymbolKind::TypeParameter => 26,
        }
    }

    /// Look up the kind word only; `None` when the word is not in the table.
    pub fn from_word(word: &str) -> Option<Self> {
        let lower = word.to_ascii_lowercase();
        KIND_TABLE
            .iter()
            .find(|(w, _)| *w == lower)
            .map(|(_, k)| *k)
    }
}

/// Kind word of a label: `definition.class` → `class`, `class.name` → `class`,
/// `usage` → `""`.
fn kind_word(label: &str) -> &str {
    let mut rest = label.strip_suffix(NAME_SUFFIX).unwrap_or(label);
    for p in ROLE_PREFIXES {
        if let Some(stripped) = rest.strip_prefix(p) {
            rest = stripped;
            break;
        }
    }
    if ROLE_PREFIXES.iter().any(|p| p.trim_end_matches('.') == rest) {
        return "";
    }
    rest
}

/// Classify a definition label. Unknown labels default to `Variable`.
pub fn classify(label: &str) -> SymbolKind {
    SymbolKind::from_word(kind_word(label)).unwrap_or(SymbolKind::Variable)
}

/// Classify a usage label, keeping "could not tell" distinct from `Variable`.
pub fn classify_usage(label: &str) -> Option<SymbolKind> {
    SymbolKind::from_word(kind_word(label))
}
