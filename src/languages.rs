use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tree_sitter::{Language, Query};

/// The three query facets every language may register.
///
/// - `Outline`: definition captures labeled `definition.<kind>` with an optional
///   `definition.<kind>.name` child capture.
/// - `Identifiers`: bare `identifier` captures used for local completion and highlights.
/// - `Usages`: `usage` / `usage.<kind>` captures folded into the cross-file index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Outline,
    Identifiers,
    Usages,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Outline => "outline",
            QueryKind::Identifiers => "identifiers",
            QueryKind::Usages => "usages",
        }
    }
}

pub trait LanguageDriver: Send + Sync {
    /// Language id as used by editors (`rust`, `typescript`, ...).
    fn name(&self) -> &'static str;
    /// File extensions handled by this driver (lowercase, without dot).
    fn extensions(&self) -> &'static [&'static str];
    fn language(&self) -> Language;

    fn query_source(&self, kind: QueryKind) -> &'static str;

    fn handles_path(&self, path: &Path) -> bool {
        let ext = path_ext_lower(path);
        self.extensions().iter().any(|e| *e == ext)
    }
}

struct RustDriver;
impl LanguageDriver for RustDriver {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn language(&self) -> Language {
        tree_sitter_rust::language()
    }

    fn query_source(&self, kind: QueryKind) -> &'static str {
        match kind {
            QueryKind::Outline => include_str!("../queries/rust/outline.scm"),
            QueryKind::Identifiers => include_str!("../queries/rust/identifiers.scm"),
            QueryKind::Usages => include_str!("../queries/rust/usages.scm"),
        }
    }
}

struct TypeScriptDriver;
impl LanguageDriver for TypeScriptDriver {
    fn name(&self) -> &'static str {
        "typescript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "mts", "cts", "js", "mjs", "cjs"]
    }

    fn language(&self) -> Language {
        tree_sitter_typescript::language_typescript()
    }

    fn query_source(&self, kind: QueryKind) -> &'static str {
        typescript_query(kind)
    }
}

/// TSX shares the TypeScript query files; only the grammar differs.
struct TsxDriver;
impl LanguageDriver for TsxDriver {
    fn name(&self) -> &'static str {
        "typescriptreact"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["tsx", "jsx"]
    }

    fn language(&self) -> Language {
        tree_sitter_typescript::language_tsx()
    }

    fn query_source(&self, kind: QueryKind) -> &'static str {
        typescript_query(kind)
    }
}

fn typescript_query(kind: QueryKind) -> &'static str {
    match kind {
        QueryKind::Outline => include_str!("../queries/typescript/outline.scm"),
        QueryKind::Identifiers => include_str!("../queries/typescript/identifiers.scm"),
        QueryKind::Usages => include_str!("../queries/typescript/usages.scm"),
    }
}

struct PythonDriver;
impl LanguageDriver for PythonDriver {
    fn name(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn language(&self) -> Language {
        tree_sitter_python::language()
    }

    fn query_source(&self, kind: QueryKind) -> &'static str {
        match kind {
            QueryKind::Outline => include_str!("../queries/python/outline.scm"),
            QueryKind::Identifiers => include_str!("../queries/python/identifiers.scm"),
            QueryKind::Usages => include_str!("../queries/python/usages.scm"),
        }
    }
}

#[cfg(feature = "lang-go")]
struct GoDriver;

#[cfg(feature = "lang-go")]
impl LanguageDriver for GoDriver {
    fn name(&self) -> &'static str {
        "go"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn language(&self) -> Language {
        tree_sitter_go::language()
    }

    fn query_source(&self, kind: QueryKind) -> &'static str {
        match kind {
            QueryKind::Outline => include_str!("../queries/go/outline.scm"),
            QueryKind::Identifiers => include_str!("../queries/go/identifiers.scm"),
            QueryKind::Usages => include_str!("../queries/go/usages.scm"),
        }
    }
}

#[cfg(feature = "lang-java")]
struct JavaDriver;

#[cfg(feature = "lang-java")]
impl LanguageDriver for JavaDriver {
    fn name(&self) -> &'static str {
        "java"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["java"]
    }

    fn language(&self) -> Language {
        tree_sitter_java::language()
    }

    fn query_source(&self, kind: QueryKind) -> &'static str {
        match kind {
            QueryKind::Outline => include_str!("../queries/java/outline.scm"),
            QueryKind::Identifiers => include_str!("../queries/java/identifiers.scm"),
            QueryKind::Usages => include_str!("../queries/java/usages.scm"),
        }
    }
}

/// A grammar with its compiled queries.
///
/// A facet whose query failed to compile is `None`: that language simply
/// doesn't support the corresponding feature.
pub struct Grammar {
    language: Language,
    outline: Option<Query>,
    identifiers: Option<Query>,
    usages: Option<Query>,
}

impl Grammar {
    fn compile(driver: &dyn LanguageDriver) -> Self {
        let language = driver.language();
        let compile = |kind: QueryKind| match Query::new(&language, driver.query_source(kind)) {
            Ok(q) => Some(q),
            Err(_e) => {
                crate::debug_log!(
                    "[symdex] {} query for {} failed to compile: {}",
                    kind.as_str(),
                    driver.name(),
                    _e
                );
                None
            }
        };

        let outline = compile(QueryKind::Outline);
        let identifiers = compile(QueryKind::Identifiers);
        let usages = compile(QueryKind::Usages);

        Self {
            language,
            outline,
            identifiers,
            usages,
        }
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn query(&self, kind: QueryKind) -> Option<&Query> {
        match kind {
            QueryKind::Outline => self.outline.as_ref(),
            QueryKind::Identifiers => self.identifiers.as_ref(),
            QueryKind::Usages => self.usages.as_ref(),
        }
    }
}

pub struct LanguageRegistry {
    drivers: Vec<Box<dyn LanguageDriver>>,
    grammars: Vec<OnceLock<Grammar>>,
    by_id: HashMap<&'static str, usize>,
    by_ext: HashMap<String, usize>,
}

impl LanguageRegistry {
    /// Compiled grammar for `language_id`; queries compile on first request.
    pub fn grammar(&self, language_id: &str) -> Option<&Grammar> {
        let idx = *self.by_id.get(language_id)?;
        let driver = self.drivers.get(idx)?;
        let slot = self.grammars.get(idx)?;
        Some(slot.get_or_init(|| Grammar::compile(driver.as_ref())))
    }

    pub fn language_id_for_path(&self, path: &Path) -> Option<&'static str> {
        let ext = path_ext_lower(path);
        if let Some(&idx) = self.by_ext.get(&ext) {
            if let Some(d) = self.drivers.get(idx) {
                if d.handles_path(path) {
                    return Some(d.name());
                }
            }
        }

        self.drivers.iter().find(|d| d.handles_path(path)).map(|d| d.name())
    }

}

impl Default for LanguageRegistry {
    fn default() -> Self {
        let mut drivers: Vec<Box<dyn LanguageDriver>> = vec![
            Box::new(RustDriver),
            Box::new(TypeScriptDriver),
            Box::new(TsxDriver),
            Box::new(PythonDriver),
        ];

        #[cfg(feature = "lang-go")]
        drivers.push(Box::new(GoDriver));

        #[cfg(feature = "lang-java")]
        drivers.push(Box::new(JavaDriver));

        let mut reg = Self {
            grammars: drivers.iter().map(|_| OnceLock::new()).collect(),
            drivers,
            by_id: HashMap::new(),
            by_ext: HashMap::new(),
        };

        for (idx, d) in reg.drivers.iter().enumerate() {
            reg.by_id.insert(d.name(), idx);
            for ext in d.extensions() {
                reg.by_ext.insert(ext.to_string(), idx);
            }
        }

        reg
    }
}

pub fn registry() -> &'static LanguageRegistry {
    static REG: OnceLock<LanguageRegistry> = OnceLock::new();
    REG.get_or_init(LanguageRegistry::default)
}

fn path_ext_lower(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}
