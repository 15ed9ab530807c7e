//! The per-workspace owner: open documents, the file cache and the index.
//!
//! Every query entry point takes a uri. Open documents are answered from
//! their buffer; any other supported file is read through the file cache.

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::{load_config, Config, SymbolSearchMode};
use crate::file_cache::{read, write, FileCache};
use crate::index::{Location, SymbolIndex, UpdateStats};
use crate::outline::{outline_of, Symbol};
use crate::resolve::{self, CompletionCandidate};
use crate::scanner::scan_workspace;
use crate::syntax::{ParsedDocument, Position, Span};
use crate::workspace_symbols::{OpenDocument, WorkspaceSearch, WorkspaceSymbol};

#[derive(Debug, Clone)]
struct Document {
    language_id: String,
    text: Arc<str>,
    version: i64,
}

pub struct Workspace {
    root: Option<PathBuf>,
    config: Config,
    documents: RwLock<HashMap<String, Document>>,
    cache: Arc<FileCache>,
    index: SymbolIndex,
}

impl Workspace {
    pub fn new(config: Config) -> Self {
        let cache = Arc::new(FileCache::new());
        Self {
            root: None,
            config,
            documents: RwLock::new(HashMap::new()),
            index: SymbolIndex::new(cache.clone()),
            cache,
        }
    }

    /// Load `<root>/.symdex.json` and index everything under `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let mut ws = Self::new(load_config(root));
        ws.index_root(root)?;
        ws.root = Some(root.to_path_buf());
        Ok(ws)
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn index(&self) -> &SymbolIndex {
        &self.index
    }

    /// Queue every supported file under `root` and fold it into the index.
    /// Returns the number of files found.
    pub fn index_root(&self, root: &Path) -> Result<usize> {
        let entries = scan_workspace(root, &self.config)?;
        for e in &entries {
            self.index.on_file_added(&e.uri());
        }
        self.index.update();
        Ok(entries.len())
    }

    // ── Document lifecycle ──────────────────────────────────────────────

    pub fn open_document(&self, uri: &str, language_id: &str, text: &str, version: i64) {
        let text: Arc<str> = Arc::from(text);
        write(&self.documents).insert(
            uri.to_string(),
            Document {
                language_id: language_id.to_string(),
                text: text.clone(),
                version,
            },
        );
        self.index.on_document_text(uri, language_id, text);
    }

    /// Replace an open document's text. Stale versions and unknown uris are ignored.
    pub fn change_document(&self, uri: &str, text: &str, version: i64) -> bool {
        let mut docs = write(&self.documents);
        let Some(doc) = docs.get_mut(uri) else {
            return false;
        };
        if version < doc.version {
            return false;
        }
        doc.text = Arc::from(text);
        doc.version = version;
        self.index.on_document_text(uri, &doc.language_id, doc.text.clone());
        true
    }

    /// Forget the buffer; the index falls back to the file on disk, if any.
    pub fn close_document(&self, uri: &str) {
        if write(&self.documents).remove(uri).is_none() {
            return;
        }
        if self.cache.get_or_insert(uri).is_ok() {
            self.index.on_file_updated(uri);
        } else {
            self.index.on_file_removed(uri);
        }
    }

    pub fn is_open(&self, uri: &str) -> bool {
        read(&self.documents).contains_key(uri)
    }

    fn open_documents(&self) -> Vec<OpenDocument> {
        let docs = read(&self.documents);
        let mut out: Vec<OpenDocument> = docs
            .iter()
            .map(|(uri, d)| OpenDocument {
                uri: uri.clone(),
                language_id: d.language_id.clone(),
                text: d.text.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.uri.cmp(&b.uri));
        out
    }

    /// Buffer text for open documents, disk text (through the cache) otherwise.
    fn source(&self, uri: &str) -> Option<(String, Arc<str>)> {
        if let Some(d) = read(&self.documents).get(uri) {
            return Some((d.language_id.clone(), d.text.clone()));
        }
        let file = self.cache.get_or_insert(uri).ok()?;
        match file.load_blocking() {
            Ok(text) => Some((file.language_id().to_string(), text?)),
            Err(_e) => {
                crate::debug_log!("[symdex] cannot read {uri}: {_e}");
                None
            }
        }
    }

    fn with_document<R>(&self, uri: &str, f: impl FnOnce(&ParsedDocument<'_>) -> R) -> Option<R> {
        let (language_id, text) = self.source(uri)?;
        let doc = ParsedDocument::parse(&language_id, &text)?;
        Some(f(&doc))
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn build_outline(&self, uri: &str) -> Option<Vec<Symbol>> {
        self.with_document(uri, outline_of).flatten()
    }

    pub fn find_references(&self, uri: &str, pos: Position, include_declaration: bool) -> Vec<Location> {
        self.with_document(uri, |doc| {
            resolve::find_references(&self.index, doc, uri, pos, include_declaration)
        })
        .unwrap_or_default()
    }

    pub fn complete(&self, uri: &str, pos: Position) -> HashMap<String, CompletionCandidate> {
        self.with_document(uri, |doc| resolve::complete(&self.index, doc, pos))
            .unwrap_or_default()
    }

    pub fn find_definitions(&self, uri: &str, pos: Position) -> Vec<Location> {
        self.with_document(uri, |doc| resolve::find_definitions(&self.index, doc, uri, pos))
            .unwrap_or_default()
    }

    pub fn document_highlights(&self, uri: &str, pos: Position) -> Vec<Span> {
        self.with_document(uri, |doc| resolve::document_highlights(doc, pos))
            .unwrap_or_default()
    }

    /// Fuzzy symbol search; `mode` defaults to the configured one.
    pub async fn search_workspace_symbols(
        &self,
        query: &str,
        mode: Option<SymbolSearchMode>,
        cancel: &CancellationToken,
    ) -> Vec<WorkspaceSymbol> {
        let open_documents = self.open_documents();
        let indexed_uris = self.index.indexed_uris();
        let search = WorkspaceSearch {
            open_documents: &open_documents,
            indexed_uris: &indexed_uris,
            cache: &self.cache,
            batch_size: self.config.search.batch_size,
        };
        search
            .run(query, mode.unwrap_or(self.config.search.mode), cancel)
            .await
    }

    // ── File watching ───────────────────────────────────────────────────
    //
    // While a document is open its buffer stays authoritative for the index;
    // disk events then only refresh the cache.

    pub fn on_file_added(&self, uri: &str) {
        if !self.is_open(uri) {
            self.index.on_file_added(uri);
        }
    }

    pub fn on_file_updated(&self, uri: &str) {
        if self.is_open(uri) {
            self.cache.invalidate(uri);
        } else {
            self.index.on_file_updated(uri);
        }
    }

    pub fn on_file_removed(&self, uri: &str) {
        if self.is_open(uri) {
            self.cache.remove(uri);
        } else {
            self.index.on_file_removed(uri);
        }
    }

    pub fn update(&self) -> UpdateStats {
        self.index.update()
    }
}
