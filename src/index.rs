//! Cross-file symbol index.
//!
//! Definitions and usages for the whole workspace, keyed by identifier text.
//! File events only queue work; `update()` folds the queue into a new
//! snapshot and swaps it in. Readers clone the current `Arc<Snapshot>` and
//! never wait for parsing, so they may observe a slightly stale index. Every
//! file's entries change together: a reader sees either the old or the new
//! entry set for a file, never a mix.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use xxhash_rust::xxh3::xxh3_64;

use crate::file_cache::{self, FileCache};
use crate::kind::{classify_usage, SymbolKind};
use crate::languages::QueryKind;
use crate::outline::outline_of;
use crate::syntax::{ParsedDocument, Span};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    pub uri: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub name: String,
    /// Always set for definitions; `None` for usages whose kind the usage query couldn't tell.
    pub kind: Option<SymbolKind>,
    pub location: Location,
}

/// Entries contributed by one file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileSlice {
    hash: u64,
    pub definitions: Vec<IndexEntry>,
    pub usages: Vec<IndexEntry>,
}

/// Extract the definitions and usages one document contributes.
///
/// Definitions come from the outline (every symbol, located at its name);
/// usages from the usage query, one per span, preferring a capture that
/// names a kind. Usage captures sitting exactly on a definition's name are
/// dropped so declarations are only reported as definitions.
pub fn index_text(uri: &str, language_id: &str, text: &str) -> FileSlice {
    let hash = xxh3_64(text.as_bytes());
    let Some(doc) = ParsedDocument::parse(language_id, text) else {
        return FileSlice { hash, ..FileSlice::default() };
    };

    let mut definitions = Vec::new();
    for root in outline_of(&doc).unwrap_or_default() {
        for s in root.walk() {
            definitions.push(IndexEntry {
                name: s.name.clone(),
                kind: Some(s.kind),
                location: Location {
                    uri: uri.to_string(),
                    span: s.selection_range,
                },
            });
        }
    }

    let declared: HashSet<Span> = definitions.iter().map(|d| d.location.span).collect();
    let mut usages: Vec<IndexEntry> = Vec::new();
    let mut by_span: HashMap<Span, usize> = HashMap::new();

    for cap in doc.captures(QueryKind::Usages).unwrap_or_default() {
        if declared.contains(&cap.span) {
            continue;
        }
        let kind = classify_usage(&cap.label);
        match by_span.get(&cap.span) {
            Some(&i) => {
                if usages[i].kind.is_none() && kind.is_some() {
                    usages[i].kind = kind;
                }
            }
            None => {
                by_span.insert(cap.span, usages.len());
                usages.push(IndexEntry {
                    name: cap.text,
                    kind,
                    location: Location {
                        uri: uri.to_string(),
                        span: cap.span,
                    },
                });
            }
        }
    }

    FileSlice {
        hash,
        definitions,
        usages,
    }
}

/// One immutable view of the index.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    files: HashMap<String, Arc<FileSlice>>,
    definitions: HashMap<String, Vec<IndexEntry>>,
    usages: HashMap<String, Vec<IndexEntry>>,
}

impl Snapshot {
    pub fn definitions(&self, name: &str) -> &[IndexEntry] {
        self.definitions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn usages(&self, name: &str) -> &[IndexEntry] {
        self.usages.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every defined name with the kind of its first definition.
    pub fn definition_names(&self) -> impl Iterator<Item = (&str, SymbolKind)> + '_ {
        self.definitions.iter().filter_map(|(name, entries)| {
            let kind = entries.first()?.kind?;
            Some((name.as_str(), kind))
        })
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> + '_ {
        self.files.keys().map(String::as_str)
    }

    pub fn contains_file(&self, uri: &str) -> bool {
        self.files.contains_key(uri)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn remove_file(&mut self, uri: &str) {
        let Some(old) = self.files.remove(uri) else { return };
        detach(&mut self.definitions, &old.definitions, uri);
        detach(&mut self.usages, &old.usages, uri);
    }

    fn insert_file(&mut self, uri: &str, slice: FileSlice) {
        self.remove_file(uri);
        for e in &slice.definitions {
            self.definitions.entry(e.name.clone()).or_default().push(e.clone());
        }
        for e in &slice.usages {
            self.usages.entry(e.name.clone()).or_default().push(e.clone());
        }
        self.files.insert(uri.to_string(), Arc::new(slice));
    }
}

fn detach(map: &mut HashMap<String, Vec<IndexEntry>>, entries: &[IndexEntry], uri: &str) {
    let names: HashSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    for name in names {
        if let Some(list) = map.get_mut(name) {
            list.retain(|e| e.location.uri != uri);
            if list.is_empty() {
                map.remove(name);
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Pending {
    /// Re-read the file from disk.
    Reload,
    /// Index this in-memory text (an open editor buffer).
    Text { language_id: String, text: Arc<str> },
    Remove,
}

enum Outcome {
    Replace(FileSlice),
    Unchanged,
    Remove,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateStats {
    pub indexed: usize,
    pub unchanged: usize,
    pub removed: usize,
}

pub struct SymbolIndex {
    cache: Arc<FileCache>,
    queue: Mutex<BTreeMap<String, Pending>>,
    snapshot: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
}

impl SymbolIndex {
    pub fn new(cache: Arc<FileCache>) -> Self {
        Self {
            cache,
            queue: Mutex::new(BTreeMap::new()),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            writer: Mutex::new(()),
        }
    }

    /// Current snapshot. Cheap; never waits for an update in flight.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        file_cache::read(&self.snapshot).clone()
    }

    pub fn on_file_added(&self, uri: &str) {
        self.enqueue(uri, Pending::Reload);
    }

    pub fn on_file_updated(&self, uri: &str) {
        self.cache.invalidate(uri);
        self.enqueue(uri, Pending::Reload);
    }

    pub fn on_file_removed(&self, uri: &str) {
        self.cache.remove(uri);
        self.enqueue(uri, Pending::Remove);
    }

    /// Index an editor buffer instead of the file on disk.
    pub fn on_document_text(&self, uri: &str, language_id: &str, text: Arc<str>) {
        self.enqueue(
            uri,
            Pending::Text {
                language_id: language_id.to_string(),
                text,
            },
        );
    }

    pub fn has_pending(&self) -> bool {
        !lock(&self.queue).is_empty()
    }

    fn enqueue(&self, uri: &str, change: Pending) {
        lock(&self.queue).insert(uri.to_string(), change);
    }

    pub fn lookup_definitions(&self, name: &str) -> Vec<IndexEntry> {
        self.snapshot().definitions(name).to_vec()
    }

    pub fn lookup_usages(&self, name: &str) -> Vec<IndexEntry> {
        self.snapshot().usages(name).to_vec()
    }

    /// Known file uris, sorted.
    pub fn indexed_uris(&self) -> Vec<String> {
        let snap = self.snapshot();
        let mut uris: Vec<String> = snap.uris().map(str::to_string).collect();
        uris.sort();
        uris
    }

    /// Fold every queued event into a new snapshot.
    ///
    /// Only one update runs at a time; concurrent callers wait for the running
    /// one and then process whatever was queued meanwhile. Files whose content
    /// hash is unchanged keep their entries untouched.
    pub fn update(&self) -> UpdateStats {
        let _writer = lock(&self.writer);
        let pending: Vec<(String, Pending)> = std::mem::take(&mut *lock(&self.queue)).into_iter().collect();
        if pending.is_empty() {
            return UpdateStats::default();
        }

        let current = self.snapshot();

        // ── Phase 1: parallel load + parse ───────────────────────────────
        let outcomes: Vec<(String, Outcome)> = pending
            .into_par_iter()
            .map(|(uri, change)| {
                let outcome = self.resolve_change(&current, &uri, change);
                (uri, outcome)
            })
            .collect();

        // ── Phase 2: apply to a private copy, then publish ───────────────
        let mut next: Snapshot = (*current).clone();
        let mut stats = UpdateStats::default();
        for (uri, outcome) in outcomes {
            match outcome {
                Outcome::Replace(slice) => {
                    next.insert_file(&uri, slice);
                    stats.indexed += 1;
                }
                Outcome::Unchanged => stats.unchanged += 1,
                Outcome::Remove => {
                    if next.contains_file(&uri) {
                        stats.removed += 1;
                    }
                    next.remove_file(&uri);
                }
            }
        }

        *file_cache::write(&self.snapshot) = Arc::new(next);

        crate::debug_log!(
            "[symdex] index update: {} indexed, {} unchanged, {} removed",
            stats.indexed,
            stats.unchanged,
            stats.removed
        );
        stats
    }

    fn resolve_change(&self, current: &Snapshot, uri: &str, change: Pending) -> Outcome {
        let (language_id, text): (String, Arc<str>) = match change {
            Pending::Remove => return Outcome::Remove,
            Pending::Text { language_id, text } => (language_id, text),
            Pending::Reload => {
                let file = match self.cache.get_or_insert(uri) {
                    Ok(f) => f,
                    Err(_e) => {
                        crate::debug_log!("[symdex] not indexing {uri}: {_e}");
                        return Outcome::Remove;
                    }
                };
                match file.load_blocking() {
                    Ok(Some(text)) => (file.language_id().to_string(), text),
                    Ok(None) => return Outcome::Remove,
                    Err(_e) => {
                        crate::debug_log!("[symdex] dropping {uri} from index: {_e}");
                        return Outcome::Remove;
                    }
                }
            }
        };

        if let Some(old) = current.files.get(uri) {
            if old.hash == xxh3_64(text.as_bytes()) {
                return Outcome::Unchanged;
            }
        }
        Outcome::Replace(index_text(uri, &language_id, &text))
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::path_to_uri;
    use tempfile::TempDir;

    fn index() -> SymbolIndex {
        SymbolIndex::new(Arc::new(FileCache::new()))
    }

    #[test]
    fn slice_has_definitions_and_kinded_usages() {
        let src = "fn helper() {}\n\nfn main() {\n    helper();\n    let v = 1;\n    println!(\"{}\", v);\n}\n";
        let slice = index_text("file:///m.rs", "rust", src);

        let defs: Vec<(&str, Option<SymbolKind>)> = slice
            .definitions
            .iter()
            .map(|d| (d.name.as_str(), d.kind))
            .collect();
        assert_eq!(
            defs,
            vec![("helper", Some(SymbolKind::Function)), ("main", Some(SymbolKind::Function))]
        );

        let helper_uses: Vec<&IndexEntry> = slice.usages.iter().filter(|u| u.name == "helper").collect();
        assert_eq!(helper_uses.len(), 1, "declaration is not a usage");
        assert_eq!(helper_uses[0].kind, Some(SymbolKind::Function));
        assert_eq!(helper_uses[0].location.span.start.line, 3);

        let v_uses: Vec<&IndexEntry> = slice.usages.iter().filter(|u| u.name == "v").collect();
        assert_eq!(v_uses.len(), 2);
        assert!(v_uses.iter().all(|u| u.kind.is_none()));
    }

    #[test]
    fn unsupported_language_contributes_nothing() {
        let slice = index_text("file:///x.txt", "plaintext", "hello");
        assert!(slice.definitions.is_empty() && slice.usages.is_empty());
    }

    #[test]
    fn events_are_invisible_until_update() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lib.py");
        std::fs::write(&path, "def alpha():\n    pass\n\nalpha()\n").unwrap();
        let uri = path_to_uri(&path);

        let idx = index();
        idx.on_file_added(&uri);
        assert!(idx.has_pending());
        assert!(idx.lookup_definitions("alpha").is_empty());
        assert!(idx.lookup_usages("alpha").is_empty());

        let stats = idx.update();
        assert_eq!(stats.indexed, 1);
        assert!(!idx.has_pending());

        let defs = idx.lookup_definitions("alpha");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].location.uri, uri);
        assert_eq!(defs[0].kind, Some(SymbolKind::Function));
        assert_eq!(idx.lookup_usages("alpha").len(), 1);
    }

    #[test]
    fn update_replaces_and_remove_drops_a_files_entries() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.py");
        let b = tmp.path().join("b.py");
        std::fs::write(&a, "def shared():\n    pass\n").unwrap();
        std::fs::write(&b, "def shared():\n    pass\n\ndef only_b():\n    pass\n").unwrap();
        let (ua, ub) = (path_to_uri(&a), path_to_uri(&b));

        let idx = index();
        idx.on_file_added(&ua);
        idx.on_file_added(&ub);
        idx.update();
        assert_eq!(idx.lookup_definitions("shared").len(), 2);

        std::fs::write(&a, "def renamed():\n    pass\n").unwrap();
        idx.on_file_updated(&ua);
        let before = idx.snapshot();
        idx.update();

        // Old snapshot is untouched by the swap.
        assert_eq!(before.definitions("shared").len(), 2);
        assert_eq!(idx.lookup_definitions("shared").len(), 1);
        assert_eq!(idx.lookup_definitions("renamed").len(), 1);

        idx.on_file_removed(&ub);
        let stats = idx.update();
        assert_eq!(stats.removed, 1);
        assert!(idx.lookup_definitions("shared").is_empty());
        assert!(idx.lookup_definitions("only_b").is_empty());
        assert_eq!(idx.indexed_uris(), vec![ua]);
    }

    #[test]
    fn unchanged_content_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("k.rs");
        std::fs::write(&p, "const K: u8 = 1;\n").unwrap();
        let uri = path_to_uri(&p);

        let idx = index();
        idx.on_file_added(&uri);
        assert_eq!(idx.update().indexed, 1);

        idx.on_file_updated(&uri);
        let stats = idx.update();
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.indexed, 0);
        assert_eq!(idx.lookup_definitions("K")[0].kind, Some(SymbolKind::Constant));
    }

    #[test]
    fn buffer_text_overrides_disk() {
        let idx = index();
        idx.on_document_text("file:///mem/x.py", "python", Arc::from("class Buffered:\n    pass\n"));
        idx.update();
        let defs = idx.lookup_definitions("Buffered");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].kind, Some(SymbolKind::Class));
    }

    #[test]
    fn unreadable_file_is_dropped() {
        let idx = index();
        idx.on_file_added("file:///definitely/not/here.rs");
        let stats = idx.update();
        assert_eq!(stats.indexed, 0);
        assert_eq!(idx.snapshot().file_count(), 0);
    }

    #[test]
    fn definition_names_carry_first_kind() {
        let idx = index();
        idx.on_document_text("file:///a.py", "python", Arc::from("class Thing:\n    pass\n"));
        idx.update();
        let names: Vec<(String, SymbolKind)> = idx
            .snapshot()
            .definition_names()
            .map(|(n, k)| (n.to_string(), k))
            .collect();
        assert_eq!(names, vec![("Thing".to_string(), SymbolKind::Class)]);
    }
}
