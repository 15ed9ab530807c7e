//! Fuzzy workspace symbol search.
//!
//! Open documents are searched first. In `workspace` mode every indexed file
//! that is not open follows, loaded through the file cache in fixed-size
//! batches; files whose text cannot contain a match (per the prefilter
//! regex) are never parsed. Cancellation is checked before each batch and
//! before each document, and whatever was collected so far is returned.

use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::SymbolSearchMode;
use crate::file_cache::FileCache;
use crate::fuzzy::{fuzzy_match, prefilter_regex};
use crate::index::Location;
use crate::kind::{classify, SymbolKind, NAME_SUFFIX};
use crate::languages::QueryKind;
use crate::syntax::ParsedDocument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSymbol {
    pub name: String,
    pub kind: SymbolKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    pub location: Location,
}

/// Editor buffer taking part in the search.
#[derive(Debug, Clone)]
pub struct OpenDocument {
    pub uri: String,
    pub language_id: String,
    pub text: Arc<str>,
}

/// Named definitions in one document whose name fuzzy-matches `query`.
///
/// A `.name` capture belongs to the capture right before it when its label
/// extends that capture's label; the owner provides the location, otherwise
/// the name's own span is used. The container is the closest enclosing
/// definition that has a name.
pub fn document_symbols(uri: &str, language_id: &str, text: &str, query: &str) -> Vec<WorkspaceSymbol> {
    let Some(doc) = ParsedDocument::parse(language_id, text) else {
        return Vec::new();
    };
    let captures = doc.captures(QueryKind::Outline).unwrap_or_default();

    let mut out = Vec::new();
    let mut names: Vec<Option<String>> = vec![None; captures.len()];
    // Open definitions, innermost last.
    let mut stack: Vec<usize> = Vec::new();

    for (i, cap) in captures.iter().enumerate() {
        while let Some(&top) = stack.last() {
            if captures[top].span.contains(&cap.span) {
                break;
            }
            stack.pop();
        }

        if !cap.label.ends_with(NAME_SUFFIX) {
            stack.push(i);
            continue;
        }

        let owner = i
            .checked_sub(1)
            .filter(|&p| stack.last() == Some(&p) && extends_label(&cap.label, &captures[p].label));
        if let Some(p) = owner {
            if names[p].is_none() {
                names[p] = Some(cap.text.clone());
            }
        }

        if !fuzzy_match(query, &cap.text) {
            continue;
        }

        let container_name = stack
            .iter()
            .rev()
            .filter(|&&s| Some(s) != owner)
            .find_map(|&s| names[s].clone());
        let span = owner.map(|p| captures[p].span).unwrap_or(cap.span);

        out.push(WorkspaceSymbol {
            name: cap.text.clone(),
            kind: classify(&cap.label),
            container_name,
            location: Location {
                uri: uri.to_string(),
                span,
            },
        });
    }
    out
}

/// `definition.class.name` extends `definition.class`.
fn extends_label(label: &str, parent: &str) -> bool {
    label
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Inputs for one workspace symbol query.
pub struct WorkspaceSearch<'a> {
    pub open_documents: &'a [OpenDocument],
    /// Candidate files; open documents among them are skipped.
    pub indexed_uris: &'a [String],
    pub cache: &'a FileCache,
    pub batch_size: usize,
}

impl WorkspaceSearch<'_> {
    pub async fn run(&self, query: &str, mode: SymbolSearchMode, cancel: &CancellationToken) -> Vec<WorkspaceSymbol> {
        self.run_with_progress(query, mode, cancel, |_, _| {}).await
    }

    /// Like [`run`](Self::run), reporting `(batches_done, batches_total)` after
    /// every batch of unopened files.
    pub async fn run_with_progress<F>(
        &self,
        query: &str,
        mode: SymbolSearchMode,
        cancel: &CancellationToken,
        mut on_batch: F,
    ) -> Vec<WorkspaceSymbol>
    where
        F: FnMut(usize, usize),
    {
        let mut out = Vec::new();
        if mode == SymbolSearchMode::Off {
            return out;
        }

        for doc in self.open_documents {
            if cancel.is_cancelled() {
                return out;
            }
            out.extend(document_symbols(&doc.uri, &doc.language_id, &doc.text, query));
        }

        if mode != SymbolSearchMode::Workspace {
            return out;
        }

        let open: HashSet<&str> = self.open_documents.iter().map(|d| d.uri.as_str()).collect();
        let pending: Vec<&str> = self
            .indexed_uris
            .iter()
            .map(String::as_str)
            .filter(|u| !open.contains(u))
            .collect();
        let prefilter = prefilter_regex(query);
        let batches: Vec<&[&str]> = pending.chunks(self.batch_size.max(1)).collect();
        let total = batches.len();

        for (n, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                crate::debug_log!("[symdex] workspace symbol search cancelled after {n}/{total} batches");
                return out;
            }

            let loaded = join_all(batch.iter().map(|uri| self.load(uri))).await;
            for (uri, language_id, text) in loaded.into_iter().flatten() {
                if cancel.is_cancelled() {
                    return out;
                }
                if !passes(prefilter.as_ref(), &text) {
                    continue;
                }
                out.extend(document_symbols(uri, language_id, &text, query));
            }
            on_batch(n + 1, total);
        }
        out
    }

    async fn load<'u>(&self, uri: &'u str) -> Option<(&'u str, &'static str, Arc<str>)> {
        let file = match self.cache.get_or_insert(uri) {
            Ok(f) => f,
            Err(_e) => {
                crate::debug_log!("[symdex] skipping {uri} in symbol search: {_e}");
                return None;
            }
        };
        match file.load().await {
            Ok(Some(text)) => Some((uri, file.language_id(), text)),
            Ok(None) => None,
            Err(_e) => {
                crate::debug_log!("[symdex] skipping {uri} in symbol search: {_e}");
                None
            }
        }
    }
}

fn passes(prefilter: Option<&Regex>, text: &str) -> bool {
    prefilter.map_or(true, |re| re.is_match(text))
}
