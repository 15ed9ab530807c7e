use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SymbolSearchMode};
use crate::index::Location;
use crate::kind::SymbolKind;
use crate::languages::registry;
use crate::outline::Symbol;
use crate::scanner::uri_to_path;
use crate::syntax::Position;
use crate::workspace::Workspace;
use crate::workspace_symbols::WorkspaceSymbol;

const FILE_CREATED: u64 = 1;
const FILE_CHANGED: u64 = 2;
const FILE_DELETED: u64 = 3;

/// Cancellation tokens of in-flight requests, keyed by the JSON text of their id.
///
/// The stdin reader registers every request before handing it to the main
/// loop, so a `$/cancelRequest` can reach a request that is queued or running.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl CancelRegistry {
    pub fn register(&self, id: &Value) -> CancellationToken {
        lock(&self.tokens).entry(id.to_string()).or_default().clone()
    }

    /// Cancel a registered request. Ids that already finished are ignored.
    pub fn cancel(&self, id: &Value) -> bool {
        match lock(&self.tokens).get(&id.to_string()) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn finish(&self, id: &Value) {
        lock(&self.tokens).remove(&id.to_string());
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock(&self.tokens).len()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct ServerState {
    workspace: Workspace,
    runtime: tokio::runtime::Runtime,
    cancels: CancelRegistry,
    shutting_down: bool,
}

impl ServerState {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;
        Ok(Self {
            workspace: Workspace::new(Config::default()),
            runtime,
            cancels: CancelRegistry::default(),
            shutting_down: false,
        })
    }

    fn initialize(&mut self, id: Value, params: &Value) -> Value {
        let root = params
            .get("rootUri")
            .and_then(|v| v.as_str())
            .and_then(uri_to_path)
            .or_else(|| params.get("rootPath").and_then(|v| v.as_str()).map(PathBuf::from));

        if let Some(root) = root {
            match Workspace::open(&root) {
                Ok(ws) => self.workspace = ws,
                Err(e) => {
                    return json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32602, "message": format!("Cannot open workspace: {e:#}") }
                    })
                }
            }
        }

        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "capabilities": {
                    "positionEncoding": "utf-8",
                    "textDocumentSync": 1,
                    "documentSymbolProvider": true,
                    "referencesProvider": true,
                    "definitionProvider": true,
                    "documentHighlightProvider": true,
                    "completionProvider": {},
                    "workspaceSymbolProvider": true
                },
                "serverInfo": { "name": "symdex", "version": env!("CARGO_PKG_VERSION") }
            }
        })
    }

    fn request(&mut self, id: Value, method: &str, params: &Value) -> Value {
        let ok = |result: Value| {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result
            })
        };

        let err = |code: i64, msg: String| {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": code, "message": msg }
            })
        };

        if self.shutting_down && method != "shutdown" {
            return err(-32600, "Server is shutting down".to_string());
        }

        let ws = &self.workspace;
        match method {
            "ping" => ok(json!({})),
            "shutdown" => {
                self.shutting_down = true;
                ok(Value::Null)
            }
            "textDocument/documentSymbol" => {
                let Some(uri) = document_uri(params) else {
                    return err(-32602, "Missing textDocument.uri".to_string());
                };
                match ws.build_outline(uri) {
                    Some(symbols) => ok(Value::Array(symbols.iter().map(symbol_json).collect())),
                    None => ok(Value::Null),
                }
            }
            "textDocument/references" => {
                let Some((uri, pos)) = document_position(params) else {
                    return err(-32602, "Missing textDocument.uri or position".to_string());
                };
                let include_declaration = params
                    .pointer("/context/includeDeclaration")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let refs = ws.find_references(uri, pos, include_declaration);
                ok(Value::Array(refs.iter().map(location_json).collect()))
            }
            "textDocument/definition" => {
                let Some((uri, pos)) = document_position(params) else {
                    return err(-32602, "Missing textDocument.uri or position".to_string());
                };
                let defs = ws.find_definitions(uri, pos);
                ok(Value::Array(defs.iter().map(location_json).collect()))
            }
            "textDocument/documentHighlight" => {
                let Some((uri, pos)) = document_position(params) else {
                    return err(-32602, "Missing textDocument.uri or position".to_string());
                };
                let spans = ws.document_highlights(uri, pos);
                ok(Value::Array(spans.iter().map(|s| json!({ "range": s })).collect()))
            }
            "textDocument/completion" => {
                let Some((uri, pos)) = document_position(params) else {
                    return err(-32602, "Missing textDocument.uri or position".to_string());
                };
                let mut items: Vec<_> = ws.complete(uri, pos).into_values().collect();
                items.sort_by(|a, b| a.label.cmp(&b.label));
                let items: Vec<Value> = items
                    .into_iter()
                    .map(|c| match c.kind {
                        Some(k) => json!({ "label": c.label, "kind": completion_item_kind(k) }),
                        None => json!({ "label": c.label }),
                    })
                    .collect();
                ok(json!({ "isIncomplete": false, "items": items }))
            }
            "workspace/symbol" => {
                let query = params.get("query").and_then(|v| v.as_str()).unwrap_or("");
                let mode = match params.get("mode").and_then(|v| v.as_str()) {
                    Some(m) => match m.parse::<SymbolSearchMode>() {
                        Ok(m) => Some(m),
                        Err(e) => return err(-32602, e.to_string()),
                    },
                    None => None,
                };
                // A cancelled search answers with what it found so far.
                let cancel = self.cancels.register(&id);
                let found = self
                    .runtime
                    .block_on(ws.search_workspace_symbols(query, mode, &cancel));
                ok(Value::Array(found.iter().map(workspace_symbol_json).collect()))
            }
            _ => err(-32601, format!("Method not found: {method}")),
        }
    }

    fn notification(&mut self, method: &str, params: &Value) {
        let ws = &self.workspace;
        match method {
            "textDocument/didOpen" => {
                let Some(doc) = params.get("textDocument") else { return };
                let (Some(uri), Some(text)) = (
                    doc.get("uri").and_then(|v| v.as_str()),
                    doc.get("text").and_then(|v| v.as_str()),
                ) else {
                    return;
                };
                let language_id = doc.get("languageId").and_then(|v| v.as_str()).unwrap_or("");
                let version = doc.get("version").and_then(|v| v.as_i64()).unwrap_or(0);
                ws.open_document(uri, &resolve_language_id(uri, language_id), text, version);
            }
            "textDocument/didChange" => {
                let Some(uri) = document_uri(params) else { return };
                let version = params
                    .pointer("/textDocument/version")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                // Full sync: the last change carries the whole text.
                let text = params
                    .get("contentChanges")
                    .and_then(|c| c.as_array())
                    .and_then(|a| a.last())
                    .and_then(|c| c.get("text"))
                    .and_then(|t| t.as_str());
                if let Some(text) = text {
                    ws.change_document(uri, text, version);
                }
            }
            "textDocument/didClose" => {
                if let Some(uri) = document_uri(params) {
                    ws.close_document(uri);
                }
            }
            "workspace/didChangeWatchedFiles" => {
                let changes = params.get("changes").and_then(|c| c.as_array());
                for change in changes.into_iter().flatten() {
                    let Some(uri) = change.get("uri").and_then(|v| v.as_str()) else { continue };
                    match change.get("type").and_then(|v| v.as_u64()) {
                        Some(FILE_CREATED) => ws.on_file_added(uri),
                        Some(FILE_CHANGED) => ws.on_file_updated(uri),
                        Some(FILE_DELETED) => ws.on_file_removed(uri),
                        _ => {}
                    }
                }
                ws.update();
            }
            _ => {}
        }
    }
}

fn document_uri(params: &Value) -> Option<&str> {
    params.pointer("/textDocument/uri").and_then(|v| v.as_str())
}

fn document_position(params: &Value) -> Option<(&str, Position)> {
    let uri = document_uri(params)?;
    let pos = params.get("position")?;
    let line = pos.get("line")?.as_u64()?;
    let character = pos.get("character")?.as_u64()?;
    Some((uri, Position::new(line as u32, character as u32)))
}

/// Client language ids we don't register (e.g. `javascript`) fall back to the
/// file extension.
fn resolve_language_id(uri: &str, language_id: &str) -> String {
    let reg = registry();
    if reg.grammar(language_id).is_some() {
        return language_id.to_string();
    }
    uri_to_path(uri)
        .and_then(|p| reg.language_id_for_path(&p))
        .map(str::to_string)
        .unwrap_or_else(|| language_id.to_string())
}

fn location_json(loc: &Location) -> Value {
    json!({ "uri": loc.uri, "range": loc.span })
}

fn symbol_json(s: &Symbol) -> Value {
    json!({
        "name": s.name,
        "kind": s.kind.code(),
        "range": s.range,
        "selectionRange": s.selection_range,
        "children": s.children.iter().map(symbol_json).collect::<Vec<_>>(),
    })
}

fn workspace_symbol_json(s: &WorkspaceSymbol) -> Value {
    let mut v = json!({
        "name": s.name,
        "kind": s.kind.code(),
        "location": location_json(&s.location),
    });
    if let Some(c) = &s.container_name {
        v["containerName"] = json!(c);
    }
    v
}

/// LSP `CompletionItemKind` for a symbol kind.
fn completion_item_kind(kind: SymbolKind) -> u32 {
    match kind {
        SymbolKind::Method => 2,
        SymbolKind::Function => 3,
        SymbolKind::Constructor => 4,
        SymbolKind::Field => 5,
        SymbolKind::Variable => 6,
        SymbolKind::Class | SymbolKind::Object => 7,
        SymbolKind::Interface => 8,
        SymbolKind::Module | SymbolKind::Namespace | SymbolKind::Package => 9,
        SymbolKind::Property | SymbolKind::Key => 10,
        SymbolKind::Enum => 13,
        SymbolKind::File => 17,
        SymbolKind::EnumMember => 20,
        SymbolKind::Constant => 21,
        SymbolKind::Struct => 22,
        SymbolKind::Event => 23,
        SymbolKind::Operator => 24,
        SymbolKind::TypeParameter => 25,
        SymbolKind::String | SymbolKind::Number | SymbolKind::Boolean | SymbolKind::Array | SymbolKind::Null => 12,
    }
}

/// Read stdin on its own thread so `$/cancelRequest` is seen while the main
/// loop is busy. Everything else is forwarded in arrival order.
fn spawn_reader(cancels: CancelRegistry) -> mpsc::Receiver<Value> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { continue };
            if line.trim().is_empty() {
                continue;
            }
            let msg: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(_e) => {
                    crate::debug_log!("[symdex] dropping malformed message: {_e}");
                    continue;
                }
            };
            if !route_incoming(&cancels, &msg) {
                continue;
            }
            if tx.send(msg).is_err() {
                break;
            }
        }
    });
    rx
}

/// Handle `$/cancelRequest` in place and register request ids. Returns
/// whether the message still has to go to the main loop.
fn route_incoming(cancels: &CancelRegistry, msg: &Value) -> bool {
    let method = msg.get("method").and_then(|m| m.as_str()).unwrap_or("");
    if method == "$/cancelRequest" {
        if let Some(id) = msg.pointer("/params/id") {
            let _hit = cancels.cancel(id);
            crate::debug_log!("[symdex] cancel request {id}: in flight = {_hit}");
        }
        return false;
    }
    if let Some(id) = msg.get("id") {
        cancels.register(id);
    }
    true
}

pub fn run_stdio_server() -> Result<()> {
    let mut stdout = std::io::stdout();

    let mut state = ServerState::new()?;
    let incoming = spawn_reader(state.cancels.clone());

    for msg in incoming {
        let method = msg.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = msg.get("params").cloned().unwrap_or(json!({}));

        // Notifications carry no "id" and get no reply.
        let Some(id) = msg.get("id").cloned() else {
            if method == "exit" {
                break;
            }
            state.notification(method, &params);
            continue;
        };

        let reply = match method {
            "initialize" => state.initialize(id.clone(), &params),
            _ => state.request(id.clone(), method, &params),
        };
        state.cancels.finish(&id);

        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ServerState {
        ServerState::new().unwrap()
    }

    #[test]
    fn unknown_method_is_reported() {
        let mut s = state();
        let reply = s.request(json!(7), "textDocument/hover", &json!({}));
        assert_eq!(reply["error"]["code"], -32601);
        assert_eq!(reply["id"], 7);
    }

    #[test]
    fn open_then_outline_uses_numeric_kinds() {
        let mut s = state();
        s.notification(
            "textDocument/didOpen",
            &json!({ "textDocument": {
                "uri": "file:///mem/a.py", "languageId": "python", "version": 1,
                "text": "class A:\n    def run(self):\n        pass\n"
            }}),
        );
        let reply = s.request(
            json!(1),
            "textDocument/documentSymbol",
            &json!({ "textDocument": { "uri": "file:///mem/a.py" } }),
        );
        let root = &reply["result"][0];
        assert_eq!(root["name"], "A");
        assert_eq!(root["kind"], 5);
        assert_eq!(root["children"][0]["name"], "run");
        assert_eq!(root["children"][0]["kind"], 12);
        assert_eq!(root["selectionRange"]["start"]["character"], 6);
    }

    #[test]
    fn language_id_falls_back_to_extension() {
        assert_eq!(resolve_language_id("file:///x/app.js", "javascript"), "typescript");
        assert_eq!(resolve_language_id("file:///x/lib.rs", "rust"), "rust");
        assert_eq!(resolve_language_id("untitled:1", "plaintext"), "plaintext");
    }

    #[test]
    fn workspace_symbol_rejects_bad_mode() {
        let mut s = state();
        let reply = s.request(json!(2), "workspace/symbol", &json!({ "query": "a", "mode": "everything" }));
        assert_eq!(reply["error"]["code"], -32602);
    }

    #[test]
    fn cancel_only_reaches_registered_requests() {
        let cancels = CancelRegistry::default();
        assert!(!cancels.cancel(&json!(4)));

        let token = cancels.register(&json!(4));
        assert!(!cancels.cancel(&json!("4")));
        assert!(cancels.cancel(&json!(4)));
        assert!(token.is_cancelled());

        cancels.finish(&json!(4));
        assert_eq!(cancels.len(), 0);
        assert!(!cancels.cancel(&json!(4)));
    }

    #[test]
    fn cancel_requests_are_consumed_by_the_reader() {
        let cancels = CancelRegistry::default();
        let search = json!({ "jsonrpc": "2.0", "id": 9, "method": "workspace/symbol", "params": { "query": "x" } });
        assert!(route_incoming(&cancels, &search));
        assert_eq!(cancels.len(), 1);

        let cancel = json!({ "jsonrpc": "2.0", "method": "$/cancelRequest", "params": { "id": 9 } });
        assert!(!route_incoming(&cancels, &cancel));
        assert!(cancels.register(&json!(9)).is_cancelled());

        let opened = json!({ "jsonrpc": "2.0", "method": "textDocument/didOpen", "params": {} });
        assert!(route_incoming(&cancels, &opened));
        assert_eq!(cancels.len(), 1);
    }

    #[test]
    fn cancelled_workspace_symbol_returns_early() {
        let mut s = state();
        s.notification(
            "textDocument/didOpen",
            &json!({ "textDocument": {
                "uri": "file:///mem/b.py", "languageId": "python", "version": 1,
                "text": "def gather():\n    pass\n"
            }}),
        );
        let params = json!({ "query": "ga", "mode": "documents" });

        s.cancels.register(&json!(1));
        s.cancels.cancel(&json!(1));
        let reply = s.request(json!(1), "workspace/symbol", &params);
        assert_eq!(reply["result"], json!([]));

        let reply = s.request(json!(2), "workspace/symbol", &params);
        assert_eq!(reply["result"][0]["name"], "gather");
    }

    #[test]
    fn requests_after_shutdown_are_refused() {
        let mut s = state();
        assert!(s.request(json!(1), "shutdown", &json!(null))["result"].is_null());
        assert_eq!(s.request(json!(2), "ping", &json!({}))["error"]["code"], -32600);
    }
}
