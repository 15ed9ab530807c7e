use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

#[test]
fn stdio_smoke() {
    // `cargo test` sets this for integration tests.
    let bin = env!("CARGO_BIN_EXE_symdex");
    let root = tempfile::TempDir::new().expect("temp workspace");
    std::fs::write(
        root.path().join("geometry.rs"),
        "pub struct Point { x: i32 }\n\nfn make_point() -> Point { Point { x: 1 } }\n",
    )
    .expect("write fixture");
    let root_uri = format!("file://{}", root.path().display());

    let mut child = Command::new(bin)
        .arg("serve")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn symdex serve");

    let messages = [
        serde_json::json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": { "rootUri": root_uri }
        }),
        serde_json::json!({
            "jsonrpc": "2.0", "method": "textDocument/didOpen",
            "params": { "textDocument": {
                "uri": "file:///scratch/notes.py", "languageId": "python", "version": 1,
                "text": "class Notebook:\n    def page(self):\n        pass\n"
            }}
        }),
        serde_json::json!({
            "jsonrpc": "2.0", "id": 2, "method": "textDocument/documentSymbol",
            "params": { "textDocument": { "uri": "file:///scratch/notes.py" } }
        }),
        serde_json::json!({
            "jsonrpc": "2.0", "id": 3, "method": "workspace/symbol",
            "params": { "query": "mp" }
        }),
        serde_json::json!({
            "jsonrpc": "2.0", "id": 4, "method": "textDocument/hover",
            "params": {}
        }),
        serde_json::json!({ "jsonrpc": "2.0", "id": 5, "method": "shutdown" }),
        serde_json::json!({ "jsonrpc": "2.0", "method": "exit" }),
    ];

    {
        let stdin = child.stdin.as_mut().expect("child stdin");
        // Keep each JSON-RPC message on one line (server reads by lines()).
        for m in &messages {
            writeln!(stdin, "{m}").unwrap();
        }
    }
    drop(child.stdin.take());

    let stdout = child.stdout.take().expect("child stdout");
    let reader = BufReader::new(stdout);

    let mut replies_by_id: HashMap<i64, serde_json::Value> = HashMap::new();
    for line in reader.lines() {
        let line = line.expect("read stdout line");
        if line.trim().is_empty() {
            continue;
        }
        let v: serde_json::Value = serde_json::from_str(&line).expect("stdout is json");
        let id = v.get("id").and_then(|x| x.as_i64()).expect("json-rpc response id");
        replies_by_id.insert(id, v);
    }

    let status = child.wait().expect("wait child");
    assert!(status.success(), "server should exit cleanly");
    assert_eq!(replies_by_id.len(), 5, "one reply per request, none for notifications");

    // initialize
    {
        let v = &replies_by_id[&1];
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["result"]["capabilities"]["documentSymbolProvider"], true);
    }

    // documentSymbol on the open buffer
    {
        let result = &replies_by_id[&2]["result"];
        assert_eq!(result[0]["name"], "Notebook");
        assert_eq!(result[0]["kind"], 5);
        assert_eq!(result[0]["children"][0]["name"], "page");
    }

    // workspace/symbol reaches the indexed file on disk
    {
        let found = replies_by_id[&3]["result"].as_array().expect("symbol array");
        let names: Vec<&str> = found.iter().filter_map(|s| s["name"].as_str()).collect();
        assert_eq!(names, vec!["make_point"]);
        assert!(found[0]["location"]["uri"]
            .as_str()
            .unwrap_or("")
            .ends_with("geometry.rs"));
    }

    assert_eq!(replies_by_id[&4]["error"]["code"], -32601);
    assert!(replies_by_id[&5]["result"].is_null());
}
