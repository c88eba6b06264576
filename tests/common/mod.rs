#![allow(dead_code)]

use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Default)]
pub struct IndexState {
    pub docs: BTreeMap<String, Value>,
    pub updates: Vec<(String, Value)>,
    pub requests: Vec<String>,
}

/// Minimal Elasticsearch stand-in serving one connection at a time.
pub struct FakeElastic {
    pub url: String,
    pub state: Arc<Mutex<IndexState>>,
}

impl FakeElastic {
    pub fn start(docs: BTreeMap<String, Value>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}", listener.local_addr().expect("addr"));
        let state = Arc::new(Mutex::new(IndexState {
            docs,
            ..IndexState::default()
        }));
        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                handle(stream, &shared);
            }
        });
        Self { url, state }
    }

    pub fn updates(&self) -> Vec<(String, Value)> {
        self.state.lock().expect("lock").updates.clone()
    }

    pub fn doc(&self, id: &str) -> Option<Value> {
        self.state.lock().expect("lock").docs.get(id).cloned()
    }
}

fn hits(docs: &[(&String, &Value)]) -> Value {
    let hits: Vec<Value> = docs
        .iter()
        .enumerate()
        .map(|(n, (id, source))| json!({"_id": id, "_source": source, "sort": [n]}))
        .collect();
    json!({"hits": {"hits": hits}})
}

fn route(method: &str, path: &str, body: &Value, state: &mut IndexState) -> (u16, Value) {
    let path = path.split('?').next().unwrap_or(path);
    let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
    match (method, parts.as_slice()) {
        ("GET", [""]) => (200, json!({"version": {"number": "8.14.0"}})),
        ("POST", [_, "_pit"]) => (200, json!({"id": "pit-1"})),
        ("DELETE", ["_pit"]) => (200, json!({"succeeded": true})),
        ("POST", ["_search"]) => {
            if body.get("search_after").is_some() {
                return (200, json!({"pit_id": "pit-1", "hits": {"hits": []}}));
            }
            let docs: Vec<(&String, &Value)> = state.docs.iter().collect();
            let mut page = hits(&docs);
            page["pit_id"] = json!("pit-1");
            (200, page)
        }
        ("POST", [_, "_search"]) => {
            let wanted = body["query"]["match"]["_id"].as_str().unwrap_or_default();
            let docs: Vec<(&String, &Value)> =
                state.docs.iter().filter(|(id, _)| id.as_str() == wanted).collect();
            (200, hits(&docs))
        }
        ("POST", [_, "_update", id]) => {
            let id = id.to_string();
            state.updates.push((id.clone(), body.clone()));
            let Some(doc) = state.docs.get_mut(&id) else {
                return (404, json!({"error": "document_missing_exception"}));
            };
            if let (Some(target), Some(fields)) = (doc.as_object_mut(), body["doc"].as_object()) {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            }
            (200, json!({"result": "updated", "_shards": {"total": 1, "successful": 1, "failed": 0}}))
        }
        _ => (404, json!({"error": "no route"})),
    }
}

fn handle(stream: TcpStream, state: &Arc<Mutex<IndexState>>) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() || line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }
    let mut raw = vec![0u8; content_length];
    if reader.read_exact(&mut raw).is_err() {
        return;
    }
    let body: Value = serde_json::from_slice(&raw).unwrap_or(Value::Null);

    let mut words = request_line.split_whitespace();
    let method = words.next().unwrap_or_default().to_string();
    let path = words.next().unwrap_or_default().to_string();

    let (status, payload) = {
        let mut guard = state.lock().expect("lock");
        guard.requests.push(format!("{method} {path}"));
        route(&method, &path, &body, &mut guard)
    };
    let text = payload.to_string();
    let response = format!(
        "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{text}",
        text.len()
    );
    let mut stream = reader.into_inner();
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/usr/bin/env bash\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

pub fn ta_migrate(tmp: &Path, es: &FakeElastic, root: &Path, lookup: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ta-migrate");
    cmd.current_dir(tmp)
        .env("TA_MIGRATE_CONFIG_PATH", tmp.join("absent-config.toml"))
        .env("TA_MIGRATE_HOME", tmp)
        .env("ES_URL", &es.url)
        .env("TA_SOURCE_DIR", root)
        .env("TA_LOOKUP_BIN", lookup)
        .env("TA_LOOKUP_DELAY_SECS", "0")
        .env("TA_MIGRATION_DELAY_SECS", "0")
        .env("TA_INDEX_TIMEOUT_SECS", "5");
    cmd
}
