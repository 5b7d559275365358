//! Recursive JSON chunker.
//!
//! Splits a JSON document into [`DocumentChunk`]s whose compact
//! serialization never exceeds `max_chunk_size` bytes. Each chunk is itself
//! a JSON object that keeps the path from the document root down to the
//! values it holds, so a chunk read on its own still says where its data
//! came from:
//!
//! ```text
//! {"docs":[{"title":"Deploy","url":"/d","body":"..."}, ...]}
//!   ──▶ {"docs":{"0":{"title":"Deploy","url":"/d","body":"..."}}}
//!   ──▶ {"docs":{"1":{...}}}
//! ```
//!
//! Arrays are walked like objects keyed by index. Entries are packed into
//! the current chunk while they fit; once the chunk holds at least
//! `min_chunk_size` bytes and the next entry does not fit, a new chunk is
//! started. A string leaf too large for any chunk is split at whitespace
//! into several chunks under the same path.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{ChunkMetadata, DocumentChunk};

/// Worst-case serialized size of one character (`\u001f`).
const MAX_ESCAPED_CHAR: usize = 6;

/// Split `value` into size-bounded chunks. Indices are contiguous from 0.
pub fn split_json(value: &Value, source: &str, config: &ChunkingConfig) -> Vec<DocumentChunk> {
    let mut splitter = JsonSplitter::new(
        config.max_chunk_size,
        config.effective_min_chunk_size(),
    );
    let mut path = Vec::new();
    splitter.walk(value, &mut path);

    splitter
        .finish()
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| make_chunk(source, index as i64, &chunk))
        .collect()
}

struct JsonSplitter {
    max: usize,
    min: usize,
    closed: Vec<Value>,
    open: Map<String, Value>,
}

impl JsonSplitter {
    fn new(max: usize, min: usize) -> Self {
        Self {
            max,
            min,
            closed: Vec::new(),
            open: Map::new(),
        }
    }

    fn walk(&mut self, value: &Value, path: &mut Vec<String>) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    path.push(key.clone());
                    self.entry(child, path);
                    path.pop();
                }
            }
            Value::Array(items) if !items.is_empty() => {
                for (index, child) in items.iter().enumerate() {
                    path.push(index.to_string());
                    self.entry(child, path);
                    path.pop();
                }
            }
            leaf => self.leaf(leaf, path),
        }
    }

    fn entry(&mut self, value: &Value, path: &mut Vec<String>) {
        if self.try_insert(path, value) {
            return;
        }
        if serialized_len(&self.open) >= self.min {
            self.close();
            if self.try_insert(path, value) {
                return;
            }
        }
        self.walk(value, path);
    }

    fn leaf(&mut self, value: &Value, path: &[String]) {
        if path.is_empty() {
            self.close();
            if value.to_string().len() <= self.max {
                self.closed.push(value.clone());
            } else {
                self.emit_bare(&leaf_text(value));
            }
            return;
        }

        if self.try_insert(path, value) {
            return;
        }
        self.close();
        if self.try_insert(path, value) {
            return;
        }

        let text = leaf_text(value);
        let mut skeleton = Map::new();
        set_nested(&mut skeleton, path, Value::String(String::new()));
        let overhead = serialized_len(&skeleton);

        if overhead + MAX_ESCAPED_CHAR > self.max {
            self.emit_bare(&text);
            return;
        }

        let budget = self.max - overhead;
        for segment in segment_text(&text, budget) {
            let mut chunk = Map::new();
            set_nested(&mut chunk, path, Value::String(segment));
            self.closed.push(Value::Object(chunk));
        }
    }

    /// Emit `text` as standalone JSON strings.
    fn emit_bare(&mut self, text: &str) {
        let budget = self.max.saturating_sub(2);
        for segment in segment_text(text, budget) {
            self.closed.push(Value::String(segment));
        }
    }

    fn try_insert(&mut self, path: &[String], value: &Value) -> bool {
        let mut trial = self.open.clone();
        set_nested(&mut trial, path, value.clone());
        if serialized_len(&trial) <= self.max {
            self.open = trial;
            true
        } else {
            false
        }
    }

    fn close(&mut self) {
        if !self.open.is_empty() {
            self.closed.push(Value::Object(std::mem::take(&mut self.open)));
        }
    }

    fn finish(mut self) -> Vec<Value> {
        self.close();
        self.closed
            .into_iter()
            .filter(|chunk| !is_empty_chunk(chunk))
            .collect()
    }
}

fn set_nested(target: &mut Map<String, Value>, path: &[String], value: Value) {
    match path {
        [] => {}
        [last] => {
            target.insert(last.clone(), value);
        }
        [head, rest @ ..] => {
            let slot = target
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                set_nested(inner, rest, value);
            }
        }
    }
}

fn serialized_len(map: &Map<String, Value>) -> usize {
    serde_json::to_string(map).map(|s| s.len()).unwrap_or(usize::MAX)
}

/// Bytes `text` occupies inside a JSON string literal, quotes excluded.
fn escaped_len(text: &str) -> usize {
    serde_json::to_string(text)
        .map(|s| s.len() - 2)
        .unwrap_or(usize::MAX)
}

fn leaf_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Greedy split at whitespace so each segment's escaped length fits
/// `budget`. Words longer than the budget are cut between characters.
fn segment_text(text: &str, budget: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for word in text.split_inclusive(char::is_whitespace) {
        if escaped_len(&current) + escaped_len(word) <= budget {
            current.push_str(word);
            continue;
        }
        if !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
        if escaped_len(word) <= budget {
            current.push_str(word);
            continue;
        }
        for ch in word.chars() {
            let mut buf = [0u8; 4];
            let piece = ch.encode_utf8(&mut buf);
            if !current.is_empty() && escaped_len(&current) + escaped_len(piece) > budget {
                segments.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect()
}

fn is_empty_chunk(chunk: &Value) -> bool {
    match chunk {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        Value::Null => true,
        _ => false,
    }
}

/// First string value stored under `key` anywhere in `value`, depth first.
fn find_string(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get(key) {
                return Some(s.clone());
            }
            map.values().find_map(|v| find_string(v, key))
        }
        Value::Array(items) => items.iter().find_map(|v| find_string(v, key)),
        _ => None,
    }
}

fn make_chunk(source: &str, index: i64, value: &Value) -> DocumentChunk {
    let content = value.to_string();

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    DocumentChunk {
        id: Uuid::new_v4().to_string(),
        metadata: ChunkMetadata {
            source: source.to_string(),
            chunk_index: index,
            title: find_string(value, "title"),
            url: find_string(value, "url"),
        },
        content,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(max: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chunk_size: max,
            min_chunk_size: None,
        }
    }

    fn assert_bounded(chunks: &[DocumentChunk], max: usize) {
        for c in chunks {
            assert!(
                c.content.len() <= max,
                "chunk {} is {} bytes (max {}): {}",
                c.metadata.chunk_index,
                c.content.len(),
                max,
                c.content
            );
            serde_json::from_str::<Value>(&c.content).expect("chunk is valid JSON");
        }
    }

    fn docs(n: usize, body_len: usize) -> Value {
        let items: Vec<Value> = (0..n)
            .map(|i| {
                json!({
                    "title": format!("Doc {}", i),
                    "url": format!("https://kb.local/doc/{}", i),
                    "body": "lorem ipsum ".repeat(body_len / 12 + 1),
                })
            })
            .collect();
        json!({ "docs": items })
    }

    #[test]
    fn small_document_is_one_chunk() {
        let value = json!({"title": "Intro", "url": "/intro", "body": "hi"});
        let chunks = split_json(&value, "src", &config(300));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, r#"{"title":"Intro","url":"/intro","body":"hi"}"#);
        assert_eq!(chunks[0].metadata.title.as_deref(), Some("Intro"));
        assert_eq!(chunks[0].metadata.url.as_deref(), Some("/intro"));
        assert_eq!(chunks[0].metadata.source, "src");
    }

    #[test]
    fn chunks_keep_their_path() {
        let value = docs(6, 80);
        let chunks = split_json(&value, "src", &config(300));
        assert!(chunks.len() > 1);
        for c in &chunks {
            let parsed: Value = serde_json::from_str(&c.content).unwrap();
            assert!(parsed.get("docs").is_some(), "missing path in {}", c.content);
        }
        assert_bounded(&chunks, 300);
    }

    #[test]
    fn indices_are_contiguous() {
        let chunks = split_json(&docs(20, 100), "src", &config(200));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.metadata.chunk_index, i as i64);
        }
    }

    #[test]
    fn bound_holds_across_shapes_and_sizes() {
        let long_words = "supercalifragilisticexpialidocious".repeat(40);
        let shapes = vec![
            docs(15, 500),
            json!({"a": {"b": {"c": {"d": "x ".repeat(400)}}}}),
            json!([1, 2, 3, [4, 5, [6, 7, {"deep": "y".repeat(900)}]]]),
            json!({"unbroken": long_words}),
            json!({"quotes": "\"\\\u{1}\n".repeat(200)}),
            json!({"emoji": "💥 ".repeat(300)}),
            json!("a top level string ".repeat(60)),
            json!({"nums": (0..300).collect::<Vec<_>>()}),
        ];

        for max in [16, 40, 100, 300, 1000] {
            for shape in &shapes {
                let chunks = split_json(shape, "src", &config(max));
                assert!(!chunks.is_empty());
                assert_bounded(&chunks, max);
            }
        }
    }

    #[test]
    fn oversized_string_keeps_all_words() {
        let body = (0..200).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let value = json!({"page": {"body": body.clone()}});
        let chunks = split_json(&value, "src", &config(100));
        assert!(chunks.len() > 1);

        let mut rebuilt = String::new();
        for c in &chunks {
            let parsed: Value = serde_json::from_str(&c.content).unwrap();
            rebuilt.push_str(parsed["page"]["body"].as_str().unwrap());
        }
        assert_eq!(rebuilt, body);
    }

    #[test]
    fn deep_path_falls_back_to_bare_segments() {
        let key = "k".repeat(30);
        let value = json!({ key.clone(): { key.clone(): "word ".repeat(20) } });
        let chunks = split_json(&value, "src", &config(40));
        assert_bounded(&chunks, 40);
        assert!(chunks
            .iter()
            .any(|c| serde_json::from_str::<Value>(&c.content).unwrap().is_string()));
    }

    #[test]
    fn empty_documents_yield_no_chunks() {
        assert!(split_json(&json!({}), "src", &config(300)).is_empty());
        assert!(split_json(&json!([]), "src", &config(300)).is_empty());
        assert!(split_json(&json!(null), "src", &config(300)).is_empty());
    }

    #[test]
    fn keys_keep_source_order() {
        let value = json!({"zeta": 1, "alpha": 2, "mid": 3});
        let chunks = split_json(&value, "src", &config(300));
        assert_eq!(chunks[0].content, r#"{"zeta":1,"alpha":2,"mid":3}"#);
    }

    #[test]
    fn metadata_comes_from_the_chunk_itself() {
        let value = json!({
            "first": {"title": "One", "url": "/one", "body": "a ".repeat(60)},
            "second": {"body": "b ".repeat(60)}
        });
        let chunks = split_json(&value, "src", &config(160));
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].metadata.title.as_deref(), Some("One"));
        let last = chunks.last().unwrap();
        assert!(last.content.contains("second"));
        assert_eq!(last.metadata.title, None);
    }

    #[test]
    fn hashes_are_content_addressed() {
        let value = docs(4, 200);
        let a = split_json(&value, "src", &config(200));
        let b = split_json(&value, "src", &config(200));
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.content, y.content);
            assert_eq!(x.hash, y.hash);
            assert_ne!(x.id, y.id);
        }
    }

    #[test]
    fn segment_text_respects_budget() {
        let segments = segment_text("alpha beta gamma delta", 11);
        assert_eq!(segments, vec!["alpha beta ", "gamma delta"]);
        for s in segment_text(&"x".repeat(25), 10) {
            assert!(s.len() <= 10);
        }
    }
}
