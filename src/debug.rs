use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value, json};

/// Append-only JSONL trace shared by every render of one renderer.
#[derive(Clone)]
pub struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: BTreeMap<String, u64>,
}

impl std::fmt::Debug for DebugLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLogger").finish_non_exhaustive()
    }
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: BTreeMap::new(),
            })),
        })
    }

    /// Writes one `{"type": event, ...fields}` line and counts the event.
    pub fn log_event(&self, event: &str, fields: Value) {
        let mut record = Map::new();
        record.insert("type".to_string(), Value::String(event.to_string()));
        if let Value::Object(fields) = fields {
            record.extend(fields);
        }
        if let Ok(mut state) = self.inner.lock() {
            let _ = serde_json::to_writer(&mut state.writer, &Value::Object(record));
            let _ = state.writer.write_all(b"\n");
            let entry = state.counters.entry(event.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    /// Writes the accumulated counters and resets them.
    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let counts = std::mem::take(&mut state.counters);
            let line = json!({
                "type": "render.summary",
                "context": context,
                "counts": counts,
            });
            let _ = serde_json::to_writer(&mut state.writer, &line);
            let _ = state.writer.write_all(b"\n");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}
