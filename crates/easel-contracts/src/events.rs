use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Keys every event carries. Payload entries with these names are dropped.
pub const RESERVED_KEYS: [&str; 4] = ["type", "session_id", "seq", "ts"];

/// Append-only JSONL log of one session's activity.
///
/// Lines are numbered with `seq` starting at 0, in the order they hit the
/// file. Clones share the file and the counter.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<SessionLog>,
}

#[derive(Debug)]
struct SessionLog {
    path: PathBuf,
    session_id: String,
    next_seq: Mutex<u64>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(SessionLog {
                path: path.into(),
                session_id: session_id.into(),
                next_seq: Mutex::new(0),
            }),
        }
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        if let Some(parent) = self.shared.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut next_seq = self
            .shared
            .next_seq
            .lock()
            .map_err(|_| anyhow::anyhow!("event log for {} poisoned", self.shared.session_id))?;

        let mut event = Map::new();
        event.insert("type".to_string(), Value::from(event_type));
        event.insert("session_id".to_string(), Value::from(self.shared.session_id.as_str()));
        event.insert("seq".to_string(), Value::from(*next_seq));
        event.insert(
            "ts".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        event.extend(
            payload
                .into_iter()
                .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str())),
        );

        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.shared.path)?
            .write_all(&line)?;
        *next_seq += 1;

        Ok(Value::Object(event))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let mut payload = EventPayload::new();
        payload.insert("model".to_string(), Value::String("dryrun-image-1".to_string()));
        let emitted = writer.emit("session_started", payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("session_started".to_string()));
        assert_eq!(parsed["session_id"], Value::String("session-123".to_string()));
        assert_eq!(parsed["model"], Value::String("dryrun-image-1".to_string()));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_cannot_replace_reserved_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-123");

        let mut payload = EventPayload::new();
        payload.insert("type".to_string(), Value::from("override"));
        payload.insert("seq".to_string(), Value::from(99));
        payload.insert("to".to_string(), Value::from("composing"));
        let emitted = writer.emit("phase_changed", payload)?;

        assert_eq!(emitted["type"], Value::from("phase_changed"));
        assert_eq!(emitted["seq"], Value::from(0));
        assert_eq!(emitted["to"], Value::from("composing"));
        Ok(())
    }

    #[test]
    fn clones_share_the_sequence() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        writer.emit("one", EventPayload::new())?;
        writer.clone().emit("two", EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let types: Vec<String> = content
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect();
        assert_eq!(types, vec!["one", "two"]);

        let seqs: Vec<u64> = content
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("seq").and_then(Value::as_u64))
            .collect();
        assert_eq!(seqs, vec![0, 1]);
        Ok(())
    }
}
