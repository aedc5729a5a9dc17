//! Event log sinks
//!
//! Every accepted message produces exactly one [`LogEvent`], appended to the
//! node's event log as a JSON line. Writing is best effort: a failed append is
//! reported to the caller and never stops the protocol.

use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

use floodmesh_core::{LogEvent, PersistError};

/// Destination for receipt events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append one event
    async fn append(&self, event: &LogEvent) -> Result<(), PersistError>;
}

/// Newline-delimited JSON event log on disk
///
/// The file is opened in append mode on first use and reopened after a
/// failed write. Appends are serialized, so file order is submission order.
///
/// A file left ending mid-line (a write that failed partway, or a crashed
/// writer) is terminated before the next record, so every record starts on
/// its own line.
pub struct JsonlEventLog {
    path: PathBuf,
    file: tokio::sync::Mutex<Option<File>>,
}

impl JsonlEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: tokio::sync::Mutex::new(None),
        }
    }

    async fn open(&self) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
    }

    /// Whether the file's last byte is something other than a newline
    async fn ends_mid_line(&self) -> std::io::Result<bool> {
        let mut file = File::open(&self.path).await?;
        if file.metadata().await?.len() == 0 {
            return Ok(false);
        }

        file.seek(SeekFrom::End(-1)).await?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await?;
        Ok(last[0] != b'\n')
    }
}

#[async_trait]
impl EventSink for JsonlEventLog {
    async fn append(&self, event: &LogEvent) -> Result<(), PersistError> {
        let mut line = event.to_json_line()?;
        line.push('\n');

        let mut guard = self.file.lock().await;
        let mut file = match guard.take() {
            Some(file) => file,
            None => {
                let file = self.open().await?;
                if self.ends_mid_line().await? {
                    warn!(
                        path = %self.path.display(),
                        "Event log ends mid-line, starting a new line"
                    );
                    line.insert(0, '\n');
                }
                file
            }
        };

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        *guard = Some(file);
        Ok(())
    }
}

/// In-memory sink for tests and simulations
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<LogEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events appended so far, in order
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl EventSink for MemoryEventLog {
    async fn append(&self, event: &LogEvent) -> Result<(), PersistError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodmesh_core::{Message, SensorPayload};
    use std::net::SocketAddr;

    fn event(node: &str) -> LogEvent {
        let message = Message::originate(
            "node1",
            SensorPayload::from([("temperature", 21.5), ("humidity", 48.25)]),
            10,
        )
        .relayed();
        LogEvent::receipt(node, SocketAddr::from(([10, 0, 0, 1], 5000)), &message)
    }

    #[tokio::test]
    async fn test_jsonl_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");

        let log = JsonlEventLog::new(&path);
        log.append(&event("node2")).await.unwrap();
        log.append(&event("node2")).await.unwrap();

        // A second writer appends instead of truncating
        let reopened = JsonlEventLog::new(&path);
        reopened.append(&event("node2")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(contents.ends_with('\n'));

        let parsed: LogEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.receiving_node, "node2");
        assert_eq!(parsed.hop, 2);
        assert_eq!(parsed.ttl_remaining, 9);
    }

    #[tokio::test]
    async fn test_jsonl_unwritable_path_is_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlEventLog::new(dir.path().join("missing").join("events.json"));

        let result = log.append(&event("node2")).await;
        assert!(matches!(result, Err(PersistError::Io(_))));
    }

    #[tokio::test]
    async fn test_jsonl_recovers_after_failed_append() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let path = logs.join("events.json");
        let log = JsonlEventLog::new(&path);

        assert!(log.append(&event("node2")).await.is_err());

        std::fs::create_dir(&logs).unwrap();
        log.append(&event("node3")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: LogEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.receiving_node, "node3");
    }

    #[tokio::test]
    async fn test_jsonl_terminates_partial_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, br#"{"node":"node2","from":"10.0"#).unwrap();

        let log = JsonlEventLog::new(&path);
        log.append(&event("node2")).await.unwrap();
        log.append(&event("node3")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], r#"{"node":"node2","from":"10.0"#);

        let nodes: Vec<String> = lines[1..]
            .iter()
            .map(|line| serde_json::from_str::<LogEvent>(line).unwrap().receiving_node)
            .collect();
        assert_eq!(nodes, vec!["node2", "node3"]);
    }

    #[tokio::test]
    async fn test_memory_log_keeps_order() {
        let log = MemoryEventLog::new();
        assert!(log.is_empty());

        tokio_test::assert_ok!(log.append(&event("a")).await);
        tokio_test::assert_ok!(log.append(&event("b")).await);

        let nodes: Vec<_> = log.events().into_iter().map(|e| e.receiving_node).collect();
        assert_eq!(nodes, vec!["a", "b"]);
    }
}
