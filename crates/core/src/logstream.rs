//! Operator-facing log streams
//!
//! Every lifecycle operation that mutates a container narrates its steps into an
//! append-only per-gitspace stream. Streams are opened per operation and must be
//! flushed before the operation returns.
//!
//! The file-backed implementation writes JSON Lines, one entry per line:
//!
//! ```text
//! {"timestamp":"2024-05-01T10:00:00Z","gitspaceId":42,"message":"Pulling image: alpine"}
//! ```

use crate::errors::LogStreamError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories_next::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Result type for log stream operations
pub type LogResult<T> = std::result::Result<T, LogStreamError>;

/// One entry of a gitspace log stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub gitspace_id: i64,
    pub message: String,
}

/// Append-only sink for one gitspace's operator log
#[async_trait]
pub trait LogStream: Send {
    /// Append a line
    async fn write(&mut self, line: &str) -> LogResult<()>;

    /// Make every written line durable
    async fn flush(&mut self) -> LogResult<()>;
}

/// Opens log streams by gitspace id
#[async_trait]
pub trait LogStreamFactory: Send + Sync {
    async fn create_log_stream(&self, gitspace_id: i64) -> LogResult<Box<dyn LogStream>>;
}

/// Directory used for log files when none is configured
///
/// `GITSPACE_LOG_DIR` wins, then the platform data directory, then `.gitspace/logs`.
pub fn default_log_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("GITSPACE_LOG_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    match ProjectDirs::from("io", "gitspace", "gitspace") {
        Some(dirs) => dirs.data_dir().join("logs"),
        None => PathBuf::from(".gitspace").join("logs"),
    }
}

/// Factory writing one JSON Lines file per gitspace
#[derive(Debug, Clone)]
pub struct FileLogStreamFactory {
    dir: PathBuf,
}

impl FileLogStreamFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for `gitspace_id`
    pub fn log_path(&self, gitspace_id: i64) -> PathBuf {
        self.dir.join(format!("gitspace-{}.jsonl", gitspace_id))
    }
}

impl Default for FileLogStreamFactory {
    fn default() -> Self {
        Self::new(default_log_dir())
    }
}

#[async_trait]
impl LogStreamFactory for FileLogStreamFactory {
    #[instrument(skip(self))]
    async fn create_log_stream(&self, gitspace_id: i64) -> LogResult<Box<dyn LogStream>> {
        let path = self.log_path(gitspace_id);
        Ok(Box::new(FileLogStream::open(&path, gitspace_id)?))
    }
}

/// Buffered JSON Lines stream appending to a file
///
/// Lines collect in a `BufWriter` and reach the file on `flush` or when the
/// buffer fills. The file I/O is synchronous and runs on the calling task,
/// which is fine for line-sized narration but not for bulk output.
#[derive(Debug)]
pub struct FileLogStream {
    gitspace_id: i64,
    writer: BufWriter<File>,
}

impl FileLogStream {
    /// Open (or create) `path` in append mode, creating parent directories
    pub fn open(path: &Path, gitspace_id: i64) -> LogResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!("Opened log stream {}", path.display());
        Ok(Self {
            gitspace_id,
            writer: BufWriter::new(file),
        })
    }
}

#[async_trait]
impl LogStream for FileLogStream {
    async fn write(&mut self, line: &str) -> LogResult<()> {
        let entry = LogEntry {
            timestamp: Utc::now(),
            gitspace_id: self.gitspace_id,
            message: line.to_string(),
        };
        let json = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{}", json)?;
        Ok(())
    }

    async fn flush(&mut self) -> LogResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Read every entry of a JSON Lines log file
pub fn read_log_file(path: &Path) -> LogResult<Vec<LogEntry>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(LogStreamError::from))
        .collect()
}

pub mod mock {
    //! In-memory log streams for tests
    //!
    //! All streams created by one factory share a single entry list, so a test
    //! can inspect what an operation wrote after it returns. Writes, flushes and
    //! stream creation can be made to fail.

    use super::{LogEntry, LogResult, LogStream, LogStreamFactory};
    use crate::errors::LogStreamError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    struct Failures {
        create: bool,
        write_containing: Option<String>,
        flush: bool,
    }

    /// Factory of in-memory log streams
    #[derive(Debug, Clone, Default)]
    pub struct MemoryLogStreamFactory {
        entries: Arc<Mutex<Vec<LogEntry>>>,
        flushes: Arc<Mutex<Vec<i64>>>,
        failures: Arc<Mutex<Failures>>,
    }

    impl MemoryLogStreamFactory {
        pub fn new() -> Self {
            Self::default()
        }

        /// All entries written through any stream, in order
        pub fn entries(&self) -> Vec<LogEntry> {
            self.entries.lock().unwrap().clone()
        }

        /// Messages written for one gitspace, in order
        pub fn messages(&self, gitspace_id: i64) -> Vec<String> {
            self.entries()
                .into_iter()
                .filter(|e| e.gitspace_id == gitspace_id)
                .map(|e| e.message)
                .collect()
        }

        /// Gitspace ids of every successful flush, in order
        pub fn flushes(&self) -> Vec<i64> {
            self.flushes.lock().unwrap().clone()
        }

        /// Make `create_log_stream` fail
        pub fn fail_create(&self) {
            self.failures.lock().unwrap().create = true;
        }

        /// Make writes of lines containing `pattern` fail
        pub fn fail_writes_containing(&self, pattern: &str) {
            self.failures.lock().unwrap().write_containing = Some(pattern.to_string());
        }

        /// Make every flush fail
        pub fn fail_flush(&self) {
            self.failures.lock().unwrap().flush = true;
        }
    }

    #[async_trait]
    impl LogStreamFactory for MemoryLogStreamFactory {
        async fn create_log_stream(&self, gitspace_id: i64) -> LogResult<Box<dyn LogStream>> {
            if self.failures.lock().unwrap().create {
                return Err(LogStreamError::Closed { gitspace_id });
            }
            Ok(Box::new(MemoryLogStream {
                gitspace_id,
                factory: self.clone(),
            }))
        }
    }

    /// Stream appending to its factory's shared entry list
    #[derive(Debug)]
    pub struct MemoryLogStream {
        gitspace_id: i64,
        factory: MemoryLogStreamFactory,
    }

    #[async_trait]
    impl LogStream for MemoryLogStream {
        async fn write(&mut self, line: &str) -> LogResult<()> {
            let failing = self
                .factory
                .failures
                .lock()
                .unwrap()
                .write_containing
                .as_ref()
                .is_some_and(|p| line.contains(p.as_str()));
            if failing {
                return Err(LogStreamError::Io(std::io::Error::other(format!(
                    "write rejected: {}",
                    line
                ))));
            }
            self.factory.entries.lock().unwrap().push(LogEntry {
                timestamp: Utc::now(),
                gitspace_id: self.gitspace_id,
                message: line.to_string(),
            });
            Ok(())
        }

        async fn flush(&mut self) -> LogResult<()> {
            if self.factory.failures.lock().unwrap().flush {
                return Err(LogStreamError::Closed {
                    gitspace_id: self.gitspace_id,
                });
            }
            self.factory.flushes.lock().unwrap().push(self.gitspace_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MemoryLogStreamFactory;
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_stream_appends_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let factory = FileLogStreamFactory::new(temp_dir.path().join("logs"));

        let mut stream = factory.create_log_stream(7).await.unwrap();
        stream.write("Pulling image: alpine").await.unwrap();
        stream.write("Successfully pulled image").await.unwrap();
        stream.flush().await.unwrap();
        drop(stream);

        let mut stream = factory.create_log_stream(7).await.unwrap();
        stream.write("Starting container: gitspace-u1-proj").await.unwrap();
        stream.flush().await.unwrap();

        let entries = read_log_file(&factory.log_path(7)).unwrap();
        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Pulling image: alpine",
                "Successfully pulled image",
                "Starting container: gitspace-u1-proj"
            ]
        );
        assert!(entries.iter().all(|e| e.gitspace_id == 7));
    }

    #[tokio::test]
    async fn test_file_stream_buffers_until_flush() {
        let temp_dir = TempDir::new().unwrap();
        let factory = FileLogStreamFactory::new(temp_dir.path());

        let mut stream = factory.create_log_stream(9).await.unwrap();
        stream.write("Stopping container: gitspace-u1-proj").await.unwrap();
        stream.write("Successfully stopped container").await.unwrap();
        assert!(read_log_file(&factory.log_path(9)).unwrap().is_empty());

        stream.flush().await.unwrap();
        assert_eq!(read_log_file(&factory.log_path(9)).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_stream_entry_shape() {
        let temp_dir = TempDir::new().unwrap();
        let factory = FileLogStreamFactory::new(temp_dir.path());
        let mut stream = factory.create_log_stream(3).await.unwrap();
        stream.write("multi\nline").await.unwrap();
        stream.flush().await.unwrap();

        let raw = std::fs::read_to_string(factory.log_path(3)).unwrap();
        assert_eq!(raw.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(raw.trim()).unwrap();
        assert_eq!(value["gitspaceId"], 3);
        assert_eq!(value["message"], "multi\nline");
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_memory_stream_failure_injection() {
        let factory = MemoryLogStreamFactory::new();
        factory.fail_writes_containing("Error while");

        let mut stream = factory.create_log_stream(1).await.unwrap();
        stream.write("Pulling image: alpine").await.unwrap();
        assert!(stream.write("Error while pulling image: x").await.is_err());
        stream.flush().await.unwrap();

        assert_eq!(factory.messages(1), vec!["Pulling image: alpine"]);
        assert_eq!(factory.flushes(), vec![1]);

        factory.fail_flush();
        assert!(stream.flush().await.is_err());
        factory.fail_create();
        assert!(factory.create_log_stream(1).await.is_err());
    }
}
