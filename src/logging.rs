use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Severity levels understood by the pipeline logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size-based rotation bounds for the in-memory log segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotationPolicy {
    pub max_bytes: usize,
    pub max_segments: usize,
}

impl Default for LogRotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 1 << 20,
            max_segments: 8,
        }
    }
}

/// Lines accumulated in one rotated segment.
#[derive(Debug, Default, Clone)]
pub struct LogSegment {
    lines: Vec<String>,
    bytes_written: usize,
}

impl LogSegment {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

/// JSON-line pipeline logger with deterministic rotation.
///
/// Each entry carries the run id and, where one applies, the section the
/// message concerns, so a drained-section investigation can be grepped from
/// the log alone.
#[derive(Debug, Clone)]
pub struct PipelineLogger {
    policy: LogRotationPolicy,
    run_id: u32,
    current_level: LogLevel,
    segments: VecDeque<LogSegment>,
    active: LogSegment,
}

impl PipelineLogger {
    pub fn new(run_id: u32, policy: LogRotationPolicy) -> Self {
        Self {
            policy,
            run_id,
            current_level: LogLevel::Info,
            segments: VecDeque::new(),
            active: LogSegment::default(),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.current_level
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.current_level = level;
    }

    /// Emits one JSON line; entries below the current level are skipped.
    pub fn log(
        &mut self,
        ts_ms: u64,
        level: LogLevel,
        module: &str,
        section: Option<u32>,
        message: &str,
    ) -> Result<(), LoggingError> {
        if level < self.current_level {
            return Ok(());
        }
        let entry = LogEntry {
            ts: ts_ms,
            level: level.as_str(),
            module,
            run: self.run_id,
            section,
            message,
        };
        let line = serde_json::to_string(&entry)?;
        self.rotate_if_needed(line.len());
        self.active.bytes_written += line.len();
        self.active.lines.push(line);
        Ok(())
    }

    /// Rotated history followed by the active segment.
    pub fn segments(&self) -> impl Iterator<Item = &LogSegment> {
        self.segments.iter().chain(std::iter::once(&self.active))
    }

    fn rotate_if_needed(&mut self, next_line_len: usize) {
        if self.active.bytes_written + next_line_len <= self.policy.max_bytes {
            return;
        }
        if !self.active.lines.is_empty() {
            self.segments.push_back(std::mem::take(&mut self.active));
            while self.segments.len() > self.policy.max_segments {
                self.segments.pop_front();
            }
        }
        self.active = LogSegment::default();
    }
}

/// Errors surfaced while serializing log entries.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to serialize log entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    ts: u64,
    level: &'a str,
    module: &'a str,
    run: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    section: Option<u32>,
    message: &'a str,
}
