//! In-memory log capture
//!
//! A `tracing` layer that mirrors every log record into a bounded ring
//! buffer so `GET /api/logs` can serve recent history without touching the
//! filesystem. Oldest records are dropped when the buffer is full.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Default ring buffer depth
pub const DEFAULT_CAPACITY: usize = 4096;

/// One captured log record
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Level name ("INFO", "WARN", ...)
    pub level: String,
    /// Module path of the event ("category" in the query API)
    pub category: String,
    /// Rendered message
    pub message: String,
}

/// Bounded buffer of recent log records
pub struct LogBuffer {
    records: Mutex<VecDeque<LogRecord>>,
    capacity: usize,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` records
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        })
    }

    /// Append a record, dropping the oldest when full
    pub fn push(&self, record: LogRecord) {
        let Ok(mut records) = self.records.lock() else {
            return;
        };
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Query records newer than `since`, optionally filtered
    ///
    /// `level` matches case-insensitively; `category` is a prefix match on
    /// the module path. At most `max_count` newest matches are returned, in
    /// chronological order.
    #[must_use]
    pub fn query(
        &self,
        since: Option<DateTime<Utc>>,
        level: Option<&str>,
        category: Option<&str>,
        max_count: usize,
    ) -> Vec<LogRecord> {
        let Ok(records) = self.records.lock() else {
            return Vec::new();
        };
        let mut matched: Vec<LogRecord> = records
            .iter()
            .filter(|r| since.is_none_or(|s| r.timestamp > s))
            .filter(|r| level.is_none_or(|l| r.level.eq_ignore_ascii_case(l)))
            .filter(|r| category.is_none_or(|c| r.category.starts_with(c)))
            .cloned()
            .collect();
        if matched.len() > max_count {
            matched.drain(..matched.len() - max_count);
        }
        matched
    }
}

/// Tracing layer feeding a [`LogBuffer`]
pub struct CaptureLayer {
    buffer: Arc<LogBuffer>,
}

impl CaptureLayer {
    #[must_use]
    pub fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer }
    }
}

/// Collects the `message` field off a tracing event
#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message.push_str(&format!("{}={value:?}", field.name()));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message.push_str(&format!("{}={value}", field.name()));
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogRecord {
            timestamp: Utc::now(),
            level: event.metadata().level().to_string(),
            category: event.metadata().target().to_string(),
            message: visitor.message,
        });
    }
}
