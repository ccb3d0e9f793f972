//! Structured debug records fanned out to attached debug streams.
//!
//! Every server, game, and player carries its own logger so debug clients can
//! subscribe at exactly the scope they care about.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tokio::sync::mpsc;
use tracing::{error, info, trace, warn};
use uuid::Uuid;

use crate::{dto::api::DebugSeveritiesQuery, state::socket::GameSocket};

/// Pending records a slow fan-out task may accumulate before producers start
/// dropping new ones. The debug stream is best-effort.
const DEBUG_QUEUE_CAPACITY: usize = 32;

/// Severity attached to every debug record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Info,
    Warning,
    Error,
}

/// Per-connection severity toggles. Severities left unspecified are enabled.
#[derive(Debug, Clone, Copy)]
pub struct SeverityFilter {
    trace: bool,
    info: bool,
    warning: bool,
    error: bool,
}

impl Default for SeverityFilter {
    fn default() -> Self {
        Self {
            trace: true,
            info: true,
            warning: true,
            error: true,
        }
    }
}

impl SeverityFilter {
    pub fn accepts(&self, severity: Severity) -> bool {
        match severity {
            Severity::Trace => self.trace,
            Severity::Info => self.info,
            Severity::Warning => self.warning,
            Severity::Error => self.error,
        }
    }
}

impl From<&DebugSeveritiesQuery> for SeverityFilter {
    fn from(query: &DebugSeveritiesQuery) -> Self {
        Self {
            trace: query.trace.unwrap_or(true),
            info: query.info.unwrap_or(true),
            warning: query.warning.unwrap_or(true),
            error: query.error.unwrap_or(true),
        }
    }
}

/// One record on its way to the attached debug streams.
#[derive(Debug, Serialize)]
struct DebugRecord {
    severity: Severity,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Box<RawValue>>,
}

struct DebugAttachment {
    socket: Arc<GameSocket>,
    filter: SeverityFilter,
}

/// Cloneable handle to one debug scope.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

struct LoggerInner {
    sockets: DashMap<Uuid, DebugAttachment>,
    queue: Mutex<Option<mpsc::Sender<DebugRecord>>>,
    print_to_console: bool,
}

impl Logger {
    /// Create a logger and spawn its fan-out task.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn new(print_to_console: bool) -> Self {
        let (queue_tx, mut queue_rx) = mpsc::channel::<DebugRecord>(DEBUG_QUEUE_CAPACITY);
        let inner = Arc::new(LoggerInner {
            sockets: DashMap::new(),
            queue: Mutex::new(Some(queue_tx)),
            print_to_console,
        });

        let fanout = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(record) = queue_rx.recv().await {
                let frame = match serde_json::to_string(&record) {
                    Ok(frame) => frame,
                    Err(err) => {
                        error!(error = %err, "failed to encode debug record");
                        continue;
                    }
                };
                for attachment in fanout.sockets.iter() {
                    if attachment.filter.accepts(record.severity) {
                        let _ = attachment.socket.send_frame(&frame);
                    }
                }
            }
        });

        Self { inner }
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.push(Severity::Trace, None, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Severity::Info, None, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(Severity::Warning, None, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Severity::Error, None, message.into());
    }

    /// Log a record with an opaque JSON payload attached.
    pub fn log_with<T: Serialize + ?Sized>(
        &self,
        severity: Severity,
        data: &T,
        message: impl Into<String>,
    ) {
        match serde_json::value::to_raw_value(data) {
            Ok(raw) => self.push(severity, Some(raw), message.into()),
            Err(err) => error!(error = %err, "failed to encode debug record data"),
        }
    }

    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        self.push(severity, None, message.into());
    }

    fn push(&self, severity: Severity, data: Option<Box<RawValue>>, message: String) {
        if self.inner.print_to_console {
            let data = data.as_deref().map(RawValue::get).unwrap_or_default();
            match severity {
                Severity::Trace => trace!(data, "{message}"),
                Severity::Info => info!(data, "{message}"),
                Severity::Warning => warn!(data, "{message}"),
                Severity::Error => error!(data, "{message}"),
            }
        }

        let sender = self.inner.queue.lock().expect("queue lock").clone();
        if let Some(sender) = sender {
            let record = DebugRecord {
                severity,
                message,
                data,
            };
            // Full or closed queue: the record is dropped, never the caller.
            let _ = sender.try_send(record);
        }
    }

    /// Register a debug stream; records matching `filter` will be forwarded.
    pub(crate) fn attach_debug(&self, socket: Arc<GameSocket>, filter: SeverityFilter) {
        self.inner
            .sockets
            .insert(socket.id(), DebugAttachment { socket, filter });
    }

    /// Disconnect and forget a debug stream. No-op for unknown IDs.
    pub(crate) fn detach_debug(&self, id: Uuid) {
        if let Some((_, attachment)) = self.inner.sockets.remove(&id) {
            attachment.socket.disconnect();
        }
    }

    /// Stop accepting records; the fan-out task exits after draining. Idempotent.
    pub(crate) fn close(&self) {
        self.inner.queue.lock().expect("queue lock").take();
    }
}
