//! Buffered capture with a single debounce timer.
//!
//! The pipeline is `Rc`-based: it lives on the isolate thread and its timer
//! is a local task, so it must be used from inside a `tokio::task::LocalSet`.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::{FlushSink, LogBatch, LogEntry, LogMethod, RequestInfo, SanitizeError};

/// A value that can be captured by the pipeline.
pub trait Capturable: Sized {
  /// Structured failure representation preferred for `error` captures
  /// (e.g. the stack of an error object).
  fn failure_form(&self) -> Option<Self>;

  /// Copy taken at capture time. Later mutation of the original must not
  /// show up in the flushed entry.
  fn snapshot(&self) -> Self;

  /// Convert to JSON, replacing anything that cannot cross the channel.
  fn sanitize(&self) -> Result<serde_json::Value, SanitizeError>;
}

impl Capturable for serde_json::Value {
  fn failure_form(&self) -> Option<Self> {
    self
      .get("stack")
      .filter(|stack| stack.is_string())
      .cloned()
  }

  fn snapshot(&self) -> Self {
    self.clone()
  }

  fn sanitize(&self) -> Result<serde_json::Value, SanitizeError> {
    Ok(self.clone())
  }
}

struct Captured<V> {
  method: LogMethod,
  id: String,
  timestamp: String,
  args: Vec<V>,
}

struct Inner<V> {
  buffer: RefCell<Vec<Captured<V>>>,
  enabled: Cell<bool>,
  request_info: RefCell<RequestInfo>,
  timer: RefCell<Option<JoinHandle<()>>>,
  delay: Duration,
  sink: Box<dyn FlushSink>,
}

impl<V> Drop for Inner<V> {
  fn drop(&mut self) {
    if let Some(timer) = self.timer.get_mut().take() {
      timer.abort();
    }
  }
}

/// Log capture pipeline for one isolate.
pub struct LogCapture<V> {
  inner: Rc<Inner<V>>,
}

impl<V> Clone for LogCapture<V> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<V: Capturable + 'static> LogCapture<V> {
  pub fn new(delay: Duration, sink: impl FlushSink + 'static) -> Self {
    Self {
      inner: Rc::new(Inner {
        buffer: RefCell::new(Vec::new()),
        enabled: Cell::new(true),
        request_info: RefCell::new(RequestInfo::default()),
        timer: RefCell::new(None),
        delay,
        sink: Box::new(sink),
      }),
    }
  }

  /// Buffer one console call and restart the debounce timer.
  ///
  /// Returns `false` when capture is disabled and nothing was stored.
  pub fn capture(&self, method: LogMethod, args: Vec<V>) -> bool {
    if !self.inner.enabled.get() {
      return false;
    }
    let args = args
      .iter()
      .map(|arg| match method {
        LogMethod::Error => arg.failure_form().unwrap_or_else(|| arg.snapshot()),
        _ => arg.snapshot(),
      })
      .collect();

    self.inner.buffer.borrow_mut().push(Captured {
      method,
      id: Uuid::new_v4().to_string(),
      timestamp: chrono::Local::now().format("%I:%M:%S").to_string(),
      args,
    });
    self.reset_timer();
    true
  }

  fn reset_timer(&self) {
    if let Some(timer) = self.inner.timer.borrow_mut().take() {
      timer.abort();
    }
    let weak: Weak<Inner<V>> = Rc::downgrade(&self.inner);
    let delay = self.inner.delay;
    let timer = tokio::task::spawn_local(async move {
      tokio::time::sleep(delay).await;
      if let Some(inner) = weak.upgrade() {
        inner.timer.borrow_mut().take();
        LogCapture { inner }.send_batch();
      }
    });
    *self.inner.timer.borrow_mut() = Some(timer);
  }

  fn send_batch(&self) -> usize {
    let logs = self.flush();
    let count = logs.len();
    if count == 0 {
      return 0;
    }
    let info = self.inner.request_info.borrow().clone();
    debug!(entries = count, event_type = ?info.event_type, "flushing log batch");
    self.inner.sink.send(LogBatch::new(logs, info));
    count
  }

  /// Take the buffered entries, sanitized, leaving the buffer empty.
  pub fn flush(&self) -> Vec<LogEntry> {
    let captured = std::mem::take(&mut *self.inner.buffer.borrow_mut());
    captured.into_iter().map(sanitize_entry).collect()
  }

  /// Cancel the debounce timer and send whatever is buffered right away.
  /// Returns the number of entries sent.
  pub fn flush_now(&self) -> usize {
    if let Some(timer) = self.inner.timer.borrow_mut().take() {
      timer.abort();
    }
    self.send_batch()
  }

  pub fn enable(&self) {
    self.inner.enabled.set(true);
  }

  /// Stop capturing. Already buffered entries are kept.
  pub fn disable(&self) {
    self.inner.enabled.set(false);
  }

  pub fn is_enabled(&self) -> bool {
    self.inner.enabled.get()
  }

  pub fn set_request_info(&self, info: RequestInfo) {
    *self.inner.request_info.borrow_mut() = info;
  }

  pub fn request_info(&self) -> RequestInfo {
    self.inner.request_info.borrow().clone()
  }

  /// Number of entries waiting for a flush.
  pub fn buffered(&self) -> usize {
    self.inner.buffer.borrow().len()
  }
}

fn sanitize_entry<V: Capturable>(captured: Captured<V>) -> LogEntry {
  let data = captured
    .args
    .iter()
    .map(|arg| arg.sanitize())
    .collect::<Result<Vec<_>, _>>()
    .unwrap_or_else(|err| vec![serde_json::Value::String(format!("There was some error: {}", err))]);

  LogEntry {
    method: captured.method,
    id: captured.id,
    data,
    timestamp: captured.timestamp,
    severity: captured.method.severity(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::NoopSink;
  use serde_json::json;

  #[derive(Debug)]
  struct Unsanitizable;

  impl Capturable for Unsanitizable {
    fn failure_form(&self) -> Option<Self> {
      None
    }

    fn snapshot(&self) -> Self {
      Unsanitizable
    }

    fn sanitize(&self) -> Result<serde_json::Value, SanitizeError> {
      Err(SanitizeError::TooDeep { limit: 3 })
    }
  }

  #[tokio::test]
  async fn test_error_prefers_stack() {
    let local = tokio::task::LocalSet::new();
    local
      .run_until(async {
        let capture = LogCapture::new(Duration::from_secs(60), NoopSink);
        capture.capture(
          LogMethod::Error,
          vec![json!({"message": "boom", "stack": "Error: boom\n    at Button1.onClick"}), json!("plain")],
        );
        let logs = capture.flush();
        assert_eq!(logs[0].data, vec![json!("Error: boom\n    at Button1.onClick"), json!("plain")]);
        assert_eq!(logs[0].severity, crate::Severity::Error);
      })
      .await;
  }

  #[tokio::test]
  async fn test_sanitize_failure_becomes_message() {
    let local = tokio::task::LocalSet::new();
    local
      .run_until(async {
        let capture = LogCapture::new(Duration::from_secs(60), NoopSink);
        capture.capture(LogMethod::Log, vec![Unsanitizable]);
        let logs = capture.flush();
        assert_eq!(logs.len(), 1);
        let message = logs[0].data[0].as_str().unwrap();
        assert!(message.starts_with("There was some error: "));
      })
      .await;
  }

  #[tokio::test]
  async fn test_timestamp_format() {
    let local = tokio::task::LocalSet::new();
    local
      .run_until(async {
        let capture = LogCapture::new(Duration::from_secs(60), NoopSink);
        capture.capture(LogMethod::Info, vec![json!(1)]);
        let entry = capture.flush().remove(0);
        let parts: Vec<&str> = entry.timestamp.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|part| part.len() == 2));
        let hour: u32 = parts[0].parse().unwrap();
        assert!((1..=12).contains(&hour), "{}", entry.timestamp);
        assert!(Uuid::parse_str(&entry.id).is_ok());
      })
      .await;
  }
}
