//! Context the host attaches to a run, echoed back on every log batch.

use serde::{Deserialize, Serialize};

use crate::LogEntry;

/// Why a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
  OnClick,
  OnPageLoad,
  OnTextChange,
  OnOptionChange,
  OnRowSelected,
  OnSubmit,
  /// A host-side interval timer fired.
  OnTimer,
  #[serde(other)]
  Other,
}

/// The widget or action whose property started the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSource {
  pub id: String,
  pub name: String,
  pub entity_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMeta {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<TriggerSource>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trigger_property_name: Option<String>,
}

/// Request info set at the start of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub event_type: Option<EventType>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trigger_meta: Option<TriggerMeta>,
}

/// Payload of one `PROCESS_LOGS` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
  pub logs: Vec<LogEntry>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub event_type: Option<EventType>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trigger_meta: Option<TriggerMeta>,
}

impl LogBatch {
  pub fn new(logs: Vec<LogEntry>, info: RequestInfo) -> Self {
    Self {
      logs,
      event_type: info.event_type,
      trigger_meta: info.trigger_meta,
    }
  }
}
