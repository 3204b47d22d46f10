//! Messages exchanged between the host and the isolate.

use bindery_host_log::{EventType, LogBatch, TriggerMeta};
use bindery_script::Binding;
use bindery_trigger::{TriggerRequest, TriggerResponse};
use serde::{Deserialize, Serialize};

/// Which kind of property a binding drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunKind {
  /// A data property; console output is not captured.
  #[default]
  Data,
  /// An event handler; console output is captured and shipped.
  Trigger,
}

/// One evaluation asked of the isolate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalRequest {
  pub run_id: String,
  pub binding: Binding,
  /// Bound identifiers visible to the binding.
  #[serde(default)]
  pub snapshot: serde_json::Value,
  #[serde(default)]
  pub kind: RunKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub event_type: Option<EventType>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trigger_meta: Option<TriggerMeta>,
}

impl EvalRequest {
  pub fn new(run_id: impl Into<String>, binding: Binding, snapshot: serde_json::Value) -> Self {
    Self {
      run_id: run_id.into(),
      binding,
      snapshot,
      kind: RunKind::Data,
      event_type: None,
      trigger_meta: None,
    }
  }

  pub fn trigger(mut self, event_type: Option<EventType>, trigger_meta: Option<TriggerMeta>) -> Self {
    self.kind = RunKind::Trigger;
    self.event_type = event_type;
    self.trigger_meta = trigger_meta;
    self
  }
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunResult {
  Success { value: serde_json::Value },
  Failure { reason: String },
}

impl RunResult {
  pub fn success(value: serde_json::Value) -> Self {
    RunResult::Success { value }
  }

  pub fn failure(reason: impl Into<String>) -> Self {
    RunResult::Failure {
      reason: reason.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, RunResult::Success { .. })
  }

  pub fn value(&self) -> Option<&serde_json::Value> {
    match self {
      RunResult::Success { value } => Some(value),
      RunResult::Failure { .. } => None,
    }
  }

  pub fn reason(&self) -> Option<&str> {
    match self {
      RunResult::Success { .. } => None,
      RunResult::Failure { reason } => Some(reason),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalOutcome {
  pub run_id: String,
  pub result: RunResult,
}

/// Messages sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostAction {
  EvalBinding(EvalRequest),
  TriggerResponse(TriggerResponse),
}

/// Messages sent by the isolate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerAction {
  ExecuteTrigger(TriggerRequest),
  ProcessLogs(LogBatch),
  EvalResult(EvalOutcome),
}

#[cfg(test)]
mod tests {
  use super::*;
  use bindery_channel::Envelope;
  use serde_json::json;

  #[test]
  fn test_eval_binding_wire_shape() {
    let request = EvalRequest::new(
      "run-1",
      Binding::new("{{ 1 }}").bound_to("Text1", "text"),
      json!({}),
    )
    .trigger(Some(EventType::OnClick), None);
    let envelope = Envelope::request(HostAction::EvalBinding(request));

    assert_eq!(
      serde_json::to_value(&envelope).unwrap(),
      json!({
        "messageType": "REQUEST",
        "body": {
          "method": "EVAL_BINDING",
          "data": {
            "runId": "run-1",
            "binding": {"text": "{{ 1 }}", "propertyPath": "text", "entityId": "Text1"},
            "snapshot": {},
            "kind": "TRIGGER",
            "eventType": "ON_CLICK"
          }
        }
      })
    );
  }

  #[test]
  fn test_eval_result_wire_shape() {
    let outcome = WorkerAction::EvalResult(EvalOutcome {
      run_id: "run-1".to_string(),
      result: RunResult::failure("Error: boom"),
    });
    assert_eq!(
      serde_json::to_value(&Envelope::response(outcome)).unwrap(),
      json!({
        "messageType": "RESPONSE",
        "body": {
          "method": "EVAL_RESULT",
          "data": {"runId": "run-1", "result": {"status": "FAILURE", "reason": "Error: boom"}}
        }
      })
    );
  }

  #[test]
  fn test_request_defaults() {
    let request: EvalRequest = serde_json::from_value(json!({
      "runId": "r",
      "binding": {"text": "{{ x }}"}
    }))
    .unwrap();
    assert_eq!(request.kind, RunKind::Data);
    assert_eq!(request.snapshot, serde_json::Value::Null);
  }
}
