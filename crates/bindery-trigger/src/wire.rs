//! Messages exchanged for one trigger call.

use serde::{Deserialize, Serialize};

use crate::Capability;

/// A trigger call captured during evaluation, before it is assigned an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerCall {
  pub capability: Capability,
  /// Sanitized arguments, in call order.
  pub arguments: Vec<serde_json::Value>,
}

impl TriggerCall {
  pub fn new(capability: Capability, arguments: Vec<serde_json::Value>) -> Self {
    Self {
      capability,
      arguments,
    }
  }
}

/// Request sent to the host for one trigger call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
  pub run_id: String,
  pub correlation_id: String,
  pub capability: Capability,
  pub arguments: Vec<serde_json::Value>,
}

/// Host's answer to a [`TriggerRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
  pub correlation_id: String,
  pub outcome: TriggerOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerOutcome {
  Success { value: serde_json::Value },
  Failure { reason: String },
}

impl TriggerOutcome {
  pub fn success(value: serde_json::Value) -> Self {
    TriggerOutcome::Success { value }
  }

  pub fn failure(reason: impl Into<String>) -> Self {
    TriggerOutcome::Failure {
      reason: reason.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, TriggerOutcome::Success { .. })
  }
}
