//! The host's side of a trigger call.

use async_trait::async_trait;
use bindery_trigger::{Capability, TriggerOutcome};

/// Which run a trigger call came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerContext {
  pub run_id: String,
  /// Entity that owns the binding being run. Empty when the binding was not
  /// bound to one.
  pub entity_id: String,
}

/// Performs the effect behind a trigger call.
///
/// Every call produces an outcome; a failure becomes the rejection reason
/// of the promise waiting in the isolate.
#[async_trait]
pub trait ActionRunner: Send + Sync {
  async fn execute(
    &self,
    context: TriggerContext,
    capability: Capability,
    arguments: Vec<serde_json::Value>,
  ) -> TriggerOutcome;
}
