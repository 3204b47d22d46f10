//! A reference [`ActionRunner`] that keeps every effect in memory.
//!
//! Queries answer from fixtures, alerts and clipboard writes are recorded,
//! stored values land in a map. Intervals are real tokio tasks that emit a
//! [`TimerTick`] carrying the callback source, so whoever owns the runner can
//! evaluate the callback again on every tick.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bindery_trigger::{Capability, TriggerOutcome};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::runner::{ActionRunner, TriggerContext};

/// Canned response for one query or API action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fixture {
  /// `run()` fulfills with this value.
  Data(serde_json::Value),
  /// `run()` rejects with this reason.
  Error(String),
}

/// One `showAlert` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
  pub message: String,
  pub style: Option<String>,
}

/// Emitted every time an interval fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTick {
  pub id: String,
  /// Source text of the callback passed to `setInterval`.
  pub callback_source: String,
  /// Entity whose binding registered the interval.
  pub entity_id: String,
}

#[derive(Default)]
struct State {
  alerts: Vec<Alert>,
  store: serde_json::Map<String, serde_json::Value>,
  clipboard: Option<String>,
  cleared: Vec<String>,
  intervals: HashMap<String, CancellationToken>,
}

pub struct LocalActions {
  fixtures: HashMap<String, Fixture>,
  ticks: mpsc::UnboundedSender<TimerTick>,
  state: Mutex<State>,
  cancel: CancellationToken,
}

impl LocalActions {
  pub fn new(fixtures: HashMap<String, Fixture>, ticks: mpsc::UnboundedSender<TimerTick>) -> Self {
    Self {
      fixtures,
      ticks,
      state: Mutex::new(State::default()),
      cancel: CancellationToken::new(),
    }
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self
      .state
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn alerts(&self) -> Vec<Alert> {
    self.state().alerts.clone()
  }

  pub fn store(&self) -> serde_json::Map<String, serde_json::Value> {
    self.state().store.clone()
  }

  pub fn clipboard(&self) -> Option<String> {
    self.state().clipboard.clone()
  }

  /// Entities whose data was reset with `clear()`, in call order.
  pub fn cleared(&self) -> Vec<String> {
    self.state().cleared.clone()
  }

  /// Ids of the intervals still running, sorted.
  pub fn active_intervals(&self) -> Vec<String> {
    let mut ids: Vec<_> = self.state().intervals.keys().cloned().collect();
    ids.sort();
    ids
  }

  /// Stop every interval.
  pub fn shutdown(&self) {
    self.cancel.cancel();
    self.state().intervals.clear();
  }

  fn run_query(&self, entity: &str) -> TriggerOutcome {
    match self.fixtures.get(entity) {
      Some(Fixture::Data(value)) => TriggerOutcome::success(value.clone()),
      Some(Fixture::Error(reason)) => TriggerOutcome::failure(reason.clone()),
      None => TriggerOutcome::failure(format!("{} has no fixture", entity)),
    }
  }

  fn set_interval(&self, context: &TriggerContext, arguments: &[serde_json::Value]) -> TriggerOutcome {
    let Some(callback_source) = arguments.first().and_then(|value| value.as_str()) else {
      return TriggerOutcome::failure("setInterval expects a callback");
    };
    let Some(millis) = arguments.get(1).and_then(|value| value.as_f64()) else {
      return TriggerOutcome::failure("setInterval expects an interval in milliseconds");
    };
    let id = match arguments.get(2) {
      Some(serde_json::Value::String(id)) => id.clone(),
      Some(serde_json::Value::Number(id)) => id.to_string(),
      _ => uuid::Uuid::new_v4().to_string(),
    };
    let period = Duration::from_millis(millis.max(1.0) as u64);

    let token = self.cancel.child_token();
    if let Some(previous) = self.state().intervals.insert(id.clone(), token.clone()) {
      debug!(interval_id = %id, "replacing interval");
      previous.cancel();
    }

    let tick = TimerTick {
      id: id.clone(),
      callback_source: callback_source.to_string(),
      entity_id: context.entity_id.clone(),
    };
    let ticks = self.ticks.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
      loop {
        tokio::select! {
          _ = token.cancelled() => break,
          _ = interval.tick() => {
            if ticks.send(tick.clone()).is_err() {
              break;
            }
          }
        }
      }
    });

    info!(interval_id = %id, period_ms = period.as_millis() as u64, "interval started");
    TriggerOutcome::success(serde_json::Value::Null)
  }

  fn clear_interval(&self, arguments: &[serde_json::Value]) -> TriggerOutcome {
    let id = match arguments.first() {
      Some(serde_json::Value::String(id)) => id.clone(),
      Some(serde_json::Value::Number(id)) => id.to_string(),
      _ => return TriggerOutcome::failure("clearInterval expects an interval id"),
    };
    match self.state().intervals.remove(&id) {
      Some(token) => {
        token.cancel();
        info!(interval_id = %id, "interval cleared");
      }
      None => debug!(interval_id = %id, "no such interval"),
    }
    TriggerOutcome::success(serde_json::Value::Null)
  }
}

impl Drop for LocalActions {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

fn text(arguments: &[serde_json::Value], index: usize) -> Option<String> {
  match arguments.get(index)? {
    serde_json::Value::Null => None,
    serde_json::Value::String(text) => Some(text.clone()),
    other => Some(other.to_string()),
  }
}

#[async_trait]
impl ActionRunner for LocalActions {
  #[instrument(
    name = "local_action",
    skip_all,
    fields(run_id = %context.run_id, entity_id = %context.entity_id, capability = %capability)
  )]
  async fn execute(
    &self,
    context: TriggerContext,
    capability: Capability,
    arguments: Vec<serde_json::Value>,
  ) -> TriggerOutcome {
    match capability {
      Capability::Run { entity } => self.run_query(&entity),
      Capability::Clear { entity } => {
        self.state().cleared.push(entity);
        TriggerOutcome::success(serde_json::Value::Null)
      }
      Capability::ShowAlert => {
        let alert = Alert {
          message: text(&arguments, 0).unwrap_or_default(),
          style: text(&arguments, 1),
        };
        info!(message = %alert.message, "alert");
        self.state().alerts.push(alert);
        TriggerOutcome::success(serde_json::Value::Null)
      }
      Capability::StoreValue => {
        let Some(key) = text(&arguments, 0) else {
          return TriggerOutcome::failure("storeValue expects a key");
        };
        let value = arguments.get(1).cloned().unwrap_or_default();
        self.state().store.insert(key, value);
        TriggerOutcome::success(serde_json::Value::Null)
      }
      Capability::RemoveValue => {
        if let Some(key) = text(&arguments, 0) {
          self.state().store.remove(&key);
        }
        TriggerOutcome::success(serde_json::Value::Null)
      }
      Capability::ClearStore => {
        self.state().store.clear();
        TriggerOutcome::success(serde_json::Value::Null)
      }
      Capability::CopyToClipboard => {
        self.state().clipboard = Some(text(&arguments, 0).unwrap_or_default());
        TriggerOutcome::success(serde_json::Value::Null)
      }
      Capability::SetInterval => self.set_interval(&context, &arguments),
      Capability::ClearInterval => self.clear_interval(&arguments),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn context() -> TriggerContext {
    TriggerContext {
      run_id: "run-1".to_string(),
      entity_id: "Button1".to_string(),
    }
  }

  fn actions() -> (LocalActions, mpsc::UnboundedReceiver<TimerTick>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let fixtures = HashMap::from([
      ("Api1".to_string(), Fixture::Data(json!([{"id": 1}]))),
      ("Api2".to_string(), Fixture::Error("Request failed with status 500".to_string())),
    ]);
    (LocalActions::new(fixtures, sender), receiver)
  }

  #[test]
  fn test_fixture_file_shape() {
    let fixtures: HashMap<String, Fixture> =
      serde_json::from_value(json!({"Api1": {"data": [1]}, "Api2": {"error": "down"}})).unwrap();
    assert_eq!(fixtures["Api1"], Fixture::Data(json!([1])));
    assert_eq!(fixtures["Api2"], Fixture::Error("down".to_string()));
  }

  #[tokio::test]
  async fn test_queries_answer_from_fixtures() {
    let (actions, _ticks) = actions();
    let run = |entity: &str| Capability::Run {
      entity: entity.to_string(),
    };

    let outcome = actions.execute(context(), run("Api1"), vec![]).await;
    assert_eq!(outcome, TriggerOutcome::success(json!([{"id": 1}])));
    let outcome = actions.execute(context(), run("Api2"), vec![]).await;
    assert_eq!(outcome, TriggerOutcome::failure("Request failed with status 500"));
    let outcome = actions.execute(context(), run("Api3"), vec![]).await;
    assert_eq!(outcome, TriggerOutcome::failure("Api3 has no fixture"));
  }

  #[tokio::test]
  async fn test_effects_are_recorded() {
    let (actions, _ticks) = actions();

    actions
      .execute(context(), Capability::ShowAlert, vec![json!("saved"), json!("success")])
      .await;
    actions
      .execute(context(), Capability::StoreValue, vec![json!("k"), json!({"a": 1})])
      .await;
    actions
      .execute(context(), Capability::StoreValue, vec![json!("gone"), json!(1)])
      .await;
    actions
      .execute(context(), Capability::RemoveValue, vec![json!("gone")])
      .await;
    actions
      .execute(context(), Capability::CopyToClipboard, vec![json!("copied")])
      .await;

    assert_eq!(
      actions.alerts(),
      vec![Alert {
        message: "saved".to_string(),
        style: Some("success".to_string()),
      }]
    );
    assert_eq!(serde_json::Value::Object(actions.store()), json!({"k": {"a": 1}}));
    assert_eq!(actions.clipboard().as_deref(), Some("copied"));

    actions.execute(context(), Capability::ClearStore, vec![]).await;
    assert!(actions.store().is_empty());
  }

  #[tokio::test]
  async fn test_interval_ticks_until_cleared() {
    let (actions, mut ticks) = actions();

    let outcome = actions
      .execute(
        context(),
        Capability::SetInterval,
        vec![json!("() => Api1.run()"), json!(10), json!("poll")],
      )
      .await;
    assert!(outcome.is_success());
    assert_eq!(actions.active_intervals(), vec!["poll".to_string()]);

    let tick = ticks.recv().await.unwrap();
    assert_eq!(
      tick,
      TimerTick {
        id: "poll".to_string(),
        callback_source: "() => Api1.run()".to_string(),
        entity_id: "Button1".to_string(),
      }
    );

    actions
      .execute(context(), Capability::ClearInterval, vec![json!("poll")])
      .await;
    assert!(actions.active_intervals().is_empty());
    tokio::time::sleep(Duration::from_millis(30)).await;
    while ticks.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(ticks.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_interval_needs_a_callback() {
    let (actions, _ticks) = actions();
    let outcome = actions
      .execute(context(), Capability::SetInterval, vec![])
      .await;
    assert_eq!(outcome, TriggerOutcome::failure("setInterval expects a callback"));
  }
}
