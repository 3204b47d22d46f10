use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bindery_config::Config;
use bindery_host::{
  ActionRunner, ChannelLogSink, Fixture, Host, HostError, LocalActions, NoopLogSink, SUPERSEDED, TriggerContext,
};
use bindery_host_log::{EventType, Severity};
use bindery_sandbox::{EvalRequest, RunResult};
use bindery_script::Binding;
use bindery_trigger::{Capability, TriggerOutcome};
use serde_json::json;
use tokio::sync::{Notify, mpsc};

fn snapshot() -> serde_json::Value {
  json!({
    "Api1": {"ENTITY_TYPE": "ACTION", "data": null},
    "Api2": {"ENTITY_TYPE": "ACTION", "data": null}
  })
}

fn click(run_id: &str, text: &str) -> EvalRequest {
  EvalRequest::new(run_id, Binding::new(text).bound_to("Button1", "onClick"), snapshot())
    .trigger(Some(EventType::OnClick), None)
}

fn local_actions(fixtures: HashMap<String, Fixture>) -> Arc<LocalActions> {
  let (ticks, _) = mpsc::unbounded_channel();
  Arc::new(LocalActions::new(fixtures, ticks))
}

/// Holds `Api1.run()` until released; everything else succeeds at once.
#[derive(Default)]
struct Gate {
  entered: Notify,
  release: Notify,
  calls: Mutex<Vec<Capability>>,
}

impl Gate {
  fn calls(&self) -> Vec<Capability> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl ActionRunner for Gate {
  async fn execute(
    &self,
    _context: TriggerContext,
    capability: Capability,
    _arguments: Vec<serde_json::Value>,
  ) -> TriggerOutcome {
    self.calls.lock().unwrap().push(capability.clone());
    if capability.entity() == Some("Api1") {
      self.entered.notify_one();
      self.release.notified().await;
    }
    TriggerOutcome::success(json!("ok"))
  }
}

#[tokio::test]
async fn test_failed_query_reaches_the_log_sink() {
  let actions = local_actions(HashMap::from([(
    "Api1".to_string(),
    Fixture::Error("Request failed with status 500".to_string()),
  )]));
  let (logs, mut batches) = mpsc::unbounded_channel();
  let host = Host::start(&Config::default(), actions, Arc::new(ChannelLogSink::new(logs))).unwrap();

  let result = host.evaluate(click("run-1", "{{ Api1.run() }}")).await.unwrap();

  assert_eq!(result, RunResult::failure("Error: Request failed with status 500"));
  let batch = batches.recv().await.unwrap();
  assert_eq!(batch.event_type, Some(EventType::OnClick));
  assert_eq!(batch.logs.len(), 1);
  assert_eq!(batch.logs[0].severity, Severity::Error);
  assert!(
    batch.logs[0].data[0]
      .as_str()
      .unwrap()
      .contains("at Button1.onClick")
  );
  assert_eq!(host.active_runs(), 0);
  host.shutdown().await;
}

#[tokio::test]
async fn test_effects_run_on_the_host() {
  let actions = local_actions(HashMap::from([(
    "Api1".to_string(),
    Fixture::Data(json!([{"name": "Ada"}])),
  )]));
  let host = Host::start(&Config::default(), actions.clone(), Arc::new(NoopLogSink)).unwrap();

  let result = host
    .evaluate(click(
      "run-1",
      "{{ Api1.run().then((rows) => { storeValue('first', rows[0].name); return showAlert(`Hi ${rows[0].name}`) }) }}",
    ))
    .await
    .unwrap();

  assert!(result.is_success(), "{:?}", result);
  assert_eq!(actions.alerts()[0].message, "Hi Ada");
  assert_eq!(actions.store().get("first"), Some(&json!("Ada")));
  host.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
  let actions = local_actions(HashMap::new());
  let host = Host::start(&Config::default(), actions, Arc::new(NoopLogSink)).unwrap();

  let (first, second) = tokio::join!(
    host.evaluate(click("run-1", "{{ 1 + 1 }}")),
    host.evaluate(click("run-2", "{{ 'two' }}")),
  );

  assert_eq!(first.unwrap(), RunResult::success(json!(2)));
  assert_eq!(second.unwrap(), RunResult::success(json!("two")));
  host.shutdown().await;
}

#[tokio::test]
async fn test_removed_entity_supersedes_its_runs() {
  let gate = Arc::new(Gate::default());
  let host = Host::start(&Config::default(), gate.clone(), Arc::new(NoopLogSink)).unwrap();

  let (result, superseded) = tokio::join!(
    host.evaluate(click("run-1", "{{ Api1.run().then(() => Api2.run()) }}")),
    async {
      gate.entered.notified().await;
      let superseded = host.remove_entity("Button1");
      gate.release.notify_one();
      superseded
    },
  );

  assert_eq!(superseded, 1);
  assert_eq!(result.unwrap(), RunResult::failure(format!("Error: {}", SUPERSEDED)));
  host.shutdown().await;
}

#[tokio::test]
async fn test_timeout() {
  let gate = Arc::new(Gate::default());
  let mut config = Config::default();
  config.host.eval_timeout_ms = Some(50);
  let (logs, mut batches) = mpsc::unbounded_channel();
  let host = Host::start(&config, gate.clone(), Arc::new(ChannelLogSink::new(logs))).unwrap();

  let err = host
    .evaluate(click("run-1", "{{ Api1.run().then(() => Api2.run()) }}"))
    .await
    .unwrap_err();

  assert!(matches!(err, HostError::Timeout { ref run_id } if run_id == "run-1"));
  assert_eq!(host.active_runs(), 0);

  // The isolate keeps running; its next call must not reach the runner.
  gate.release.notify_one();
  let batch = batches.recv().await.unwrap();
  let stack = batch.logs[0].data[0].as_str().unwrap();
  assert!(stack.starts_with(&format!("Error: {}", SUPERSEDED)), "{}", stack);
  assert!(gate.calls().iter().all(|call| call.entity() != Some("Api2")));
  host.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_releases_waiting_callers() {
  let gate = Arc::new(Gate::default());
  let host = Host::start(&Config::default(), gate.clone(), Arc::new(NoopLogSink)).unwrap();

  let (result, _) = tokio::join!(host.evaluate(click("run-1", "{{ Api1.run() }}")), async {
    gate.entered.notified().await;
    host.disconnect();
  });

  assert!(matches!(result, Err(HostError::Disconnected)));
  let err = host.evaluate(click("run-2", "{{ 1 }}")).await.unwrap_err();
  assert!(matches!(err, HostError::Disconnected));
  assert_eq!(host.active_runs(), 0);
}
