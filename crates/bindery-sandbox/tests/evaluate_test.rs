use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use bindery_config::Config;
use bindery_host_log::{ChannelSink, EventType, LogBatch, Severity, TriggerMeta, TriggerSource};
use bindery_sandbox::{EvalRequest, MAX_DEPTH, RunResult, Sandbox, TOO_DEEP};
use bindery_script::Binding;
use bindery_trigger::{
  Capability, TriggerDispatcher, TriggerError, TriggerOutcome, TriggerRequest, TriggerResponse, TriggerTransport,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::LocalSet;

struct Recorder(mpsc::UnboundedSender<TriggerRequest>);

impl TriggerTransport for Recorder {
  fn send(&self, request: TriggerRequest) -> Result<(), TriggerError> {
    self.0.send(request).map_err(|err| TriggerError::Transport {
      message: err.to_string(),
    })
  }
}

struct Harness {
  sandbox: Rc<Sandbox>,
  requests: Option<mpsc::UnboundedReceiver<TriggerRequest>>,
  logs: mpsc::UnboundedReceiver<LogBatch>,
  seen: Rc<RefCell<Vec<TriggerRequest>>>,
}

impl Harness {
  fn new() -> Self {
    Self::with_config(&Config::default())
  }

  fn with_config(config: &Config) -> Self {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (log_tx, log_rx) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(TriggerDispatcher::new(Recorder(request_tx)));
    Self {
      sandbox: Rc::new(Sandbox::new(config, dispatcher, ChannelSink::new(log_tx))),
      requests: Some(request_rx),
      logs: log_rx,
      seen: Rc::default(),
    }
  }

  /// Answer every trigger request with `answer`, in arrival order.
  fn respond(&mut self, answer: impl Fn(&TriggerRequest) -> TriggerOutcome + 'static) {
    let mut requests = self.requests.take().expect("responder already started");
    let dispatcher = self.sandbox.dispatcher().clone();
    let seen = self.seen.clone();
    tokio::task::spawn_local(async move {
      while let Some(request) = requests.recv().await {
        let outcome = answer(&request);
        seen.borrow_mut().push(request.clone());
        dispatcher
          .complete(TriggerResponse {
            correlation_id: request.correlation_id,
            outcome,
          })
          .unwrap();
      }
    });
  }

  fn seen(&self) -> Vec<TriggerRequest> {
    self.seen.borrow().clone()
  }

  fn batches(&mut self) -> Vec<LogBatch> {
    let mut batches = Vec::new();
    while let Ok(batch) = self.logs.try_recv() {
      batches.push(batch);
    }
    batches
  }

  async fn data(&self, text: &str, snapshot: serde_json::Value) -> RunResult {
    let request = EvalRequest::new("run-1", Binding::new(text).bound_to("Text1", "text"), snapshot);
    self.sandbox.evaluate(request).await
  }

  async fn trigger(&self, text: &str, snapshot: serde_json::Value) -> RunResult {
    let request = EvalRequest::new("run-1", Binding::new(text).bound_to("Button1", "onClick"), snapshot)
      .trigger(Some(EventType::OnClick), Some(click_meta()));
    self.sandbox.evaluate(request).await
  }
}

fn click_meta() -> TriggerMeta {
  TriggerMeta {
    source: Some(TriggerSource {
      id: "w1".to_string(),
      name: "Button1".to_string(),
      entity_type: "WIDGET".to_string(),
    }),
    trigger_property_name: Some("onClick".to_string()),
  }
}

fn actions() -> serde_json::Value {
  json!({
    "Api1": {"ENTITY_TYPE": "ACTION", "data": null},
    "Api2": {"ENTITY_TYPE": "ACTION", "data": null},
    "Input1": {"text": "Ada"}
  })
}

fn local(test: impl Future<Output = ()>) -> impl Future<Output = ()> {
  async move { LocalSet::new().run_until(test).await }
}

fn ok(_: &TriggerRequest) -> TriggerOutcome {
  TriggerOutcome::success(serde_json::Value::Null)
}

#[tokio::test]
async fn test_plain_expression_has_no_side_effects() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(ok);

    let result = harness.data("{{ 1 + 1 }}", json!({})).await;

    assert_eq!(result, RunResult::success(json!(2)));
    assert!(harness.seen().is_empty());
    assert!(harness.batches().is_empty());
  })
  .await;
}

#[tokio::test]
async fn test_trigger_calls_are_sent_in_call_order() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(ok);

    let result = harness
      .trigger(
        "{{ showAlert('hi', 'info'); storeValue('k', 1); setInterval(() => showAlert('tick'), 1000, 'poll') }}",
        actions(),
      )
      .await;

    assert!(result.is_success(), "{:?}", result);
    let seen = harness.seen();
    let capabilities: Vec<_> = seen.iter().map(|r| r.capability.clone()).collect();
    assert_eq!(
      capabilities,
      vec![Capability::ShowAlert, Capability::StoreValue, Capability::SetInterval]
    );
    assert_eq!(seen[0].arguments, vec![json!("hi"), json!("info")]);
    assert_eq!(seen[1].arguments, vec![json!("k"), json!(1)]);
    assert_eq!(seen[2].arguments[0], json!("() => showAlert('tick')"));
    assert_eq!(seen[2].arguments[1], json!(1000));
    assert!(seen.iter().all(|r| r.run_id == "run-1"));
  })
  .await;
}

#[tokio::test]
async fn test_failed_action_fails_the_run_and_logs_the_error() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(|request| match request.capability {
      Capability::Run { .. } => TriggerOutcome::failure("Request failed with status 500"),
      _ => TriggerOutcome::success(serde_json::Value::Null),
    });

    let result = harness.trigger("{{ Api1.run() }}", actions()).await;

    assert_eq!(result, RunResult::failure("Error: Request failed with status 500"));
    let batches = harness.batches();
    assert_eq!(batches.len(), 1);
    let logs = &batches[0].logs;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].severity, Severity::Error);
    let stack = logs[0].data[0].as_str().unwrap();
    assert!(stack.starts_with("Error: Request failed with status 500"), "{}", stack);
    assert!(stack.contains("at Button1.onClick"), "{}", stack);
    assert_eq!(batches[0].event_type, Some(EventType::OnClick));
  })
  .await;
}

#[tokio::test]
async fn test_caught_action_failure_succeeds() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(|request| match request.capability {
      Capability::Run { .. } => TriggerOutcome::failure("timeout"),
      _ => TriggerOutcome::success(serde_json::Value::Null),
    });

    let result = harness
      .trigger("{{ Api1.run().catch((e) => showAlert(e.message, 'error')) }}", actions())
      .await;

    assert!(result.is_success(), "{:?}", result);
    let seen = harness.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].capability, Capability::ShowAlert);
    assert_eq!(seen[1].arguments, vec![json!("timeout"), json!("error")]);
    assert!(harness.batches().is_empty());
  })
  .await;
}

#[tokio::test]
async fn test_console_burst_makes_one_batch() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(ok);

    let result = harness
      .trigger("{{ (() => { for (let i = 0; i < 500; i++) console.log(i) })() }}", json!({}))
      .await;

    assert!(result.is_success(), "{:?}", result);
    let batches = harness.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].logs.len(), 500);
    assert_eq!(batches[0].logs[0].data, vec![json!(0)]);
    assert_eq!(batches[0].logs[499].data, vec![json!(499)]);
    assert_eq!(batches[0].trigger_meta, Some(click_meta()));
  })
  .await;
}

#[tokio::test]
async fn test_data_runs_capture_nothing() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(ok);

    let result = harness.data("{{ console.log('hidden'), 3 }}", json!({})).await;

    assert_eq!(result, RunResult::success(json!(3)));
    assert!(harness.batches().is_empty());
  })
  .await;
}

#[tokio::test]
async fn test_data_run_failure_is_logged() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(ok);

    let result = harness
      .data("{{ (() => { console.log('hidden'); return missing.value })() }}", json!({}))
      .await;

    assert_eq!(result, RunResult::failure("ReferenceError: missing is not defined"));
    let batches = harness.batches();
    assert_eq!(batches.len(), 1);
    let logs = &batches[0].logs;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].severity, Severity::Error);
    let stack = logs[0].data[0].as_str().unwrap();
    assert!(stack.starts_with("ReferenceError: missing is not defined"), "{}", stack);
    assert!(stack.contains("at Text1.text"), "{}", stack);
  })
  .await;
}

#[tokio::test]
async fn test_logged_values_are_copied_when_logged() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(ok);

    let result = harness
      .trigger(
        "{{ (() => { const o = { a: 1, list: [1] }; console.log(o, o.list); o.a = 2; o.list.push(2) })() }}",
        json!({}),
      )
      .await;

    assert!(result.is_success(), "{:?}", result);
    let batches = harness.batches();
    assert_eq!(batches[0].logs[0].data, vec![json!({"a": 1, "list": [1]}), json!([1])]);
  })
  .await;
}

#[tokio::test]
async fn test_deeply_nested_result_is_cut_with_a_placeholder() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(ok);

    let result = harness
      .data(
        "{{ (() => { let v = 0; for (let i = 0; i < 200; i++) v = [v]; return v })() }}",
        json!({}),
      )
      .await;

    let RunResult::Success { value } = result else {
      panic!("deep result should still succeed: {:?}", result);
    };
    let mut depth = 0;
    let mut cursor = &value;
    while let Some(inner) = cursor.get(0) {
      depth += 1;
      cursor = inner;
    }
    assert_eq!(depth, MAX_DEPTH);
    assert_eq!(cursor, &json!(TOO_DEEP));
  })
  .await;
}

#[tokio::test]
async fn test_deeply_nested_trigger_argument_is_sent() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(ok);

    let result = harness
      .trigger(
        "{{ (() => { let v = {}; for (let i = 0; i < 200; i++) v = { v }; return storeValue('deep', v) })() }}",
        json!({}),
      )
      .await;

    assert!(result.is_success(), "{:?}", result);
    let seen = harness.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].capability, Capability::StoreValue);
  })
  .await;
}

#[tokio::test]
async fn test_promise_all_keeps_argument_order() {
  local(async {
    let mut harness = Harness::new();
    let mut requests = harness.requests.take().unwrap();
    let dispatcher = harness.sandbox.dispatcher().clone();
    tokio::task::spawn_local(async move {
      let first = requests.recv().await.unwrap();
      let second = requests.recv().await.unwrap();
      for (request, value) in [(second, "two"), (first, "one")] {
        dispatcher
          .complete(TriggerResponse {
            correlation_id: request.correlation_id,
            outcome: TriggerOutcome::success(json!(value)),
          })
          .unwrap();
      }
    });

    let result = harness
      .trigger("{{ Promise.all([Api1.run(), Api2.run()]) }}", actions())
      .await;

    assert_eq!(result, RunResult::success(json!(["one", "two"])));
  })
  .await;
}

#[tokio::test]
async fn test_chained_calls_wait_for_each_other() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(|request| match &request.capability {
      Capability::Run { entity } => TriggerOutcome::success(json!({"from": entity})),
      _ => TriggerOutcome::success(serde_json::Value::Null),
    });

    let result = harness
      .trigger(
        "{{ Api1.run().then((a) => Api2.run({ after: a.from })).then((b) => showAlert(b.from)) }}",
        actions(),
      )
      .await;

    assert!(result.is_success(), "{:?}", result);
    let seen = harness.seen();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[1].arguments, vec![json!({"after": "Api1"})]);
    assert_eq!(seen[2].arguments, vec![json!("Api2")]);
  })
  .await;
}

#[tokio::test]
async fn test_run_updates_entity_data() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(|_| TriggerOutcome::success(json!([{"id": 1}])));

    let result = harness
      .trigger("{{ (async () => { await Api1.run(); return Api1.data[0].id })() }}", actions())
      .await;

    assert_eq!(result, RunResult::success(json!(1)));
  })
  .await;
}

#[tokio::test]
async fn test_run_callback_form() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(|request| match request.capability {
      Capability::Run { .. } => TriggerOutcome::success(json!("rows")),
      _ => TriggerOutcome::success(serde_json::Value::Null),
    });

    let result = harness
      .trigger(
        "{{ Api1.run((data) => showAlert(data), () => showAlert('failed'), { page: 2 }) }}",
        actions(),
      )
      .await;

    assert!(result.is_success(), "{:?}", result);
    let seen = harness.seen();
    assert_eq!(seen[0].arguments, vec![json!({"page": 2})]);
    assert_eq!(seen[1].arguments, vec![json!("rows")]);
  })
  .await;
}

#[tokio::test]
async fn test_store_value_is_visible_immediately() {
  local(async {
    let mut harness = Harness::new();
    harness.respond(ok);

    let result = harness
      .trigger("{{ (() => { storeValue('user', { name: 'Ada' }); return appsmith.store.user.name })() }}", json!({}))
      .await;

    assert_eq!(result, RunResult::success(json!("Ada")));
  })
  .await;
}

#[tokio::test]
async fn test_optional_chaining_and_nullish_defaults() {
  local(async {
    let harness = Harness::new();

    let result = harness
      .data("{{ Table1.selectedRow?.name ?? 'nobody' }}", json!({"Table1": {"selectedRow": null}}))
      .await;

    assert_eq!(result, RunResult::success(json!("nobody")));
  })
  .await;
}

#[tokio::test]
async fn test_mixed_text_renders_each_script() {
  local(async {
    let harness = Harness::new();

    let result = harness
      .data("Hello {{ Input1.text }}, {{ [1, 2] }}", actions())
      .await;

    assert_eq!(result, RunResult::success(json!("Hello Ada, [1,2]")));
  })
  .await;
}

#[tokio::test]
async fn test_runaway_recursion_is_a_range_error() {
  local(async {
    let mut config = Config::default();
    config.sandbox.max_call_depth = 32;
    let harness = Harness::with_config(&config);

    let result = harness
      .data("{{ (() => { function down(n) { return down(n + 1) } return down(0) })() }}", json!({}))
      .await;

    assert_eq!(result, RunResult::failure("RangeError: Maximum call stack size exceeded"));
  })
  .await;
}

#[tokio::test]
async fn test_result_placeholders() {
  local(async {
    let harness = Harness::new();

    let result = harness
      .data(
        "{{ (() => { const o = { f: function load() {}, p: new Promise(() => {}) }; o.self = o; return o })() }}",
        json!({}),
      )
      .await;

    assert_eq!(
      result,
      RunResult::success(json!({"f": "func() load", "p": "Promise", "self": "[Circular]"}))
    );
  })
  .await;
}

#[tokio::test]
async fn test_unhandled_rejection_fails_the_run() {
  local(async {
    let harness = Harness::new();

    let result = harness
      .data("{{ (() => { Promise.reject(new TypeError('lost')); return 1 })() }}", json!({}))
      .await;

    assert_eq!(result, RunResult::failure("TypeError: lost"));
  })
  .await;
}

#[tokio::test]
async fn test_timer_error_fails_the_run() {
  local(async {
    let mut harness = Harness::new();

    let result = harness
      .trigger("{{ setTimeout(() => { throw new Error('late') }, 5) }}", json!({}))
      .await;

    assert_eq!(result, RunResult::failure("Error: late"));
    let logs: Vec<_> = harness.batches().into_iter().flat_map(|b| b.logs).collect();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].severity, Severity::Error);
  })
  .await;
}

#[tokio::test]
async fn test_cleared_timer_never_fires() {
  local(async {
    let harness = Harness::new();

    let result = harness
      .data(
        "{{ (() => { const id = setTimeout(() => { throw new Error('fired') }, 5); clearTimeout(id); return 'ok' })() }}",
        json!({}),
      )
      .await;

    assert_eq!(result, RunResult::success(json!("ok")));
  })
  .await;
}

#[tokio::test]
async fn test_parse_error_is_a_syntax_error() {
  local(async {
    let harness = Harness::new();

    let result = harness.data("{{ 1 + }}", json!({})).await;

    let reason = result.reason().unwrap();
    assert!(reason.starts_with("SyntaxError"), "{}", reason);
  })
  .await;
}

#[tokio::test]
async fn test_never_settling_promise_fails_the_run() {
  local(async {
    let harness = Harness::new();

    let result = harness.data("{{ Promise.race([]) }}", json!({})).await;

    assert_eq!(result, RunResult::failure("Error: Binding promise never settled"));
  })
  .await;
}

#[tokio::test]
async fn test_disconnected_host_rejects_trigger_calls() {
  local(async {
    let harness = Harness::new();
    harness.sandbox.dispatcher().disconnect("host gone");

    let result = harness.trigger("{{ showAlert('hi') }}", json!({})).await;

    let reason = result.reason().unwrap();
    assert!(reason.contains("disconnected"), "{}", reason);
  })
  .await;
}
