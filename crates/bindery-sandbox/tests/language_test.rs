use std::sync::Arc;

use bindery_config::Config;
use bindery_host_log::NoopSink;
use bindery_sandbox::{EvalRequest, RunResult, Sandbox};
use bindery_script::Binding;
use bindery_trigger::{TriggerDispatcher, TriggerError, TriggerRequest, TriggerTransport};
use serde_json::json;
use tokio::task::LocalSet;

struct Unreachable;

impl TriggerTransport for Unreachable {
  fn send(&self, _request: TriggerRequest) -> Result<(), TriggerError> {
    Err(TriggerError::Transport {
      message: "no host".to_string(),
    })
  }
}

async fn eval_with(text: &str, snapshot: serde_json::Value) -> RunResult {
  let sandbox = Sandbox::new(
    &Config::default(),
    Arc::new(TriggerDispatcher::new(Unreachable)),
    NoopSink,
  );
  let request = EvalRequest::new("run", Binding::new(text), snapshot);
  LocalSet::new().run_until(sandbox.evaluate(request)).await
}

async fn eval(text: &str) -> serde_json::Value {
  match eval_with(text, json!({})).await {
    RunResult::Success { value } => value,
    RunResult::Failure { reason } => panic!("{:?} failed: {}", text, reason),
  }
}

async fn failure(text: &str) -> String {
  match eval_with(text, json!({})).await {
    RunResult::Success { value } => panic!("{:?} succeeded with {}", text, value),
    RunResult::Failure { reason } => reason,
  }
}

#[tokio::test]
async fn test_arithmetic_and_coercion() {
  assert_eq!(eval("{{ 2 ** 10 - 7 % 4 }}").await, json!(1021));
  assert_eq!(eval("{{ '3' * '4' }}").await, json!(12));
  assert_eq!(eval("{{ 1 + '2' }}").await, json!("12"));
  assert_eq!(eval("{{ 0.1 + 0.2 > 0.3 }}").await, json!(true));
  assert_eq!(eval("{{ 1 / 0 > Number.MAX_SAFE_INTEGER }}").await, json!(true));
  assert_eq!(eval("{{ null == undefined && null !== undefined }}").await, json!(true));
  assert_eq!(eval("{{ typeof [] + typeof null + typeof (() => 1) }}").await, json!("objectobjectfunction"));
}

#[tokio::test]
async fn test_snapshot_values_are_globals() {
  let value = eval_with(
    "{{ Table1.tableData.filter((row) => row.age > 30).map((row) => row.name) }}",
    json!({"Table1": {"tableData": [{"name": "Ada", "age": 36}, {"name": "Bo", "age": 20}]}}),
  )
  .await;
  assert_eq!(value, RunResult::success(json!(["Ada"])));
}

#[tokio::test]
async fn test_template_literals_and_strings() {
  assert_eq!(eval("{{ `a${1 + 1}b` }}").await, json!("a2b"));
  assert_eq!(eval("{{ 'a-b-c'.split('-').reverse().join('+') }}").await, json!("c+b+a"));
  assert_eq!(eval("{{ ' Hi '.trim().toUpperCase().padStart(4, '*') }}").await, json!("**HI"));
  assert_eq!(eval("{{ 'héllo'.slice(1, 3) }}").await, json!("él"));
}

#[tokio::test]
async fn test_destructuring_spread_and_defaults() {
  assert_eq!(
    eval("{{ (() => { const { a, b = 2, ...rest } = { a: 1, c: 3, d: 4 }; return [a, b, rest] })() }}").await,
    json!([1, 2, {"c": 3, "d": 4}])
  );
  assert_eq!(
    eval("{{ (([x, , y], ...more) => [x, y, more.length])([1, 2, 3], 4, 5) }}").await,
    json!([1, 3, 2])
  );
  assert_eq!(eval("{{ [...[1, 2], ...'ab'] }}").await, json!([1, 2, "a", "b"]));
  assert_eq!(eval("{{ { ...{ a: 1 }, b: 2 } }}").await, json!({"a": 1, "b": 2}));
}

#[tokio::test]
async fn test_statements_and_loops() {
  let source = "{{ (() => {
    let total = 0;
    for (const n of [1, 2, 3, 4]) {
      if (n === 3) continue;
      total += n;
    }
    let i = 0;
    while (true) { if (++i > 5) break; }
    const keys = [];
    for (const k in { x: 1, y: 2 }) keys.push(k);
    return { total, i, keys };
  })() }}";
  assert_eq!(eval(source).await, json!({"total": 7, "i": 6, "keys": ["x", "y"]}));
}

#[tokio::test]
async fn test_closures_capture_their_scope() {
  let source = "{{ (() => {
    const counter = () => { let n = 0; return () => ++n };
    const next = counter();
    next(); next();
    return next();
  })() }}";
  assert_eq!(eval(source).await, json!(3));
}

#[tokio::test]
async fn test_try_catch_finally() {
  let source = "{{ (() => {
    const steps = [];
    try { null.x } catch (e) { steps.push(e instanceof TypeError) } finally { steps.push('done') }
    try { throw { code: 7 } } catch ({ code }) { steps.push(code) }
    return steps;
  })() }}";
  assert_eq!(eval(source).await, json!([true, "done", 7]));
}

#[tokio::test]
async fn test_async_functions_and_promises() {
  assert_eq!(
    eval("{{ (async () => { const a = await Promise.resolve(1); const b = await 2; return a + b })() }}").await,
    json!(3)
  );
  assert_eq!(
    eval("{{ Promise.allSettled([Promise.resolve(1), Promise.reject(new Error('x'))]) }}").await,
    json!([{"status": "fulfilled", "value": 1}, {"status": "rejected", "reason": "Error: x"}])
  );
  assert_eq!(eval("{{ Promise.any([Promise.reject(1), Promise.resolve(2)]) }}").await, json!(2));
  assert_eq!(
    eval("{{ new Promise((resolve) => setTimeout(() => resolve('later'), 5)) }}").await,
    json!("later")
  );
  assert_eq!(
    eval("{{ Promise.resolve(1).finally(() => 5).then((v) => v * 10) }}").await,
    json!(10)
  );
}

#[tokio::test]
async fn test_top_level_statements() {
  assert_eq!(eval("{{ const x = 4; return x * x }}").await, json!(16));
  assert_eq!(eval("{{ await Promise.resolve('awaited') }}").await, json!("awaited"));
}

#[tokio::test]
async fn test_json_and_math() {
  assert_eq!(eval("{{ JSON.parse('{\"a\":[1,2]}').a[1] }}").await, json!(2));
  assert_eq!(eval("{{ JSON.stringify({ a: undefined, b: [undefined] }) }}").await, json!("{\"b\":[null]}"));
  assert_eq!(eval("{{ Math.max(1, 5, 3) + Math.round(2.5) }}").await, json!(8));
  assert_eq!(eval("{{ Object.entries({ a: 1 }).flat() }}").await, json!(["a", 1]));
}

#[tokio::test]
async fn test_runtime_errors() {
  assert_eq!(
    failure("{{ missing + 1 }}").await,
    "ReferenceError: missing is not defined"
  );
  assert!(failure("{{ undefined.x }}").await.starts_with("TypeError"));
  assert!(failure("{{ (1)() }}").await.starts_with("TypeError"));
  assert_eq!(
    failure("{{ (() => { const c = 1; c = 2 })() }}").await,
    "TypeError: Assignment to constant variable."
  );
  assert_eq!(failure("{{ (() => { throw 'plain' })() }}").await, "plain");
}

#[tokio::test]
async fn test_oversized_allocations_throw_range_errors() {
  assert_eq!(
    failure("{{ (() => { const a = []; a.length = 2 ** 52; return 1 })() }}").await,
    "RangeError: Invalid array length"
  );
  assert_eq!(
    failure("{{ (() => { const a = []; a[2 ** 31] = 1; return a })() }}").await,
    "RangeError: Invalid array length"
  );
  assert_eq!(failure("{{ new Array(2 ** 32) }}").await, "RangeError: Invalid array length");
  assert_eq!(failure("{{ Array.from({ length: 2 ** 40 }) }}").await, "RangeError: Invalid array length");
  assert_eq!(failure("{{ 'ab'.repeat(2 ** 62) }}").await, "RangeError: Invalid string length");
  assert_eq!(failure("{{ 'a'.padEnd(2 ** 40, 'xy') }}").await, "RangeError: Invalid string length");
  assert_eq!(
    eval("{{ (() => { try { 'ab'.repeat(2 ** 62) } catch (e) { return e.name } })() }}").await,
    json!("RangeError")
  );
  assert_eq!(eval("{{ ''.repeat(2 ** 40) + [1, 2].concat([3]).length }}").await, json!("3"));
  assert_eq!(eval("{{ (() => { const a = [1]; a.length = 3; return a.length })() }}").await, json!(3));
}

#[tokio::test]
async fn test_deeply_nested_source_is_a_syntax_error() {
  let text = format!("{{{{ {}1{} }}}}", "(".repeat(3_000), ")".repeat(3_000));
  let reason = failure(&text).await;
  assert!(reason.starts_with("SyntaxError"), "{}", reason);
}

#[tokio::test]
async fn test_trigger_calls_without_a_host_reject() {
  let reason = failure("{{ showAlert('hi') }}").await;
  assert!(reason.contains("no host"), "{}", reason);
}
