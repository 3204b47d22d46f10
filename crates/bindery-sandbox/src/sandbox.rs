//! One evaluation run, from binding text to [`RunResult`].

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use bindery_config::Config;
use bindery_host_log::{FlushSink, LogBatch, LogCapture, LogMethod, RequestInfo};
use bindery_script::ast::{DeclKind, Script};
use bindery_script::{Segment, parse_script_at};
use bindery_trigger::TriggerDispatcher;
use tracing::{error, info, instrument};

use crate::builtins::{self, json_stringify};
use crate::error::{ErrorKind, Throw};
use crate::interpreter::{EvalResult, Interpreter};
use crate::promise::PromiseState;
use crate::protocol::{EvalRequest, RunKind, RunResult};
use crate::realm::{Realm, TriggerLink};
use crate::sanitize::sanitize;
use crate::triggers;
use crate::value::{Value, error_summary};

/// Evaluates bindings against per-run snapshots.
///
/// Runs are `!Send` and spawn local tasks: [`Sandbox::evaluate`] must be
/// polled inside a [`tokio::task::LocalSet`].
pub struct Sandbox {
  dispatcher: Arc<TriggerDispatcher>,
  sink: Rc<dyn FlushSink>,
  flush_delay: Duration,
  max_call_depth: usize,
}

/// Shares one sink between the pipelines of concurrent runs.
struct SharedSink(Rc<dyn FlushSink>);

impl FlushSink for SharedSink {
  fn send(&self, batch: LogBatch) {
    self.0.send(batch);
  }
}

enum Piece {
  Text(String),
  Script(Script),
}

impl Sandbox {
  pub fn new(config: &Config, dispatcher: Arc<TriggerDispatcher>, sink: impl FlushSink + 'static) -> Self {
    Self {
      dispatcher,
      sink: Rc::new(sink),
      flush_delay: config.log.flush_delay(),
      max_call_depth: config.sandbox.max_call_depth,
    }
  }

  pub fn dispatcher(&self) -> &Arc<TriggerDispatcher> {
    &self.dispatcher
  }

  /// Evaluate one binding to completion: the program has settled and every
  /// trigger call and timer it started has finished.
  #[instrument(
    name = "evaluate",
    skip_all,
    fields(run_id = %request.run_id, entity_id = %request.binding.entity_id, kind = ?request.kind)
  )]
  pub async fn evaluate(&self, request: EvalRequest) -> RunResult {
    info!("run started");
    let location = request.binding.location();

    let console = LogCapture::new(self.flush_delay, SharedSink(self.sink.clone()));
    console.set_request_info(RequestInfo {
      event_type: request.event_type,
      trigger_meta: request.trigger_meta.clone(),
    });
    if request.kind == RunKind::Data {
      console.disable();
    }

    let link = TriggerLink {
      dispatcher: self.dispatcher.clone(),
      run_id: request.run_id.clone(),
    };
    let interp = Interpreter::new(Realm::new(console.clone(), link, &location, self.max_call_depth));
    builtins::install(interp.globals());
    install_snapshot(&interp, &request.snapshot);
    triggers::install_globals(&interp);

    let outcome = match parse(&request) {
      Ok(pieces) => run_to_completion(&interp, pieces).await,
      Err(err) => Err(vec![interp.error_value(ErrorKind::SyntaxError, err.message)]),
    };

    let result = match outcome {
      Ok(value) => RunResult::success(sanitize(&value)),
      Err(errors) => {
        // Failures are reported for every run kind.
        console.enable();
        for error in &errors {
          console.capture(LogMethod::Error, vec![error.clone()]);
        }
        let reason = errors.first().map(failure_reason).unwrap_or_default();
        error!(reason = %reason, errors = errors.len(), "run failed");
        RunResult::failure(reason)
      }
    };

    console.flush_now();
    interp.realm().teardown();
    info!(success = result.is_success(), "run complete");
    result
  }
}

fn parse(request: &EvalRequest) -> Result<Vec<Piece>, bindery_script::ParseError> {
  request
    .binding
    .segments()
    .into_iter()
    .map(|segment| match segment {
      Segment::Text(text) => Ok(Piece::Text(text.to_string())),
      Segment::Script { source, offset } => parse_script_at(source, offset).map(Piece::Script),
    })
    .collect()
}

/// Declare every snapshot entry as a global; action entities get their
/// trigger methods.
fn install_snapshot(interp: &Interpreter, snapshot: &serde_json::Value) {
  let serde_json::Value::Object(entries) = snapshot else {
    return;
  };
  for (name, json) in entries {
    let value = Value::from_json(json);
    if let Value::Object(entity) = &value
      && triggers::is_action(entity)
    {
      triggers::install_entity(entity, name);
    }
    interp.globals().declare(name.as_str(), value, DeclKind::Var);
  }
}

/// Run the pieces and wait for the run to go quiet. `Err` holds every
/// error nobody handled, the one that ended the program first.
async fn run_to_completion(interp: &Interpreter, pieces: Vec<Piece>) -> Result<Value, Vec<Value>> {
  let program = interp.new_promise();
  program.mark_handled();

  let runner = interp.clone();
  let target = program.clone();
  interp.realm().spawn_continuation(async move {
    let outcome = render(&runner, pieces).await;
    target.settle_with(outcome.map_err(Throw::into_value));
  });
  interp.drain().await;

  let outcome = match program.state() {
    PromiseState::Fulfilled(Value::Promise(value)) => {
      value.mark_handled();
      match value.state() {
        PromiseState::Fulfilled(value) => Ok(value),
        PromiseState::Rejected(reason) => Err(reason),
        PromiseState::Pending => Err(interp.error_value(ErrorKind::Error, "Binding promise never settled")),
      }
    }
    PromiseState::Fulfilled(value) => Ok(value),
    PromiseState::Rejected(reason) => Err(reason),
    PromiseState::Pending => Err(interp.error_value(ErrorKind::Error, "Binding never completed")),
  };

  let mut errors: Vec<Value> = outcome.as_ref().err().cloned().into_iter().collect();
  errors.extend(interp.realm().hooks.unhandled());
  errors.extend(interp.realm().take_uncaught());
  match outcome {
    Ok(value) if errors.is_empty() => Ok(value),
    _ => Err(errors),
  }
}

/// A binding that is a single script evaluates to the script's value; mixed
/// text renders every script into the surrounding text.
async fn render(interp: &Interpreter, pieces: Vec<Piece>) -> EvalResult {
  if let [Piece::Script(script)] = pieces.as_slice() {
    return interp.run_script(script).await;
  }
  let mut text = String::new();
  for piece in &pieces {
    match piece {
      Piece::Text(literal) => text.push_str(literal),
      Piece::Script(script) => {
        let value = interp.run_script(script).await?;
        match &value {
          Value::Array(_) | Value::Object(_) if value.as_error().is_none() => {
            text.push_str(&json_stringify(interp, &value, None)?.unwrap_or_default());
          }
          other => text.push_str(&other.to_js_string()),
        }
      }
    }
  }
  Ok(Value::from(text))
}

fn failure_reason(error: &Value) -> String {
  match error.as_error() {
    Some(object) => error_summary(object),
    None => error.summary(),
  }
}
