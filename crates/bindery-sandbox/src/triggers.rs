//! Stand-ins for host capabilities.
//!
//! Each stand-in sends its request the moment it is called and returns a
//! pending promise; the promise settles when the host's response arrives.

use bindery_script::ast::DeclKind;
use bindery_trigger::{Capability, TriggerCall, TriggerOutcome};
use tracing::debug;

use crate::builtins::arg;
use crate::error::ErrorKind;
use crate::interpreter::Interpreter;
use crate::promise::Promise;
use crate::sanitize::sanitize;
use crate::value::{Function, Object, Value};

/// `ENTITY_TYPE` of entities that get `run`/`clear`.
pub const ACTION_ENTITY_TYPE: &str = "ACTION";

/// Install the global trigger functions and the `appsmith.store` object.
pub(crate) fn install_globals(interp: &Interpreter) {
  for &name in Capability::GLOBAL_NAMES {
    let Some(capability) = Capability::from_global(name) else {
      continue;
    };
    let function = Function::native(name, move |interp, _, args| {
      Ok(Value::Promise(call_global(interp, capability.clone(), args)))
    });
    interp.globals().declare(name, Value::Function(function), DeclKind::Var);
  }
  ensure_store(interp);
}

/// Give an action entity its `run` and `clear` methods.
pub(crate) fn install_entity(entity: &Object, name: &str) {
  let run_entity = name.to_string();
  entity.set(
    "run",
    Value::Function(Function::native("run", move |interp, _, args| {
      Ok(Value::Promise(run(interp, &run_entity, args)))
    })),
  );
  let clear_entity = name.to_string();
  entity.set(
    "clear",
    Value::Function(Function::native("clear", move |interp, _, args| {
      let capability = Capability::Clear {
        entity: clear_entity.clone(),
      };
      Ok(Value::Promise(dispatch(interp, capability, &args)))
    })),
  );
}

pub(crate) fn is_action(entity: &Object) -> bool {
  entity
    .get("ENTITY_TYPE")
    .is_some_and(|kind| kind.as_str() == Some(ACTION_ENTITY_TYPE))
}

/// `Entity.run(params)` or the callback form
/// `Entity.run(onSuccess, onError, params)`.
fn run(interp: &Interpreter, entity: &str, args: Vec<Value>) -> Promise {
  let capability = Capability::Run {
    entity: entity.to_string(),
  };
  let callbacks = matches!(arg(&args, 0), Value::Function(_));
  let params = if callbacks { arg(&args, 2) } else { arg(&args, 0) };
  let sent = if params.is_undefined() { Vec::new() } else { vec![params] };

  let promise = dispatch(interp, capability, &sent);
  if !callbacks {
    return promise;
  }
  interp.chain(&promise, arg(&args, 0), arg(&args, 1))
}

fn call_global(interp: &Interpreter, capability: Capability, args: Vec<Value>) -> Promise {
  match capability {
    Capability::StoreValue => {
      if let Some(store) = ensure_store(interp) {
        store.set(arg(&args, 0).to_js_string(), arg(&args, 1));
      }
    }
    Capability::RemoveValue => {
      if let Some(store) = ensure_store(interp) {
        store.remove(&arg(&args, 0).to_js_string());
      }
    }
    Capability::ClearStore => {
      if let Some(store) = ensure_store(interp) {
        for key in store.keys() {
          store.remove(&key);
        }
      }
    }
    _ => {}
  }

  let args: Vec<Value> = match capability {
    // The host re-evaluates the callback from its source on every tick.
    Capability::SetInterval => args
      .into_iter()
      .map(|value| match value.as_function().and_then(Function::source) {
        Some(source) => Value::String(source),
        None => value,
      })
      .collect(),
    _ => args,
  };
  dispatch(interp, capability, &args)
}

/// `appsmith.store`, created when missing. `None` when `appsmith` has been
/// replaced by something that is not an object.
fn ensure_store(interp: &Interpreter) -> Option<Object> {
  let globals = interp.globals();
  let appsmith = match globals.lookup("appsmith") {
    Some(Value::Object(appsmith)) => appsmith,
    Some(Value::Undefined) | None => {
      let appsmith = Object::new();
      globals.declare(
        "appsmith",
        Value::Object(appsmith.clone()),
        DeclKind::Var,
      );
      appsmith
    }
    Some(_) => return None,
  };
  match appsmith.get("store") {
    Some(Value::Object(store)) => Some(store),
    _ => {
      let store = Object::new();
      appsmith.set("store", Value::Object(store.clone()));
      Some(store)
    }
  }
}

/// Send one trigger request and return the promise its response settles.
fn dispatch(interp: &Interpreter, capability: Capability, args: &[Value]) -> Promise {
  let arguments: Vec<_> = args.iter().map(sanitize).collect();

  let realm = interp.realm();
  let promise = interp.new_promise();
  let updates_data = match &capability {
    Capability::Run { entity } => Some(entity.clone()),
    _ => None,
  };

  let link = &realm.triggers;
  let pending = match link
    .dispatcher
    .dispatch(&link.run_id, TriggerCall::new(capability, arguments))
  {
    Ok(pending) => pending,
    Err(err) => {
      promise.reject(interp.error_value(ErrorKind::Error, err.to_string()));
      return promise;
    }
  };

  let target = promise.clone();
  let task = interp.clone();
  realm.spawn_work(async move {
    let correlation_id = pending.correlation_id().to_string();
    match pending.await {
      TriggerOutcome::Success { value } => {
        let value = Value::from_json(&value);
        if let Some(name) = updates_data
          && let Some(Value::Object(entity)) = task.globals().lookup(&name)
        {
          entity.set("data", value.clone());
        }
        target.fulfill(value);
      }
      TriggerOutcome::Failure { reason } => {
        debug!(correlation_id = %correlation_id, reason = %reason, "trigger call failed");
        target.reject(task.error_value(ErrorKind::Error, reason));
      }
    }
  });
  promise
}
