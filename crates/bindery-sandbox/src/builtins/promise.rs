//! `Promise` constructor, combinators and reactions.
//!
//! Combinators return immediately and settle their result from a
//! continuation task, so no native call stays suspended on user promises.

use futures::StreamExt;
use futures::future;
use futures::stream::FuturesUnordered;

use super::{arg, method};
use crate::error::{ErrorKind, Throw};
use crate::interpreter::Interpreter;
use crate::promise::Promise;
use crate::value::{Function, PropertyMap, Value};

pub(super) fn constructor() -> Function {
  Function::native_async_constructor("Promise", |interp, _, args| {
    Box::pin(async move {
      let executor = arg(&args, 0);
      if !matches!(executor, Value::Function(_)) {
        return Err(interp.throw(
          ErrorKind::TypeError,
          format!("Promise resolver {} is not a function", executor.summary()),
        ));
      }
      let promise = interp.new_promise();
      let resolve = {
        let promise = promise.clone();
        Function::native("resolve", move |interp, _, args| {
          interp.resolve(&promise, arg(&args, 0));
          Ok(Value::Undefined)
        })
      };
      let reject = {
        let promise = promise.clone();
        Function::native("reject", move |_, _, args| {
          promise.reject(arg(&args, 0));
          Ok(Value::Undefined)
        })
      };
      if let Err(Throw(error)) = interp
        .call(&executor, Value::Undefined, vec![resolve.into(), reject.into()])
        .await
      {
        promise.reject(error);
      }
      Ok(Value::Promise(promise))
    })
  })
  .with(
    "resolve",
    Function::native("resolve", |interp, _, args| match arg(&args, 0) {
      Value::Promise(promise) => Ok(Value::Promise(promise)),
      other => {
        let promise = interp.new_promise();
        interp.resolve(&promise, other);
        Ok(Value::Promise(promise))
      }
    }),
  )
  .with(
    "reject",
    Function::native("reject", |interp, _, args| {
      let promise = interp.new_promise();
      promise.reject(arg(&args, 0));
      Ok(Value::Promise(promise))
    }),
  )
  .with("all", Function::native("all", all))
  .with("allSettled", Function::native("allSettled", all_settled))
  .with("race", Function::native("race", race))
  .with("any", Function::native("any", any))
}

fn members(interp: &Interpreter, iterable: &Value) -> Result<Vec<Promise>, Throw> {
  let items = interp.iterate(iterable)?;
  Ok(items.into_iter().map(|item| interp.to_promise(item)).collect())
}

fn all(interp: &Interpreter, _: Value, args: Vec<Value>) -> Result<Value, Throw> {
  let members = members(interp, &arg(&args, 0))?;
  let result = interp.new_promise();
  let target = result.clone();
  interp.realm().spawn_continuation(async move {
    let outcome = future::try_join_all(members.iter().map(Promise::settled)).await;
    target.settle_with(outcome.map(Value::array));
  });
  Ok(Value::Promise(result))
}

fn all_settled(interp: &Interpreter, _: Value, args: Vec<Value>) -> Result<Value, Throw> {
  let members = members(interp, &arg(&args, 0))?;
  let result = interp.new_promise();
  let target = result.clone();
  interp.realm().spawn_continuation(async move {
    let outcomes = future::join_all(members.iter().map(Promise::settled)).await;
    let entries = outcomes
      .into_iter()
      .map(|outcome| {
        let mut entry = PropertyMap::new();
        match outcome {
          Ok(value) => {
            entry.insert("status", Value::from("fulfilled"));
            entry.insert("value", value);
          }
          Err(reason) => {
            entry.insert("status", Value::from("rejected"));
            entry.insert("reason", reason);
          }
        }
        Value::object(entry)
      })
      .collect();
    target.fulfill(Value::array(entries));
  });
  Ok(Value::Promise(result))
}

/// Settles like the first member to settle. An empty race never settles.
fn race(interp: &Interpreter, _: Value, args: Vec<Value>) -> Result<Value, Throw> {
  let members = members(interp, &arg(&args, 0))?;
  let result = interp.new_promise();
  if members.is_empty() {
    return Ok(Value::Promise(result));
  }
  let target = result.clone();
  interp.realm().spawn_continuation(async move {
    let (outcome, _, _) = future::select_all(members.iter().map(Promise::settled)).await;
    target.settle_with(outcome);
  });
  Ok(Value::Promise(result))
}

fn any(interp: &Interpreter, _: Value, args: Vec<Value>) -> Result<Value, Throw> {
  let members = members(interp, &arg(&args, 0))?;
  let result = interp.new_promise();
  let target = result.clone();
  let aggregate = interp.error_value(ErrorKind::Error, "All promises were rejected");
  interp.realm().spawn_continuation(async move {
    let mut pending: FuturesUnordered<_> = members.iter().map(Promise::settled).collect();
    let mut errors = Vec::new();
    while let Some(outcome) = pending.next().await {
      match outcome {
        Ok(value) => {
          target.fulfill(value);
          return;
        }
        Err(reason) => errors.push(reason),
      }
    }
    if let Value::Object(error) = &aggregate {
      error.set("errors", Value::array(errors));
    }
    target.reject(aggregate);
  });
  Ok(Value::Promise(result))
}

fn this_promise(interp: &Interpreter, this: &Value, name: &str) -> Result<Promise, Throw> {
  match this {
    Value::Promise(promise) => Ok(promise.clone()),
    other => Err(interp.throw(
      ErrorKind::TypeError,
      format!("Method Promise.prototype.{} called on incompatible receiver {}", name, other.summary()),
    )),
  }
}

pub(super) fn prototype() -> PropertyMap {
  let mut proto = PropertyMap::new();

  method(&mut proto, "then", |interp, this, args| {
    let source = this_promise(interp, &this, "then")?;
    Ok(Value::Promise(interp.chain(&source, arg(&args, 0), arg(&args, 1))))
  });
  method(&mut proto, "catch", |interp, this, args| {
    let source = this_promise(interp, &this, "catch")?;
    Ok(Value::Promise(interp.chain(&source, Value::Undefined, arg(&args, 0))))
  });
  method(&mut proto, "finally", |interp, this, args| {
    let source = this_promise(interp, &this, "finally")?;
    let callback = arg(&args, 0);
    let settled = source.settled();
    let derived = interp.new_promise();
    let target = derived.clone();
    let task = interp.clone();
    interp.realm().spawn_continuation(async move {
      let outcome = settled.await;
      if matches!(callback, Value::Function(_)) {
        let returned = task.call(&callback, Value::Undefined, Vec::new()).await;
        let waited = match returned {
          Ok(value) => task.await_value(value).await,
          Err(thrown) => Err(thrown),
        };
        if let Err(Throw(error)) = waited {
          target.reject(error);
          return;
        }
      }
      target.settle_with(outcome);
    });
    Ok(Value::Promise(derived))
  });

  proto
}
