use std::time::Duration;

use tracing::debug;

use super::arg;
use crate::value::{Function, Value};

/// Longest delay honoured; larger values fire immediately, as in browsers.
const MAX_DELAY_MS: f64 = 2_147_483_647.0;

pub(super) fn set_timeout() -> Function {
  Function::native("setTimeout", |interp, _, args| {
    let callback = arg(&args, 0);
    let delay = arg(&args, 1).to_number();
    let delay = if delay.is_finite() && (0.0..=MAX_DELAY_MS).contains(&delay) { delay } else { 0.0 };
    let extra: Vec<Value> = args.into_iter().skip(2).collect();

    let realm = interp.realm();
    let id = realm.next_timer_id();
    let task = interp.clone();
    let handle = realm.spawn_work(async move {
      tokio::time::sleep(Duration::from_millis(delay as u64)).await;
      task.realm().forget_timer(id);
      if !matches!(callback, Value::Function(_)) {
        return;
      }
      match task.call(&callback, Value::Undefined, extra).await {
        Ok(Value::Promise(promise)) => {
          // Async callbacks may wait on anything; only their rejection matters.
          let settled = promise.settled();
          let reporter = task.clone();
          task.realm().spawn_continuation(async move {
            if let Err(reason) = settled.await {
              reporter.realm().report_uncaught(reason);
            }
          });
        }
        Ok(_) => {}
        Err(thrown) => {
          debug!(timer = id, error = %thrown.value().summary(), "timer callback threw");
          task.realm().report_uncaught(thrown.into_value());
        }
      }
    });
    realm.register_timer(id, handle);
    Ok(Value::Number(id as f64))
  })
}

pub(super) fn clear_timeout() -> Function {
  Function::native("clearTimeout", |interp, _, args| {
    if let Value::Number(id) = arg(&args, 0)
      && id >= 1.0
    {
      interp.realm().cancel_timer(id as u64);
    }
    Ok(Value::Undefined)
  })
}
