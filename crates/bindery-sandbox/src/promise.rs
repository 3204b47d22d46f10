//! Promises backed by wakers.
//!
//! A promise settles at most once. Awaiting it through [`Promise::settled`]
//! marks it handled; a rejection nobody ever handles is reported through the
//! [`PromiseHooks`] of the run that created it.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use crate::value::Value;

#[derive(Clone)]
pub enum PromiseState {
  Pending,
  Fulfilled(Value),
  Rejected(Value),
}

struct PromiseData {
  state: PromiseState,
  waiters: Vec<Waker>,
  handled: bool,
}

/// Per-run bookkeeping shared by every promise the run creates.
#[derive(Default)]
pub struct PromiseHooks {
  /// Bumped whenever something settles; used to detect quiescence.
  epoch: Cell<u64>,
  rejected: RefCell<Vec<Promise>>,
}

impl PromiseHooks {
  pub fn new() -> Rc<Self> {
    Rc::new(Self::default())
  }

  pub fn epoch(&self) -> u64 {
    self.epoch.get()
  }

  pub fn bump(&self) {
    self.epoch.set(self.epoch.get().wrapping_add(1));
  }

  /// Reasons of rejected promises that were never awaited or chained.
  pub fn unhandled(&self) -> Vec<Value> {
    self
      .rejected
      .borrow()
      .iter()
      .filter(|promise| !promise.is_handled())
      .filter_map(|promise| match promise.state() {
        PromiseState::Rejected(reason) => Some(reason),
        _ => None,
      })
      .collect()
  }

  pub fn clear(&self) {
    self.rejected.borrow_mut().clear();
  }
}

#[derive(Clone)]
pub struct Promise {
  data: Rc<RefCell<PromiseData>>,
  hooks: Weak<PromiseHooks>,
}

impl Promise {
  pub fn pending(hooks: &Rc<PromiseHooks>) -> Self {
    Self {
      data: Rc::new(RefCell::new(PromiseData {
        state: PromiseState::Pending,
        waiters: Vec::new(),
        handled: false,
      })),
      hooks: Rc::downgrade(hooks),
    }
  }

  pub fn fulfilled(hooks: &Rc<PromiseHooks>, value: Value) -> Self {
    let promise = Self::pending(hooks);
    promise.fulfill(value);
    promise
  }

  pub fn rejected(hooks: &Rc<PromiseHooks>, reason: Value) -> Self {
    let promise = Self::pending(hooks);
    promise.reject(reason);
    promise
  }

  pub fn fulfill(&self, value: Value) {
    self.settle(PromiseState::Fulfilled(value));
  }

  pub fn reject(&self, reason: Value) {
    self.settle(PromiseState::Rejected(reason));
  }

  /// Settle with the outcome of an evaluation.
  pub fn settle_with(&self, outcome: Result<Value, Value>) {
    match outcome {
      Ok(value) => self.fulfill(value),
      Err(reason) => self.reject(reason),
    }
  }

  fn settle(&self, state: PromiseState) {
    let (waiters, unhandled_rejection) = {
      let mut data = self.data.borrow_mut();
      if !matches!(data.state, PromiseState::Pending) {
        return;
      }
      let rejected = matches!(state, PromiseState::Rejected(_));
      data.state = state;
      (std::mem::take(&mut data.waiters), rejected && !data.handled)
    };

    if let Some(hooks) = self.hooks.upgrade() {
      hooks.bump();
      if unhandled_rejection {
        hooks.rejected.borrow_mut().push(self.clone());
      }
    }
    for waiter in waiters {
      waiter.wake();
    }
  }

  pub fn state(&self) -> PromiseState {
    self.data.borrow().state.clone()
  }

  pub fn is_pending(&self) -> bool {
    matches!(self.data.borrow().state, PromiseState::Pending)
  }

  pub fn is_handled(&self) -> bool {
    self.data.borrow().handled
  }

  pub fn mark_handled(&self) {
    self.data.borrow_mut().handled = true;
  }

  /// Future resolving to `Ok(value)` or `Err(reason)`. Marks the promise
  /// handled.
  pub fn settled(&self) -> Settled {
    self.mark_handled();
    Settled {
      promise: self.clone(),
    }
  }

  pub fn ptr_eq(&self, other: &Promise) -> bool {
    Rc::ptr_eq(&self.data, &other.data)
  }
}

pub struct Settled {
  promise: Promise,
}

impl Future for Settled {
  type Output = Result<Value, Value>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut data = self.promise.data.borrow_mut();
    match &data.state {
      PromiseState::Fulfilled(value) => Poll::Ready(Ok(value.clone())),
      PromiseState::Rejected(reason) => Poll::Ready(Err(reason.clone())),
      PromiseState::Pending => {
        if !data.waiters.iter().any(|waiter| waiter.will_wake(cx.waker())) {
          data.waiters.push(cx.waker().clone());
        }
        Poll::Pending
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_settles_once() {
    let hooks = PromiseHooks::new();
    let promise = Promise::pending(&hooks);
    promise.fulfill(Value::Number(1.0));
    promise.reject(Value::from("late"));

    let outcome = promise.settled().await;
    assert!(matches!(outcome, Ok(Value::Number(n)) if n == 1.0));
    assert!(hooks.unhandled().is_empty());
  }

  #[tokio::test]
  async fn test_waiter_is_woken() {
    let hooks = PromiseHooks::new();
    let promise = Promise::pending(&hooks);
    let waiting = promise.settled();

    let settler = promise.clone();
    let local = tokio::task::LocalSet::new();
    let outcome = local
      .run_until(async move {
        tokio::task::spawn_local(async move {
          tokio::task::yield_now().await;
          settler.reject(Value::from("nope"));
        });
        waiting.await
      })
      .await;

    assert!(matches!(outcome, Err(Value::String(s)) if &*s == "nope"));
    // Awaited before it rejected, so it is handled.
    assert!(hooks.unhandled().is_empty());
  }

  #[test]
  fn test_unhandled_rejection_is_reported() {
    let hooks = PromiseHooks::new();
    let epoch = hooks.epoch();
    let promise = Promise::rejected(&hooks, Value::from("boom"));
    assert!(hooks.epoch() > epoch);
    assert_eq!(hooks.unhandled().len(), 1);

    // Chaining later still counts as handling it.
    let _ = promise.settled();
    assert!(hooks.unhandled().is_empty());
  }
}
