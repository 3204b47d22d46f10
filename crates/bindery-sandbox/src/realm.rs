//! State owned by one evaluation run.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use bindery_host_log::LogCapture;
use bindery_trigger::TriggerDispatcher;
use tokio::task::{AbortHandle, JoinHandle};

use crate::builtins::Prototypes;
use crate::promise::PromiseHooks;
use crate::scope::{Scope, WeakScope};
use crate::value::Value;

/// Where trigger calls of a run go.
pub struct TriggerLink {
  pub dispatcher: Arc<TriggerDispatcher>,
  pub run_id: String,
}

pub struct Realm {
  pub(crate) globals: Scope,
  pub(crate) hooks: Rc<PromiseHooks>,
  pub(crate) prototypes: Prototypes,
  pub(crate) console: LogCapture<Value>,
  pub(crate) triggers: TriggerLink,
  /// `entity.property` shown in error stacks.
  pub(crate) location: Rc<str>,
  max_call_depth: usize,
  depth: Cell<usize>,
  /// Tasks waiting on something outside the run (trigger responses, timers).
  work: RefCell<Vec<JoinHandle<()>>>,
  /// Tasks only waiting on other promises of the run.
  continuations: RefCell<Vec<JoinHandle<()>>>,
  timers: RefCell<HashMap<u64, AbortHandle>>,
  next_timer: Cell<u64>,
  /// Errors thrown from timer callbacks.
  uncaught: RefCell<Vec<Value>>,
  scopes: RefCell<Vec<WeakScope>>,
}

impl Realm {
  pub(crate) fn new(
    console: LogCapture<Value>,
    triggers: TriggerLink,
    location: &str,
    max_call_depth: usize,
  ) -> Self {
    let globals = Scope::global();
    Self {
      scopes: RefCell::new(vec![WeakScope::new(&globals)]),
      globals,
      hooks: PromiseHooks::new(),
      prototypes: Prototypes::new(),
      console,
      triggers,
      location: Rc::from(location),
      max_call_depth,
      depth: Cell::new(0),
      work: RefCell::new(Vec::new()),
      continuations: RefCell::new(Vec::new()),
      timers: RefCell::new(HashMap::new()),
      next_timer: Cell::new(1),
      uncaught: RefCell::new(Vec::new()),
    }
  }

  /// Enter a call frame; `None` when the depth limit is reached.
  pub(crate) fn enter(&self) -> Option<DepthGuard<'_>> {
    let depth = self.depth.get();
    if depth >= self.max_call_depth {
      return None;
    }
    self.depth.set(depth + 1);
    Some(DepthGuard { realm: self })
  }

  pub(crate) fn track_scope(&self, scope: &Scope) {
    let mut scopes = self.scopes.borrow_mut();
    if scopes.len() >= 1024 && scopes.len().is_power_of_two() {
      scopes.retain(WeakScope::is_alive);
    }
    scopes.push(WeakScope::new(scope));
  }

  pub(crate) fn spawn_work(&self, task: impl Future<Output = ()> + 'static) -> AbortHandle {
    let handle = tokio::task::spawn_local(task);
    let abort = handle.abort_handle();
    self.work.borrow_mut().push(handle);
    self.hooks.bump();
    abort
  }

  pub(crate) fn spawn_continuation(&self, task: impl Future<Output = ()> + 'static) {
    let handle = tokio::task::spawn_local(task);
    self.continuations.borrow_mut().push(handle);
    self.hooks.bump();
  }

  pub(crate) fn take_work(&self) -> Vec<JoinHandle<()>> {
    std::mem::take(&mut *self.work.borrow_mut())
  }

  pub(crate) fn has_work(&self) -> bool {
    !self.work.borrow().is_empty()
  }

  pub(crate) fn next_timer_id(&self) -> u64 {
    let id = self.next_timer.get();
    self.next_timer.set(id + 1);
    id
  }

  pub(crate) fn register_timer(&self, id: u64, handle: AbortHandle) {
    self.timers.borrow_mut().insert(id, handle);
  }

  pub(crate) fn forget_timer(&self, id: u64) {
    self.timers.borrow_mut().remove(&id);
  }

  pub(crate) fn cancel_timer(&self, id: u64) -> bool {
    match self.timers.borrow_mut().remove(&id) {
      Some(handle) => {
        handle.abort();
        true
      }
      None => false,
    }
  }

  pub(crate) fn report_uncaught(&self, error: Value) {
    self.uncaught.borrow_mut().push(error);
  }

  pub(crate) fn take_uncaught(&self) -> Vec<Value> {
    std::mem::take(&mut *self.uncaught.borrow_mut())
  }

  /// Abort leftover tasks and clear every scope so closures do not keep the
  /// run alive through reference cycles.
  pub(crate) fn teardown(&self) {
    for handle in self.take_work() {
      handle.abort();
    }
    for handle in std::mem::take(&mut *self.continuations.borrow_mut()) {
      handle.abort();
    }
    for (_, handle) in self.timers.borrow_mut().drain() {
      handle.abort();
    }
    for scope in std::mem::take(&mut *self.scopes.borrow_mut()) {
      scope.clear();
    }
    self.hooks.clear();
  }
}

pub(crate) struct DepthGuard<'a> {
  realm: &'a Realm,
}

impl Drop for DepthGuard<'_> {
  fn drop(&mut self) {
    self.realm.depth.set(self.realm.depth.get().saturating_sub(1));
  }
}
