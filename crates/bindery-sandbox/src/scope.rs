//! Lexical scopes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use bindery_script::ast::DeclKind;

use crate::value::Value;

struct Slot {
  value: Value,
  mutable: bool,
}

struct ScopeData {
  vars: RefCell<HashMap<Rc<str>, Slot>>,
  parent: Option<Scope>,
  /// Function and program scopes receive `var` declarations.
  function_scope: bool,
}

#[derive(Clone)]
pub struct Scope(Rc<ScopeData>);

/// Why an assignment was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
  Undeclared,
  Constant,
}

impl Scope {
  pub fn global() -> Self {
    Self::with_parent(None, true)
  }

  fn with_parent(parent: Option<Scope>, function_scope: bool) -> Self {
    Self(Rc::new(ScopeData {
      vars: RefCell::new(HashMap::new()),
      parent,
      function_scope,
    }))
  }

  /// A block scope nested in this one.
  pub fn block(&self) -> Self {
    Self::with_parent(Some(self.clone()), false)
  }

  /// A function (or program) scope nested in this one.
  pub fn function(&self) -> Self {
    Self::with_parent(Some(self.clone()), true)
  }

  fn var_scope(&self) -> &Scope {
    let mut scope = self;
    while !scope.0.function_scope {
      match &scope.0.parent {
        Some(parent) => scope = parent,
        None => break,
      }
    }
    scope
  }

  /// Declare `name`. `var` declarations land in the nearest function scope.
  pub fn declare(&self, name: impl Into<Rc<str>>, value: Value, kind: DeclKind) {
    let target = match kind {
      DeclKind::Var => self.var_scope(),
      DeclKind::Let | DeclKind::Const => self,
    };
    target.0.vars.borrow_mut().insert(
      name.into(),
      Slot {
        value,
        mutable: kind != DeclKind::Const,
      },
    );
  }

  /// Declare a `var` as undefined unless it already exists in its function
  /// scope.
  pub fn hoist_var(&self, name: &Rc<str>) {
    let target = self.var_scope();
    let mut vars = target.0.vars.borrow_mut();
    if !vars.contains_key(name) {
      vars.insert(
        name.clone(),
        Slot {
          value: Value::Undefined,
          mutable: true,
        },
      );
    }
  }

  pub fn lookup(&self, name: &str) -> Option<Value> {
    let mut scope = Some(self);
    while let Some(current) = scope {
      if let Some(slot) = current.0.vars.borrow().get(name) {
        return Some(slot.value.clone());
      }
      scope = current.0.parent.as_ref();
    }
    None
  }

  pub fn has(&self, name: &str) -> bool {
    self.lookup(name).is_some()
  }

  /// Whether `name` is declared directly in this scope.
  pub fn has_own(&self, name: &str) -> bool {
    self.0.vars.borrow().contains_key(name)
  }

  pub fn assign(&self, name: &str, value: Value) -> Result<(), AssignError> {
    let mut scope = Some(self);
    while let Some(current) = scope {
      if let Some(slot) = current.0.vars.borrow_mut().get_mut(name) {
        if !slot.mutable {
          return Err(AssignError::Constant);
        }
        slot.value = value;
        return Ok(());
      }
      scope = current.0.parent.as_ref();
    }
    Err(AssignError::Undeclared)
  }

  /// Outermost ancestor.
  pub fn root(&self) -> Scope {
    let mut scope = self.clone();
    while let Some(parent) = scope.0.parent.clone() {
      scope = parent;
    }
    scope
  }

  /// Drop every variable, breaking reference cycles through closures.
  pub fn clear(&self) {
    let vars = std::mem::take(&mut *self.0.vars.borrow_mut());
    drop(vars);
  }
}

/// Weak handle used to clear scopes at the end of a run.
pub(crate) struct WeakScope(Weak<ScopeData>);

impl WeakScope {
  pub(crate) fn new(scope: &Scope) -> Self {
    Self(Rc::downgrade(&scope.0))
  }

  pub(crate) fn is_alive(&self) -> bool {
    self.0.strong_count() > 0
  }

  pub(crate) fn clear(&self) {
    if let Some(data) = self.0.upgrade() {
      Scope(data).clear();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_shadowing_and_lookup() {
    let global = Scope::global();
    global.declare("a", Value::Number(1.0), DeclKind::Let);
    let inner = global.block();
    inner.declare("a", Value::Number(2.0), DeclKind::Let);

    assert_eq!(inner.lookup("a").map(|v| v.to_number()), Some(2.0));
    assert_eq!(global.lookup("a").map(|v| v.to_number()), Some(1.0));
    assert!(inner.lookup("missing").is_none());
  }

  #[test]
  fn test_var_goes_to_function_scope() {
    let function = Scope::global().function();
    let block = function.block().block();
    block.declare("v", Value::Bool(true), DeclKind::Var);
    assert!(function.has_own("v"));
    assert!(!block.has_own("v"));
  }

  #[test]
  fn test_const_cannot_be_reassigned() {
    let scope = Scope::global();
    scope.declare("c", Value::Null, DeclKind::Const);
    assert_eq!(scope.assign("c", Value::Null), Err(AssignError::Constant));
    assert_eq!(scope.assign("nope", Value::Null), Err(AssignError::Undeclared));
  }

  #[test]
  fn test_hoist_keeps_existing_value() {
    let scope = Scope::global();
    scope.declare("x", Value::Number(3.0), DeclKind::Var);
    scope.hoist_var(&Rc::from("x"));
    assert_eq!(scope.lookup("x").map(|v| v.to_number()), Some(3.0));
  }
}
