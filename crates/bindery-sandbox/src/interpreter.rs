//! Tree-walking evaluator.
//!
//! Every evaluation step is a boxed local future so that `await` can suspend
//! anywhere inside an async function body. Synchronous code never actually
//! suspends; the only pending points are awaits on unsettled promises.

use std::cmp::Ordering;
use std::rc::Rc;
use std::task::Poll;

use bindery_script::ast::{
  ArrayItem, Argument, AssignOp, BinaryOp, DeclKind, Expr, Function as FunctionDef, FunctionBody,
  LogicalOp, MemberKey, Param, Pattern, Property, PropertyKey, Script, Stmt, UnaryOp, UpdateOp,
};
use futures::future::{self, LocalBoxFuture};

use crate::error::{ErrorKind, Throw};
use crate::promise::Promise;
use crate::realm::{DepthGuard, Realm};
use crate::scope::{AssignError, Scope};
use crate::value::{
  Function, FunctionKind, MAX_ARRAY_LENGTH, MAX_STRING_LENGTH, Native, Object, PropertyMap, Value,
  number_to_string,
};

pub type EvalResult = Result<Value, Throw>;

/// Statement completion.
pub(crate) enum Flow {
  Normal,
  Return(Value),
  Break,
  Continue,
}

#[derive(Clone)]
pub struct Interpreter {
  realm: Rc<Realm>,
}

impl Interpreter {
  pub(crate) fn new(realm: Realm) -> Self {
    Self {
      realm: Rc::new(realm),
    }
  }

  pub(crate) fn realm(&self) -> &Realm {
    &self.realm
  }

  pub fn globals(&self) -> &Scope {
    &self.realm.globals
  }

  /// An error object of `kind` whose stack points at the running binding.
  pub fn error_value(&self, kind: ErrorKind, message: impl Into<String>) -> Value {
    let message = message.into();
    let stack = format!("{}: {}\n    at {}", kind.as_str(), message, self.realm.location);
    Value::Object(Object::error(kind.as_str(), &message, stack))
  }

  pub fn throw(&self, kind: ErrorKind, message: impl Into<String>) -> Throw {
    Throw(self.error_value(kind, message))
  }

  /// Validate a requested array length.
  pub fn array_length(&self, length: f64) -> Result<usize, Throw> {
    if length < 0.0 || length.fract() != 0.0 || !length.is_finite() || length > MAX_ARRAY_LENGTH as f64 {
      return Err(self.throw(ErrorKind::RangeError, "Invalid array length"));
    }
    Ok(length as usize)
  }

  /// Resize `items` to `length`, throwing instead of aborting when the
  /// allocation fails.
  pub fn resize_array(&self, items: &mut Vec<Value>, length: usize) -> Result<(), Throw> {
    if length > MAX_ARRAY_LENGTH
      || (length > items.len() && items.try_reserve_exact(length - items.len()).is_err())
    {
      return Err(self.throw(ErrorKind::RangeError, "Invalid array length"));
    }
    items.resize(length, Value::Undefined);
    Ok(())
  }

  /// Throw unless a string of `bytes` bytes fits.
  pub fn check_string_length(&self, bytes: usize) -> Result<(), Throw> {
    if bytes > MAX_STRING_LENGTH {
      return Err(self.throw(ErrorKind::RangeError, "Invalid string length"));
    }
    Ok(())
  }

  fn enter_frame(&self) -> Result<DepthGuard<'_>, Throw> {
    self
      .realm
      .enter()
      .ok_or_else(|| self.throw(ErrorKind::RangeError, "Maximum call stack size exceeded"))
  }

  fn block_scope(&self, parent: &Scope) -> Scope {
    let scope = parent.block();
    self.realm.track_scope(&scope);
    scope
  }

  fn function_scope(&self, parent: &Scope) -> Scope {
    let scope = parent.function();
    self.realm.track_scope(&scope);
    scope
  }

  // Promises

  pub fn new_promise(&self) -> Promise {
    Promise::pending(&self.realm.hooks)
  }

  /// Resolve `promise` with `value`, adopting the state of `value` when it
  /// is itself a promise.
  pub fn resolve(&self, promise: &Promise, value: Value) {
    match value {
      Value::Promise(inner) if inner.ptr_eq(promise) => {
        promise.reject(self.error_value(ErrorKind::TypeError, "Chaining cycle detected for promise"))
      }
      Value::Promise(inner) => {
        let target = promise.clone();
        let settled = inner.settled();
        self
          .realm
          .spawn_continuation(async move { target.settle_with(settled.await) });
      }
      other => promise.fulfill(other),
    }
  }

  /// `value` as a promise, wrapping plain values in a fulfilled one.
  pub fn to_promise(&self, value: Value) -> Promise {
    match value {
      Value::Promise(promise) => promise,
      other => Promise::fulfilled(&self.realm.hooks, other),
    }
  }

  /// Attach reactions to `source`, returning the derived promise. Handlers
  /// that are not functions pass the outcome through.
  pub fn chain(&self, source: &Promise, on_fulfilled: Value, on_rejected: Value) -> Promise {
    let derived = self.new_promise();
    let settled = source.settled();
    let interp = self.clone();
    let target = derived.clone();
    self.realm.spawn_continuation(async move {
      let (handler, outcome) = match settled.await {
        Ok(value) => (on_fulfilled, Ok(value)),
        Err(reason) => (on_rejected, Err(reason)),
      };
      if !matches!(handler, Value::Function(_)) {
        target.settle_with(outcome);
        return;
      }
      let argument = match outcome {
        Ok(value) | Err(value) => value,
      };
      match interp.call(&handler, Value::Undefined, vec![argument]).await {
        Ok(value) => interp.resolve(&target, value),
        Err(Throw(error)) => target.reject(error),
      }
    });
    derived
  }

  pub async fn await_value(&self, value: Value) -> EvalResult {
    match value {
      Value::Promise(promise) => promise.settled().await.map_err(Throw),
      other => Ok(other),
    }
  }

  // Calls

  /// Call `callee` with receiver `this`.
  pub fn call(&self, callee: &Value, this: Value, args: Vec<Value>) -> LocalBoxFuture<'static, EvalResult> {
    let Value::Function(function) = callee else {
      let error = self.throw(
        ErrorKind::TypeError,
        format!("{} is not a function", callee.summary()),
      );
      return Box::pin(future::ready(Err(error)));
    };
    let function = function.clone();
    let interp = self.clone();
    Box::pin(async move { interp.invoke(&function, this, args).await })
  }

  async fn invoke(&self, function: &Function, this: Value, args: Vec<Value>) -> EvalResult {
    match function.kind() {
      FunctionKind::Native(Native::Sync(native)) => {
        let _frame = self.enter_frame()?;
        native(self, this, args)
      }
      FunctionKind::Native(Native::Async(native)) => {
        let native = native.clone();
        let _frame = self.enter_frame()?;
        native(self.clone(), this, args).await
      }
      FunctionKind::Closure { def, scope } if def.is_async => {
        self.call_async(def.clone(), scope.clone(), args).await
      }
      FunctionKind::Closure { def, scope } => {
        let _frame = self.enter_frame()?;
        self.run_closure(def, scope, args).await
      }
    }
  }

  /// Start an async function. The body runs eagerly up to its first pending
  /// await; the rest continues as a local task.
  async fn call_async(&self, def: Rc<FunctionDef>, scope: Scope, args: Vec<Value>) -> EvalResult {
    let promise = self.new_promise();
    let interp = self.clone();
    let mut body: LocalBoxFuture<'static, EvalResult> =
      Box::pin(async move { interp.run_closure(&def, &scope, args).await });

    let first = {
      let _frame = self.enter_frame()?;
      futures::poll!(&mut body)
    };
    match first {
      Poll::Ready(outcome) => promise.settle_with(outcome.map_err(Throw::into_value)),
      Poll::Pending => {
        let target = promise.clone();
        self.realm.spawn_continuation(async move {
          target.settle_with(body.await.map_err(Throw::into_value));
        });
      }
    }
    Ok(Value::Promise(promise))
  }

  async fn run_closure(&self, def: &FunctionDef, closure_scope: &Scope, args: Vec<Value>) -> EvalResult {
    let scope = self.function_scope(closure_scope);
    self.bind_params(&def.params, args, &scope).await?;
    match &def.body {
      FunctionBody::Expression(expr) => self.eval(expr, &scope).await,
      FunctionBody::Block(stmts) => {
        self.hoist(stmts, &scope);
        match self.exec_list(stmts, &scope).await? {
          Flow::Return(value) => Ok(value),
          _ => Ok(Value::Undefined),
        }
      }
    }
  }

  async fn bind_params(&self, params: &[Param], args: Vec<Value>, scope: &Scope) -> Result<(), Throw> {
    let mut args = args.into_iter();
    for param in params {
      if param.rest {
        let rest = Value::array(args.by_ref().collect());
        self.bind_pattern(&param.pattern, rest, scope, DeclKind::Let).await?;
        break;
      }
      let mut value = args.next().unwrap_or(Value::Undefined);
      if let (true, Some(default)) = (value.is_undefined(), &param.default) {
        value = self.eval(default, scope).await?;
      }
      self.bind_pattern(&param.pattern, value, scope, DeclKind::Let).await?;
    }
    Ok(())
  }

  async fn construct(&self, callee: &Value, args: Vec<Value>, callee_expr: &Expr) -> EvalResult {
    match callee {
      Value::Function(function) if function.is_constructor() => {
        self.call(callee, Value::Undefined, args).await
      }
      _ => Err(self.throw(
        ErrorKind::TypeError,
        format!("{} is not a constructor", describe(callee_expr)),
      )),
    }
  }

  // Programs and statements

  /// Run a parsed script in a fresh program scope. A program evaluates to
  /// its last expression statement, or to the value of a top-level `return`.
  pub async fn run_script(&self, script: &Script) -> EvalResult {
    let scope = self.function_scope(&self.realm.globals);
    match script {
      Script::Expression(expr) => self.eval(expr, &scope).await,
      Script::Program(program) => {
        self.hoist(&program.body, &scope);
        let mut last = Value::Undefined;
        for stmt in &program.body {
          if let Stmt::Expr(expr) = stmt {
            last = self.eval(expr, &scope).await?;
            continue;
          }
          match self.exec(stmt, &scope).await? {
            Flow::Return(value) => return Ok(value),
            Flow::Break | Flow::Continue => break,
            Flow::Normal => {}
          }
        }
        Ok(last)
      }
    }
  }

  fn hoist(&self, stmts: &[Stmt], scope: &Scope) {
    let mut names = Vec::new();
    collect_var_names(stmts, &mut names);
    for name in &names {
      scope.hoist_var(name);
    }
    self.hoist_functions(stmts, scope);
  }

  fn hoist_functions(&self, stmts: &[Stmt], scope: &Scope) {
    for stmt in stmts {
      if let Stmt::Function(def) = stmt
        && let Some(name) = &def.name
      {
        let function = Function::closure(def.clone(), scope.clone(), None);
        scope.declare(name.clone(), Value::Function(function), DeclKind::Let);
      }
    }
  }

  async fn exec_list(&self, stmts: &[Stmt], scope: &Scope) -> Result<Flow, Throw> {
    for stmt in stmts {
      match self.exec(stmt, scope).await? {
        Flow::Normal => {}
        other => return Ok(other),
      }
    }
    Ok(Flow::Normal)
  }

  async fn exec_block(&self, stmts: &[Stmt], parent: &Scope) -> Result<Flow, Throw> {
    let scope = self.block_scope(parent);
    self.hoist_functions(stmts, &scope);
    self.exec_list(stmts, &scope).await
  }

  fn exec<'a>(&'a self, stmt: &'a Stmt, scope: &'a Scope) -> LocalBoxFuture<'a, Result<Flow, Throw>> {
    Box::pin(async move {
      match stmt {
        Stmt::Expr(expr) => {
          self.eval(expr, scope).await?;
          Ok(Flow::Normal)
        }
        Stmt::Declaration { kind, declarators } => {
          for declarator in declarators {
            let value = match (&declarator.init, kind) {
              (Some(init), _) => {
                self
                  .eval_named(init, scope, single_name(&declarator.pattern))
                  .await?
              }
              (None, DeclKind::Var) => {
                for name in declarator.pattern.bound_names() {
                  scope.hoist_var(&name);
                }
                continue;
              }
              (None, _) => Value::Undefined,
            };
            self
              .bind_pattern(&declarator.pattern, value, scope, *kind)
              .await?;
          }
          Ok(Flow::Normal)
        }
        Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
        Stmt::Return(argument) => {
          let value = match argument {
            Some(expr) => self.eval(expr, scope).await?,
            None => Value::Undefined,
          };
          Ok(Flow::Return(value))
        }
        Stmt::If {
          test,
          consequent,
          alternate,
        } => {
          if self.eval(test, scope).await?.truthy() {
            self.exec(consequent, scope).await
          } else if let Some(alternate) = alternate {
            self.exec(alternate, scope).await
          } else {
            Ok(Flow::Normal)
          }
        }
        Stmt::Block(stmts) => self.exec_block(stmts, scope).await,
        Stmt::For {
          init,
          test,
          update,
          body,
        } => {
          self
            .exec_for(init.as_deref(), test.as_ref(), update.as_ref(), body, scope)
            .await
        }
        Stmt::ForOf {
          kind,
          pattern,
          iterable,
          body,
        } => {
          let iterable = self.eval(iterable, scope).await?;
          let items = self.iterate(&iterable)?;
          self.exec_each(items, *kind, pattern, body, scope).await
        }
        Stmt::ForIn {
          kind,
          pattern,
          object,
          body,
        } => {
          let object = self.eval(object, scope).await?;
          let keys = self
            .own_entries(&object)
            .into_iter()
            .map(|(key, _)| Value::String(key))
            .collect();
          self.exec_each(keys, *kind, pattern, body, scope).await
        }
        Stmt::While { test, body } => {
          while self.eval(test, scope).await?.truthy() {
            match self.exec(body, scope).await? {
              Flow::Break => break,
              Flow::Return(value) => return Ok(Flow::Return(value)),
              Flow::Normal | Flow::Continue => {}
            }
          }
          Ok(Flow::Normal)
        }
        Stmt::DoWhile { body, test } => {
          loop {
            match self.exec(body, scope).await? {
              Flow::Break => break,
              Flow::Return(value) => return Ok(Flow::Return(value)),
              Flow::Normal | Flow::Continue => {}
            }
            if !self.eval(test, scope).await?.truthy() {
              break;
            }
          }
          Ok(Flow::Normal)
        }
        Stmt::Break => Ok(Flow::Break),
        Stmt::Continue => Ok(Flow::Continue),
        Stmt::Throw(expr) => Err(Throw(self.eval(expr, scope).await?)),
        Stmt::Try {
          block,
          handler,
          finalizer,
        } => {
          let mut outcome = self.exec_block(block, scope).await;
          if let (Err(Throw(error)), Some(handler)) = (&outcome, handler) {
            let error = error.clone();
            let catch_scope = self.block_scope(scope);
            outcome = async {
              if let Some(param) = &handler.param {
                self
                  .bind_pattern(param, error, &catch_scope, DeclKind::Let)
                  .await?;
              }
              self.exec_block(&handler.body, &catch_scope).await
            }
            .await;
          }
          if let Some(finalizer) = finalizer {
            match self.exec_block(finalizer, scope).await? {
              Flow::Normal => {}
              other => return Ok(other),
            }
          }
          outcome
        }
      }
    })
  }

  async fn exec_for(
    &self,
    init: Option<&Stmt>,
    test: Option<&Expr>,
    update: Option<&Expr>,
    body: &Stmt,
    scope: &Scope,
  ) -> Result<Flow, Throw> {
    let loop_scope = self.block_scope(scope);
    // `let` bindings get a fresh copy per iteration so closures capture the
    // value of their own iteration.
    let mut per_iteration = Vec::new();
    if let Some(init) = init {
      if let Stmt::Declaration {
        kind: DeclKind::Let | DeclKind::Const,
        declarators,
      } = init
      {
        per_iteration = declarators
          .iter()
          .flat_map(|declarator| declarator.pattern.bound_names())
          .collect();
      }
      self.exec(init, &loop_scope).await?;
    }

    loop {
      if let Some(test) = test
        && !self.eval(test, &loop_scope).await?.truthy()
      {
        break;
      }

      let iteration = self.block_scope(&loop_scope);
      for name in &per_iteration {
        if let Some(value) = loop_scope.lookup(name) {
          iteration.declare(name.clone(), value, DeclKind::Let);
        }
      }
      let flow = self.exec(body, &iteration).await?;
      for name in &per_iteration {
        if let Some(value) = iteration.lookup(name) {
          let _ = loop_scope.assign(name, value);
        }
      }

      match flow {
        Flow::Break => break,
        Flow::Return(value) => return Ok(Flow::Return(value)),
        Flow::Normal | Flow::Continue => {}
      }
      if let Some(update) = update {
        self.eval(update, &loop_scope).await?;
      }
    }
    Ok(Flow::Normal)
  }

  async fn exec_each(
    &self,
    items: Vec<Value>,
    kind: DeclKind,
    pattern: &Pattern,
    body: &Stmt,
    scope: &Scope,
  ) -> Result<Flow, Throw> {
    for item in items {
      let iteration = self.block_scope(scope);
      self.bind_pattern(pattern, item, &iteration, kind).await?;
      match self.exec(body, &iteration).await? {
        Flow::Break => break,
        Flow::Return(value) => return Ok(Flow::Return(value)),
        Flow::Normal | Flow::Continue => {}
      }
    }
    Ok(Flow::Normal)
  }

  fn bind_pattern<'a>(
    &'a self,
    pattern: &'a Pattern,
    value: Value,
    scope: &'a Scope,
    kind: DeclKind,
  ) -> LocalBoxFuture<'a, Result<(), Throw>> {
    Box::pin(async move {
      match pattern {
        Pattern::Ident(name) => {
          scope.declare(name.clone(), value, kind);
          Ok(())
        }
        Pattern::Object { properties, rest } => {
          if value.is_nullish() {
            return Err(self.throw(
              ErrorKind::TypeError,
              format!("Cannot destructure '{}' as it is {}.", value.summary(), value.summary()),
            ));
          }
          for property in properties {
            let mut item = self.get_property(&value, &property.key)?;
            if let (true, Some(default)) = (item.is_undefined(), &property.default) {
              item = self
                .eval_named(default, scope, single_name(&property.value))
                .await?;
            }
            self.bind_pattern(&property.value, item, scope, kind).await?;
          }
          if let Some(rest) = rest {
            let remaining: PropertyMap = self
              .own_entries(&value)
              .into_iter()
              .filter(|(key, _)| !properties.iter().any(|property| property.key == *key))
              .collect();
            scope.declare(rest.clone(), Value::object(remaining), kind);
          }
          Ok(())
        }
        Pattern::Array { elements, rest } => {
          let items = self.iterate(&value)?;
          for (index, element) in elements.iter().enumerate() {
            let Some(element) = element else {
              continue;
            };
            let mut item = items.get(index).cloned().unwrap_or(Value::Undefined);
            if let (true, Some(default)) = (item.is_undefined(), &element.default) {
              item = self
                .eval_named(default, scope, single_name(&element.pattern))
                .await?;
            }
            self.bind_pattern(&element.pattern, item, scope, kind).await?;
          }
          if let Some(rest) = rest {
            let remaining = items.get(elements.len()..).map(<[Value]>::to_vec).unwrap_or_default();
            self
              .bind_pattern(rest, Value::array(remaining), scope, kind)
              .await?;
          }
          Ok(())
        }
      }
    })
  }

  // Expressions

  fn eval<'a>(&'a self, expr: &'a Expr, scope: &'a Scope) -> LocalBoxFuture<'a, EvalResult> {
    Box::pin(async move {
      match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::String(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Template { quasis, exprs } => {
          let mut text = String::new();
          for (index, quasi) in quasis.iter().enumerate() {
            text.push_str(quasi);
            if let Some(expr) = exprs.get(index) {
              let part = self.eval(expr, scope).await?.to_js_string();
              self.check_string_length(text.len() + part.len())?;
              text.push_str(&part);
            }
          }
          Ok(Value::from(text))
        }
        Expr::Ident(name) => self.lookup(name, scope),
        Expr::Array(items) => {
          let mut values = Vec::with_capacity(items.len());
          for item in items {
            match item {
              ArrayItem::Expr(expr) => values.push(self.eval(expr, scope).await?),
              ArrayItem::Spread(expr) => {
                let spread = self.eval(expr, scope).await?;
                values.extend(self.iterate(&spread)?);
              }
              ArrayItem::Hole => values.push(Value::Undefined),
            }
          }
          Ok(Value::array(values))
        }
        Expr::Object(properties) => self.eval_object(properties, scope).await,
        Expr::Function(def) => Ok(Value::Function(Function::closure(
          def.clone(),
          scope.clone(),
          None,
        ))),
        Expr::Unary { op, argument } => self.eval_unary(*op, argument, scope).await,
        Expr::Update { op, prefix, target } => self.eval_update(*op, *prefix, target, scope).await,
        Expr::Binary { op, left, right } => {
          let left = self.eval(left, scope).await?;
          let right = self.eval(right, scope).await?;
          self.binary(*op, left, right)
        }
        Expr::Logical { op, left, right } => {
          let left = self.eval(left, scope).await?;
          let short_circuit = match op {
            LogicalOp::And => !left.truthy(),
            LogicalOp::Or => left.truthy(),
            LogicalOp::Nullish => !left.is_nullish(),
          };
          if short_circuit {
            Ok(left)
          } else {
            self.eval(right, scope).await
          }
        }
        Expr::Conditional {
          test,
          consequent,
          alternate,
        } => {
          if self.eval(test, scope).await?.truthy() {
            self.eval(consequent, scope).await
          } else {
            self.eval(alternate, scope).await
          }
        }
        Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, scope).await,
        Expr::Member { .. } | Expr::Call { .. } => {
          Ok(self.eval_chain(expr, scope).await?.unwrap_or(Value::Undefined))
        }
        Expr::New { callee, arguments } => {
          let constructor = self.eval(callee, scope).await?;
          let args = self.eval_arguments(arguments, scope).await?;
          self.construct(&constructor, args, callee).await
        }
        Expr::Await(argument) => {
          let value = self.eval(argument, scope).await?;
          self.await_value(value).await
        }
        Expr::Sequence(exprs) => {
          let mut last = Value::Undefined;
          for expr in exprs {
            last = self.eval(expr, scope).await?;
          }
          Ok(last)
        }
      }
    })
  }

  /// Evaluate `expr`, naming anonymous functions after the binding they are
  /// assigned to.
  async fn eval_named(&self, expr: &Expr, scope: &Scope, name: Option<&Rc<str>>) -> EvalResult {
    match (expr, name) {
      (Expr::Function(def), Some(name)) if def.name.is_none() => Ok(Value::Function(
        Function::closure(def.clone(), scope.clone(), Some(name.clone())),
      )),
      _ => self.eval(expr, scope).await,
    }
  }

  fn lookup(&self, name: &str, scope: &Scope) -> EvalResult {
    scope
      .lookup(name)
      .ok_or_else(|| self.throw(ErrorKind::ReferenceError, format!("{} is not defined", name)))
  }

  fn assign_name(&self, name: &str, value: Value, scope: &Scope) -> Result<(), Throw> {
    match scope.assign(name, value.clone()) {
      Ok(()) => Ok(()),
      // Assigning an undeclared name creates a global.
      Err(AssignError::Undeclared) => {
        self.realm.globals.declare(name, value, DeclKind::Var);
        Ok(())
      }
      Err(AssignError::Constant) => Err(self.throw(
        ErrorKind::TypeError,
        "Assignment to constant variable.",
      )),
    }
  }

  async fn eval_object(&self, properties: &[Property], scope: &Scope) -> EvalResult {
    let object = Object::new();
    for property in properties {
      match property {
        Property::KeyValue { key, value } => {
          let key = match key {
            PropertyKey::Named(name) => name.clone(),
            PropertyKey::Computed(expr) => property_key(&self.eval(expr, scope).await?),
          };
          let value = self.eval_named(value, scope, Some(&key)).await?;
          object.set(key, value);
        }
        Property::Spread(expr) => {
          let source = self.eval(expr, scope).await?;
          for (key, value) in self.own_entries(&source) {
            object.set(key, value);
          }
        }
      }
    }
    Ok(Value::Object(object))
  }

  async fn member_key(&self, property: &MemberKey, scope: &Scope) -> Result<Rc<str>, Throw> {
    match property {
      MemberKey::Named(name) => Ok(name.clone()),
      MemberKey::Computed(expr) => Ok(property_key(&self.eval(expr, scope).await?)),
    }
  }

  async fn eval_arguments(&self, arguments: &[Argument], scope: &Scope) -> Result<Vec<Value>, Throw> {
    let mut values = Vec::with_capacity(arguments.len());
    for argument in arguments {
      match argument {
        Argument::Expr(expr) => values.push(self.eval(expr, scope).await?),
        Argument::Spread(expr) => {
          let spread = self.eval(expr, scope).await?;
          values.extend(self.iterate(&spread)?);
        }
      }
    }
    Ok(values)
  }

  /// Evaluate a member/call chain. `None` means an optional link met a
  /// nullish value and the rest of the chain was skipped.
  fn eval_chain<'a>(&'a self, expr: &'a Expr, scope: &'a Scope) -> LocalBoxFuture<'a, Result<Option<Value>, Throw>> {
    Box::pin(async move {
      match expr {
        Expr::Member {
          object,
          property,
          optional,
        } => {
          let Some(target) = self.eval_chain(object, scope).await? else {
            return Ok(None);
          };
          if *optional && target.is_nullish() {
            return Ok(None);
          }
          let key = self.member_key(property, scope).await?;
          self.get_property(&target, &key).map(Some)
        }
        Expr::Call {
          callee,
          arguments,
          optional,
        } => {
          let Some((this, function)) = self.eval_callee(callee, scope).await? else {
            return Ok(None);
          };
          if *optional && function.is_nullish() {
            return Ok(None);
          }
          let args = self.eval_arguments(arguments, scope).await?;
          if !matches!(function, Value::Function(_)) {
            return Err(self.throw(
              ErrorKind::TypeError,
              format!("{} is not a function", describe(callee)),
            ));
          }
          self.call(&function, this, args).await.map(Some)
        }
        other => self.eval(other, scope).await.map(Some),
      }
    })
  }

  async fn eval_callee(&self, callee: &Expr, scope: &Scope) -> Result<Option<(Value, Value)>, Throw> {
    match callee {
      Expr::Member {
        object,
        property,
        optional,
      } => {
        let Some(target) = self.eval_chain(object, scope).await? else {
          return Ok(None);
        };
        if *optional && target.is_nullish() {
          return Ok(None);
        }
        let key = self.member_key(property, scope).await?;
        let function = self.get_property(&target, &key)?;
        Ok(Some((target, function)))
      }
      other => Ok(
        self
          .eval_chain(other, scope)
          .await?
          .map(|function| (Value::Undefined, function)),
      ),
    }
  }

  async fn eval_unary(&self, op: UnaryOp, argument: &Expr, scope: &Scope) -> EvalResult {
    match op {
      UnaryOp::TypeOf => {
        if let Expr::Ident(name) = argument
          && !scope.has(name)
        {
          return Ok(Value::from("undefined"));
        }
        Ok(Value::from(self.eval(argument, scope).await?.type_of()))
      }
      UnaryOp::Delete => {
        if let Expr::Member {
          object, property, ..
        } = argument
        {
          let target = self.eval(object, scope).await?;
          let key = self.member_key(property, scope).await?;
          self.delete_property(&target, &key)?;
        }
        Ok(Value::Bool(true))
      }
      UnaryOp::Not => Ok(Value::Bool(!self.eval(argument, scope).await?.truthy())),
      UnaryOp::Negate => Ok(Value::Number(-self.eval(argument, scope).await?.to_number())),
      UnaryOp::Plus => Ok(Value::Number(self.eval(argument, scope).await?.to_number())),
      UnaryOp::Void => {
        self.eval(argument, scope).await?;
        Ok(Value::Undefined)
      }
    }
  }

  async fn eval_update(&self, op: UpdateOp, prefix: bool, target: &Expr, scope: &Scope) -> EvalResult {
    let step = match op {
      UpdateOp::Increment => 1.0,
      UpdateOp::Decrement => -1.0,
    };
    let (old, new) = match target {
      Expr::Ident(name) => {
        let old = self.lookup(name, scope)?.to_number();
        self.assign_name(name, Value::Number(old + step), scope)?;
        (old, old + step)
      }
      Expr::Member {
        object, property, ..
      } => {
        let object = self.eval(object, scope).await?;
        let key = self.member_key(property, scope).await?;
        let old = self.get_property(&object, &key)?.to_number();
        self.set_property(&object, &key, Value::Number(old + step))?;
        (old, old + step)
      }
      _ => {
        return Err(self.throw(
          ErrorKind::SyntaxError,
          "Invalid left-hand side expression in update operation",
        ));
      }
    };
    Ok(Value::Number(if prefix { new } else { old }))
  }

  async fn eval_assign(&self, op: AssignOp, target: &Expr, value: &Expr, scope: &Scope) -> EvalResult {
    match target {
      Expr::Ident(name) => {
        let result = if op == AssignOp::Assign {
          self.eval_named(value, scope, Some(name)).await?
        } else {
          let current = self.lookup(name, scope)?;
          match self.compound(op, current, value, scope).await? {
            Compound::Unchanged(current) => return Ok(current),
            Compound::Assign(result) => result,
          }
        };
        self.assign_name(name, result.clone(), scope)?;
        Ok(result)
      }
      Expr::Member {
        object, property, ..
      } => {
        let object = self.eval(object, scope).await?;
        let key = self.member_key(property, scope).await?;
        let result = if op == AssignOp::Assign {
          self.eval(value, scope).await?
        } else {
          let current = self.get_property(&object, &key)?;
          match self.compound(op, current, value, scope).await? {
            Compound::Unchanged(current) => return Ok(current),
            Compound::Assign(result) => result,
          }
        };
        self.set_property(&object, &key, result.clone())?;
        Ok(result)
      }
      _ => Err(self.throw(ErrorKind::SyntaxError, "Invalid left-hand side in assignment")),
    }
  }

  async fn compound(&self, op: AssignOp, current: Value, value: &Expr, scope: &Scope) -> Result<Compound, Throw> {
    let binary = match op {
      AssignOp::And | AssignOp::Or | AssignOp::Nullish => {
        let keep = match op {
          AssignOp::And => !current.truthy(),
          AssignOp::Or => current.truthy(),
          _ => !current.is_nullish(),
        };
        if keep {
          return Ok(Compound::Unchanged(current));
        }
        return Ok(Compound::Assign(self.eval(value, scope).await?));
      }
      AssignOp::Add => BinaryOp::Add,
      AssignOp::Sub => BinaryOp::Sub,
      AssignOp::Mul => BinaryOp::Mul,
      AssignOp::Div => BinaryOp::Div,
      AssignOp::Rem => BinaryOp::Rem,
      AssignOp::Exp => BinaryOp::Exp,
      AssignOp::Assign => return Ok(Compound::Assign(self.eval(value, scope).await?)),
    };
    let right = self.eval(value, scope).await?;
    Ok(Compound::Assign(self.binary(binary, current, right)?))
  }

  pub fn binary(&self, op: BinaryOp, left: Value, right: Value) -> EvalResult {
    let number = |f: fn(f64, f64) -> f64| Ok(Value::Number(f(left.to_number(), right.to_number())));
    match op {
      BinaryOp::Add => {
        let (left, right) = (to_primitive(&left), to_primitive(&right));
        if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
          let (left, right) = (left.to_js_string(), right.to_js_string());
          self.check_string_length(left.len() + right.len())?;
          let mut text = String::with_capacity(left.len() + right.len());
          text.push_str(&left);
          text.push_str(&right);
          Ok(Value::from(text))
        } else {
          Ok(Value::Number(left.to_number() + right.to_number()))
        }
      }
      BinaryOp::Sub => number(|a, b| a - b),
      BinaryOp::Mul => number(|a, b| a * b),
      BinaryOp::Div => number(|a, b| a / b),
      BinaryOp::Rem => number(|a, b| a % b),
      BinaryOp::Exp => number(f64::powf),
      BinaryOp::Eq => Ok(Value::Bool(left.loose_equals(&right))),
      BinaryOp::NotEq => Ok(Value::Bool(!left.loose_equals(&right))),
      BinaryOp::StrictEq => Ok(Value::Bool(left.strict_equals(&right))),
      BinaryOp::StrictNotEq => Ok(Value::Bool(!left.strict_equals(&right))),
      BinaryOp::Lt => Ok(Value::Bool(compare(&left, &right) == Some(Ordering::Less))),
      BinaryOp::Gt => Ok(Value::Bool(compare(&left, &right) == Some(Ordering::Greater))),
      BinaryOp::LtEq => Ok(Value::Bool(matches!(
        compare(&left, &right),
        Some(Ordering::Less | Ordering::Equal)
      ))),
      BinaryOp::GtEq => Ok(Value::Bool(matches!(
        compare(&left, &right),
        Some(Ordering::Greater | Ordering::Equal)
      ))),
      BinaryOp::In => match &right {
        Value::Object(_) | Value::Array(_) | Value::Function(_) => {
          Ok(Value::Bool(self.has_property(&right, &property_key(&left))))
        }
        _ => Err(self.throw(
          ErrorKind::TypeError,
          format!(
            "Cannot use 'in' operator to search for '{}' in {}",
            left.summary(),
            right.summary()
          ),
        )),
      },
      BinaryOp::InstanceOf => match &right {
        Value::Function(constructor) => Ok(Value::Bool(instance_of(&left, constructor))),
        _ => Err(self.throw(
          ErrorKind::TypeError,
          "Right-hand side of 'instanceof' is not callable",
        )),
      },
    }
  }

  // Properties

  pub fn get_property(&self, target: &Value, key: &str) -> EvalResult {
    let prototypes = &self.realm.prototypes;
    let inherited = |map: &PropertyMap| map.get(key).cloned().unwrap_or(Value::Undefined);
    match target {
      Value::Undefined | Value::Null => Err(self.throw(
        ErrorKind::TypeError,
        format!("Cannot read properties of {} (reading '{}')", target.summary(), key),
      )),
      Value::Object(object) => Ok(object.get(key).unwrap_or_else(|| inherited(&prototypes.object))),
      Value::Array(array) => {
        if key == "length" {
          return Ok(Value::Number(array.len() as f64));
        }
        match array_index(key) {
          Some(index) => Ok(array.get(index)),
          None => Ok(inherited(&prototypes.array)),
        }
      }
      Value::String(s) => {
        if key == "length" {
          return Ok(Value::Number(s.chars().count() as f64));
        }
        match array_index(key) {
          Some(index) => Ok(
            s.chars()
              .nth(index)
              .map(|c| Value::from(c.to_string()))
              .unwrap_or(Value::Undefined),
          ),
          None => Ok(inherited(&prototypes.string)),
        }
      }
      Value::Number(_) => Ok(inherited(&prototypes.number)),
      Value::Bool(_) => Ok(inherited(&prototypes.boolean)),
      Value::Function(function) => match key {
        "name" => Ok(Value::from(function.name())),
        _ => Ok(function.get(key).unwrap_or_else(|| inherited(&prototypes.function))),
      },
      Value::Promise(_) => Ok(inherited(&prototypes.promise)),
    }
  }

  pub fn set_property(&self, target: &Value, key: &str, value: Value) -> Result<(), Throw> {
    match target {
      Value::Undefined | Value::Null => Err(self.throw(
        ErrorKind::TypeError,
        format!("Cannot set properties of {} (setting '{}')", target.summary(), key),
      )),
      Value::Object(object) => {
        object.set(key, value);
        Ok(())
      }
      Value::Function(function) => {
        function.set(key, value);
        Ok(())
      }
      Value::Array(array) => {
        if key == "length" {
          let length = self.array_length(value.to_number())?;
          self.resize_array(&mut array.borrow_mut(), length)?;
        } else if let Some(index) = array_index(key) {
          let mut items = array.borrow_mut();
          if index >= items.len() {
            self.resize_array(&mut items, index.saturating_add(1))?;
          }
          items[index] = value;
        }
        Ok(())
      }
      // Primitives silently drop writes.
      _ => Ok(()),
    }
  }

  fn delete_property(&self, target: &Value, key: &str) -> Result<(), Throw> {
    match target {
      Value::Undefined | Value::Null => Err(self.throw(
        ErrorKind::TypeError,
        format!("Cannot convert {} to object", target.summary()),
      )),
      Value::Object(object) => {
        object.remove(key);
        Ok(())
      }
      Value::Array(array) => {
        if let Some(index) = array_index(key)
          && let Some(slot) = array.borrow_mut().get_mut(index)
        {
          *slot = Value::Undefined;
        }
        Ok(())
      }
      _ => Ok(()),
    }
  }

  fn has_property(&self, target: &Value, key: &str) -> bool {
    match target {
      Value::Object(object) => object.has(key) || self.realm.prototypes.object.contains_key(key),
      Value::Array(array) => {
        key == "length"
          || array_index(key).is_some_and(|index| index < array.len())
          || self.realm.prototypes.array.contains_key(key)
      }
      Value::Function(function) => key == "name" || function.has(key),
      _ => false,
    }
  }

  /// Own enumerable entries, as seen by `Object.keys`, spread and `for-in`.
  pub fn own_entries(&self, value: &Value) -> Vec<(Rc<str>, Value)> {
    match value {
      Value::Object(object) => object.entries(),
      Value::Array(array) => array
        .borrow()
        .iter()
        .enumerate()
        .map(|(index, item)| (Rc::from(index.to_string()), item.clone()))
        .collect(),
      Value::String(s) => s
        .chars()
        .enumerate()
        .map(|(index, c)| (Rc::from(index.to_string()), Value::from(c.to_string())))
        .collect(),
      Value::Function(function) => function
        .keys()
        .into_iter()
        .filter_map(|key| function.get(&key).map(|value| (key, value)))
        .collect(),
      _ => Vec::new(),
    }
  }

  /// Elements produced by iterating `value` (`for-of`, spread, array
  /// destructuring).
  pub fn iterate(&self, value: &Value) -> Result<Vec<Value>, Throw> {
    match value {
      Value::Array(array) => Ok(array.to_vec()),
      Value::String(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
      other => Err(self.throw(
        ErrorKind::TypeError,
        format!("{} is not iterable", other.summary()),
      )),
    }
  }

  /// Wait until the run has nothing left to do: every outstanding trigger
  /// call and timer has finished and no continuation can make progress.
  pub(crate) async fn drain(&self) {
    let mut quiet_rounds = 0;
    while quiet_rounds < 2 {
      let work = self.realm.take_work();
      if !work.is_empty() {
        future::join_all(work).await;
        quiet_rounds = 0;
        continue;
      }
      let epoch = self.realm.hooks.epoch();
      tokio::task::yield_now().await;
      if self.realm.hooks.epoch() == epoch && !self.realm.has_work() {
        quiet_rounds += 1;
      } else {
        quiet_rounds = 0;
      }
    }
  }
}

enum Compound {
  Unchanged(Value),
  Assign(Value),
}

fn single_name(pattern: &Pattern) -> Option<&Rc<str>> {
  match pattern {
    Pattern::Ident(name) => Some(name),
    _ => None,
  }
}

fn collect_var_names(stmts: &[Stmt], names: &mut Vec<Rc<str>>) {
  for stmt in stmts {
    collect_stmt_var_names(stmt, names);
  }
}

fn collect_stmt_var_names(stmt: &Stmt, names: &mut Vec<Rc<str>>) {
  match stmt {
    Stmt::Declaration {
      kind: DeclKind::Var,
      declarators,
    } => {
      for declarator in declarators {
        names.extend(declarator.pattern.bound_names());
      }
    }
    Stmt::If {
      consequent,
      alternate,
      ..
    } => {
      collect_stmt_var_names(consequent, names);
      if let Some(alternate) = alternate {
        collect_stmt_var_names(alternate, names);
      }
    }
    Stmt::Block(stmts) => collect_var_names(stmts, names),
    Stmt::For { init, body, .. } => {
      if let Some(init) = init {
        collect_stmt_var_names(init, names);
      }
      collect_stmt_var_names(body, names);
    }
    Stmt::ForOf {
      kind, pattern, body, ..
    }
    | Stmt::ForIn {
      kind, pattern, body, ..
    } => {
      if *kind == DeclKind::Var {
        names.extend(pattern.bound_names());
      }
      collect_stmt_var_names(body, names);
    }
    Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => collect_stmt_var_names(body, names),
    Stmt::Try {
      block,
      handler,
      finalizer,
    } => {
      collect_var_names(block, names);
      if let Some(handler) = handler {
        collect_var_names(&handler.body, names);
      }
      if let Some(finalizer) = finalizer {
        collect_var_names(finalizer, names);
      }
    }
    _ => {}
  }
}

/// Human-readable name of a callee for error messages.
fn describe(expr: &Expr) -> String {
  match expr {
    Expr::Ident(name) => name.to_string(),
    Expr::Member {
      object, property, ..
    } => match property {
      MemberKey::Named(name) => format!("{}.{}", describe(object), name),
      MemberKey::Computed(_) => format!("{}[...]", describe(object)),
    },
    Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
    _ => "expression".to_string(),
  }
}

/// Property key for a computed member.
pub fn property_key(value: &Value) -> Rc<str> {
  match value {
    Value::String(s) => s.clone(),
    Value::Number(n) => Rc::from(number_to_string(*n)),
    other => other.to_js_string(),
  }
}

/// Canonical array index (`"0"`, `"12"`; not `"01"` or `"-1"`).
pub fn array_index(key: &str) -> Option<usize> {
  if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
    return None;
  }
  if !key.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  key.parse().ok()
}

fn to_primitive(value: &Value) -> Value {
  match value {
    Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Promise(_) => {
      Value::String(value.to_js_string())
    }
    other => other.clone(),
  }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
  let (left, right) = (to_primitive(left), to_primitive(right));
  match (&left, &right) {
    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
    _ => left.to_number().partial_cmp(&right.to_number()),
  }
}

fn instance_of(value: &Value, constructor: &Function) -> bool {
  if !matches!(constructor.kind(), FunctionKind::Native(_)) {
    return false;
  }
  match (constructor.name(), value) {
    ("Array", Value::Array(_)) | ("Promise", Value::Promise(_)) | ("Function", Value::Function(_)) => true,
    ("Object", Value::Object(_) | Value::Array(_) | Value::Function(_) | Value::Promise(_)) => true,
    ("Error", Value::Object(object)) => object.is_error(),
    (name, Value::Object(object)) if object.is_error() && ErrorKind::ALL.iter().any(|kind| kind.as_str() == name) => {
      object.get("name").is_some_and(|n| n.as_str() == Some(name))
    }
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_array_index() {
    assert_eq!(array_index("0"), Some(0));
    assert_eq!(array_index("42"), Some(42));
    assert_eq!(array_index("01"), None);
    assert_eq!(array_index("-1"), None);
    assert_eq!(array_index("length"), None);
    assert_eq!(array_index(""), None);
  }

  #[test]
  fn test_property_key() {
    assert_eq!(&*property_key(&Value::Number(1.0)), "1");
    assert_eq!(&*property_key(&Value::Bool(true)), "true");
  }
}
