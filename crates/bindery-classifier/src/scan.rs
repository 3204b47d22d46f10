//! Syntax walk collecting the facts the classifier decides on.

use bindery_script::ast::*;
use bindery_trigger::Capability;

/// Array methods that make a binding iterate.
const ITERATION_METHODS: &[&str] = &[
  "forEach", "map", "filter", "reduce", "some", "every", "find", "findIndex", "flatMap",
];

const PROMISE_COMBINATORS: &[&str] = &["all", "race", "allSettled", "any"];

#[derive(Debug, Default)]
pub(crate) struct Scan {
  /// Function nesting depth of every trigger call, in source order.
  pub trigger_depths: Vec<usize>,
  /// Set when the script uses a construct the selector cannot express.
  pub forbidden: bool,
  depth: usize,
}

impl Scan {
  pub fn expr(expr: &Expr) -> Self {
    let mut scan = Self::default();
    scan.visit_expr(expr);
    scan
  }

  /// Scan a callback's body; calls directly inside it are at depth zero.
  pub fn callback(function: &Function) -> Self {
    let mut scan = Self::default();
    scan.visit_body(&function.body);
    scan
  }

  pub fn top_level_triggers(&self) -> usize {
    self.trigger_depths.iter().filter(|depth| **depth == 0).count()
  }

  pub fn max_trigger_depth(&self) -> usize {
    self.trigger_depths.iter().copied().max().unwrap_or_default()
  }

  fn visit_body(&mut self, body: &FunctionBody) {
    match body {
      FunctionBody::Expression(expr) => self.visit_expr(expr),
      FunctionBody::Block(stmts) => self.visit_stmts(stmts),
    }
  }

  fn visit_function(&mut self, function: &Function) {
    if function.is_async {
      self.forbidden = true;
    }
    self.depth += 1;
    for param in &function.params {
      self.visit_pattern(&param.pattern);
      if let Some(default) = &param.default {
        self.visit_expr(default);
      }
    }
    self.visit_body(&function.body);
    self.depth -= 1;
  }

  fn visit_stmts(&mut self, stmts: &[Stmt]) {
    for stmt in stmts {
      self.visit_stmt(stmt);
    }
  }

  fn visit_stmt(&mut self, stmt: &Stmt) {
    if stmt.is_loop() {
      self.forbidden = true;
    }
    match stmt {
      Stmt::Expr(expr) | Stmt::Throw(expr) => self.visit_expr(expr),
      Stmt::Return(expr) => {
        if let Some(expr) = expr {
          self.visit_expr(expr);
        }
      }
      Stmt::Declaration { declarators, .. } => {
        for declarator in declarators {
          self.visit_pattern(&declarator.pattern);
          if let Some(init) = &declarator.init {
            self.visit_expr(init);
          }
        }
      }
      Stmt::Function(function) => self.visit_function(function),
      Stmt::If {
        test,
        consequent,
        alternate,
      } => {
        self.visit_expr(test);
        self.visit_stmt(consequent);
        if let Some(alternate) = alternate {
          self.visit_stmt(alternate);
        }
      }
      Stmt::Block(stmts) => self.visit_stmts(stmts),
      Stmt::For {
        init,
        test,
        update,
        body,
      } => {
        if let Some(init) = init {
          self.visit_stmt(init);
        }
        for expr in [test, update].into_iter().flatten() {
          self.visit_expr(expr);
        }
        self.visit_stmt(body);
      }
      Stmt::ForOf {
        pattern,
        iterable: target,
        body,
        ..
      }
      | Stmt::ForIn {
        pattern,
        object: target,
        body,
        ..
      } => {
        self.visit_pattern(pattern);
        self.visit_expr(target);
        self.visit_stmt(body);
      }
      Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
        self.visit_expr(test);
        self.visit_stmt(body);
      }
      Stmt::Try {
        block,
        handler,
        finalizer,
      } => {
        self.visit_stmts(block);
        if let Some(handler) = handler {
          if let Some(param) = &handler.param {
            self.visit_pattern(param);
          }
          self.visit_stmts(&handler.body);
        }
        if let Some(finalizer) = finalizer {
          self.visit_stmts(finalizer);
        }
      }
      Stmt::Break | Stmt::Continue | Stmt::Empty => {}
    }
  }

  fn visit_pattern(&mut self, pattern: &Pattern) {
    match pattern {
      Pattern::Ident(_) => {}
      Pattern::Object { properties, .. } => {
        for property in properties {
          self.visit_pattern(&property.value);
          if let Some(default) = &property.default {
            self.visit_expr(default);
          }
        }
      }
      Pattern::Array { elements, rest } => {
        for element in elements.iter().flatten() {
          self.visit_pattern(&element.pattern);
          if let Some(default) = &element.default {
            self.visit_expr(default);
          }
        }
        if let Some(rest) = rest {
          self.visit_pattern(rest);
        }
      }
    }
  }

  fn visit_expr(&mut self, expr: &Expr) {
    match expr {
      Expr::Number(_) | Expr::String(_) | Expr::Bool(_) | Expr::Null | Expr::Ident(_) => {}
      Expr::Template { exprs, .. } | Expr::Sequence(exprs) => {
        for expr in exprs {
          self.visit_expr(expr);
        }
      }
      Expr::Array(items) => {
        for item in items {
          match item {
            ArrayItem::Expr(expr) | ArrayItem::Spread(expr) => self.visit_expr(expr),
            ArrayItem::Hole => {}
          }
        }
      }
      Expr::Object(properties) => {
        for property in properties {
          match property {
            Property::KeyValue { key, value } => {
              if let PropertyKey::Computed(key) = key {
                self.visit_expr(key);
              }
              self.visit_expr(value);
            }
            Property::Spread(expr) => self.visit_expr(expr),
          }
        }
      }
      Expr::Function(function) => self.visit_function(function),
      Expr::Unary { argument, .. } => self.visit_expr(argument),
      Expr::Update { target, .. } => self.visit_expr(target),
      Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
        self.visit_expr(left);
        self.visit_expr(right);
      }
      Expr::Conditional {
        test,
        consequent,
        alternate,
      } => {
        self.visit_expr(test);
        self.visit_expr(consequent);
        self.visit_expr(alternate);
      }
      Expr::Assign { target, value, .. } => {
        self.visit_expr(target);
        self.visit_expr(value);
      }
      Expr::Member {
        object, property, ..
      } => {
        self.visit_expr(object);
        if let MemberKey::Computed(key) = property {
          self.visit_expr(key);
        }
      }
      Expr::Call {
        callee, arguments, ..
      } => {
        if is_trigger_call(expr) {
          self.trigger_depths.push(self.depth);
        }
        match callee.as_ref() {
          Expr::Function(_) => self.forbidden = true,
          Expr::Member {
            object,
            property: MemberKey::Named(method),
            ..
          } => {
            if ITERATION_METHODS.contains(&method.as_ref()) {
              self.forbidden = true;
            }
            if is_ident(object, "Promise") && PROMISE_COMBINATORS.contains(&method.as_ref()) {
              self.forbidden = true;
            }
          }
          _ => {}
        }
        self.visit_expr(callee);
        for argument in arguments {
          self.visit_expr(argument.expr());
        }
      }
      Expr::New { callee, arguments } => {
        if is_ident(callee, "Promise") {
          self.forbidden = true;
        }
        self.visit_expr(callee);
        for argument in arguments {
          self.visit_expr(argument.expr());
        }
      }
      Expr::Await(argument) => {
        self.forbidden = true;
        self.visit_expr(argument);
      }
    }
  }
}

fn is_ident(expr: &Expr, name: &str) -> bool {
  matches!(expr, Expr::Ident(ident) if ident.as_ref() == name)
}

/// Whether `expr` calls a trigger stand-in: a global trigger function or
/// `<Entity>.run` / `<Entity>.clear`.
pub(crate) fn is_trigger_call(expr: &Expr) -> bool {
  let Expr::Call { callee, .. } = expr else {
    return false;
  };
  match callee.as_ref() {
    Expr::Ident(name) => Capability::is_global(name),
    Expr::Member {
      object,
      property: MemberKey::Named(method),
      ..
    } => matches!(object.as_ref(), Expr::Ident(_)) && Capability::is_entity_method(method),
    _ => false,
  }
}
