use bindery_script::ast::{Argument, Expr, MemberKey, Script, Stmt};
use bindery_script::{Binding, Segment, parse_script_at, split_segments};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scan::{Scan, is_trigger_call};

/// Outcome of classifying a binding's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
  /// A plain value expression, or a single trigger call with at most one
  /// `.then`/`.catch` continuation.
  SimpleExpression,
  /// Code that only free-form editing can represent.
  TriggerProgram,
  /// A script segment failed to parse.
  Unparsable,
}

impl Classification {
  /// Whether the simplified action selector may be offered. Parse failures
  /// disable it the same way trigger programs do.
  pub fn selector_enabled(self) -> bool {
    self == Classification::SimpleExpression
  }
}

enum Shape {
  Value,
  Trigger,
  Program,
}

/// Classify raw binding text. Deterministic and side-effect free.
pub fn classify(text: &str) -> Classification {
  let mut scripts = Vec::new();
  for segment in split_segments(text) {
    let Segment::Script { source, offset } = segment else {
      continue;
    };
    if source.trim().is_empty() {
      continue;
    }
    match parse_script_at(source, offset) {
      Ok(script) => scripts.push(script),
      Err(_) => return Classification::Unparsable,
    }
  }

  let mut trigger_scripts = 0;
  for script in &scripts {
    let expr = match script {
      Script::Expression(expr) => expr,
      Script::Program(program) => {
        let mut statements = program.body.iter().filter(|stmt| !matches!(stmt, Stmt::Empty));
        match (statements.next(), statements.next()) {
          (None, _) => continue,
          (Some(Stmt::Expr(expr)), None) => expr,
          _ => return Classification::TriggerProgram,
        }
      }
    };
    match shape_of(expr) {
      Shape::Value => {}
      Shape::Trigger => trigger_scripts += 1,
      Shape::Program => return Classification::TriggerProgram,
    }
  }

  if trigger_scripts > 1 {
    Classification::TriggerProgram
  } else {
    Classification::SimpleExpression
  }
}

/// Classify a binding, logging the decision against its owner.
pub fn classify_binding(binding: &Binding) -> Classification {
  let classification = classify(&binding.text);
  debug!(
    entity_id = %binding.entity_id,
    property_path = %binding.property_path,
    classification = ?classification,
    "classified binding"
  );
  classification
}

fn shape_of(expr: &Expr) -> Shape {
  let scan = Scan::expr(expr);
  if scan.forbidden {
    return Shape::Program;
  }
  if scan.trigger_depths.is_empty() {
    return Shape::Value;
  }
  if scan.top_level_triggers() != 1 || scan.max_trigger_depth() > 1 {
    return Shape::Program;
  }
  if is_selector_shape(expr) {
    Shape::Trigger
  } else {
    Shape::Program
  }
}

/// `trigger(...)`, `trigger(...).then(cb[, cb])` or `trigger(...).catch(cb)`.
fn is_selector_shape(expr: &Expr) -> bool {
  let Expr::Call {
    callee,
    arguments,
    optional: false,
  } = expr
  else {
    return false;
  };
  if is_trigger_call(expr) {
    return callbacks_ok(arguments);
  }

  let Expr::Member {
    object,
    property: MemberKey::Named(method),
    optional: false,
  } = callee.as_ref()
  else {
    return false;
  };
  let max_arguments = match method.as_ref() {
    "then" => 2,
    "catch" => 1,
    _ => return false,
  };
  if arguments.is_empty() || arguments.len() > max_arguments {
    return false;
  }

  match object.as_ref() {
    Expr::Call {
      arguments: head_arguments,
      optional: false,
      ..
    } if is_trigger_call(object) => callbacks_ok(head_arguments) && callbacks_ok(arguments),
    _ => false,
  }
}

/// Each callback may itself hold at most one trigger call.
fn callbacks_ok(arguments: &[Argument]) -> bool {
  arguments.iter().all(|argument| match argument {
    Argument::Spread(_) => false,
    Argument::Expr(Expr::Function(callback)) => Scan::callback(callback).trigger_depths.len() <= 1,
    Argument::Expr(_) => true,
  })
}
