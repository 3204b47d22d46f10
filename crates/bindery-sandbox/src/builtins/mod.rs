//! Globals and prototype methods available to user code.

mod array;
mod console;
mod error;
mod json;
mod math;
mod number;
mod object;
mod promise;
mod string;
mod timers;

use bindery_script::ast::DeclKind;

use crate::interpreter::Interpreter;
use crate::scope::Scope;
use crate::value::{Function, NativeResult, PropertyMap, Value};

pub(crate) use json::stringify as json_stringify;

/// Methods looked up on values that carry no own properties.
pub(crate) struct Prototypes {
  pub array: PropertyMap,
  pub string: PropertyMap,
  pub number: PropertyMap,
  pub boolean: PropertyMap,
  pub object: PropertyMap,
  pub function: PropertyMap,
  pub promise: PropertyMap,
}

impl Prototypes {
  pub(crate) fn new() -> Self {
    Self {
      array: array::prototype(),
      string: string::prototype(),
      number: number::prototype(),
      boolean: boolean_prototype(),
      object: object::prototype(),
      function: function_prototype(),
      promise: promise::prototype(),
    }
  }
}

/// Declare every built-in global in `globals`.
pub(crate) fn install(globals: &Scope) {
  let declare = |name: &str, value: Value| globals.declare(name, value, DeclKind::Var);

  declare("undefined", Value::Undefined);
  declare("NaN", Value::Number(f64::NAN));
  declare("Infinity", Value::Number(f64::INFINITY));

  declare("console", console::object());
  declare("Math", math::object());
  declare("JSON", json::object());
  declare("Object", object::constructor().into());
  declare("Array", array::constructor().into());
  declare("String", string::constructor().into());
  declare("Number", number::constructor().into());
  declare("Boolean", Function::native("Boolean", |_, _, args| Ok(Value::Bool(arg(&args, 0).truthy()))).into());
  declare("Promise", promise::constructor().into());
  for constructor in error::constructors() {
    let name = constructor.name().to_string();
    declare(&name, constructor.into());
  }

  declare("parseInt", number::parse_int_function().into());
  declare("parseFloat", number::parse_float_function().into());
  declare(
    "isNaN",
    Function::native("isNaN", |_, _, args| Ok(Value::Bool(arg(&args, 0).to_number().is_nan()))).into(),
  );
  declare(
    "isFinite",
    Function::native("isFinite", |_, _, args| {
      Ok(Value::Bool(arg(&args, 0).to_number().is_finite()))
    })
    .into(),
  );

  declare("setTimeout", timers::set_timeout().into());
  declare("clearTimeout", timers::clear_timeout().into());
}

/// Argument `index`, or `undefined` when missing.
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
  args.get(index).cloned().unwrap_or(Value::Undefined)
}

pub(crate) fn method(
  map: &mut PropertyMap,
  name: &str,
  f: impl Fn(&Interpreter, Value, Vec<Value>) -> NativeResult + 'static,
) {
  map.insert(name, Value::Function(Function::native(name, f)));
}

pub(crate) fn method_async(
  map: &mut PropertyMap,
  name: &str,
  f: impl Fn(Interpreter, Value, Vec<Value>) -> futures::future::LocalBoxFuture<'static, NativeResult> + 'static,
) {
  map.insert(name, Value::Function(Function::native_async(name, f)));
}

/// Clamp a relative index (negative counts from the end) into `0..=len`.
pub(crate) fn relative_index(value: &Value, len: usize, default: usize) -> usize {
  if value.is_undefined() {
    return default;
  }
  let n = value.to_integer();
  let len = len as f64;
  let index = if n < 0.0 { (len + n).max(0.0) } else { n.min(len) };
  index as usize
}

fn boolean_prototype() -> PropertyMap {
  let mut proto = PropertyMap::new();
  method(&mut proto, "toString", |_, this, _| Ok(Value::String(this.to_js_string())));
  method(&mut proto, "valueOf", |_, this, _| Ok(this));
  proto
}

fn function_prototype() -> PropertyMap {
  let mut proto = PropertyMap::new();
  method_async(&mut proto, "call", |interp, this, args| {
    Box::pin(async move {
      let rest = args.get(1..).map(<[Value]>::to_vec).unwrap_or_default();
      interp.call(&this, arg(&args, 0), rest).await
    })
  });
  method_async(&mut proto, "apply", |interp, this, args| {
    Box::pin(async move {
      let rest = match arg(&args, 1) {
        Value::Undefined | Value::Null => Vec::new(),
        list => interp.iterate(&list)?,
      };
      interp.call(&this, arg(&args, 0), rest).await
    })
  });
  method(&mut proto, "toString", |_, this, _| Ok(Value::String(this.to_js_string())));
  proto
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_relative_index() {
    assert_eq!(relative_index(&Value::Number(-1.0), 5, 0), 4);
    assert_eq!(relative_index(&Value::Number(-10.0), 5, 0), 0);
    assert_eq!(relative_index(&Value::Number(7.0), 5, 0), 5);
    assert_eq!(relative_index(&Value::Undefined, 5, 3), 3);
  }
}
