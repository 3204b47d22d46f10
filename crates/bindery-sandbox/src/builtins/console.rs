//! `console`: every method feeds the run's log capture.

use bindery_host_log::LogMethod;

use crate::value::{Function, Object, Value};

pub(super) fn object() -> Value {
  let console = Object::new();
  for method in LogMethod::ALL {
    let function = Function::native(method.as_str(), move |interp, _, args| {
      interp.realm().console.capture(method, args);
      Ok(Value::Undefined)
    });
    console.set(method.as_str(), Value::Function(function));
  }
  Value::Object(console)
}
