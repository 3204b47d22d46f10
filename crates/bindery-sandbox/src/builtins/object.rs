use std::rc::Rc;

use super::{arg, method};
use crate::error::{ErrorKind, Throw};
use crate::interpreter::{Interpreter, property_key};
use crate::value::{Function, Object, PropertyMap, Value};

pub(super) fn constructor() -> Function {
  Function::native_constructor("Object", |_, _, args| match arg(&args, 0) {
    Value::Undefined | Value::Null => Ok(Value::Object(Object::new())),
    other => Ok(other),
  })
  .with(
    "keys",
    Function::native("keys", |interp, _, args| {
      let target = arg(&args, 0);
      require_object(interp, &target, "keys")?;
      let keys = interp.own_entries(&target).into_iter().map(|(key, _)| Value::String(key));
      Ok(Value::array(keys.collect()))
    }),
  )
  .with(
    "values",
    Function::native("values", |interp, _, args| {
      let target = arg(&args, 0);
      require_object(interp, &target, "values")?;
      let values = interp.own_entries(&target).into_iter().map(|(_, value)| value);
      Ok(Value::array(values.collect()))
    }),
  )
  .with(
    "entries",
    Function::native("entries", |interp, _, args| {
      let target = arg(&args, 0);
      require_object(interp, &target, "entries")?;
      let entries = interp
        .own_entries(&target)
        .into_iter()
        .map(|(key, value)| Value::array(vec![Value::String(key), value]));
      Ok(Value::array(entries.collect()))
    }),
  )
  .with(
    "assign",
    Function::native("assign", |interp, _, args| {
      let target = arg(&args, 0);
      require_object(interp, &target, "assign")?;
      for source in args.iter().skip(1) {
        for (key, value) in interp.own_entries(source) {
          interp.set_property(&target, &key, value)?;
        }
      }
      Ok(target)
    }),
  )
  .with(
    "fromEntries",
    Function::native("fromEntries", |interp, _, args| {
      let object = Object::new();
      for entry in interp.iterate(&arg(&args, 0))? {
        let key = interp.get_property(&entry, "0")?;
        let value = interp.get_property(&entry, "1")?;
        object.set(property_key(&key), value);
      }
      Ok(Value::Object(object))
    }),
  )
  // Returns its argument; properties stay writable.
  .with("freeze", Function::native("freeze", |_, _, args| Ok(arg(&args, 0))))
}

fn require_object(interp: &Interpreter, value: &Value, name: &str) -> Result<(), Throw> {
  if value.is_nullish() {
    return Err(interp.throw(
      ErrorKind::TypeError,
      format!("Object.{} called on null or undefined", name),
    ));
  }
  Ok(())
}

pub(super) fn prototype() -> PropertyMap {
  let mut proto = PropertyMap::new();
  method(&mut proto, "hasOwnProperty", |_, this, args| {
    let key: Rc<str> = property_key(&arg(&args, 0));
    let own = match &this {
      Value::Object(object) => object.has(&key),
      Value::Function(function) => function.has(&key),
      _ => false,
    };
    Ok(Value::Bool(own))
  });
  method(&mut proto, "toString", |_, this, _| Ok(Value::String(this.to_js_string())));
  method(&mut proto, "valueOf", |_, this, _| Ok(this));
  proto
}
