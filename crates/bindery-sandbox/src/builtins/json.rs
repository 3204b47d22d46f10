use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use super::arg;
use crate::error::{ErrorKind, Throw};
use crate::interpreter::Interpreter;
use crate::value::{Function, PropertyMap, Value, number_to_json};

pub(super) fn object() -> Value {
  let mut json = PropertyMap::new();
  json.insert(
    "parse",
    Function::native("parse", |interp, _, args| {
      let text = arg(&args, 0).to_js_string();
      serde_json::from_str::<serde_json::Value>(&text)
        .map(|parsed| Value::from_json(&parsed))
        .map_err(|e| interp.throw(ErrorKind::SyntaxError, format!("Unexpected token in JSON: {}", e)))
    })
    .into(),
  );
  json.insert(
    "stringify",
    Function::native("stringify", |interp, _, args| {
      let indent = match arg(&args, 2) {
        Value::Number(n) if n >= 1.0 => Some(" ".repeat(n.min(10.0) as usize)),
        Value::String(s) if !s.is_empty() => Some(s.chars().take(10).collect()),
        _ => None,
      };
      Ok(match stringify(interp, &arg(&args, 0), indent.as_deref())? {
        Some(text) => Value::from(text),
        None => Value::Undefined,
      })
    })
    .into(),
  );
  Value::object(json)
}

/// `JSON.stringify`. `None` when the value itself has no JSON form
/// (`undefined`, functions).
pub(crate) fn stringify(interp: &Interpreter, value: &Value, indent: Option<&str>) -> Result<Option<String>, Throw> {
  let mut stack = Vec::new();
  let Some(json) = to_json(interp, value, &mut stack)? else {
    return Ok(None);
  };
  let text = match indent {
    None => json.to_string(),
    Some(indent) => {
      let mut out = Vec::new();
      let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
      json
        .serialize(&mut serializer)
        .map_err(|e| interp.throw(ErrorKind::TypeError, e.to_string()))?;
      String::from_utf8_lossy(&out).into_owned()
    }
  };
  Ok(Some(text))
}

fn to_json(interp: &Interpreter, value: &Value, stack: &mut Vec<usize>) -> Result<Option<serde_json::Value>, Throw> {
  let json = match value {
    Value::Undefined | Value::Function(_) => return Ok(None),
    Value::Null => serde_json::Value::Null,
    Value::Bool(b) => serde_json::Value::Bool(*b),
    Value::Number(n) => number_to_json(*n),
    Value::String(s) => serde_json::Value::String(s.to_string()),
    Value::Promise(_) => serde_json::Value::Object(serde_json::Map::new()),
    Value::Object(object) if object.is_error() => serde_json::Value::Object(serde_json::Map::new()),
    Value::Array(array) => {
      enter(interp, stack, array.addr())?;
      let mut items = Vec::with_capacity(array.len());
      for item in array.to_vec() {
        items.push(to_json(interp, &item, stack)?.unwrap_or(serde_json::Value::Null));
      }
      stack.pop();
      serde_json::Value::Array(items)
    }
    Value::Object(object) => {
      enter(interp, stack, object.addr())?;
      let mut map = serde_json::Map::new();
      for (key, item) in object.entries() {
        if let Some(item) = to_json(interp, &item, stack)? {
          map.insert(key.to_string(), item);
        }
      }
      stack.pop();
      serde_json::Value::Object(map)
    }
  };
  Ok(Some(json))
}

fn enter(interp: &Interpreter, stack: &mut Vec<usize>, addr: usize) -> Result<(), Throw> {
  if stack.contains(&addr) {
    return Err(interp.throw(ErrorKind::TypeError, "Converting circular structure to JSON"));
  }
  stack.push(addr);
  Ok(())
}
