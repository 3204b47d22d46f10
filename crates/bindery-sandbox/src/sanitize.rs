//! Conversion of sandbox values into JSON that may cross the channel.
//!
//! Anything without a structural representation is replaced by a string
//! placeholder, so conversion never fails.

use bindery_host_log::{Capturable, SanitizeError};
use serde_json::{Map, Value as Json};

use crate::value::{Array, Object, Value, error_summary, number_to_json};

/// Deepest nesting converted; anything below becomes [`TOO_DEEP`].
pub const MAX_DEPTH: usize = 128;

pub const CIRCULAR: &str = "[Circular]";
pub const PROMISE: &str = "Promise";
pub const TOO_DEEP: &str = "[Too deep]";

/// Convert `value` to JSON, replacing functions, promises, cycles and
/// over-deep nesting with placeholders. `undefined` and non-finite numbers
/// become `null`.
pub fn sanitize(value: &Value) -> Json {
  convert(value, &mut Vec::new())
}

fn convert(value: &Value, path: &mut Vec<usize>) -> Json {
  match value {
    Value::Undefined | Value::Null => Json::Null,
    Value::Bool(b) => Json::Bool(*b),
    Value::Number(n) => number_to_json(*n),
    Value::String(s) => Json::String(s.to_string()),
    Value::Function(function) => Json::String(format!("func() {}", function.name())),
    Value::Promise(_) => Json::String(PROMISE.to_string()),
    Value::Object(object) if object.is_error() => Json::String(error_summary(object)),
    Value::Array(array) => match enter(path, array.addr()) {
      Some(placeholder) => Json::String(placeholder.to_string()),
      None => {
        let items = array.to_vec().iter().map(|item| convert(item, path)).collect();
        path.pop();
        Json::Array(items)
      }
    },
    Value::Object(object) => match enter(path, object.addr()) {
      Some(placeholder) => Json::String(placeholder.to_string()),
      None => {
        let mut map = Map::new();
        for (key, item) in object.entries() {
          map.insert(key.to_string(), convert(&item, path));
        }
        path.pop();
        Json::Object(map)
      }
    },
  }
}

/// Push a container onto the path, or name the placeholder standing in for it.
fn enter(path: &mut Vec<usize>, addr: usize) -> Option<&'static str> {
  if path.contains(&addr) {
    return Some(CIRCULAR);
  }
  if path.len() >= MAX_DEPTH {
    return Some(TOO_DEEP);
  }
  path.push(addr);
  None
}

/// Detached copy of `value`: arrays and objects are copied so later writes
/// to the original do not show through. Functions and promises stay shared.
/// Cycles and over-deep nesting are cut with the same placeholders
/// [`sanitize`] uses, so the copy never holds an `Rc` cycle.
pub fn snapshot(value: &Value) -> Value {
  copy(value, &mut Vec::new())
}

fn copy(value: &Value, path: &mut Vec<usize>) -> Value {
  match value {
    Value::Array(array) => match enter(path, array.addr()) {
      Some(placeholder) => Value::from(placeholder),
      None => {
        let items = array.to_vec().iter().map(|item| copy(item, path)).collect();
        path.pop();
        Value::Array(Array::new(items))
      }
    },
    Value::Object(object) => match enter(path, object.addr()) {
      Some(placeholder) => Value::from(placeholder),
      None => {
        let properties = object
          .entries()
          .into_iter()
          .map(|(key, item)| (key, copy(&item, path)))
          .collect();
        path.pop();
        Value::Object(Object::with_class(properties, object.class()))
      }
    },
    other => other.clone(),
  }
}

impl Capturable for Value {
  fn failure_form(&self) -> Option<Self> {
    self.as_error()?.get("stack").filter(|stack| stack.as_str().is_some())
  }

  fn snapshot(&self) -> Self {
    snapshot(self)
  }

  fn sanitize(&self) -> Result<Json, SanitizeError> {
    Ok(sanitize(self))
  }
}
