//! String methods. Indices count characters, not UTF-16 units.

use std::rc::Rc;

use super::{arg, method, relative_index};
use crate::error::{ErrorKind, Throw};
use crate::interpreter::Interpreter;
use crate::value::{Function, MAX_STRING_LENGTH, PropertyMap, Value};

pub(super) fn constructor() -> Function {
  Function::native("String", |_, _, args| match args.first() {
    None => Ok(Value::from("")),
    Some(value) => Ok(Value::String(value.to_js_string())),
  })
  .with(
    "fromCharCode",
    Function::native("fromCharCode", |_, _, args| {
      let text: String = args
        .iter()
        .filter_map(|code| char::from_u32(code.to_number() as u32))
        .collect();
      Ok(Value::from(text))
    }),
  )
}

fn this_string(interp: &Interpreter, this: &Value, name: &str) -> Result<Rc<str>, Throw> {
  match this {
    Value::String(s) => Ok(s.clone()),
    Value::Undefined | Value::Null => Err(interp.throw(
      ErrorKind::TypeError,
      format!("String.prototype.{} called on null or undefined", name),
    )),
    other => Ok(other.to_js_string()),
  }
}

fn chars(s: &str) -> Vec<char> {
  s.chars().collect()
}

fn substring(chars: &[char], start: usize, end: usize) -> Value {
  let (start, end) = if start <= end { (start, end) } else { (end, start) };
  Value::from(chars[start.min(chars.len())..end.min(chars.len())].iter().collect::<String>())
}

/// Byte offset of the character at `index`.
fn char_to_byte(s: &str, index: usize) -> usize {
  s.char_indices().nth(index).map(|(byte, _)| byte).unwrap_or(s.len())
}

fn byte_to_char(s: &str, byte: usize) -> usize {
  s[..byte].chars().count()
}

fn pad(interp: &Interpreter, this: Value, args: Vec<Value>, name: &str, at_start: bool) -> Result<Value, Throw> {
  let s = this_string(interp, &this, name)?;
  let target = arg(&args, 0).to_integer().max(0.0) as usize;
  let filler = match arg(&args, 1) {
    Value::Undefined => " ".to_string(),
    other => other.to_js_string().to_string(),
  };
  let len = s.chars().count();
  if target <= len || filler.is_empty() {
    return Ok(Value::String(s));
  }
  let widest = filler.chars().map(char::len_utf8).max().unwrap_or(1);
  interp.check_string_length(s.len().saturating_add((target - len).saturating_mul(widest)))?;
  let padding: String = filler.chars().cycle().take(target - len).collect();
  Ok(Value::from(if at_start {
    format!("{}{}", padding, s)
  } else {
    format!("{}{}", s, padding)
  }))
}

pub(super) fn prototype() -> PropertyMap {
  let mut proto = PropertyMap::new();

  method(&mut proto, "toString", |interp, this, _| {
    Ok(Value::String(this_string(interp, &this, "toString")?))
  });
  method(&mut proto, "valueOf", |interp, this, _| {
    Ok(Value::String(this_string(interp, &this, "valueOf")?))
  });
  method(&mut proto, "charAt", |interp, this, args| {
    let s = this_string(interp, &this, "charAt")?;
    let index = arg(&args, 0).to_integer();
    let c = if index < 0.0 { None } else { s.chars().nth(index as usize) };
    Ok(Value::from(c.map(String::from).unwrap_or_default()))
  });
  method(&mut proto, "charCodeAt", |interp, this, args| {
    let s = this_string(interp, &this, "charCodeAt")?;
    let index = arg(&args, 0).to_integer();
    let c = if index < 0.0 { None } else { s.chars().nth(index as usize) };
    Ok(Value::Number(c.map(|c| f64::from(u32::from(c))).unwrap_or(f64::NAN)))
  });
  method(&mut proto, "at", |interp, this, args| {
    let s = chars(&this_string(interp, &this, "at")?);
    let len = s.len() as f64;
    let index = arg(&args, 0).to_integer();
    let index = if index < 0.0 { len + index } else { index };
    if index < 0.0 || index >= len {
      return Ok(Value::Undefined);
    }
    Ok(Value::from(s[index as usize].to_string()))
  });
  method(&mut proto, "indexOf", |interp, this, args| {
    let s = this_string(interp, &this, "indexOf")?;
    let needle = arg(&args, 0).to_js_string();
    let from = relative_index(&arg(&args, 1), s.chars().count(), 0);
    let start = char_to_byte(&s, from);
    let found = s[start..].find(&*needle).map(|byte| byte_to_char(&s, start + byte) as f64);
    Ok(Value::Number(found.unwrap_or(-1.0)))
  });
  method(&mut proto, "lastIndexOf", |interp, this, args| {
    let s = this_string(interp, &this, "lastIndexOf")?;
    let needle = arg(&args, 0).to_js_string();
    let found = s.rfind(&*needle).map(|byte| byte_to_char(&s, byte) as f64);
    Ok(Value::Number(found.unwrap_or(-1.0)))
  });
  method(&mut proto, "includes", |interp, this, args| {
    let s = this_string(interp, &this, "includes")?;
    let needle = arg(&args, 0).to_js_string();
    Ok(Value::Bool(s.contains(&*needle)))
  });
  method(&mut proto, "startsWith", |interp, this, args| {
    let s = this_string(interp, &this, "startsWith")?;
    let needle = arg(&args, 0).to_js_string();
    let from = relative_index(&arg(&args, 1), s.chars().count(), 0);
    Ok(Value::Bool(s[char_to_byte(&s, from)..].starts_with(&*needle)))
  });
  method(&mut proto, "endsWith", |interp, this, args| {
    let s = this_string(interp, &this, "endsWith")?;
    let needle = arg(&args, 0).to_js_string();
    let len = s.chars().count();
    let end = relative_index(&arg(&args, 1), len, len);
    Ok(Value::Bool(s[..char_to_byte(&s, end)].ends_with(&*needle)))
  });
  method(&mut proto, "slice", |interp, this, args| {
    let s = chars(&this_string(interp, &this, "slice")?);
    let start = relative_index(&arg(&args, 0), s.len(), 0);
    let end = relative_index(&arg(&args, 1), s.len(), s.len());
    if start >= end {
      return Ok(Value::from(""));
    }
    Ok(substring(&s, start, end))
  });
  method(&mut proto, "substring", |interp, this, args| {
    let s = chars(&this_string(interp, &this, "substring")?);
    let clamp = |value: Value, default: usize| match value {
      Value::Undefined => default,
      other => other.to_integer().clamp(0.0, s.len() as f64) as usize,
    };
    let start = clamp(arg(&args, 0), 0);
    let end = clamp(arg(&args, 1), s.len());
    Ok(substring(&s, start, end))
  });
  method(&mut proto, "substr", |interp, this, args| {
    let s = chars(&this_string(interp, &this, "substr")?);
    let start = relative_index(&arg(&args, 0), s.len(), 0);
    let length = match arg(&args, 1) {
      Value::Undefined => s.len(),
      other => other.to_integer().max(0.0) as usize,
    };
    Ok(substring(&s, start, start.saturating_add(length)))
  });
  method(&mut proto, "toUpperCase", |interp, this, _| {
    Ok(Value::from(this_string(interp, &this, "toUpperCase")?.to_uppercase()))
  });
  method(&mut proto, "toLowerCase", |interp, this, _| {
    Ok(Value::from(this_string(interp, &this, "toLowerCase")?.to_lowercase()))
  });
  method(&mut proto, "trim", |interp, this, _| {
    Ok(Value::from(this_string(interp, &this, "trim")?.trim()))
  });
  method(&mut proto, "trimStart", |interp, this, _| {
    Ok(Value::from(this_string(interp, &this, "trimStart")?.trim_start()))
  });
  method(&mut proto, "trimEnd", |interp, this, _| {
    Ok(Value::from(this_string(interp, &this, "trimEnd")?.trim_end()))
  });
  method(&mut proto, "split", |interp, this, args| {
    let s = this_string(interp, &this, "split")?;
    let limit = match arg(&args, 1) {
      Value::Undefined => usize::MAX,
      other => other.to_integer().max(0.0) as usize,
    };
    let parts: Vec<Value> = match arg(&args, 0) {
      Value::Undefined => vec![Value::String(s.clone())],
      separator => {
        let separator = separator.to_js_string();
        if separator.is_empty() {
          s.chars().map(|c| Value::from(c.to_string())).collect()
        } else {
          s.split(&*separator).map(Value::from).collect()
        }
      }
    };
    Ok(Value::array(parts.into_iter().take(limit).collect()))
  });
  method(&mut proto, "replace", |interp, this, args| {
    let s = this_string(interp, &this, "replace")?;
    let pattern = arg(&args, 0).to_js_string();
    let replacement = arg(&args, 1).to_js_string();
    Ok(Value::from(s.replacen(&*pattern, &replacement, 1)))
  });
  method(&mut proto, "replaceAll", |interp, this, args| {
    let s = this_string(interp, &this, "replaceAll")?;
    let pattern = arg(&args, 0).to_js_string();
    let replacement = arg(&args, 1).to_js_string();
    if pattern.is_empty() {
      return Ok(Value::String(s));
    }
    Ok(Value::from(s.replace(&*pattern, &replacement)))
  });
  method(&mut proto, "repeat", |interp, this, args| {
    let s = this_string(interp, &this, "repeat")?;
    let count = arg(&args, 0).to_integer();
    if count < 0.0 || !count.is_finite() {
      return Err(interp.throw(ErrorKind::RangeError, format!("Invalid count value: {}", count)));
    }
    if !s.is_empty() && count * s.len() as f64 > MAX_STRING_LENGTH as f64 {
      return Err(interp.throw(ErrorKind::RangeError, "Invalid string length"));
    }
    Ok(Value::from(s.repeat(count as usize)))
  });
  method(&mut proto, "padStart", |interp, this, args| pad(interp, this, args, "padStart", true));
  method(&mut proto, "padEnd", |interp, this, args| pad(interp, this, args, "padEnd", false));
  method(&mut proto, "concat", |interp, this, args| {
    let mut s = this_string(interp, &this, "concat")?.to_string();
    for value in &args {
      let part = value.to_js_string();
      interp.check_string_length(s.len() + part.len())?;
      s.push_str(&part);
    }
    Ok(Value::from(s))
  });
  method(&mut proto, "localeCompare", |interp, this, args| {
    let s = this_string(interp, &this, "localeCompare")?;
    let other = arg(&args, 0).to_js_string();
    let order = match s.cmp(&other) {
      std::cmp::Ordering::Less => -1.0,
      std::cmp::Ordering::Equal => 0.0,
      std::cmp::Ordering::Greater => 1.0,
    };
    Ok(Value::Number(order))
  });

  proto
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_char_offsets() {
    let s = "héllo";
    assert_eq!(char_to_byte(s, 2), 3);
    assert_eq!(byte_to_char(s, 3), 2);
    assert_eq!(char_to_byte(s, 10), s.len());
  }

  #[test]
  fn test_substring_swaps_bounds() {
    let s = chars("bindery");
    assert_eq!(substring(&s, 4, 1).summary(), "ind");
    assert_eq!(substring(&s, 3, 99).summary(), "dery");
  }
}
