use super::{arg, method};
use crate::error::{ErrorKind, Throw};
use crate::interpreter::Interpreter;
use crate::value::{Function, PropertyMap, Value, number_to_string};

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub(super) fn constructor() -> Function {
  Function::native("Number", |_, _, args| match args.first() {
    None => Ok(Value::Number(0.0)),
    Some(value) => Ok(Value::Number(value.to_number())),
  })
  .with("MAX_SAFE_INTEGER", MAX_SAFE_INTEGER)
  .with("MIN_SAFE_INTEGER", -MAX_SAFE_INTEGER)
  .with("EPSILON", f64::EPSILON)
  .with("POSITIVE_INFINITY", f64::INFINITY)
  .with("NEGATIVE_INFINITY", f64::NEG_INFINITY)
  .with("NaN", f64::NAN)
  .with(
    "isInteger",
    Function::native("isInteger", |_, _, args| {
      Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0)))
    }),
  )
  .with(
    "isSafeInteger",
    Function::native("isSafeInteger", |_, _, args| {
      Ok(Value::Bool(matches!(
        arg(&args, 0),
        Value::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER
      )))
    }),
  )
  .with(
    "isFinite",
    Function::native("isFinite", |_, _, args| {
      Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite())))
    }),
  )
  .with(
    "isNaN",
    Function::native("isNaN", |_, _, args| {
      Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_nan())))
    }),
  )
  .with("parseInt", parse_int_function())
  .with("parseFloat", parse_float_function())
}

pub(super) fn parse_int_function() -> Function {
  Function::native("parseInt", |_, _, args| {
    let radix = match arg(&args, 1) {
      Value::Undefined => 0,
      other => other.to_integer() as u32,
    };
    Ok(Value::Number(parse_int(&arg(&args, 0).to_js_string(), radix)))
  })
}

pub(super) fn parse_float_function() -> Function {
  Function::native("parseFloat", |_, _, args| {
    Ok(Value::Number(parse_float(&arg(&args, 0).to_js_string())))
  })
}

/// Leading integer of `s` in `radix` (0 picks 10, or 16 for `0x`).
fn parse_int(s: &str, radix: u32) -> f64 {
  let s = s.trim_start();
  let (sign, mut digits) = match s.as_bytes().first() {
    Some(b'-') => (-1.0, &s[1..]),
    Some(b'+') => (1.0, &s[1..]),
    _ => (1.0, s),
  };
  let mut radix = radix;
  if (radix == 0 || radix == 16) && (digits.starts_with("0x") || digits.starts_with("0X")) {
    digits = &digits[2..];
    radix = 16;
  }
  if radix == 0 {
    radix = 10;
  }
  if !(2..=36).contains(&radix) {
    return f64::NAN;
  }
  let mut value = None::<f64>;
  for c in digits.chars() {
    let Some(digit) = c.to_digit(radix) else {
      break;
    };
    value = Some(value.unwrap_or(0.0) * f64::from(radix) + f64::from(digit));
  }
  value.map(|v| sign * v).unwrap_or(f64::NAN)
}

/// Longest decimal prefix of `s`.
fn parse_float(s: &str) -> f64 {
  let s = s.trim_start();
  let rest = s.strip_prefix(['-', '+']).unwrap_or(s);
  if rest.starts_with("Infinity") {
    return if s.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
  }
  let bytes = s.as_bytes();
  let mut end = 0;
  let mut seen_dot = false;
  let mut seen_exp = false;
  let mut last_valid = 0;
  while end < bytes.len() {
    let b = bytes[end];
    match b {
      b'0'..=b'9' => last_valid = end + 1,
      b'+' | b'-' if end == 0 || matches!(bytes[end - 1], b'e' | b'E') => {}
      b'.' if !seen_dot && !seen_exp => seen_dot = true,
      b'e' | b'E' if !seen_exp && last_valid > 0 => seen_exp = true,
      _ => break,
    }
    end += 1;
  }
  s[..last_valid].parse().unwrap_or(f64::NAN)
}

fn this_number(interp: &Interpreter, this: &Value, name: &str) -> Result<f64, Throw> {
  match this {
    Value::Number(n) => Ok(*n),
    _ => Err(interp.throw(
      ErrorKind::TypeError,
      format!("Number.prototype.{} requires that 'this' be a Number", name),
    )),
  }
}

fn to_radix(n: f64, radix: u32) -> String {
  if !n.is_finite() || radix == 10 {
    return number_to_string(n);
  }
  let negative = n < 0.0;
  let mut int = n.abs().trunc() as u64;
  let mut digits = Vec::new();
  loop {
    digits.push(std::char::from_digit((int % u64::from(radix)) as u32, radix).unwrap_or('0'));
    int /= u64::from(radix);
    if int == 0 {
      break;
    }
  }
  if negative {
    digits.push('-');
  }
  digits.iter().rev().collect()
}

pub(super) fn prototype() -> PropertyMap {
  let mut proto = PropertyMap::new();

  method(&mut proto, "toString", |interp, this, args| {
    let n = this_number(interp, &this, "toString")?;
    let radix = match arg(&args, 0) {
      Value::Undefined => 10,
      other => other.to_integer() as u32,
    };
    if !(2..=36).contains(&radix) {
      return Err(interp.throw(ErrorKind::RangeError, "toString() radix must be between 2 and 36"));
    }
    Ok(Value::from(to_radix(n, radix)))
  });
  method(&mut proto, "toFixed", |interp, this, args| {
    let n = this_number(interp, &this, "toFixed")?;
    let digits = arg(&args, 0).to_integer();
    if !(0.0..=100.0).contains(&digits) {
      return Err(interp.throw(ErrorKind::RangeError, "toFixed() digits argument must be between 0 and 100"));
    }
    if !n.is_finite() {
      return Ok(Value::from(number_to_string(n)));
    }
    Ok(Value::from(format!("{:.*}", digits as usize, n)))
  });
  method(&mut proto, "valueOf", |interp, this, _| {
    Ok(Value::Number(this_number(interp, &this, "valueOf")?))
  });

  proto
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_int() {
    assert_eq!(parse_int("42px", 0), 42.0);
    assert_eq!(parse_int("  -17", 10), -17.0);
    assert_eq!(parse_int("0x1F", 0), 31.0);
    assert_eq!(parse_int("101", 2), 5.0);
    assert!(parse_int("px", 10).is_nan());
    assert!(parse_int("1", 40).is_nan());
  }

  #[test]
  fn test_parse_float() {
    assert_eq!(parse_float("3.25abc"), 3.25);
    assert_eq!(parse_float("-1e3x"), -1000.0);
    assert_eq!(parse_float(".5"), 0.5);
    assert_eq!(parse_float("1e"), 1.0);
    assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
    assert!(parse_float("abc").is_nan());
  }

  #[test]
  fn test_to_radix() {
    assert_eq!(to_radix(255.0, 16), "ff");
    assert_eq!(to_radix(-5.0, 2), "-101");
    assert_eq!(to_radix(1.5, 10), "1.5");
  }
}
