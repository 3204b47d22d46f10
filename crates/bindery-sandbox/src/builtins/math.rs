use uuid::Uuid;

use super::arg;
use crate::value::{Function, PropertyMap, Value};

fn unary(math: &mut PropertyMap, name: &str, f: fn(f64) -> f64) {
  math.insert(
    name,
    Function::native(name, move |_, _, args| Ok(Value::Number(f(arg(&args, 0).to_number())))).into(),
  );
}

/// Uniform in `[0, 1)`, built from the 53 low bits of a random UUID.
fn random() -> f64 {
  const MANTISSA: u64 = 1 << 53;
  let bits = Uuid::new_v4().as_u128() as u64 & (MANTISSA - 1);
  bits as f64 / MANTISSA as f64
}

/// `Math.round` rounds halves towards positive infinity.
fn round(n: f64) -> f64 {
  (n + 0.5).floor()
}

pub(super) fn object() -> Value {
  let mut math = PropertyMap::new();
  math.insert("PI", Value::Number(std::f64::consts::PI));
  math.insert("E", Value::Number(std::f64::consts::E));

  unary(&mut math, "abs", f64::abs);
  unary(&mut math, "floor", f64::floor);
  unary(&mut math, "ceil", f64::ceil);
  unary(&mut math, "round", round);
  unary(&mut math, "trunc", f64::trunc);
  unary(&mut math, "sign", |n| if n == 0.0 || n.is_nan() { n } else { n.signum() });
  unary(&mut math, "sqrt", f64::sqrt);
  unary(&mut math, "cbrt", f64::cbrt);
  unary(&mut math, "log", f64::ln);
  unary(&mut math, "log10", f64::log10);
  unary(&mut math, "log2", f64::log2);
  unary(&mut math, "exp", f64::exp);
  unary(&mut math, "sin", f64::sin);
  unary(&mut math, "cos", f64::cos);
  unary(&mut math, "tan", f64::tan);

  math.insert(
    "pow",
    Function::native("pow", |_, _, args| {
      Ok(Value::Number(arg(&args, 0).to_number().powf(arg(&args, 1).to_number())))
    })
    .into(),
  );
  math.insert(
    "max",
    Function::native("max", |_, _, args| {
      let numbers = args.iter().map(Value::to_number);
      Ok(Value::Number(numbers.fold(f64::NEG_INFINITY, |acc, n| {
        if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.max(n) }
      })))
    })
    .into(),
  );
  math.insert(
    "min",
    Function::native("min", |_, _, args| {
      let numbers = args.iter().map(Value::to_number);
      Ok(Value::Number(numbers.fold(f64::INFINITY, |acc, n| {
        if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.min(n) }
      })))
    })
    .into(),
  );
  math.insert(
    "random",
    Function::native("random", |_, _, _| Ok(Value::Number(random()))).into(),
  );

  Value::object(math)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_round_halves_up() {
    assert_eq!(round(2.5), 3.0);
    assert_eq!(round(-2.5), -2.0);
    assert_eq!(round(-2.6), -3.0);
  }

  #[test]
  fn test_random_range() {
    for _ in 0..100 {
      let n = random();
      assert!((0.0..1.0).contains(&n));
    }
  }
}
