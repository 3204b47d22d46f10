//! Runtime values.
//!
//! Compound values are shared and mutable (`Rc<RefCell<_>>`), which mirrors
//! reference semantics of the script language: assigning an object copies
//! the reference, not the contents.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use bindery_script::ast;
use futures::future::LocalBoxFuture;

use crate::error::Throw;
use crate::interpreter::Interpreter;
use crate::promise::Promise;
use crate::scope::Scope;

pub type NativeResult = Result<Value, Throw>;

/// Longest string a binding may build, in bytes.
pub const MAX_STRING_LENGTH: usize = 1 << 29;

/// Arrays are dense; lengths past this throw `RangeError`.
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

#[derive(Clone)]
pub enum Value {
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  String(Rc<str>),
  Array(Array),
  Object(Object),
  Function(Function),
  Promise(Promise),
}

/// Insertion-ordered property storage.
#[derive(Clone, Default)]
pub struct PropertyMap {
  entries: Vec<(Rc<str>, Value)>,
  index: HashMap<Rc<str>, usize>,
}

impl PropertyMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.index.get(key).map(|&i| &self.entries[i].1)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.index.contains_key(key)
  }

  pub fn insert(&mut self, key: impl Into<Rc<str>>, value: Value) {
    let key = key.into();
    match self.index.get(&key) {
      Some(&i) => self.entries[i].1 = value,
      None => {
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
      }
    }
  }

  pub fn remove(&mut self, key: &str) -> Option<Value> {
    let removed = self.index.remove(key)?;
    let (_, value) = self.entries.remove(removed);
    for i in self.index.values_mut() {
      if *i > removed {
        *i -= 1;
      }
    }
    Some(value)
  }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.index.clear();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn keys(&self) -> impl Iterator<Item = &Rc<str>> {
    self.entries.iter().map(|(key, _)| key)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &Value)> {
    self.entries.iter().map(|(key, value)| (key, value))
  }
}

impl FromIterator<(Rc<str>, Value)> for PropertyMap {
  fn from_iter<I: IntoIterator<Item = (Rc<str>, Value)>>(iter: I) -> Self {
    let mut map = PropertyMap::new();
    for (key, value) in iter {
      map.insert(key, value);
    }
    map
  }
}

#[derive(Clone)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Array {
  pub fn new(items: Vec<Value>) -> Self {
    Self(Rc::new(RefCell::new(items)))
  }

  pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
    self.0.borrow()
  }

  pub fn borrow_mut(&self) -> RefMut<'_, Vec<Value>> {
    self.0.borrow_mut()
  }

  pub fn len(&self) -> usize {
    self.0.borrow().len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.borrow().is_empty()
  }

  pub fn get(&self, index: usize) -> Value {
    self.0.borrow().get(index).cloned().unwrap_or(Value::Undefined)
  }

  /// Copy of the current elements.
  pub fn to_vec(&self) -> Vec<Value> {
    self.0.borrow().clone()
  }

  pub fn ptr_eq(&self, other: &Array) -> bool {
    Rc::ptr_eq(&self.0, &other.0)
  }

  pub(crate) fn addr(&self) -> usize {
    Rc::as_ptr(&self.0) as *const () as usize
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
  Plain,
  /// Created by one of the error constructors.
  Error,
}

pub struct ObjectData {
  pub properties: RefCell<PropertyMap>,
  pub class: ObjectClass,
}

#[derive(Clone)]
pub struct Object(Rc<ObjectData>);

impl Object {
  pub fn new() -> Self {
    Self::from_map(PropertyMap::new())
  }

  pub fn from_map(properties: PropertyMap) -> Self {
    Self::with_class(properties, ObjectClass::Plain)
  }

  pub fn with_class(properties: PropertyMap, class: ObjectClass) -> Self {
    Self(Rc::new(ObjectData {
      properties: RefCell::new(properties),
      class,
    }))
  }

  /// An error object with `name`, `message` and `stack` properties.
  pub fn error(name: &str, message: &str, stack: String) -> Self {
    let mut properties = PropertyMap::new();
    properties.insert("name", Value::from(name));
    properties.insert("message", Value::from(message));
    properties.insert("stack", Value::from(stack));
    Self(Rc::new(ObjectData {
      properties: RefCell::new(properties),
      class: ObjectClass::Error,
    }))
  }

  pub fn class(&self) -> ObjectClass {
    self.0.class
  }

  pub fn is_error(&self) -> bool {
    self.0.class == ObjectClass::Error
  }

  pub fn get(&self, key: &str) -> Option<Value> {
    self.0.properties.borrow().get(key).cloned()
  }

  pub fn set(&self, key: impl Into<Rc<str>>, value: Value) {
    self.0.properties.borrow_mut().insert(key, value);
  }

  pub fn remove(&self, key: &str) -> Option<Value> {
    self.0.properties.borrow_mut().remove(key)
  }

  pub fn has(&self, key: &str) -> bool {
    self.0.properties.borrow().contains_key(key)
  }

  pub fn keys(&self) -> Vec<Rc<str>> {
    self.0.properties.borrow().keys().cloned().collect()
  }

  pub fn entries(&self) -> Vec<(Rc<str>, Value)> {
    self
      .0
      .properties
      .borrow()
      .iter()
      .map(|(key, value)| (key.clone(), value.clone()))
      .collect()
  }

  pub fn properties(&self) -> Ref<'_, PropertyMap> {
    self.0.properties.borrow()
  }

  pub fn ptr_eq(&self, other: &Object) -> bool {
    Rc::ptr_eq(&self.0, &other.0)
  }

  pub(crate) fn addr(&self) -> usize {
    Rc::as_ptr(&self.0) as *const () as usize
  }
}

impl Default for Object {
  fn default() -> Self {
    Self::new()
  }
}

type SyncNative = dyn Fn(&Interpreter, Value, Vec<Value>) -> NativeResult;
type AsyncNative = dyn Fn(Interpreter, Value, Vec<Value>) -> LocalBoxFuture<'static, NativeResult>;

/// A function implemented in Rust. Both kinds receive the receiver (`this`)
/// of a method call, or `undefined` for plain calls.
#[derive(Clone)]
pub enum Native {
  Sync(Rc<SyncNative>),
  /// Natives that call back into user code.
  Async(Rc<AsyncNative>),
}

pub enum FunctionKind {
  Closure { def: Rc<ast::Function>, scope: Scope },
  Native(Native),
}

pub struct FunctionData {
  pub name: Rc<str>,
  pub kind: FunctionKind,
  /// Whether `new` may be applied.
  pub constructor: bool,
  pub properties: RefCell<PropertyMap>,
}

#[derive(Clone)]
pub struct Function(Rc<FunctionData>);

impl Function {
  fn build(name: impl Into<Rc<str>>, kind: FunctionKind, constructor: bool) -> Self {
    Self(Rc::new(FunctionData {
      name: name.into(),
      kind,
      constructor,
      properties: RefCell::new(PropertyMap::new()),
    }))
  }

  /// A closure over `scope`. Anonymous functions take `name` when given.
  pub fn closure(def: Rc<ast::Function>, scope: Scope, name: Option<Rc<str>>) -> Self {
    let name = def.name.clone().or(name).unwrap_or_else(|| Rc::from(""));
    Self::build(name, FunctionKind::Closure { def, scope }, false)
  }

  pub fn native(
    name: &str,
    f: impl Fn(&Interpreter, Value, Vec<Value>) -> NativeResult + 'static,
  ) -> Self {
    Self::build(name, FunctionKind::Native(Native::Sync(Rc::new(f))), false)
  }

  pub fn native_async(
    name: &str,
    f: impl Fn(Interpreter, Value, Vec<Value>) -> LocalBoxFuture<'static, NativeResult> + 'static,
  ) -> Self {
    Self::build(name, FunctionKind::Native(Native::Async(Rc::new(f))), false)
  }

  /// A native that may also be invoked with `new`.
  pub fn native_constructor(
    name: &str,
    f: impl Fn(&Interpreter, Value, Vec<Value>) -> NativeResult + 'static,
  ) -> Self {
    Self::build(name, FunctionKind::Native(Native::Sync(Rc::new(f))), true)
  }

  pub fn native_async_constructor(
    name: &str,
    f: impl Fn(Interpreter, Value, Vec<Value>) -> LocalBoxFuture<'static, NativeResult> + 'static,
  ) -> Self {
    Self::build(name, FunctionKind::Native(Native::Async(Rc::new(f))), true)
  }

  pub fn name(&self) -> &str {
    &self.0.name
  }

  pub fn kind(&self) -> &FunctionKind {
    &self.0.kind
  }

  pub fn is_constructor(&self) -> bool {
    self.0.constructor
  }

  /// Source text for closures.
  pub fn source(&self) -> Option<Rc<str>> {
    match &self.0.kind {
      FunctionKind::Closure { def, .. } => Some(def.source.clone()),
      FunctionKind::Native(_) => None,
    }
  }

  pub fn get(&self, key: &str) -> Option<Value> {
    self.0.properties.borrow().get(key).cloned()
  }

  pub fn set(&self, key: impl Into<Rc<str>>, value: Value) {
    self.0.properties.borrow_mut().insert(key, value);
  }

  pub fn has(&self, key: &str) -> bool {
    self.0.properties.borrow().contains_key(key)
  }

  pub fn keys(&self) -> Vec<Rc<str>> {
    self.0.properties.borrow().keys().cloned().collect()
  }

  /// Attach a static method, builder style.
  pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
    self.set(key, value.into());
    self
  }

  pub fn ptr_eq(&self, other: &Function) -> bool {
    Rc::ptr_eq(&self.0, &other.0)
  }
}

impl Value {
  pub fn string(s: impl Into<Rc<str>>) -> Self {
    Value::String(s.into())
  }

  pub fn array(items: Vec<Value>) -> Self {
    Value::Array(Array::new(items))
  }

  pub fn object(properties: PropertyMap) -> Self {
    Value::Object(Object::from_map(properties))
  }

  pub fn type_of(&self) -> &'static str {
    match self {
      Value::Undefined => "undefined",
      Value::Null | Value::Array(_) | Value::Object(_) | Value::Promise(_) => "object",
      Value::Bool(_) => "boolean",
      Value::Number(_) => "number",
      Value::String(_) => "string",
      Value::Function(_) => "function",
    }
  }

  pub fn is_nullish(&self) -> bool {
    matches!(self, Value::Undefined | Value::Null)
  }

  pub fn is_undefined(&self) -> bool {
    matches!(self, Value::Undefined)
  }

  pub fn truthy(&self) -> bool {
    match self {
      Value::Undefined | Value::Null => false,
      Value::Bool(b) => *b,
      Value::Number(n) => *n != 0.0 && !n.is_nan(),
      Value::String(s) => !s.is_empty(),
      _ => true,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_function(&self) -> Option<&Function> {
    match self {
      Value::Function(f) => Some(f),
      _ => None,
    }
  }

  /// Error object behind this value, if any.
  pub fn as_error(&self) -> Option<&Object> {
    match self {
      Value::Object(object) if object.is_error() => Some(object),
      _ => None,
    }
  }

  pub fn to_number(&self) -> f64 {
    match self {
      Value::Undefined => f64::NAN,
      Value::Null => 0.0,
      Value::Bool(b) => f64::from(u8::from(*b)),
      Value::Number(n) => *n,
      Value::String(s) => string_to_number(s),
      Value::Array(_) => string_to_number(&self.to_js_string()),
      _ => f64::NAN,
    }
  }

  /// Integer conversion used for indices and lengths.
  pub fn to_integer(&self) -> f64 {
    let n = self.to_number();
    if n.is_nan() { 0.0 } else { n.trunc() }
  }

  /// String conversion as performed by `String(value)`.
  pub fn to_js_string(&self) -> Rc<str> {
    match self {
      Value::String(s) => s.clone(),
      other => Rc::from(other.to_display_string()),
    }
  }

  fn to_display_string(&self) -> String {
    match self {
      Value::Undefined => "undefined".to_string(),
      Value::Null => "null".to_string(),
      Value::Bool(b) => b.to_string(),
      Value::Number(n) => number_to_string(*n),
      Value::String(s) => s.to_string(),
      Value::Array(array) => {
        let mut visited = Vec::new();
        join_array(array, ",", &mut visited)
      }
      Value::Object(object) if object.is_error() => error_summary(object),
      Value::Object(_) => "[object Object]".to_string(),
      Value::Function(function) => match function.source() {
        Some(source) => source.to_string(),
        None => format!("function {}() {{ [native code] }}", function.name()),
      },
      Value::Promise(_) => "[object Promise]".to_string(),
    }
  }

  /// One-line description used for thrown values and failure reasons.
  pub fn summary(&self) -> String {
    self.to_js_string().to_string()
  }

  pub fn strict_equals(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
      (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
      (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
      (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
      _ => false,
    }
  }

  pub fn loose_equals(&self, other: &Value) -> bool {
    match (self, other) {
      (a, b) if a.is_nullish() && b.is_nullish() => true,
      (a, b) if a.is_nullish() || b.is_nullish() => false,
      (Value::Number(_), Value::String(_))
      | (Value::String(_), Value::Number(_))
      | (Value::Bool(_), _)
      | (_, Value::Bool(_)) => self.to_number() == other.to_number(),
      (Value::Array(_) | Value::Object(_), Value::String(_) | Value::Number(_))
      | (Value::String(_) | Value::Number(_), Value::Array(_) | Value::Object(_)) => {
        let (object, primitive) = if matches!(self, Value::String(_) | Value::Number(_)) {
          (other, self)
        } else {
          (self, other)
        };
        Value::String(object.to_js_string()).loose_equals(primitive)
      }
      _ => self.strict_equals(other),
    }
  }

  /// Equality used by `includes`: like `===`, but `NaN` equals itself.
  pub fn same_value_zero(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
      _ => self.strict_equals(other),
    }
  }

  pub fn from_json(json: &serde_json::Value) -> Self {
    match json {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(b) => Value::Bool(*b),
      serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
      serde_json::Value::String(s) => Value::string(s.as_str()),
      serde_json::Value::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
      serde_json::Value::Object(map) => Value::object(
        map
          .iter()
          .map(|(key, value)| (Rc::from(key.as_str()), Value::from_json(value)))
          .collect(),
      ),
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::String(Rc::from(s))
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::String(Rc::from(s))
  }
}

impl From<Rc<str>> for Value {
  fn from(s: Rc<str>) -> Self {
    Value::String(s)
  }
}

impl From<f64> for Value {
  fn from(n: f64) -> Self {
    Value::Number(n)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<Function> for Value {
  fn from(f: Function) -> Self {
    Value::Function(f)
  }
}

impl From<Object> for Value {
  fn from(o: Object) -> Self {
    Value::Object(o)
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::String(s) => write!(f, "{:?}", s),
      Value::Array(array) => write!(f, "Array(len={})", array.len()),
      Value::Object(object) => write!(f, "Object(keys={:?})", object.keys()),
      Value::Function(function) => write!(f, "Function({})", function.name()),
      other => f.write_str(&other.to_display_string()),
    }
  }
}

/// `Name: message` for error objects.
pub fn error_summary(error: &Object) -> String {
  let name = error.get("name").map(|v| v.to_js_string()).unwrap_or_else(|| Rc::from("Error"));
  let message = error.get("message").map(|v| v.to_js_string()).unwrap_or_else(|| Rc::from(""));
  if message.is_empty() {
    name.to_string()
  } else {
    format!("{}: {}", name, message)
  }
}

fn join_array(array: &Array, separator: &str, visited: &mut Vec<usize>) -> String {
  if visited.contains(&array.addr()) {
    return String::new();
  }
  visited.push(array.addr());
  let parts: Vec<String> = array
    .borrow()
    .iter()
    .map(|item| match item {
      Value::Undefined | Value::Null => String::new(),
      Value::Array(inner) => join_array(inner, ",", visited),
      other => other.to_display_string(),
    })
    .collect();
  visited.pop();
  parts.join(separator)
}

/// Join array elements the way `Array.prototype.join` does.
pub fn join(array: &Array, separator: &str) -> String {
  join_array(array, separator, &mut Vec::new())
}

/// Number formatting compatible with the script language's `String(n)`.
pub fn number_to_string(n: f64) -> String {
  if n.is_nan() {
    return "NaN".to_string();
  }
  if n.is_infinite() {
    return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
  }
  if n == 0.0 {
    return "0".to_string();
  }
  let abs = n.abs();
  if (1e-6..1e21).contains(&abs) {
    if n.fract() == 0.0 {
      return format!("{:.0}", n);
    }
    return format!("{}", n);
  }
  let formatted = format!("{:e}", n);
  match formatted.split_once('e') {
    Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{}e+{}", mantissa, exponent),
    _ => formatted,
  }
}

/// Numeric conversion of a string, as performed by `Number(s)`.
pub fn string_to_number(s: &str) -> f64 {
  let trimmed = s.trim();
  if trimmed.is_empty() {
    return 0.0;
  }
  let (sign, digits) = match trimmed.as_bytes()[0] {
    b'-' => (-1.0, &trimmed[1..]),
    b'+' => (1.0, &trimmed[1..]),
    _ => (1.0, trimmed),
  };
  if digits == "Infinity" {
    return sign * f64::INFINITY;
  }
  let radix = match digits.get(..2) {
    Some("0x" | "0X") => Some(16),
    Some("0o" | "0O") => Some(8),
    Some("0b" | "0B") => Some(2),
    _ => None,
  };
  if let Some(radix) = radix {
    // Prefixed literals take no sign.
    if sign < 0.0 || trimmed.starts_with('+') {
      return f64::NAN;
    }
    return u64::from_str_radix(&digits[2..], radix)
      .map(|v| v as f64)
      .unwrap_or(f64::NAN);
  }
  let valid = digits
    .bytes()
    .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
  if !valid || digits.starts_with(['e', 'E']) {
    return f64::NAN;
  }
  digits.parse::<f64>().map(|v| sign * v).unwrap_or(f64::NAN)
}

/// JSON number for `n`; integral values become integers.
pub fn number_to_json(n: f64) -> serde_json::Value {
  const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
  if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE {
    if n == 0.0 {
      return serde_json::Value::from(0);
    }
    return serde_json::Value::from(n as i64);
  }
  serde_json::Number::from_f64(n)
    .map(serde_json::Value::Number)
    .unwrap_or(serde_json::Value::Null)
}
