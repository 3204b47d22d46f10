use futures::future::LocalBoxFuture;

use super::{arg, method, method_async, relative_index};
use crate::error::{ErrorKind, Throw};
use crate::interpreter::Interpreter;
use crate::value::{Array, Function, NativeResult, PropertyMap, Value, join};

pub(super) fn constructor() -> Function {
  Function::native_constructor("Array", |interp, _, args| {
    let [Value::Number(length)] = args[..] else {
      return Ok(Value::array(args));
    };
    let length = interp.array_length(length)?;
    let mut items = Vec::new();
    interp.resize_array(&mut items, length)?;
    Ok(Value::array(items))
  })
  .with(
    "isArray",
    Function::native("isArray", |_, _, args| {
      Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_))))
    }),
  )
  .with("of", Function::native("of", |_, _, args| Ok(Value::array(args))))
  .with("from", Function::native_async("from", from))
}

fn from(interp: Interpreter, _: Value, args: Vec<Value>) -> LocalBoxFuture<'static, NativeResult> {
  Box::pin(async move {
    let source = arg(&args, 0);
    let items = match &source {
      Value::Array(_) | Value::String(_) => interp.iterate(&source)?,
      // Array-likes: `{ length: n }`.
      Value::Object(object) => {
        let length = object.get("length").map(|v| v.to_integer()).unwrap_or(0.0).max(0.0);
        let length = interp.array_length(length)?;
        (0..length)
          .map(|index| object.get(&index.to_string()).unwrap_or(Value::Undefined))
          .collect()
      }
      _ => Vec::new(),
    };
    let mapper = arg(&args, 1);
    if !matches!(mapper, Value::Function(_)) {
      return Ok(Value::array(items));
    }
    let mut mapped = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
      mapped.push(
        interp
          .call(&mapper, Value::Undefined, vec![item, Value::Number(index as f64)])
          .await?,
      );
    }
    Ok(Value::array(mapped))
  })
}

fn this_array(interp: &Interpreter, this: &Value, name: &str) -> Result<Array, Throw> {
  match this {
    Value::Array(array) => Ok(array.clone()),
    other => Err(interp.throw(
      ErrorKind::TypeError,
      format!("Array.prototype.{} called on {}", name, other.summary()),
    )),
  }
}

fn callback(interp: &Interpreter, args: &[Value]) -> Result<Value, Throw> {
  match arg(args, 0) {
    function @ Value::Function(_) => Ok(function),
    other => Err(interp.throw(
      ErrorKind::TypeError,
      format!("{} is not a function", other.summary()),
    )),
  }
}

/// Call `callback(item, index, array)` for each element, in order.
async fn each(
  interp: &Interpreter,
  array: &Array,
  callback: &Value,
  mut visit: impl FnMut(usize, Value, Value) -> bool,
) -> Result<(), Throw> {
  for (index, item) in array.to_vec().into_iter().enumerate() {
    let result = interp
      .call(
        callback,
        Value::Undefined,
        vec![item.clone(), Value::Number(index as f64), Value::Array(array.clone())],
      )
      .await?;
    if !visit(index, item, result) {
      break;
    }
  }
  Ok(())
}

pub(super) fn prototype() -> PropertyMap {
  let mut proto = PropertyMap::new();

  method(&mut proto, "push", |interp, this, args| {
    let array = this_array(interp, &this, "push")?;
    let mut items = array.borrow_mut();
    items.extend(args);
    Ok(Value::Number(items.len() as f64))
  });
  method(&mut proto, "pop", |interp, this, _| {
    let array = this_array(interp, &this, "pop")?;
    Ok(array.borrow_mut().pop().unwrap_or(Value::Undefined))
  });
  method(&mut proto, "shift", |interp, this, _| {
    let array = this_array(interp, &this, "shift")?;
    let mut items = array.borrow_mut();
    if items.is_empty() {
      return Ok(Value::Undefined);
    }
    Ok(items.remove(0))
  });
  method(&mut proto, "unshift", |interp, this, args| {
    let array = this_array(interp, &this, "unshift")?;
    let mut items = array.borrow_mut();
    items.splice(0..0, args);
    Ok(Value::Number(items.len() as f64))
  });
  method(&mut proto, "slice", |interp, this, args| {
    let array = this_array(interp, &this, "slice")?;
    let items = array.borrow();
    let start = relative_index(&arg(&args, 0), items.len(), 0);
    let end = relative_index(&arg(&args, 1), items.len(), items.len());
    Ok(Value::array(items.get(start..end.max(start)).map(<[Value]>::to_vec).unwrap_or_default()))
  });
  method(&mut proto, "splice", |interp, this, args| {
    let array = this_array(interp, &this, "splice")?;
    let mut items = array.borrow_mut();
    let start = relative_index(&arg(&args, 0), items.len(), 0);
    let delete_count = match args.len() {
      0 => 0,
      1 => items.len() - start,
      _ => (arg(&args, 1).to_integer().max(0.0) as usize).min(items.len() - start),
    };
    let inserted = args.into_iter().skip(2);
    let removed: Vec<Value> = items.splice(start..start + delete_count, inserted).collect();
    Ok(Value::array(removed))
  });
  method(&mut proto, "concat", |interp, this, args| {
    let array = this_array(interp, &this, "concat")?;
    let mut items = array.to_vec();
    for value in args {
      match value {
        Value::Array(other) => items.extend(other.to_vec()),
        other => items.push(other),
      }
    }
    Ok(Value::array(items))
  });
  method(&mut proto, "join", |interp, this, args| {
    let array = this_array(interp, &this, "join")?;
    let separator = match arg(&args, 0) {
      Value::Undefined => ",".into(),
      other => other.to_js_string(),
    };
    Ok(Value::from(join(&array, &separator)))
  });
  method(&mut proto, "toString", |interp, this, _| {
    let array = this_array(interp, &this, "toString")?;
    Ok(Value::from(join(&array, ",")))
  });
  method(&mut proto, "indexOf", |interp, this, args| {
    let array = this_array(interp, &this, "indexOf")?;
    let items = array.borrow();
    let needle = arg(&args, 0);
    let from = relative_index(&arg(&args, 1), items.len(), 0);
    let found = items
      .iter()
      .enumerate()
      .skip(from)
      .find(|(_, item)| item.strict_equals(&needle))
      .map(|(index, _)| index as f64);
    Ok(Value::Number(found.unwrap_or(-1.0)))
  });
  method(&mut proto, "lastIndexOf", |interp, this, args| {
    let array = this_array(interp, &this, "lastIndexOf")?;
    let items = array.borrow();
    let needle = arg(&args, 0);
    let found = items
      .iter()
      .rposition(|item| item.strict_equals(&needle))
      .map(|index| index as f64);
    Ok(Value::Number(found.unwrap_or(-1.0)))
  });
  method(&mut proto, "includes", |interp, this, args| {
    let array = this_array(interp, &this, "includes")?;
    let needle = arg(&args, 0);
    Ok(Value::Bool(array.borrow().iter().any(|item| item.same_value_zero(&needle))))
  });
  method(&mut proto, "reverse", |interp, this, _| {
    let array = this_array(interp, &this, "reverse")?;
    array.borrow_mut().reverse();
    Ok(this)
  });
  method(&mut proto, "at", |interp, this, args| {
    let array = this_array(interp, &this, "at")?;
    let len = array.len() as f64;
    let index = arg(&args, 0).to_integer();
    let index = if index < 0.0 { len + index } else { index };
    if index < 0.0 || index >= len {
      return Ok(Value::Undefined);
    }
    Ok(array.get(index as usize))
  });
  method(&mut proto, "fill", |interp, this, args| {
    let array = this_array(interp, &this, "fill")?;
    let mut items = array.borrow_mut();
    let len = items.len();
    let start = relative_index(&arg(&args, 1), len, 0);
    let end = relative_index(&arg(&args, 2), len, len);
    let value = arg(&args, 0);
    for item in items.iter_mut().take(end).skip(start) {
      *item = value.clone();
    }
    drop(items);
    Ok(this)
  });
  method(&mut proto, "flat", |interp, this, args| {
    let array = this_array(interp, &this, "flat")?;
    let depth = match arg(&args, 0) {
      Value::Undefined => 1.0,
      other => other.to_integer(),
    };
    Ok(Value::array(flatten(&array.to_vec(), depth)))
  });

  method_async(&mut proto, "forEach", |interp, this, args| {
    Box::pin(async move {
      let array = this_array(&interp, &this, "forEach")?;
      let callback = callback(&interp, &args)?;
      each(&interp, &array, &callback, |_, _, _| true).await?;
      Ok(Value::Undefined)
    })
  });
  method_async(&mut proto, "map", |interp, this, args| {
    Box::pin(async move {
      let array = this_array(&interp, &this, "map")?;
      let callback = callback(&interp, &args)?;
      let mut mapped = Vec::with_capacity(array.len());
      each(&interp, &array, &callback, |_, _, result| {
        mapped.push(result);
        true
      })
      .await?;
      Ok(Value::array(mapped))
    })
  });
  method_async(&mut proto, "filter", |interp, this, args| {
    Box::pin(async move {
      let array = this_array(&interp, &this, "filter")?;
      let callback = callback(&interp, &args)?;
      let mut kept = Vec::new();
      each(&interp, &array, &callback, |_, item, result| {
        if result.truthy() {
          kept.push(item);
        }
        true
      })
      .await?;
      Ok(Value::array(kept))
    })
  });
  method_async(&mut proto, "flatMap", |interp, this, args| {
    Box::pin(async move {
      let array = this_array(&interp, &this, "flatMap")?;
      let callback = callback(&interp, &args)?;
      let mut mapped = Vec::new();
      each(&interp, &array, &callback, |_, _, result| {
        mapped.push(result);
        true
      })
      .await?;
      Ok(Value::array(flatten(&mapped, 1.0)))
    })
  });
  method_async(&mut proto, "find", |interp, this, args| {
    Box::pin(async move {
      let array = this_array(&interp, &this, "find")?;
      let callback = callback(&interp, &args)?;
      let mut found = Value::Undefined;
      each(&interp, &array, &callback, |_, item, result| {
        if result.truthy() {
          found = item;
          return false;
        }
        true
      })
      .await?;
      Ok(found)
    })
  });
  method_async(&mut proto, "findIndex", |interp, this, args| {
    Box::pin(async move {
      let array = this_array(&interp, &this, "findIndex")?;
      let callback = callback(&interp, &args)?;
      let mut found = -1.0;
      each(&interp, &array, &callback, |index, _, result| {
        if result.truthy() {
          found = index as f64;
          return false;
        }
        true
      })
      .await?;
      Ok(Value::Number(found))
    })
  });
  method_async(&mut proto, "some", |interp, this, args| {
    Box::pin(async move {
      let array = this_array(&interp, &this, "some")?;
      let callback = callback(&interp, &args)?;
      let mut any = false;
      each(&interp, &array, &callback, |_, _, result| {
        any = result.truthy();
        !any
      })
      .await?;
      Ok(Value::Bool(any))
    })
  });
  method_async(&mut proto, "every", |interp, this, args| {
    Box::pin(async move {
      let array = this_array(&interp, &this, "every")?;
      let callback = callback(&interp, &args)?;
      let mut all = true;
      each(&interp, &array, &callback, |_, _, result| {
        all = result.truthy();
        all
      })
      .await?;
      Ok(Value::Bool(all))
    })
  });
  method_async(&mut proto, "reduce", |interp, this, args| {
    Box::pin(async move {
      let array = this_array(&interp, &this, "reduce")?;
      let items = array.to_vec();
      reduce(&interp, &array, items.into_iter().enumerate().collect(), &args).await
    })
  });
  method_async(&mut proto, "reduceRight", |interp, this, args| {
    Box::pin(async move {
      let array = this_array(&interp, &this, "reduceRight")?;
      let items = array.to_vec();
      reduce(&interp, &array, items.into_iter().enumerate().rev().collect(), &args).await
    })
  });
  method_async(&mut proto, "sort", |interp, this, args| {
    Box::pin(async move {
      let array = this_array(&interp, &this, "sort")?;
      let comparator = arg(&args, 0);
      let (defined, undefined): (Vec<Value>, Vec<Value>) =
        array.to_vec().into_iter().partition(|item| !item.is_undefined());
      let mut sorted = merge_sort(&interp, defined, &comparator).await?;
      sorted.extend(undefined);
      *array.borrow_mut() = sorted;
      Ok(this)
    })
  });

  proto
}

async fn reduce(
  interp: &Interpreter,
  array: &Array,
  items: Vec<(usize, Value)>,
  args: &[Value],
) -> NativeResult {
  let callback = callback(interp, args)?;
  let mut items = items.into_iter();
  let mut accumulator = match args.get(1) {
    Some(initial) => initial.clone(),
    None => match items.next() {
      Some((_, first)) => first,
      None => {
        return Err(interp.throw(
          ErrorKind::TypeError,
          "Reduce of empty array with no initial value",
        ));
      }
    },
  };
  for (index, item) in items {
    accumulator = interp
      .call(
        &callback,
        Value::Undefined,
        vec![accumulator, item, Value::Number(index as f64), Value::Array(array.clone())],
      )
      .await?;
  }
  Ok(accumulator)
}

fn flatten(items: &[Value], depth: f64) -> Vec<Value> {
  let mut flat = Vec::new();
  for item in items {
    match item {
      Value::Array(inner) if depth >= 1.0 => flat.extend(flatten(&inner.to_vec(), depth - 1.0)),
      other => flat.push(other.clone()),
    }
  }
  flat
}

/// Whether `a` may stay before `b`.
async fn in_order(interp: &Interpreter, a: &Value, b: &Value, comparator: &Value) -> Result<bool, Throw> {
  if matches!(comparator, Value::Function(_)) {
    let order = interp
      .call(comparator, Value::Undefined, vec![a.clone(), b.clone()])
      .await?
      .to_number();
    return Ok(!(order > 0.0));
  }
  Ok(a.to_js_string() <= b.to_js_string())
}

/// Stable bottom-up merge sort with a possibly user-defined comparator.
async fn merge_sort(interp: &Interpreter, mut items: Vec<Value>, comparator: &Value) -> Result<Vec<Value>, Throw> {
  let len = items.len();
  let mut width = 1;
  while width < len {
    let mut merged = Vec::with_capacity(len);
    for start in (0..len).step_by(2 * width) {
      let middle = (start + width).min(len);
      let end = (start + 2 * width).min(len);
      let (mut left, mut right) = (start, middle);
      while left < middle && right < end {
        if in_order(interp, &items[left], &items[right], comparator).await? {
          merged.push(items[left].clone());
          left += 1;
        } else {
          merged.push(items[right].clone());
          right += 1;
        }
      }
      merged.extend_from_slice(&items[left..middle]);
      merged.extend_from_slice(&items[right..end]);
    }
    items = merged;
    width *= 2;
  }
  Ok(items)
}
