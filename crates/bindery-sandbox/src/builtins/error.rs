use super::arg;
use crate::error::ErrorKind;
use crate::value::Function;

/// `Error` and its subclasses. Calling with or without `new` builds the
/// same error object.
pub(super) fn constructors() -> Vec<Function> {
  ErrorKind::ALL
    .into_iter()
    .map(|kind| {
      Function::native_constructor(kind.as_str(), move |interp, _, args| {
        let message = match arg(&args, 0) {
          value if value.is_undefined() => String::new(),
          value => value.to_js_string().to_string(),
        };
        Ok(interp.error_value(kind, message))
      })
    })
    .collect()
}
