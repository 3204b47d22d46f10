//! Bindings and their `{{ ... }}` segments.

use serde::{Deserialize, Serialize};

/// User-authored dynamic text bound to a property or event handler.
///
/// Script segments are delimited by `{{` and `}}`; anything outside of them is
/// literal text. A binding is never rewritten by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
  /// Raw text as typed by the user.
  pub text: String,
  /// Property the binding drives (e.g. `onClick`, `text`).
  #[serde(default)]
  pub property_path: String,
  /// Id of the widget or action that owns the property.
  #[serde(default)]
  pub entity_id: String,
}

/// A piece of a binding's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
  /// Literal text outside of any `{{ }}` pair.
  Text(&'a str),
  /// Script source between `{{` and `}}`, with its byte offset in the text.
  Script { source: &'a str, offset: usize },
}

impl Binding {
  pub fn new(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      property_path: String::new(),
      entity_id: String::new(),
    }
  }

  /// Attach the owning entity and property path.
  pub fn bound_to(mut self, entity_id: impl Into<String>, property_path: impl Into<String>) -> Self {
    self.entity_id = entity_id.into();
    self.property_path = property_path.into();
    self
  }

  pub fn segments(&self) -> Vec<Segment<'_>> {
    split_segments(&self.text)
  }

  /// Script sources contained in this binding, in order.
  pub fn scripts(&self) -> Vec<&str> {
    self
      .segments()
      .into_iter()
      .filter_map(|segment| match segment {
        Segment::Script { source, .. } => Some(source),
        Segment::Text(_) => None,
      })
      .collect()
  }

  /// Whether the binding contains at least one script segment.
  pub fn is_dynamic(&self) -> bool {
    self
      .segments()
      .iter()
      .any(|segment| matches!(segment, Segment::Script { .. }))
  }

  /// `entity.property` description used in stack traces and spans.
  pub fn location(&self) -> String {
    match (self.entity_id.is_empty(), self.property_path.is_empty()) {
      (true, true) => "<binding>".to_string(),
      (false, true) => self.entity_id.clone(),
      (true, false) => self.property_path.clone(),
      (false, false) => format!("{}.{}", self.entity_id, self.property_path),
    }
  }
}

/// Split text into literal and script segments.
///
/// The closing `}}` is searched for outside of string literals and at brace
/// depth zero, so object literals inside a script do not end it early. An
/// opening `{{` that is never closed is kept as literal text.
pub fn split_segments(text: &str) -> Vec<Segment<'_>> {
  let mut segments = Vec::new();
  let mut cursor = 0;

  while cursor < text.len() {
    let Some(open) = text[cursor..].find("{{").map(|i| cursor + i) else {
      break;
    };
    let script_start = open + 2;
    let Some(script_end) = find_close(text, script_start) else {
      break;
    };

    if open > cursor {
      segments.push(Segment::Text(&text[cursor..open]));
    }
    segments.push(Segment::Script {
      source: &text[script_start..script_end],
      offset: script_start,
    });
    cursor = script_end + 2;
  }

  if cursor < text.len() {
    segments.push(Segment::Text(&text[cursor..]));
  }

  segments
}

fn find_close(text: &str, from: usize) -> Option<usize> {
  let bytes = text.as_bytes();
  let mut depth = 0usize;
  let mut quote: Option<u8> = None;
  let mut escaped = false;
  let mut i = from;

  while i < bytes.len() {
    let b = bytes[i];
    if let Some(q) = quote {
      if escaped {
        escaped = false;
      } else if b == b'\\' {
        escaped = true;
      } else if b == q {
        quote = None;
      }
      i += 1;
      continue;
    }
    match b {
      b'"' | b'\'' | b'`' => quote = Some(b),
      b'{' => depth += 1,
      b'}' if depth == 0 => {
        if bytes.get(i + 1) == Some(&b'}') {
          return Some(i);
        }
      }
      b'}' => depth -= 1,
      _ => {}
    }
    i += 1;
  }

  None
}
