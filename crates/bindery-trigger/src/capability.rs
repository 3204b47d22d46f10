use std::fmt;

use serde::{Deserialize, Serialize};

/// A side-effecting capability that only the host can perform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
  /// Run a query or API action.
  Run { entity: String },
  /// Reset an action's data.
  Clear { entity: String },
  ShowAlert,
  SetInterval,
  ClearInterval,
  StoreValue,
  RemoveValue,
  ClearStore,
  CopyToClipboard,
}

impl Capability {
  /// Names of the trigger functions installed as globals.
  pub const GLOBAL_NAMES: &'static [&'static str] = &[
    "showAlert",
    "setInterval",
    "clearInterval",
    "storeValue",
    "removeValue",
    "clearStore",
    "copyToClipboard",
  ];

  /// Methods installed on every action entity.
  pub const ENTITY_METHODS: &'static [&'static str] = &["run", "clear"];

  /// Capability behind a global trigger function.
  pub fn from_global(name: &str) -> Option<Self> {
    let capability = match name {
      "showAlert" => Capability::ShowAlert,
      "setInterval" => Capability::SetInterval,
      "clearInterval" => Capability::ClearInterval,
      "storeValue" => Capability::StoreValue,
      "removeValue" => Capability::RemoveValue,
      "clearStore" => Capability::ClearStore,
      "copyToClipboard" => Capability::CopyToClipboard,
      _ => return None,
    };
    Some(capability)
  }

  /// Capability behind `<entity>.<method>`.
  pub fn from_entity_method(entity: &str, method: &str) -> Option<Self> {
    let entity = entity.to_string();
    match method {
      "run" => Some(Capability::Run { entity }),
      "clear" => Some(Capability::Clear { entity }),
      _ => None,
    }
  }

  pub fn is_global(name: &str) -> bool {
    Self::GLOBAL_NAMES.contains(&name)
  }

  pub fn is_entity_method(method: &str) -> bool {
    Self::ENTITY_METHODS.contains(&method)
  }

  /// Entity the capability acts on, for entity methods.
  pub fn entity(&self) -> Option<&str> {
    match self {
      Capability::Run { entity } | Capability::Clear { entity } => Some(entity),
      _ => None,
    }
  }
}

impl fmt::Display for Capability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Capability::Run { entity } => write!(f, "{}.run", entity),
      Capability::Clear { entity } => write!(f, "{}.clear", entity),
      Capability::ShowAlert => f.write_str("showAlert"),
      Capability::SetInterval => f.write_str("setInterval"),
      Capability::ClearInterval => f.write_str("clearInterval"),
      Capability::StoreValue => f.write_str("storeValue"),
      Capability::RemoveValue => f.write_str("removeValue"),
      Capability::ClearStore => f.write_str("clearStore"),
      Capability::CopyToClipboard => f.write_str("copyToClipboard"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_every_global_name_resolves() {
    for name in Capability::GLOBAL_NAMES {
      let capability = Capability::from_global(name).unwrap();
      assert_eq!(capability.to_string(), *name);
    }
    assert!(Capability::from_global("alert").is_none());
  }

  #[test]
  fn test_entity_methods() {
    let run = Capability::from_entity_method("Api1", "run").unwrap();
    assert_eq!(run.entity(), Some("Api1"));
    assert_eq!(run.to_string(), "Api1.run");
    assert!(Capability::from_entity_method("Api1", "data").is_none());
  }

  #[test]
  fn test_wire_shape() {
    let json = serde_json::to_value(Capability::Run {
      entity: "Api1".to_string(),
    })
    .unwrap();
    assert_eq!(json, serde_json::json!({"type": "RUN", "entity": "Api1"}));
    let json = serde_json::to_value(Capability::ShowAlert).unwrap();
    assert_eq!(json, serde_json::json!({"type": "SHOW_ALERT"}));
  }
}
