//! Message envelope shared by both directions of the channel.

use serde::{Deserialize, Serialize};

/// Kind of message carried by an [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
  /// Fire-and-forget notification (e.g. a log batch).
  Default,
  /// A request that expects a matching response.
  Request,
  /// A reply to an earlier request.
  Response,
}

/// Wire envelope: `{ "messageType": ..., "body": { "method": ..., "data": ... } }`.
///
/// The body type is expected to serialize as an adjacently tagged enum
/// (`#[serde(tag = "method", content = "data")]`) so that the action tag and
/// its payload land in the `method`/`data` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<B> {
  pub message_type: MessageType,
  pub body: B,
}

impl<B> Envelope<B> {
  pub fn new(message_type: MessageType, body: B) -> Self {
    Self { message_type, body }
  }

  pub fn default_message(body: B) -> Self {
    Self::new(MessageType::Default, body)
  }

  pub fn request(body: B) -> Self {
    Self::new(MessageType::Request, body)
  }

  pub fn response(body: B) -> Self {
    Self::new(MessageType::Response, body)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[derive(Debug, PartialEq, Serialize, Deserialize)]
  #[serde(tag = "method", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
  enum Body {
    ProcessLogs { count: u32 },
  }

  #[test]
  fn test_envelope_wire_shape() {
    let envelope = Envelope::default_message(Body::ProcessLogs { count: 3 });
    let value = serde_json::to_value(&envelope).unwrap();

    assert_eq!(
      value,
      json!({
        "messageType": "DEFAULT",
        "body": { "method": "PROCESS_LOGS", "data": { "count": 3 } }
      })
    );
  }
}
