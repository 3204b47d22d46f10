//! Integration tests for the duplex channel.

use bindery_channel::{ChannelError, Envelope, MessageType, duplex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
enum HostSays {
  Hello { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
enum IsolateSays {
  Reply { greeting: String },
}

#[tokio::test]
async fn test_round_trip_both_directions() {
  let (mut host, mut isolate) = duplex::<HostSays, IsolateSays>();

  host
    .outbox()
    .send(&Envelope::request(HostSays::Hello {
      name: "Button1".to_string(),
    }))
    .unwrap();

  let received = isolate.recv().await.unwrap().unwrap();
  assert_eq!(received.message_type, MessageType::Request);
  let HostSays::Hello { name } = received.body;

  isolate
    .outbox()
    .post(
      MessageType::Response,
      IsolateSays::Reply {
        greeting: format!("hi {}", name),
      },
    )
    .unwrap();

  let reply = host.recv().await.unwrap().unwrap();
  assert_eq!(reply.message_type, MessageType::Response);
  assert_eq!(
    reply.body,
    IsolateSays::Reply {
      greeting: "hi Button1".to_string()
    }
  );
}

#[tokio::test]
async fn test_send_after_peer_dropped() {
  let (host, isolate) = duplex::<HostSays, IsolateSays>();
  let outbox = host.outbox();
  drop(isolate);

  assert!(outbox.is_closed());
  let result = outbox.send(&Envelope::request(HostSays::Hello {
    name: "x".to_string(),
  }));
  assert!(matches!(result, Err(ChannelError::Closed)));
}

#[tokio::test]
async fn test_recv_returns_none_when_all_senders_gone() {
  let (host, mut isolate) = duplex::<HostSays, IsolateSays>();
  drop(host);

  assert!(isolate.recv().await.is_none());
}

#[tokio::test]
async fn test_messages_arrive_in_send_order() {
  let (host, isolate) = duplex::<HostSays, IsolateSays>();
  let (_isolate_out, mut inbox) = isolate.split();
  let outbox = host.outbox();

  for i in 0..5 {
    outbox
      .post(
        MessageType::Default,
        HostSays::Hello {
          name: i.to_string(),
        },
      )
      .unwrap();
  }

  for i in 0..5 {
    let envelope = inbox.recv().await.unwrap().unwrap();
    assert_eq!(
      envelope.body,
      HostSays::Hello {
        name: i.to_string()
      }
    );
  }
}
