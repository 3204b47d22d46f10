//! Channel endpoints.
//!
//! Frames travel as JSON strings over unbounded tokio channels. Serializing on
//! send (rather than moving typed values) keeps the two contexts honest: a
//! value that cannot be represented on the wire fails at the boundary instead
//! of sneaking a shared reference across.

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::trace;

use crate::envelope::{Envelope, MessageType};
use crate::error::ChannelError;

/// Sending half of a channel endpoint. Cheap to clone.
pub struct Outbox<T> {
  sender: mpsc::UnboundedSender<String>,
  _marker: PhantomData<fn(T)>,
}

impl<T> Clone for Outbox<T> {
  fn clone(&self) -> Self {
    Self {
      sender: self.sender.clone(),
      _marker: PhantomData,
    }
  }
}

impl<T: Serialize> Outbox<T> {
  /// Serialize and send an envelope.
  pub fn send(&self, envelope: &Envelope<T>) -> Result<(), ChannelError> {
    let frame =
      serde_json::to_string(envelope).map_err(|source| ChannelError::Encode { source })?;
    trace!(bytes = frame.len(), "channel send");
    self.sender.send(frame).map_err(|_| ChannelError::Closed)
  }

  /// Wrap `body` in an envelope of the given type and send it.
  pub fn post(&self, message_type: MessageType, body: T) -> Result<(), ChannelError> {
    self.send(&Envelope::new(message_type, body))
  }

  /// Whether the receiving side has gone away.
  pub fn is_closed(&self) -> bool {
    self.sender.is_closed()
  }
}

/// Receiving half of a channel endpoint.
pub struct Inbox<T> {
  receiver: mpsc::UnboundedReceiver<String>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Inbox<T> {
  /// Receive and decode the next envelope.
  ///
  /// Returns `None` once every sender for this inbox has been dropped.
  pub async fn recv(&mut self) -> Option<Result<Envelope<T>, ChannelError>> {
    let frame = self.receiver.recv().await?;
    Some(serde_json::from_str(&frame).map_err(|source| ChannelError::Decode { source }))
  }

  /// Stop accepting new frames. Frames already queued can still be received.
  pub fn close(&mut self) {
    self.receiver.close();
  }
}

/// One end of a duplex channel: sends `Out`, receives `In`.
pub struct Port<Out, In> {
  outbox: Outbox<Out>,
  inbox: Inbox<In>,
}

impl<Out: Serialize, In: DeserializeOwned> Port<Out, In> {
  /// Get a sender handle for this end.
  pub fn outbox(&self) -> Outbox<Out> {
    self.outbox.clone()
  }

  /// Receive the next envelope sent by the other end.
  pub async fn recv(&mut self) -> Option<Result<Envelope<In>, ChannelError>> {
    self.inbox.recv().await
  }

  /// Split into independently owned halves.
  pub fn split(self) -> (Outbox<Out>, Inbox<In>) {
    (self.outbox, self.inbox)
  }
}

/// Create a connected pair of ports.
///
/// The first port sends `A` and receives `B`; the second is its mirror image.
pub fn duplex<A, B>() -> (Port<A, B>, Port<B, A>) {
  let (a_tx, a_rx) = mpsc::unbounded_channel();
  let (b_tx, b_rx) = mpsc::unbounded_channel();

  let left = Port {
    outbox: Outbox {
      sender: a_tx,
      _marker: PhantomData,
    },
    inbox: Inbox {
      receiver: b_rx,
      _marker: PhantomData,
    },
  };
  let right = Port {
    outbox: Outbox {
      sender: b_tx,
      _marker: PhantomData,
    },
    inbox: Inbox {
      receiver: a_rx,
      _marker: PhantomData,
    },
  };

  (left, right)
}
