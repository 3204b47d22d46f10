//! Pending-call table for trigger requests.
//!
//! Every dispatched call gets a fresh correlation id and a oneshot slot in the
//! table. A response settles exactly the slot it names; a disconnect settles
//! all of them with a failure.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{TriggerCall, TriggerError, TriggerOutcome, TriggerRequest, TriggerResponse};

/// Outbound side of the trigger protocol.
pub trait TriggerTransport: Send + Sync {
  /// Hand a request to the host. Must not wait for the response.
  fn send(&self, request: TriggerRequest) -> Result<(), TriggerError>;
}

#[derive(Default)]
struct Table {
  pending: HashMap<String, oneshot::Sender<TriggerOutcome>>,
  /// Set once the channel is gone.
  closed: Option<String>,
}

pub struct TriggerDispatcher {
  transport: Box<dyn TriggerTransport>,
  table: Mutex<Table>,
}

impl TriggerDispatcher {
  pub fn new(transport: impl TriggerTransport + 'static) -> Self {
    Self {
      transport: Box::new(transport),
      table: Mutex::new(Table::default()),
    }
  }

  fn table(&self) -> MutexGuard<'_, Table> {
    self
      .table
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Register a call and send its request.
  ///
  /// The returned future resolves with the host's outcome, or with a failure
  /// if the dispatcher disconnects first.
  #[instrument(name = "trigger_dispatch", skip(self, call), fields(capability = %call.capability))]
  pub fn dispatch(&self, run_id: &str, call: TriggerCall) -> Result<PendingTrigger, TriggerError> {
    let correlation_id = Uuid::new_v4().to_string();
    let (sender, receiver) = oneshot::channel();

    {
      let mut table = self.table();
      if let Some(reason) = &table.closed {
        return Err(TriggerError::Disconnected {
          reason: reason.clone(),
        });
      }
      table.pending.insert(correlation_id.clone(), sender);
    }

    let request = TriggerRequest {
      run_id: run_id.to_string(),
      correlation_id: correlation_id.clone(),
      capability: call.capability,
      arguments: call.arguments,
    };
    if let Err(err) = self.transport.send(request) {
      self.table().pending.remove(&correlation_id);
      return Err(err);
    }

    debug!(correlation_id = %correlation_id, "trigger request sent");
    Ok(PendingTrigger {
      correlation_id,
      receiver,
    })
  }

  /// Settle the call named by `response`.
  pub fn complete(&self, response: TriggerResponse) -> Result<(), TriggerError> {
    let sender = self.table().pending.remove(&response.correlation_id);
    let Some(sender) = sender else {
      warn!(
        correlation_id = %response.correlation_id,
        "response for unknown trigger call"
      );
      return Err(TriggerError::UnknownCorrelation {
        correlation_id: response.correlation_id,
      });
    };
    // the waiting side may have been dropped with its run
    let _ = sender.send(response.outcome);
    Ok(())
  }

  /// Reject every outstanding call with `reason` and refuse new ones.
  ///
  /// Calls are rejected in correlation id order. Returns how many were
  /// rejected.
  pub fn disconnect(&self, reason: &str) -> usize {
    let mut drained: Vec<_> = {
      let mut table = self.table();
      table.closed.get_or_insert_with(|| reason.to_string());
      table.pending.drain().collect()
    };
    drained.sort_by(|a, b| a.0.cmp(&b.0));

    let count = drained.len();
    for (_, sender) in drained {
      let _ = sender.send(TriggerOutcome::failure(reason));
    }
    if count > 0 {
      warn!(rejected = count, reason, "trigger dispatcher disconnected");
    }
    count
  }

  pub fn pending_count(&self) -> usize {
    self.table().pending.len()
  }

  pub fn is_pending(&self, correlation_id: &str) -> bool {
    self.table().pending.contains_key(correlation_id)
  }

  pub fn is_closed(&self) -> bool {
    self.table().closed.is_some()
  }
}

/// Future for one dispatched call.
#[derive(Debug)]
pub struct PendingTrigger {
  correlation_id: String,
  receiver: oneshot::Receiver<TriggerOutcome>,
}

impl PendingTrigger {
  pub fn correlation_id(&self) -> &str {
    &self.correlation_id
  }
}

impl Future for PendingTrigger {
  type Output = TriggerOutcome;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    Pin::new(&mut self.get_mut().receiver)
      .poll(cx)
      .map(|outcome| outcome.unwrap_or_else(|_| TriggerOutcome::failure("trigger dispatcher dropped")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Capability;
  use serde_json::json;
  use std::sync::Arc;

  #[derive(Clone, Default)]
  struct Recording(Arc<Mutex<Vec<TriggerRequest>>>);

  impl TriggerTransport for Recording {
    fn send(&self, request: TriggerRequest) -> Result<(), TriggerError> {
      self.0.lock().unwrap().push(request);
      Ok(())
    }
  }

  struct Broken;

  impl TriggerTransport for Broken {
    fn send(&self, _request: TriggerRequest) -> Result<(), TriggerError> {
      Err(TriggerError::Transport {
        message: "closed".to_string(),
      })
    }
  }

  #[tokio::test]
  async fn test_failed_send_leaves_nothing_pending() {
    let dispatcher = TriggerDispatcher::new(Broken);
    let result = dispatcher.dispatch("run-1", TriggerCall::new(Capability::ShowAlert, vec![]));
    assert!(matches!(result, Err(TriggerError::Transport { .. })));
    assert_eq!(dispatcher.pending_count(), 0);
  }

  #[tokio::test]
  async fn test_request_carries_call() {
    let transport = Recording::default();
    let dispatcher = TriggerDispatcher::new(transport.clone());
    let pending = dispatcher
      .dispatch("run-1", TriggerCall::new(Capability::StoreValue, vec![json!("k"), json!(1)]))
      .unwrap();

    let sent = transport.0.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].run_id, "run-1");
    assert_eq!(sent[0].correlation_id, pending.correlation_id());
    assert_eq!(sent[0].arguments, vec![json!("k"), json!(1)]);
  }
}
