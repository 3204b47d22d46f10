//! The isolate thread.
//!
//! The isolate owns a current-thread runtime and a `LocalSet`; every run is a
//! local task on it. The only way in or out is the channel port handed to
//! [`Isolate::spawn`].

use std::rc::Rc;
use std::sync::Arc;
use std::thread::JoinHandle;

use bindery_channel::{Envelope, Outbox, Port};
use bindery_config::Config;
use bindery_host_log::{FlushSink, LogBatch};
use bindery_trigger::{TriggerDispatcher, TriggerError, TriggerRequest, TriggerTransport};
use tokio::task::LocalSet;
use tracing::{debug, error, info, warn};

use crate::error::SandboxError;
use crate::protocol::{EvalOutcome, HostAction, WorkerAction};
use crate::sandbox::Sandbox;

/// Sends trigger requests to the host as `EXECUTE_TRIGGER` requests.
struct OutboxTransport(Outbox<WorkerAction>);

impl TriggerTransport for OutboxTransport {
  fn send(&self, request: TriggerRequest) -> Result<(), TriggerError> {
    self
      .0
      .send(&Envelope::request(WorkerAction::ExecuteTrigger(request)))
      .map_err(|err| TriggerError::Transport {
        message: err.to_string(),
      })
  }
}

/// Posts flushed log batches as `PROCESS_LOGS` notifications.
struct OutboxSink(Outbox<WorkerAction>);

impl FlushSink for OutboxSink {
  fn send(&self, batch: LogBatch) {
    let entries = batch.logs.len();
    if let Err(err) = self
      .0
      .send(&Envelope::default_message(WorkerAction::ProcessLogs(batch)))
    {
      warn!(error = %err, entries, "dropping log batch");
    }
  }
}

pub struct Isolate;

impl Isolate {
  /// Start the isolate thread serving `port`.
  ///
  /// The isolate runs until the host side of the channel is dropped.
  pub fn spawn(config: &Config, port: Port<WorkerAction, HostAction>) -> Result<IsolateHandle, SandboxError> {
    let config = config.clone();
    let thread = std::thread::Builder::new()
      .name(config.sandbox.thread_name.clone())
      .stack_size(config.sandbox.stack_size_bytes)
      .spawn(move || {
        if let Err(err) = run(config, port) {
          error!(error = %err, "isolate stopped");
        }
      })
      .map_err(|source| SandboxError::Spawn { source })?;

    Ok(IsolateHandle { thread })
  }
}

/// Handle to a running isolate thread.
pub struct IsolateHandle {
  thread: JoinHandle<()>,
}

impl IsolateHandle {
  pub fn is_finished(&self) -> bool {
    self.thread.is_finished()
  }

  /// Wait for the thread to exit. Blocks; call after the channel is closed.
  pub fn join(self) -> std::thread::Result<()> {
    self.thread.join()
  }
}

fn run(config: Config, port: Port<WorkerAction, HostAction>) -> Result<(), SandboxError> {
  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .map_err(|source| SandboxError::Runtime { source })?;
  LocalSet::new().block_on(&runtime, serve(config, port));
  Ok(())
}

async fn serve(config: Config, port: Port<WorkerAction, HostAction>) {
  let (outbox, mut inbox) = port.split();
  let dispatcher = Arc::new(TriggerDispatcher::new(OutboxTransport(outbox.clone())));
  let sandbox = Rc::new(Sandbox::new(&config, dispatcher.clone(), OutboxSink(outbox.clone())));
  info!("isolate ready");

  while let Some(message) = inbox.recv().await {
    let envelope = match message {
      Ok(envelope) => envelope,
      Err(err) => {
        warn!(error = %err, "dropping undecodable message");
        continue;
      }
    };
    match envelope.body {
      HostAction::EvalBinding(request) => {
        let sandbox = sandbox.clone();
        let outbox = outbox.clone();
        tokio::task::spawn_local(async move {
          let run_id = request.run_id.clone();
          let result = sandbox.evaluate(request).await;
          let reply = Envelope::response(WorkerAction::EvalResult(EvalOutcome {
            run_id: run_id.clone(),
            result,
          }));
          if let Err(err) = outbox.send(&reply) {
            warn!(run_id = %run_id, error = %err, "could not deliver run result");
          }
        });
      }
      HostAction::TriggerResponse(response) => {
        if let Err(err) = dispatcher.complete(response) {
          debug!(error = %err, "ignoring trigger response");
        }
      }
    }
  }

  let rejected = dispatcher.disconnect("channel closed");
  info!(rejected, "isolate channel closed");
}
