//! The privileged side of the engine.
//!
//! A [`Host`] owns one isolate thread and a message pump task on the
//! caller's tokio runtime. The pump performs trigger calls through the
//! [`ActionRunner`], hands log batches to the [`LogSink`] and routes run
//! outcomes back to the callers of [`Host::evaluate`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bindery_channel::{Envelope, Inbox, Outbox, duplex};
use bindery_config::Config;
use bindery_sandbox::{EvalOutcome, EvalRequest, HostAction, Isolate, IsolateHandle, RunResult, WorkerAction};
use bindery_trigger::{TriggerOutcome, TriggerRequest, TriggerResponse};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::HostError;
use crate::runner::{ActionRunner, TriggerContext};
use crate::sink::LogSink;

/// Rejection reason for trigger calls of runs whose entity was removed or
/// whose caller stopped waiting.
pub const SUPERSEDED: &str = "superseded";

struct ActiveRun {
  entity_id: String,
  superseded: bool,
  reply: oneshot::Sender<RunResult>,
}

#[derive(Default)]
struct RunTable {
  active: HashMap<String, ActiveRun>,
  closed: bool,
}

struct Shared {
  /// `None` once the host has shut down.
  outbox: Mutex<Option<Outbox<HostAction>>>,
  runs: Mutex<RunTable>,
  runner: Arc<dyn ActionRunner>,
  sink: Arc<dyn LogSink>,
}

impl Shared {
  fn runs(&self) -> MutexGuard<'_, RunTable> {
    self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn outbox(&self) -> MutexGuard<'_, Option<Outbox<HostAction>>> {
    self.outbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn send(&self, envelope: Envelope<HostAction>) -> Result<(), HostError> {
    match self.outbox().as_ref() {
      Some(outbox) => Ok(outbox.send(&envelope)?),
      None => Err(HostError::Disconnected),
    }
  }

  /// Entity of an active run and whether it has been superseded.
  fn run_state(&self, run_id: &str) -> Option<(String, bool)> {
    self
      .runs()
      .active
      .get(run_id)
      .map(|run| (run.entity_id.clone(), run.superseded))
  }

  fn finish(&self, outcome: EvalOutcome) {
    let Some(run) = self.runs().active.remove(&outcome.run_id) else {
      warn!(run_id = %outcome.run_id, "outcome for unknown run");
      return;
    };
    // the caller may have given up waiting
    let _ = run.reply.send(outcome.result);
  }

  /// Drop every waiting caller and refuse new runs.
  fn close(&self) -> usize {
    let mut runs = self.runs();
    runs.closed = true;
    let dropped = runs.active.len();
    runs.active.clear();
    dropped
  }
}

pub struct Host {
  shared: Arc<Shared>,
  cancel: CancellationToken,
  pump: Option<JoinHandle<()>>,
  isolate: Option<IsolateHandle>,
  timeout: Option<Duration>,
}

impl Host {
  /// Start an isolate and the pump serving it.
  ///
  /// Must be called from inside a tokio runtime.
  pub fn start(config: &Config, runner: Arc<dyn ActionRunner>, sink: Arc<dyn LogSink>) -> Result<Self, HostError> {
    let (port, isolate_port) = duplex::<HostAction, WorkerAction>();
    let isolate = Isolate::spawn(config, isolate_port)?;
    let (outbox, inbox) = port.split();

    let shared = Arc::new(Shared {
      outbox: Mutex::new(Some(outbox)),
      runs: Mutex::new(RunTable::default()),
      runner,
      sink,
    });
    let cancel = CancellationToken::new();
    let pump = tokio::spawn(pump(shared.clone(), inbox, cancel.clone()));
    info!(thread = %config.sandbox.thread_name, "host started");

    Ok(Self {
      shared,
      cancel,
      pump: Some(pump),
      isolate: Some(isolate),
      timeout: config.host.eval_timeout(),
    })
  }

  /// Evaluate one binding and wait for its outcome.
  #[instrument(
    name = "host_evaluate",
    skip_all,
    fields(run_id = %request.run_id, entity_id = %request.binding.entity_id)
  )]
  pub async fn evaluate(&self, request: EvalRequest) -> Result<RunResult, HostError> {
    let run_id = request.run_id.clone();
    let (reply, outcome) = oneshot::channel();
    {
      let mut runs = self.shared.runs();
      if runs.closed {
        return Err(HostError::Disconnected);
      }
      runs.active.insert(
        run_id.clone(),
        ActiveRun {
          entity_id: request.binding.entity_id.clone(),
          superseded: false,
          reply,
        },
      );
    }

    if let Err(err) = self.shared.send(Envelope::request(HostAction::EvalBinding(request))) {
      self.shared.runs().active.remove(&run_id);
      return Err(err);
    }
    debug!("binding sent to isolate");

    let result = match self.timeout {
      Some(limit) => match tokio::time::timeout(limit, outcome).await {
        Ok(received) => received,
        Err(_) => {
          self.shared.runs().active.remove(&run_id);
          warn!(timeout_ms = limit.as_millis() as u64, "run timed out");
          return Err(HostError::Timeout { run_id });
        }
      },
      None => outcome.await,
    };
    result.map_err(|_| HostError::Disconnected)
  }

  /// Stop the running bindings of an entity: every trigger call they make
  /// from now on is rejected with [`SUPERSEDED`]. Returns how many runs were
  /// affected.
  pub fn remove_entity(&self, entity_id: &str) -> usize {
    let mut runs = self.shared.runs();
    let mut superseded = 0;
    for run in runs.active.values_mut() {
      if run.entity_id == entity_id && !run.superseded {
        run.superseded = true;
        superseded += 1;
      }
    }
    if superseded > 0 {
      warn!(entity_id, runs = superseded, "runs superseded");
    }
    superseded
  }

  /// Number of runs waiting for an outcome.
  pub fn active_runs(&self) -> usize {
    self.shared.runs().active.len()
  }

  /// Close the channel, stop the pump and wait for the isolate thread.
  pub async fn shutdown(mut self) {
    self.disconnect();
    if let Some(pump) = self.pump.take()
      && let Err(err) = pump.await
    {
      warn!(error = %err, "host pump failed");
    }
    self.shared.close();

    let Some(isolate) = self.isolate.take() else {
      return;
    };
    match tokio::task::spawn_blocking(move || isolate.join()).await {
      Ok(Ok(())) => info!("host stopped"),
      Ok(Err(_)) => warn!("isolate thread panicked"),
      Err(err) => warn!(error = %err, "could not join isolate thread"),
    }
  }

  /// Close the channel to the isolate. Waiting callers get
  /// [`HostError::Disconnected`], and so does every later call.
  pub fn disconnect(&self) {
    self.shared.outbox().take();
    self.cancel.cancel();
  }
}

impl Drop for Host {
  fn drop(&mut self) {
    self.disconnect();
  }
}

async fn pump(shared: Arc<Shared>, mut inbox: Inbox<WorkerAction>, cancel: CancellationToken) {
  loop {
    let message = tokio::select! {
      _ = cancel.cancelled() => break,
      message = inbox.recv() => message,
    };
    let Some(message) = message else {
      break;
    };
    let envelope = match message {
      Ok(envelope) => envelope,
      Err(err) => {
        warn!(error = %err, "dropping undecodable message");
        continue;
      }
    };

    match envelope.body {
      WorkerAction::ExecuteTrigger(request) => {
        tokio::spawn(execute(shared.clone(), request));
      }
      WorkerAction::ProcessLogs(batch) => {
        debug!(entries = batch.logs.len(), "log batch received");
        shared.sink.process(batch);
      }
      WorkerAction::EvalResult(outcome) => shared.finish(outcome),
    }
  }

  let dropped = shared.close();
  info!(dropped, "host pump stopped");
}

/// Perform one trigger call and answer it. Every request gets a response.
#[instrument(
  name = "host_execute",
  skip_all,
  fields(run_id = %request.run_id, correlation_id = %request.correlation_id, capability = %request.capability)
)]
async fn execute(shared: Arc<Shared>, request: TriggerRequest) {
  let TriggerRequest {
    run_id,
    correlation_id,
    capability,
    arguments,
  } = request;

  // Runs that timed out or were removed are no longer in the table.
  let outcome = match shared.run_state(&run_id) {
    Some((entity_id, false)) => {
      let context = TriggerContext { run_id, entity_id };
      shared.runner.execute(context, capability, arguments).await
    }
    Some((_, true)) | None => {
      warn!("rejecting call from a run that is no longer active");
      TriggerOutcome::failure(SUPERSEDED)
    }
  };

  let response = TriggerResponse {
    correlation_id,
    outcome,
  };
  if let Err(err) = shared.send(Envelope::response(HostAction::TriggerResponse(response))) {
    warn!(error = %err, "could not deliver trigger response");
  }
}
