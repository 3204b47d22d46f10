use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bindery_classifier::classify;
use bindery_config::Config;
use bindery_host::{ChannelLogSink, Fixture, Host, LocalActions};
use bindery_host_log::EventType;
use bindery_sandbox::{EvalRequest, RunResult};
use bindery_script::Binding;

/// Bindery - evaluate bindings and run their triggers in an isolate
#[derive(Parser)]
#[command(name = "bindery")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the config file (default: ~/.bindery/config.json when present)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Print how a binding would be edited
  Classify {
    /// File holding the binding text
    binding_file: PathBuf,
  },

  /// Evaluate a binding against a data snapshot
  Eval {
    /// File holding the binding text
    binding_file: PathBuf,

    /// JSON object of bound identifiers
    #[arg(long)]
    data: Option<PathBuf>,

    /// JSON object mapping action names to `{"data": ...}` or `{"error": "..."}`
    #[arg(long)]
    fixtures: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Kind::Data)]
    kind: Kind,

    /// Entity that owns the binding
    #[arg(long, default_value = "Widget1")]
    entity: String,

    /// Property the binding drives
    #[arg(long, default_value = "value")]
    property: String,
  },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
  Data,
  Trigger,
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(std::io::stderr)
    .init();

  match cli.command {
    Some(Commands::Classify { binding_file }) => {
      run_classify(&binding_file)?;
      Ok(ExitCode::SUCCESS)
    }
    Some(Commands::Eval {
      binding_file,
      data,
      fixtures,
      kind,
      entity,
      property,
    }) => {
      let config = load_config(cli.config.as_deref())?;
      let binding = Binding::new(read_text(&binding_file)?).bound_to(entity, property);
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async {
        run_eval(config, binding, data.as_deref(), fixtures.as_deref(), kind).await
      })
    }
    None => {
      println!("bindery - use --help to see available commands");
      Ok(ExitCode::SUCCESS)
    }
  }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
  match path {
    Some(path) => {
      Config::load(path).with_context(|| format!("failed to load config: {}", path.display()))
    }
    None => match dirs::home_dir() {
      Some(home) => {
        let path = home.join(".bindery").join("config.json");
        Config::load_or_default(&path)
          .with_context(|| format!("failed to load config: {}", path.display()))
      }
      None => Ok(Config::default()),
    },
  }
}

fn read_text(path: &Path) -> Result<String> {
  std::fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
  let content = read_text(path)?;
  serde_json::from_str(&content).with_context(|| format!("failed to parse JSON file: {}", path.display()))
}

fn run_classify(binding_file: &Path) -> Result<()> {
  let text = read_text(binding_file)?;
  let classification = classify(&text);
  info!(?classification, "binding classified");
  let output = serde_json::json!({
    "classification": classification,
    "selectorEnabled": classification.selector_enabled(),
  });
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

async fn run_eval(
  config: Config,
  binding: Binding,
  data: Option<&Path>,
  fixtures: Option<&Path>,
  kind: Kind,
) -> Result<ExitCode> {
  let snapshot: serde_json::Value = match data {
    Some(path) => read_json(path)?,
    None => serde_json::json!({}),
  };
  let fixtures: HashMap<String, Fixture> = match fixtures {
    Some(path) => read_json(path)?,
    None => HashMap::new(),
  };

  let (ticks, _) = mpsc::unbounded_channel();
  let actions = Arc::new(LocalActions::new(fixtures, ticks));
  let (logs, mut batches) = mpsc::unbounded_channel();
  let host = Host::start(&config, actions.clone(), Arc::new(ChannelLogSink::new(logs)))
    .context("failed to start isolate")?;

  let run_id = uuid::Uuid::new_v4().to_string();
  info!(run_id = %run_id, entity = %binding.entity_id, "evaluating binding");
  let mut request = EvalRequest::new(run_id, binding, snapshot);
  if let Kind::Trigger = kind {
    request = request.trigger(Some(EventType::OnClick), None);
  }
  let result = host.evaluate(request).await.context("evaluation failed")?;
  match &result {
    RunResult::Success { .. } => info!("binding evaluated"),
    RunResult::Failure { reason } => warn!(reason = %reason, "binding failed"),
  }
  actions.shutdown();
  host.shutdown().await;

  while let Ok(batch) = batches.try_recv() {
    for entry in batch.logs {
      eprintln!("[{} {}] {}", entry.timestamp, entry.method.as_str(), serde_json::to_string(&entry.data)?);
    }
  }
  for alert in actions.alerts() {
    eprintln!("alert: {}", alert.message);
  }

  println!("{}", serde_json::to_string_pretty(&result)?);
  Ok(match result {
    RunResult::Success { .. } => ExitCode::SUCCESS,
    RunResult::Failure { .. } => ExitCode::FAILURE,
  })
}
