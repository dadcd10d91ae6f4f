//! Collector assembly and lifecycle management.
//!
//! The [`Orchestrator`] builds the core, loads configuration, registers
//! plugins from both the configuration file and CLI flags, installs
//! pipelines and the routing table, and drives the run loop until a
//! shutdown signal arrives.
//!
//! # Assembly order
//!
//! 1. Core construction and `initialize()` (components in dependency order)
//! 2. Configuration file load into the core config store
//! 3. Plugin construction via the factory (config specs + CLI synthesis)
//! 4. Pipeline chains and routing table from the `pipelines` section
//! 5. `start()` / `run_once()` depending on `--one-shot`

use std::sync::Arc;

use anyhow::Result;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use signalpost_core::{Component, Core, PluginType, TelemetryType};
use signalpost_plugins::PluginFactory;

use crate::api;
use crate::cli::CollectorCli;
use crate::metrics_server;

/// Default parser patterns used when no parser is configured.
const DEFAULT_PARSER_PATTERNS: [&str; 2] = [
    r"^(?P<timestamp>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.?\d*Z) (?P<level>[A-Z]+) (?P<message>.*)$",
    r"^(?P<message>.*)$",
];

/// Control API settings resolved from CLI flags.
struct ApiSettings {
    host: String,
    port: u16,
}

/// The collector orchestrator.
pub struct Orchestrator {
    core: Arc<Core>,
    one_shot: bool,
    api: Option<ApiSettings>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("one_shot", &self.one_shot)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Build a fully wired collector from CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if core initialization fails, the configuration
    /// file cannot be loaded, or plugin registration fails.
    pub async fn build(cli: &CollectorCli) -> Result<Self> {
        let core = Core::new();
        core.initialize()
            .await
            .map_err(|e| anyhow::anyhow!("failed to initialize core: {e}"))?;

        if let Some(path) = &cli.config {
            core.config_store()
                .load(path)
                .await
                .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
            tracing::info!(path = %path.display(), "configuration loaded");
        }

        let root = core.config_store().get("", Value::Null);
        metrics_server::install_from_config(&root)?;

        register_plugins(&core, cli, &root)?;
        configure_pipelines(&core, &root)?;

        tracing::info!(
            plugins = core.registry().count(),
            "orchestrator initialized"
        );

        Ok(Self {
            core,
            one_shot: cli.one_shot,
            api: cli.api.then(|| ApiSettings {
                host: cli.api_host.clone(),
                port: cli.api_port,
            }),
        })
    }

    /// Access the underlying core (for tests and the API layer).
    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// Run the collector until shutdown.
    ///
    /// In one-shot mode this performs a single collect/flush pass and
    /// returns. Otherwise it starts the core workers, optionally serves
    /// the control API, and blocks until SIGTERM/SIGINT.
    pub async fn run(&self) -> Result<()> {
        if self.one_shot {
            tracing::info!("running in one-shot mode");
            return self
                .core
                .run_once()
                .await
                .map_err(|e| anyhow::anyhow!("one-shot run failed: {e}"));
        }

        self.core
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start core: {e}"))?;

        record_daemon_metrics(self.core.registry().count());
        let uptime_cancel = CancellationToken::new();
        let uptime_task = spawn_uptime_updater(uptime_cancel.clone());

        let api_cancel = CancellationToken::new();
        let api_task = match &self.api {
            Some(settings) => {
                let core = Arc::clone(&self.core);
                let addr = format!("{}:{}", settings.host, settings.port);
                let cancel = api_cancel.clone();
                Some(tokio::spawn(async move {
                    if let Err(e) = api::serve(core, &addr, cancel).await {
                        tracing::error!(error = %e, "control API server failed");
                    }
                }))
            }
            None => None,
        };

        tracing::info!("collector running, waiting for shutdown signal");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal, "shutdown signal received");

        api_cancel.cancel();
        if let Some(task) = api_task {
            let _ = task.await;
        }
        uptime_cancel.cancel();
        let _ = uptime_task.await;

        self.core
            .stop()
            .await
            .map_err(|e| anyhow::anyhow!("failed to stop core: {e}"))?;
        tracing::info!("collector shut down");
        Ok(())
    }
}

/// Register plugins from the configuration file and CLI flags.
///
/// Configuration specs come first; CLI flags synthesize plugins that
/// are not already present (the way explicit flags worked in the
/// original CLI): `--input-file` adds a file input, `--stdout` a
/// stdout output, `--output-dir` a file output. A parser and a stdout
/// output are added as defaults when none are configured so that a
/// flag-only invocation still produces a working flow.
fn register_plugins(core: &Arc<Core>, cli: &CollectorCli, root: &Value) -> Result<()> {
    let factory = PluginFactory::with_standard_plugins();

    let mut handles = factory
        .build_from_config(root)
        .map_err(|e| anyhow::anyhow!("failed to build plugins from config: {e}"))?;

    let has = |handles: &[signalpost_core::PluginHandle], id: &str| {
        handles.iter().any(|h| h.id() == id)
    };

    if let Some(input_file) = &cli.input_file {
        if !has(&handles, "file_input") {
            let handle = factory.create(PluginType::Input, "file", "file_input")?;
            handle.as_plugin().configure(json!({
                "paths": [input_file.display().to_string()],
            }))?;
            handles.push(handle);
        }
    }

    if let Some(output_dir) = &cli.output_dir {
        if !has(&handles, "file_output") {
            let handle = factory.create(PluginType::Output, "file", "file_output")?;
            handle.as_plugin().configure(json!({
                "output_dir": output_dir.display().to_string(),
            }))?;
            handles.push(handle);
        }
    }

    let no_outputs = !handles
        .iter()
        .any(|h| h.plugin_type() == PluginType::Output);
    if (cli.stdout || no_outputs) && !has(&handles, "stdout_output") {
        let handle = factory.create(PluginType::Output, "stdout", "stdout_output")?;
        handle.as_plugin().configure(json!({
            "format": if cli.json_format { "json" } else { "text" },
            "colorize": cli.colorize,
        }))?;
        handles.push(handle);
    }

    let no_processors = !handles
        .iter()
        .any(|h| h.plugin_type() == PluginType::Processor);
    if no_processors {
        let handle = factory.create(PluginType::Processor, "parser", "log_parser")?;
        handle.as_plugin().configure(json!({
            "patterns": DEFAULT_PARSER_PATTERNS,
        }))?;
        handles.push(handle);
    }

    for handle in handles {
        let id = handle.id().to_owned();
        core.register_plugin(handle)
            .map_err(|e| anyhow::anyhow!("failed to register plugin '{id}': {e}"))?;
    }
    Ok(())
}

/// Install pipeline chains and the routing table from the `pipelines`
/// configuration section.
///
/// Unknown telemetry names are ignored. When no section is present, a
/// default `logs` pipeline through `log_parser` is installed.
fn configure_pipelines(core: &Arc<Core>, root: &Value) -> Result<()> {
    let Some(section) = root.get("pipelines").and_then(Value::as_object) else {
        if core.registry().get("log_parser").is_some() {
            tracing::info!("no pipeline configuration, installing default logs pipeline");
            core.pipeline()
                .create_pipeline(TelemetryType::Log, &["log_parser".to_owned()])
                .map_err(|e| anyhow::anyhow!("failed to create default pipeline: {e}"))?;
        }
        return Ok(());
    };

    for (name, config) in section {
        let Some(telemetry_type) = TelemetryType::from_config_name(name) else {
            tracing::warn!(name, "unknown telemetry name in pipelines section, ignoring");
            continue;
        };

        let processors = string_list(config.get("processors"));
        if !processors.is_empty() {
            core.pipeline()
                .create_pipeline(telemetry_type, &processors)
                .map_err(|e| anyhow::anyhow!("failed to create {name} pipeline: {e}"))?;
            tracing::info!(
                pipeline = name,
                processors = processors.len(),
                "pipeline configured"
            );
        }

        let outputs = string_list(config.get("outputs"));
        if !outputs.is_empty() {
            core.set_route(telemetry_type, outputs);
        }
    }

    Ok(())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

/// Record daemon-level metrics (build info, registered plugins).
fn record_daemon_metrics(plugin_count: usize) {
    use signalpost_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_PLUGINS_REGISTERED).set(plugin_count as f64);
}

/// Spawn a background task that periodically refreshes the uptime gauge.
fn spawn_uptime_updater(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    use signalpost_core::metrics as m;

    let start_time = std::time::Instant::now();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {e}"))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {e}"))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
