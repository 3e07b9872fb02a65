// # ecssd - Service Discovery Daemon
//
// The ecssd daemon is a thin integration layer. It is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the Docker runtime, the DNS provider and the handler registry
// 4. Starting the event router and terminating on fatal errors
//
// All reconciliation logic lives in ecssd-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Runtime
// - `ECSSD_DOCKER_HOST`: Docker endpoint (default `unix:///var/run/docker.sock`)
//
// ### DNS Provider
// - `ECSSD_PROVIDER_TYPE`: Provider type (cloudflare, memory)
// - `ECSSD_PROVIDER_API_TOKEN`: API token (cloudflare)
// - `ECSSD_PROVIDER_ZONE_ID`: Zone ID (cloudflare)
// - `ECSSD_MODE`: Set to `dry-run` to skip DNS mutations
//
// ### Records
// - `ECSSD_DOMAIN_SUFFIX`: Zone suffix (default `servicediscovery.internal`)
// - `ECSSD_HOST_NAME`: SRV target host (default: OS hostname)
// - `ECSSD_HOST_SUFFIX`: Suffix of the target host (default `compute.internal`)
// - `ECSSD_SERVICE_LABEL`: Container label naming the service
// - `ECSSD_SRV_PROTOCOL`: Names records `_<service>._<protocol>.<suffix>`;
//   `none` keeps `<service>.<suffix>` (default `tcp` for cloudflare, which
//   rejects SRV names without the prefix, otherwise `none`)
//
// ### Router
// - `ECSSD_WORKER_POOL_SIZE`: Concurrent reconciliations (default 5)
// - `ECSSD_EVENT_BUFFER_SIZE`: Inbound event buffer (default 5)
// - `ECSSD_WORKER_TIMEOUT_SECS`: Worker wait before logging (default 60)
//
// ### Backoff
// - `ECSSD_RETRY_INITIAL_SECS`: First wait (default 1)
// - `ECSSD_RETRY_STEP_SECS`: Wait increment (default 2)
// - `ECSSD_RETRY_THRESHOLD_SECS`: Wait above which a failure is fatal (default 8)
//
// ## Example
//
// ```bash
// export ECSSD_PROVIDER_TYPE=cloudflare
// export ECSSD_PROVIDER_API_TOKEN=your_token
// export ECSSD_PROVIDER_ZONE_ID=023e105f4ecef8ad9ca31a8372d0c353
// export ECSSD_DOMAIN_SUFFIX=servicediscovery.internal
//
// ecssd
// ```

use anyhow::{Context, Result};
use ecssd_core::config::{AgentConfig, ProviderConfig};
use ecssd_core::handlers::{HandlerRegistry, ReconcileContext};
use ecssd_core::traits::{ContainerInspector, DnsProvider, EventSource};
use ecssd_core::{EventRouter, ProviderRegistry, RouterEvent};
use ecssd_runtime_docker::DockerRuntime;
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (including unrecoverable DNS failures)
#[derive(Debug, Clone, Copy)]
enum EcssdExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error or fatal reconciliation failure
    RuntimeError = 2,
}

impl From<EcssdExitCode> for ExitCode {
    fn from(code: EcssdExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
struct Config {
    agent: AgentConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut agent = AgentConfig::default();

        if let Some(host) = var("ECSSD_DOCKER_HOST") {
            agent.runtime.docker_host = host;
        }

        let dry_run = var("ECSSD_MODE").is_some_and(|mode| mode.eq_ignore_ascii_case("dry-run"));
        let provider_type = var("ECSSD_PROVIDER_TYPE").unwrap_or_else(|| "cloudflare".to_string());
        agent.provider = match provider_type.as_str() {
            "cloudflare" => ProviderConfig::Cloudflare {
                api_token: var("ECSSD_PROVIDER_API_TOKEN").context(
                    "ECSSD_PROVIDER_API_TOKEN is required. \
                    Set it via: export ECSSD_PROVIDER_API_TOKEN=your_token",
                )?,
                zone_id: var("ECSSD_PROVIDER_ZONE_ID").context(
                    "ECSSD_PROVIDER_ZONE_ID is required when ECSSD_PROVIDER_TYPE=cloudflare",
                )?,
                dry_run,
            },
            "memory" => ProviderConfig::Memory,
            other => anyhow::bail!(
                "ECSSD_PROVIDER_TYPE '{}' is not supported. \
                Supported providers: cloudflare, memory",
                other
            ),
        };

        if let Some(suffix) = var("ECSSD_DOMAIN_SUFFIX") {
            agent.records.domain_suffix = suffix;
        }
        agent.records.host_name = match var("ECSSD_HOST_NAME") {
            Some(name) => name,
            None => os_hostname().context("ECSSD_HOST_NAME is not set and the OS hostname is unavailable")?,
        };
        if let Some(suffix) = lookup("ECSSD_HOST_SUFFIX") {
            // An explicitly empty suffix uses the host name as is
            agent.records.host_suffix = suffix.trim().to_string();
        }
        if let Some(label) = var("ECSSD_SERVICE_LABEL") {
            agent.records.service_label = label;
        }
        agent.records.srv_protocol = match var("ECSSD_SRV_PROTOCOL") {
            Some(protocol) if protocol.eq_ignore_ascii_case("none") => None,
            Some(protocol) => Some(protocol.to_lowercase()),
            None if matches!(agent.provider, ProviderConfig::Cloudflare { .. }) => Some("tcp".to_string()),
            None => None,
        };

        parse_into(&var, "ECSSD_WORKER_POOL_SIZE", &mut agent.router.worker_pool_size)?;
        parse_into(&var, "ECSSD_EVENT_BUFFER_SIZE", &mut agent.router.event_buffer_size)?;
        parse_into(&var, "ECSSD_WORKER_TIMEOUT_SECS", &mut agent.router.worker_timeout_secs)?;
        parse_into(&var, "ECSSD_RETRY_INITIAL_SECS", &mut agent.retry.initial_backoff_secs)?;
        parse_into(&var, "ECSSD_RETRY_STEP_SECS", &mut agent.retry.backoff_step_secs)?;
        parse_into(&var, "ECSSD_RETRY_THRESHOLD_SECS", &mut agent.retry.fatal_threshold_secs)?;

        Ok(Self {
            agent,
            log_level: var("ECSSD_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.agent.validate()?;
        self.log_level()?;
        Ok(())
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "ECSSD_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

/// Overwrite `target` with the parsed value of `key`, if set
fn parse_into<T>(var: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = var(key) {
        *target = raw
            .parse()
            .with_context(|| format!("{} must be a non-negative integer. Got: '{}'", key, raw))?;
    }
    Ok(())
}

/// Host name of this machine
fn os_hostname() -> Option<String> {
    env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/proc/sys/kernel/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return EcssdExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return EcssdExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = config.log_level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return EcssdExitCode::ConfigError.into();
    }

    info!("Starting ecssd daemon");
    info!(
        provider = config.agent.provider.type_name(),
        docker_host = %config.agent.runtime.docker_host,
        domain = %config.agent.records.domain_suffix,
        target = %config.agent.records.target_host(),
        "Configuration loaded"
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return EcssdExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config.agent).await {
            Ok(()) => EcssdExitCode::CleanShutdown,
            Err(DaemonError::Startup(e)) => {
                error!("Startup error: {:#}", e);
                EcssdExitCode::ConfigError
            }
            Err(DaemonError::Runtime(e)) => {
                error!("Daemon error: {:#}", e);
                EcssdExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Why the daemon stopped
enum DaemonError {
    /// Wiring or subscription failed before the router ran
    Startup(anyhow::Error),
    /// The router reported an unrecoverable error
    Runtime(anyhow::Error),
}

/// Run the daemon
async fn run_daemon(config: AgentConfig) -> std::result::Result<(), DaemonError> {
    let (router, mut events) = build_router(&config).map_err(DaemonError::Startup)?;

    router
        .start()
        .await
        .context("Failed to subscribe to container events")
        .map_err(DaemonError::Startup)?;
    info!("Ready to track container lifecycle events");

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            received = &mut shutdown => {
                match received {
                    Ok(name) => info!("Received shutdown signal: {}", name),
                    Err(e) => warn!("Signal handling failed, shutting down: {:#}", e),
                }
                break Ok(());
            }
            event = events.recv() => match event {
                Some(RouterEvent::Fatal { event_id, status, handler, error }) => {
                    error!(
                        event_id = %event_id,
                        status = %status,
                        handler,
                        "Unrecoverable error, terminating"
                    );
                    break Err(DaemonError::Runtime(anyhow::anyhow!(
                        "{} failed for '{}' event of {}: {}",
                        handler, status, event_id, error
                    )));
                }
                Some(event) => log_router_event(&event),
                None => {
                    break Err(DaemonError::Runtime(anyhow::anyhow!("Router event channel closed")));
                }
            },
        }
    };

    info!("Shutting down daemon");
    if let Err(e) = router.stop().await {
        warn!("Failed to unsubscribe from container events: {}", e);
    }
    outcome
}

/// Wire the runtime, provider and handlers into a router
fn build_router(config: &AgentConfig) -> Result<(EventRouter, tokio::sync::mpsc::Receiver<RouterEvent>)> {
    let registry = ProviderRegistry::with_builtin();

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare provider");
        ecssd_provider_cloudflare::register(&registry);
    }
    debug!(providers = ?registry.list_providers(), "DNS providers available");

    let provider: Arc<dyn DnsProvider> = Arc::from(
        registry
            .create_provider(&config.provider)
            .context("Failed to create DNS provider")?,
    );
    if matches!(config.provider, ProviderConfig::Memory) {
        warn!("Using in-memory DNS provider - records are not published anywhere");
    }

    let runtime = Arc::new(DockerRuntime::new(&config.runtime).context("Failed to create Docker client")?);
    let inspector: Arc<dyn ContainerInspector> = runtime.clone();
    let source: Arc<dyn EventSource> = runtime;

    let context = Arc::new(ReconcileContext::new(
        inspector,
        provider,
        config.records.clone(),
        config.retry.clone(),
    ));
    let handlers = HandlerRegistry::standard(context);
    debug!(?handlers, "Handler registry built");

    Ok(EventRouter::new(source, handlers, &config.router)?)
}

fn log_router_event(event: &RouterEvent) {
    match event {
        RouterEvent::Started { pool_size } => info!(pool_size, "Event router started"),
        RouterEvent::Dispatched { event_id, status } => {
            debug!(event_id = %event_id, status = %status, "Event dispatched")
        }
        RouterEvent::WorkerTimeout { event_id, waited } => {
            debug!(event_id = %event_id, ?waited, "Still waiting for a worker")
        }
        RouterEvent::HandlerFailed { event_id, handler, error, .. } => {
            warn!(event_id = %event_id, handler, error = %error, "Event handling failed")
        }
        RouterEvent::Completed { event_id, status, handlers } => {
            debug!(event_id = %event_id, status = %status, handlers, "Event handled")
        }
        RouterEvent::Fatal { .. } => {}
        RouterEvent::Stopped => info!("Event router stopped"),
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
