use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crony_core::{CronyConfig, WorkloadId};
use crony_notify::{HeartbeatReporter, HttpHeartbeatTransport, NotificationDispatcher};
use crony_runtime::{DockerRuntime, Runtime, WorkloadFilter};
use crony_scheduler::{CronScheduler, EventWatcher, JobExecutor, JobRegistry, PrometheusMetrics};
use tracing::{info, warn};

mod app;
mod http;
mod shutdown;

#[derive(Parser, Debug)]
#[command(name = "crony")]
#[command(version)]
#[command(about = "Runs labelled containers on cron schedules")]
struct Args {
    /// Path to the TOML config file (default: $CRONY_CONFIG, then ./crony.toml)
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crony=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    // config: --config > CRONY_CONFIG env > ./crony.toml
    let config_path = args.config.or_else(|| std::env::var("CRONY_CONFIG").ok());
    let config = CronyConfig::load(config_path.as_deref()).context("invalid configuration")?;

    // metrics sink is owned here and injected into the executor
    let metrics = Arc::new(PrometheusMetrics::new().context("can't register metrics")?);

    let runtime: Arc<dyn Runtime> = Arc::new(DockerRuntime::new(
        &config.runtime,
        config.default_policy(),
    ));

    let transport = HttpHeartbeatTransport::new(Duration::from_secs(config.heartbeat.timeout_secs))
        .context("can't build heartbeat client")?;
    let heartbeat = HeartbeatReporter::from_config(Arc::new(transport), &config.heartbeat);

    let dispatcher = match &config.mail {
        Some(mail) => NotificationDispatcher::from_config(mail).context("invalid mail settings")?,
        None => {
            info!("no [mail] section, outcome mails disabled");
            NotificationDispatcher::disabled()
        }
    };

    let scheduler = Arc::new(CronScheduler::new());
    let executor = JobExecutor::new(runtime.clone(), Arc::new(dispatcher), metrics.clone())
        .with_heartbeat(Arc::new(heartbeat));
    let registry = Arc::new(JobRegistry::new(scheduler.clone(), Arc::new(executor)));

    let shutdown = shutdown::install_shutdown_handler().context("can't install signal handlers")?;

    // watch before scanning so workloads created during the scan are not missed
    let watcher = EventWatcher::new(
        runtime.clone(),
        registry.clone(),
        Duration::from_secs(config.runtime.resubscribe_delay_secs),
    )
    .spawn(shutdown.clone());

    let workloads = runtime
        .list_schedulable(&WorkloadFilter::All)
        .await
        .context("can't list workloads from the runtime")?;
    let scanned: Vec<WorkloadId> = workloads.iter().map(|w| w.id.clone()).collect();
    let added = registry.sync(workloads);
    info!(jobs = added, "initial inventory scanned");

    // a destroy event handled before sync leaves a stale entry behind
    match runtime.list_schedulable(&WorkloadFilter::All).await {
        Ok(current) => {
            let gone = registry.forget_missing(&scanned, &current);
            if gone > 0 {
                info!(jobs = gone, "dropped workloads destroyed during the scan");
            }
        }
        Err(e) => warn!(error = %e, "can't re-list workloads, keeping the initial scan"),
    }

    let state = Arc::new(app::AppState::new(registry.clone(), metrics.clone()));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("crony listening on {}", addr);

    let server_shutdown = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    let stopped_early = tokio::select! {
        _ = shutdown.cancelled() => None,
        result = &mut server => Some(result),
    };
    shutdown.cancel();

    // triggers stop firing at once; the server drain shares the same deadline
    let grace = Duration::from_secs(config.shutdown.grace_secs);
    let (finished, drained) = shutdown::drain(&scheduler, grace, async move {
        if let Err(e) = watcher.await {
            warn!(error = %e, "event watcher task failed");
        }
        match stopped_early {
            Some(result) => result,
            None => server.await,
        }
    })
    .await;
    if finished {
        info!("all executions finished, bye");
    }

    match drained {
        Some(Ok(result)) => result.context("http server failed"),
        Some(Err(e)) => {
            warn!(error = %e, "http server task failed");
            Ok(())
        }
        None => {
            warn!("http server did not drain within the grace period");
            Ok(())
        }
    }
}
