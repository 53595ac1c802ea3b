use futures::StreamExt;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use rollout_orchestrator::config::ControllerConfig;
use rollout_orchestrator::controller::{error_policy, reconcile, Context};
use rollout_orchestrator::crd::{RolloutOrchestrator, StagePodAutoscaler};
use rollout_orchestrator::server::{
    create_metrics, run_health_server, shutdown_channel, wait_for_signal, ReadinessState,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting rollout orchestrator controller");

    let config = ControllerConfig::from_env();
    info!(
        health_port = config.health_port,
        reconcile_timeout_secs = config.reconcile_timeout.as_secs(),
        error_requeue_secs = config.error_requeue.as_secs(),
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        "Loaded configuration"
    );

    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let readiness = ReadinessState::new();
    let metrics = create_metrics()?;

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    let health_handle = tokio::spawn({
        let port = config.health_port;
        let readiness = readiness.clone();
        let metrics = metrics.clone();
        let shutdown = shutdown_signal.clone();
        async move {
            if let Err(e) = run_health_server(port, readiness, metrics, shutdown).await {
                warn!(error = %e, "Health server failed");
            }
        }
    });

    let (orchestrators, autoscalers) = match config.watch_namespace.as_deref() {
        Some(ns) => (
            Api::<RolloutOrchestrator>::namespaced(client.clone(), ns),
            Api::<StagePodAutoscaler>::namespaced(client.clone(), ns),
        ),
        None => (
            Api::<RolloutOrchestrator>::all(client.clone()),
            Api::<StagePodAutoscaler>::all(client.clone()),
        ),
    };

    let ctx = Arc::new(Context::new(client, config, Some(metrics)));

    readiness.set_ready();
    info!("Controller ready, starting reconciliation loop");

    // StagePodAutoscaler status changes re-trigger the owning orchestrator
    let controller = Controller::new(orchestrators, watcher::Config::default())
        .owns(autoscalers, watcher::Config::default())
        .graceful_shutdown_on(shutdown_signal.wait())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Ok((object, action)) = res {
                debug!(orchestrator = %object.name, action = ?action, "Reconciled");
            }
        });

    let signal_handle = tokio::spawn({
        let readiness = readiness.clone();
        async move {
            match wait_for_signal().await {
                Ok(name) => info!(signal = name, "Initiating graceful shutdown"),
                Err(e) => error!(error = %e, "Failed to listen for termination signals, shutting down"),
            }
            readiness.set_not_ready();
            shutdown_controller.shutdown();
        }
    });

    controller.await;
    info!("Controller stream ended");

    // Dropping the shutdown controller also stops the health server
    signal_handle.abort();
    let _ = signal_handle.await;
    readiness.set_not_ready();
    if let Err(e) = health_handle.await {
        warn!(error = %e, "Health server task did not exit cleanly");
    }

    info!("Rollout orchestrator controller stopped");
    Ok(())
}
