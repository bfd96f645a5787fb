use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use futures::StreamExt;
use kube::Client;
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use kube::runtime::watcher;
use prometheus::{Encoder, TextEncoder};
use tokio::signal;
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

use addon_health_core::addon_store::KubeAddonStore;
use addon_health_core::reconciler::{self, ReconcilerContext, REGISTRY};
use addon_health_core::registry::AgentRegistry;
use addon_health_core::types::{ManagedClusterAddOn, ManifestWork, ADDON_NAME_LABEL};
use addon_health_core::work_index::KubeWorkIndex;
use kube::ResourceExt;
use kube::api::Api;

use crate::commands::registry::demo_registry;

pub(crate) struct ReadyState {
    pub(crate) ready: bool,
}

pub async fn run(concurrency: u16, metrics_addr: &str) -> Result<()> {
    println!("Starting add-on health reconciler...\n");

    let client = Client::try_default().await.context("Failed to load kubeconfig")?;

    print!("  Hub connection .............. ");
    match client.apiserver_version().await {
        Ok(v) => println!("OK (v{}.{})", v.major, v.minor),
        Err(e) => {
            println!("FAIL");
            anyhow::bail!("Cannot reach hub cluster: {}. Is it running?", e);
        }
    }

    let addons: Api<ManagedClusterAddOn> = Api::all(client.clone());
    let works: Api<ManifestWork> = Api::all(client.clone());

    let ctx = Arc::new(ReconcilerContext {
        client: client.clone(),
        registry: Arc::new(demo_registry()),
        work_index: Arc::new(KubeWorkIndex::new(client.clone())),
        addon_store: Arc::new(KubeAddonStore::new(client.clone())),
        conflict_backoff: reconciler::ConflictBackoff::new(),
    });

    reconciler::force_init_metrics();

    let addr: SocketAddr = metrics_addr.parse().context("invalid --metrics-addr")?;

    println!("  Watching .................... ManagedClusterAddOn, ManifestWork");
    println!("  Concurrency .................. {concurrency}");
    println!("  Metrics server .............. http://{addr}");
    println!();
    println!("  Available endpoints:");
    println!("    GET /healthz .............. Liveness probe (always 200 OK)");
    println!("    GET /readyz ............... Readiness probe (503 until first reconcile)");
    println!("    GET /metrics .............. Prometheus metrics scrape endpoint");
    println!();
    println!("Reconciler running. Press Ctrl+C to stop.\n");

    info!("reconciler_started");

    let ready_state = Arc::new(Mutex::new(ReadyState { ready: false }));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let http_state = ready_state.clone();
    let http_shutdown = shutdown_tx.subscribe();
    let http_handle = tokio::spawn(async move { start_metrics_server(http_state, http_shutdown, addr).await });

    // §5: reconciles for different (cluster, addon) keys run concurrently,
    // up to `concurrency` in flight at once, by draining the Controller's
    // result stream with `for_each_concurrent` rather than serially.
    let concurrency = concurrency.max(1) as usize;
    let controller_ready = ready_state.clone();
    let controller = Controller::new(addons, watcher::Config::default())
        .watches(works, watcher::Config::default(), move |work| {
            work.labels().get(ADDON_NAME_LABEL).map(|addon| {
                kube::runtime::reflector::ObjectRef::new(addon).within(&work.namespace().unwrap_or_default())
            })
        })
        .run(reconciler::reconcile, reconciler::error_policy, ctx)
        .for_each_concurrent(concurrency, move |result| {
            let state = controller_ready.clone();
            async move {
                {
                    let mut s = state.lock().await;
                    s.ready = true;
                }
                if let Err(e) = result {
                    warn!(error = %e, "reconcile_dispatch_error");
                }
            }
        });

    tokio::select! {
        _ = controller => {
            info!("controller_stream_ended");
        }
        _ = signal::ctrl_c() => {
            info!("shutdown_signal_received");
            println!("\nShutdown signal received. Stopping reconciler...");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = http_handle.await?;

    info!("reconciler_stopped");
    println!("Reconciler stopped.");

    Ok(())
}

/* ============================= HTTP SERVER ============================= */

pub(crate) fn build_router(state: Arc<Mutex<ReadyState>>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { (StatusCode::OK, "OK") }))
        .route("/readyz", get({
            let state = state.clone();
            move || ready_handler(state.clone())
        }))
}

async fn start_metrics_server(
    state: Arc<Mutex<ReadyState>>,
    mut shutdown: broadcast::Receiver<()>,
    addr: SocketAddr,
) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await.context("Failed to bind metrics server")?;

    info!(addr = %addr, "metrics_server_started");

    axum::serve(listener, app).with_graceful_shutdown(async move { let _ = shutdown.recv().await; }).await?;

    Ok(())
}

async fn ready_handler(state: Arc<Mutex<ReadyState>>) -> impl IntoResponse {
    let state = state.lock().await;
    if state.ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => match String::from_utf8(buffer) {
            Ok(body) => (StatusCode::OK, body),
            Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error".to_string()),
        },
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error".to_string()),
    }
}
