use clap::Parser;
use dotenvy::dotenv;
use media_split_backend::config::AppConfig;
use media_split_backend::services::reaper::ReaperWorker;
use media_split_backend::{AppState, create_app};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service type to run (api, worker, all)
    #[arg(short, long, default_value = "all")]
    mode: String,

    /// Port for the API server
    #[arg(short, long, default_value_t = 5000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_split_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting media split backend [Mode: {}]...", args.mode);

    let config = AppConfig::from_env();
    std::fs::create_dir_all(&config.upload_root)?;
    std::fs::create_dir_all(&config.split_root)?;
    info!("Upload root: {}", config.upload_root.display());
    info!("Split root: {}", config.split_root.display());
    info!(
        "Part cap: {} MB, transfer client: {}",
        config.part_size_mb, config.transfer_client_type
    );

    let state = AppState::from_config(config.clone());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    if args.mode == "worker" || args.mode == "all" {
        let worker = ReaperWorker::new(
            state.reaper.clone(),
            Duration::from_secs(config.cleanup_interval_secs),
            Duration::from_secs(config.max_file_age_secs),
            shutdown_rx.clone(),
        );
        tokio::spawn(worker.run());
        info!("🧹 Reaper worker initialized.");
    }

    if args.mode == "api" || args.mode == "all" {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!("Finished in {:?} with status {}", latency, response.status());
                },
            );

        let app = create_app(state).layer(trace_layer);
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("✅ API server listening on http://0.0.0.0:{}", args.port);
        info!(
            "Swagger UI documentation: http://localhost:{}/swagger-ui",
            args.port
        );

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!("Server runtime error: {}", e);
        }
    } else {
        // Standalone worker mode just waits for the signal
        shutdown_signal().await;
    }

    let _ = shutdown_tx.send(true);
    info!("👋 Backend exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("SIGTERM received, initiating graceful shutdown...");
        },
    }
}
