use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dnnface::config::ServiceConfig;
use dnnface::inference::InferenceContext;
use dnnface::service::{self, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,axum=info,hyper=info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config = ServiceConfig::from_env();
    let inference = match InferenceContext::new(&config) {
        Ok(inference) => inference,
        Err(err) => {
            error!("event" = "detector.init_failed", %err);
            return ExitCode::FAILURE;
        }
    };
    if inference.detector.is_none() {
        warn!("event" = "detector.unavailable", "message" = "/detect will answer 503");
    }

    let addr: SocketAddr = match config.bind_addr().parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!("event" = "server.bad_addr", addr = %config.bind_addr(), %err);
            return ExitCode::FAILURE;
        }
    };
    let app = service::router(AppState::new(inference, config));
    info!("listening" = %addr, "event" = "server.start");

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("event" = "server.bind_failed", %err);
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = axum::serve(listener, app).await {
        error!(%err, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
