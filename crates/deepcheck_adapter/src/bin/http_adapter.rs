#![forbid(unsafe_code)]

use std::{env, net::SocketAddr, sync::Arc};

use deepcheck_adapter::http::{router, SharedRuntime};
use deepcheck_adapter::{log_startup, AdapterRuntime};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let bind = env::var("DEEPCHECK_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;
    let runtime: SharedRuntime = Arc::new(AdapterRuntime::default_from_env()?);
    let app = router(runtime.clone());

    log_startup(&bind, &runtime);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        log::warn!("ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
    log::info!("deepcheck_http shutting down");
}
