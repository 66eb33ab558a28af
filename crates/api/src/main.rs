use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use gatehouse_api::app::{build_app, services::build_services};
use gatehouse_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gatehouse_observability::init();

    let config = AppConfig::from_env().context("loading configuration")?;
    let services = build_services(&config).await?;
    let app = build_app(Arc::new(services));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!(%addr, "gatehouse-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("serving")?;
    Ok(())
}
