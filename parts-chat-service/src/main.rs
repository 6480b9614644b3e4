use anyhow::Context;
use parts_chat_service::{LogFormat, ServiceConfig, create_app};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing in the format selected by LOG_FORMAT
fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "parts_chat_service=debug,parts_flow=debug,tower_http=debug".into()
    });

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    init_tracing(config.log_format);

    let app = create_app(&config).context("Failed to build application")?;
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    let addr = listener.local_addr()?;

    info!("Parts chat service listening on http://{}", addr);
    info!("Chat endpoint: POST http://{}/chat", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
