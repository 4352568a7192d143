use std::net::TcpListener;

use anyhow::Context;
use scribe::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=debug,actix_web=info", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let listener = TcpListener::bind(&config.bind_addr)
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    scribe::start(&config, listener).await?.await?;
    Ok(())
}
