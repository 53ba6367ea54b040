use std::{error::Error, sync::Arc};

use tokio::net;
use tracing::info;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use ticket_register::{relay, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load("config.toml").await?;
    let relay = relay::Relay::new(&config.relay)?;

    let listener = net::TcpListener::bind(config.relay.server.addr).await?;
    info!(
        addr = %config.relay.server.addr,
        downstream = %config.relay.downstream_url,
        "listening",
    );
    axum::serve(listener, relay::app(Arc::new(relay))).await?;

    Ok(())
}
