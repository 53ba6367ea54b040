use std::{error::Error, sync::Arc};

use tokio::net;
use tracing::{error, info};
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use ticket_register::{config, db, server, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load("config.toml").await?;
    let db_config = config::Db::from_env().inspect_err(|e| error!("{e}"))?;

    let db_client = db::connect(&db_config, &config.pool).await?;
    db_client
        .ping()
        .await
        .inspect_err(|e| error!("failed to connect to database: {e}"))?;
    info!(host = %db_config.host, db = %db_config.name, "connected to database");

    let app = server::app(Arc::new(db_client), &config.http)?;

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    info!(addr = %config.http.server.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
