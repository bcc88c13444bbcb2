use flock_api::{
    config::{Config, ConfigError},
    server::{self, ServerState, StateError},
};
use flock_db::{DbClient, DbError, MemoryStore, Store};
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error setting up services: {0}")]
    State(#[from] StateError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
    #[error("Post worker panicked: {0}")]
    Worker(JoinError),
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "flock_api=debug,\
                flock_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn open_store(config: &Config) -> Result<Arc<dyn Store>, InitError> {
    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL is not set, keeping everything in memory");
        return Ok(Arc::new(MemoryStore::new(
            config.snowflake_worker_id,
            config.snowflake_process_id,
        )));
    };

    let client = DbClient::connect(
        database_url,
        config.snowflake_worker_id,
        config.snowflake_process_id,
    )
    .await?;
    client.migrate().await?;

    Ok(Arc::new(client))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!(error = %err, "Could not listen for ctrl-c");
            }
            info!("Shutting down");
            shutdown.cancel();
        }
        () = shutdown.cancelled() => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let config = Config::from_env()?;

    let store = open_store(&config).await?;
    let (state, worker) = ServerState::new(store, &config)?;

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(worker.run(shutdown.child_token()));

    let server_address = config.socket_address();
    let listener = TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    let served = axum::serve(
        listener,
        server::app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await;

    shutdown.cancel();
    worker.await.map_err(InitError::Worker)?;

    served.map_err(InitError::TcpServe)
}
