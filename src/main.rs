use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use web_blog::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, Storage},
    spawn_session_sweeper,
};

/// main
///
/// Loads configuration, installs logging, connects and migrates Postgres,
/// then serves the API until the process is stopped.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: pretty locally, JSON in production
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "web_blog=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let storage = Storage::postgres(PostgresRepository::new(pool));

    // 4. Optional expired-session sweep
    if let Some(every) = config.session_sweep_interval {
        tracing::info!(interval_secs = every.as_secs(), "session sweeper enabled");
        spawn_session_sweeper(storage.clone(), every);
    }

    // 5. Server
    let address = config.address.clone();
    let app = create_router(AppState::new(storage, config));

    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%address, error = %e, "failed to bind listener");
            std::process::exit(1);
        }
    };

    tracing::info!("Listening on {address}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{address}/swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server terminated");
        std::process::exit(1);
    }
}
