use press_portal::{
    AppState, BcryptVerifier, InMemoryRepository, PostgresRepository,
    config::{AppConfig, Env},
    create_router,
    password::CredentialState,
    repository::RepositoryState,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `DATABASE_URL` value that selects the in-process store.
const MEMORY_STORE: &str = "memory";

/// main
///
/// Entry point: configuration, logging, storage, bootstrap admin, then the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise verbose for our crate.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "press_portal=debug,tower_http=info,axum=trace".into());

    // 3. Pretty logs locally, JSON for log aggregation in production.
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

    // 4. Storage
    let repo: RepositoryState = if config.db_url == MEMORY_STORE {
        tracing::warn!("DATABASE_URL=memory: all data is lost on shutdown");
        Arc::new(InMemoryRepository::new())
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.db_url)
            .await
            .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("FATAL: Database migrations failed.");

        Arc::new(PostgresRepository::new(pool))
    };

    // 5. Services
    let credentials: CredentialState = Arc::new(BcryptVerifier::default());
    let (app_state, _view_worker) = AppState::build(config.clone(), repo, credentials)
        .expect("FATAL: Invalid token signing configuration. Check JWT_SECRET and JWT_EXPIRES_IN.");

    // 6. Bootstrap administrator
    match app_state
        .accounts
        .seed_admin(&config.admin_username, &config.admin_email, &config.admin_password)
        .await
    {
        Ok(Some(admin)) => tracing::info!(email = %admin.email, "Default admin created"),
        Ok(None) => tracing::debug!("Admin account already present, skipping seed"),
        Err(e) => panic!("FATAL: Could not seed the default admin: {e}"),
    }

    // 7. Router and Server
    let app = create_router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Could not bind {addr}: {e}"));

    tracing::info!("Listening on {}", addr);
    tracing::info!(
        "API Documentation (Swagger UI) available at: http://localhost:{}/swagger-ui",
        config.port
    );

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
