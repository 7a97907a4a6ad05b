use duo_backend::config::Config;
use duo_backend::{AppState, app, store};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();

    let store = store::connect(&config.database_url)
        .await
        .expect("failed to open store");

    let addr = format!("{}:{}", config.host, config.port);
    let app = app(AppState::new(store, config));

    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");
    axum::serve(listener, app).await.expect("server error");
}
