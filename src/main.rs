use startline::api;
use startline::config::Config;
use startline::reconcile;
use startline::state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "startline=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!("Starting startline (env: {})", config.environment);

    let state = AppState::new(config).await?;

    // Periodic reconciliation sweep
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let interval_secs = sweep_state.config.sweep_interval_secs;
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            if let Err(e) = reconcile::run_sweep(&sweep_state).await {
                tracing::error!(error = %e, "Reconciliation sweep failed");
            }
        }
    });

    let app = api::create_router(state.clone());

    let addr = format!("0.0.0.0:{}", state.config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("startline HTTP listening on {addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
