use std::sync::Arc;

use bandtogether::services::identity::{HttpIdentityVerifier, IdentityVerifier};
use bandtogether::{db, routes, services, state};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    // Identity verification is optional: without it, websocket connections
    // are accepted as guests only.
    let verifier: Option<Arc<dyn IdentityVerifier>> = match HttpIdentityVerifier::from_env() {
        Ok(v) => {
            tracing::info!("identity verifier configured");
            Some(Arc::new(v))
        }
        Err(e) => {
            tracing::warn!(error = %e, "identity verifier not configured, guest access only");
            None
        }
    };

    let state = state::AppState::new(pool, verifier);

    // Evicts presence entries for sockets that died without a close frame.
    let _sweep = services::sweep::spawn_sweep_task(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "bandtogether realtime listening");
    axum::serve(listener, app).await.expect("server failed");
}
