use prism::main_helper::{build_router, load_args};
use prism::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let args = load_args();

    let _guard = prism::logging::init_tracing(&args.log_dir, args.log_json);
    prism::logging::setup_panic_hook();

    let addr = format!("{}:{}", args.host, args.port);
    let state = match AppState::from_args(args) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Failed to build application state: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Upstream: {} | Models: {} | Reasoning format: {:?} | Auth: {}",
        state.engine.upstream().profile().name(),
        state.engine.models().join(", "),
        state.engine.reasoning_format(),
        if state.args.api_key.is_some() { "bearer" } else { "open" }
    );

    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Prism listening on {}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
