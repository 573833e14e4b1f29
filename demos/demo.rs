use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{error, info};

use synchrolog_axum::init::{init_tracing_with_options, InitOptions};
use synchrolog_axum::{abort, HttpException, Severity, SynchrologConfig};

async fn index() -> Result<Json<Value>, HttpException> {
    info!("HELLO");
    error!("ALOHA");

    if let Err(err) = "EXCEPTION!!!".parse::<i64>() {
        error!(error = &err as &(dyn std::error::Error + 'static), "failed to parse order id");
    }

    Err(abort(StatusCode::NOT_FOUND))
}

async fn hello() -> Json<Value> {
    Json(json!({}))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // SYNCHROLOG_ACCESS_TOKEN must be set; the other SYNCHROLOG_* vars are
    // optional overrides.
    let config = SynchrologConfig::from_env()?;

    let app = Router::new()
        .route("/", get(index))
        .route("/hello", get(hello));

    let options = InitOptions::default().use_queue(true).level(Severity::Debug);
    let app = init_tracing_with_options(app, &config, options)?;

    let listener = TcpListener::bind("127.0.0.1:5000").await?;
    info!(address = %listener.local_addr()?, "demo listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
