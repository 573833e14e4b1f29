use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::error::Error;
use std::net::SocketAddr;
use tracing::Instrument;

use crate::context::RequestContext;
use crate::enrich::iso_timestamp;
use crate::exception::{abort, HttpException};

/// Path of the diagnostic clock route.
pub const TIME_ROUTE: &str = "/synchrolog-time";

#[derive(Debug, Serialize)]
pub struct TimeResponse {
    pub time: String,
}

/// Current server time, used by clients to check liveness and clock skew.
pub async fn synchrolog_time() -> (StatusCode, Json<TimeResponse>) {
    let body = TimeResponse {
        time: iso_timestamp(Utc::now()),
    };
    (StatusCode::OK, Json(body))
}

/// Runs the request inside a `synchrolog_request` span and reports
/// [`HttpException`]s returned by handlers.
///
/// The response is passed through untouched apart from the internal
/// exception marker.
pub async fn synchrolog_middleware(req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let span = RequestContext::from_headers(req.headers(), peer).span();

    let mut response = next.run(req).instrument(span.clone()).await;

    if let Some(exception) = response.extensions_mut().remove::<HttpException>() {
        span.in_scope(|| report_http_exception(&exception));
    }
    response
}

fn report_http_exception(exception: &HttpException) {
    tracing::error!(
        exception = exception as &(dyn Error + 'static),
        status = exception.status().as_u16(),
        "HTTP exception during web request"
    );
}

/// Add the time route and wrap every route registered so far with
/// [`synchrolog_middleware`].
///
/// Unmatched paths and unsupported methods answer with a reported
/// [`HttpException`] (404 and 405). This replaces any fallback already set
/// on `router`. Routes added to the router afterwards are not covered.
pub fn instrument_router<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .route(TIME_ROUTE, get(synchrolog_time))
        .fallback(|| async { abort(StatusCode::NOT_FOUND) })
        .method_not_allowed_fallback(|| async { abort(StatusCode::METHOD_NOT_ALLOWED) })
        .layer(axum::middleware::from_fn(synchrolog_middleware))
}
