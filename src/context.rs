use axum::http::header::{COOKIE, USER_AGENT};
use axum::http::HeaderMap;
use std::fmt;
use std::net::SocketAddr;
use tracing::field::{Field, Visit};

/// Cookie holding the persistent anonymous identifier.
pub const ANONYMOUS_COOKIE: &str = "synchrolog_anonymous_id";
/// Cookie holding the authenticated user identifier.
pub const USER_COOKIE: &str = "synchrolog_user_id";

/// Name of the span that carries a [`RequestContext`].
pub const REQUEST_SPAN: &str = "synchrolog_request";

const FORWARDED_FOR_HEADERS: [&str; 2] = ["x-forwarded-for", "http_x-forwarded-for"];

/// Request-scoped identity and client information used by enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub anonymous_id: Option<String>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Extract the context from request headers and the peer address.
    pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let ip_address = FORWARDED_FOR_HEADERS
            .iter()
            .filter_map(|name| headers.get(*name))
            .filter_map(|value| value.to_str().ok())
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
            .or_else(|| peer.map(|addr| addr.ip().to_string()));

        RequestContext {
            anonymous_id: cookie(headers, ANONYMOUS_COOKIE),
            user_id: cookie(headers, USER_COOKIE),
            ip_address,
            user_agent: headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }

    /// Open a span carrying this context.
    ///
    /// Events emitted inside the span are enriched with its values. This is
    /// how the axum middleware attaches context, and it works the same for
    /// code that runs outside a request, such as a background job acting
    /// on behalf of a user.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "synchrolog_request",
            anonymous_id = self.anonymous_id.as_deref(),
            user_id = self.user_id.as_deref(),
            ip_address = self.ip_address.as_deref(),
            user_agent = self.user_agent.as_deref()
        )
    }
}

/// Value of the named cookie, percent-decoded. Empty values count as absent.
fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
        .map(|value| match urlencoding::decode(value) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => value.to_string(),
        })
}

/// Fills a [`RequestContext`] from the fields of a request span.
pub(crate) struct RequestContextVisitor<'a>(pub &'a mut RequestContext);

impl RequestContextVisitor<'_> {
    fn set(&mut self, field: &Field, value: String) {
        let slot = match field.name() {
            "anonymous_id" => &mut self.0.anonymous_id,
            "user_id" => &mut self.0.user_id,
            "ip_address" => &mut self.0.ip_address,
            "user_agent" => &mut self.0.user_agent,
            _ => return,
        };
        *slot = Some(value);
    }
}

impl Visit for RequestContextVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.set(field, format!("{:?}", value));
    }
}
