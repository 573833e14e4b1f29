use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::error::Error;

use crate::traceback::Traceback;

/// Exception details attached to a [`crate::record::LogRecord`].
#[derive(Debug, Clone)]
pub struct ExceptionInfo {
    /// The exception's own message.
    pub message: String,
    /// Application-defined HTTP status carried by the exception.
    pub status: Option<u16>,
    pub traceback: Traceback,
}

impl ExceptionInfo {
    pub fn new(message: impl Into<String>, traceback: Traceback) -> Self {
        ExceptionInfo {
            message: message.into(),
            status: None,
            traceback,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Build exception info from an error recorded on a `tracing` event.
    ///
    /// If the error, or anything in its source chain, is an
    /// [`HttpException`], its status and the stack captured where it was
    /// raised are used. Otherwise the current stack is captured.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let mut current: Option<&(dyn Error + 'static)> = Some(err);
        while let Some(e) = current {
            if let Some(http) = e.downcast_ref::<HttpException>() {
                return ExceptionInfo {
                    message: err.to_string(),
                    status: Some(http.status().as_u16()),
                    traceback: http.traceback().clone(),
                };
            }
            current = e.source();
        }

        ExceptionInfo::new(err.to_string(), Traceback::capture())
    }
}

/// An HTTP-level error raised by a handler.
///
/// Returned from a handler it becomes a plain response with the given
/// status; the synchrolog middleware additionally reports it as an error
/// event.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status}: {message}")]
pub struct HttpException {
    status: StatusCode,
    message: String,
    traceback: Traceback,
}

impl HttpException {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        HttpException {
            status,
            message: message.into(),
            traceback: Traceback::capture(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn traceback(&self) -> &Traceback {
        &self.traceback
    }
}

/// Shorthand for an [`HttpException`] with the canonical reason phrase.
pub fn abort(status: StatusCode) -> HttpException {
    HttpException::new(status, status.canonical_reason().unwrap_or("Error"))
}

impl IntoResponse for HttpException {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.message.clone()).into_response();
        response.extensions_mut().insert(self);
        response
    }
}
