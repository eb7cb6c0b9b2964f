use std::error::Error as StdError;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dispensa_api_types::{RpcErrorBody, RpcErrorMessage, code, codes};

use crate::service::ServiceError;

/// Structured diagnostics attached to a response so the shared logging
/// middleware can emit the full error chain without leaking it on the
/// wire.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Wire-facing RPC error: HTTP status plus the numeric gRPC-style code
/// carried in the error envelope.
#[derive(Debug)]
pub struct RpcError {
    source: &'static str,
    status: StatusCode,
    code: &'static str,
    grpc_code: u32,
    message: String,
    hint: Option<String>,
}

impl RpcError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        grpc_code: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            code,
            grpc_code,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn bad_request(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            source,
            StatusCode::BAD_REQUEST,
            codes::BAD_REQUEST,
            code::UNKNOWN,
            message,
        )
    }

    pub fn not_found(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            source,
            StatusCode::NOT_FOUND,
            codes::NOT_FOUND,
            code::NOT_FOUND,
            message,
        )
    }

    pub fn from_service(source: &'static str, error: ServiceError) -> Self {
        let (status, code) = service_status(&error);
        Self::new(source, status, code, error.grpc_code(), error.to_string())
    }
}

/// HTTP status and symbolic code for a service-layer failure. The
/// numeric envelope code comes from [`ServiceError::grpc_code`].
pub fn service_status(error: &ServiceError) -> (StatusCode, &'static str) {
    match error {
        ServiceError::Capacity { .. } => (StatusCode::SERVICE_UNAVAILABLE, codes::PAYLOAD_TOO_LARGE),
        ServiceError::Backpressure | ServiceError::DeadlineExceeded => {
            (StatusCode::SERVICE_UNAVAILABLE, codes::UNAVAILABLE)
        }
        ServiceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, codes::INTERNAL),
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let body = RpcErrorBody {
            error: RpcErrorMessage {
                code: self.code.to_string(),
                grpc_code: self.grpc_code,
                message: self.message.clone(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            self.source,
            self.status,
            format!("{}: {}", self.code, self.message),
        )
        .attach(&mut response);
        response
    }
}
