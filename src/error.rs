// Error types for the dashboard backend

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures raised by a document store backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store connection has not been established")]
    NotConnected,

    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("malformed document in '{collection}': {message}")]
    Decode { collection: String, message: String },
}

impl StoreError {
    pub fn decode(collection: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            collection: collection.to_string(),
            message: message.into(),
        }
    }

    /// True when the store itself is unreachable rather than a single query failing.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Connection(_))
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;
        match *err.kind {
            ErrorKind::ServerSelection { .. }
            | ErrorKind::Io(_)
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::DnsResolve { .. } => Self::Connection(err.to_string()),
            _ => Self::Query(err.to_string()),
        }
    }
}

/// Input rejected before reaching the store, naming every failing field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid or missing field(s): {}", fields.join(", "))]
pub struct ValidationError {
    pub fields: Vec<String>,
}

impl ValidationError {
    pub fn field(name: &str) -> Self {
        Self {
            fields: vec![name.to_string()],
        }
    }
}

/// Errors surfaced by the record accessor and the dashboard cache.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccessError {
    #[error("connection error: {0}")]
    Connection(StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        if err.is_connection() {
            Self::Connection(err)
        } else {
            Self::Store(err)
        }
    }
}

/// Sync status could not be determined. Never degraded to a guess.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("sync status unavailable while reading {kind}: {source}")]
pub struct SyncError {
    pub kind: String,
    #[source]
    pub source: StoreError,
}

/// Errors returned by the JSON route layer.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Access(AccessError::Connection(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Access(AccessError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Access(AccessError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Sync(err) if err.source.is_connection() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Sync(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = json!({ "error": self.to_string() });
        if let ApiError::Access(AccessError::Validation(v)) = &self {
            body["fields"] = json!(v.fields);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failures_map_to_connection_variant() {
        let err: AccessError = StoreError::NotConnected.into();
        assert!(matches!(err, AccessError::Connection(_)));

        let err: AccessError = StoreError::Query("boom".into()).into();
        assert!(matches!(err, AccessError::Store(_)));
    }

    #[test]
    fn validation_error_lists_fields() {
        let err = ValidationError {
            fields: vec!["name".into(), "flag".into()],
        };
        assert_eq!(err.to_string(), "invalid or missing field(s): name, flag");
    }

    #[test]
    fn api_error_statuses() {
        let resp = ApiError::from(AccessError::from(StoreError::NotConnected)).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = ApiError::from(AccessError::from(ValidationError::field("id"))).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resp = ApiError::from(SyncError {
            kind: "users".into(),
            source: StoreError::Query("bad".into()),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
